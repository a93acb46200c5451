//! Module enumeration over the host's probe/fetch primitives.
//!
//! The host reports a module count and fills a caller-sized buffer in two
//! separate calls, so the set can grow in between. The snapshot loop retries
//! with the larger count a bounded number of times and then gives up rather
//! than chasing a process that keeps loading modules.

use crate::host::{Host, ModuleHandle};

/// Unproductive regrow attempts before a snapshot is abandoned.
pub const MAX_SNAPSHOT_RETRIES: usize = 3;

/// Number of modules currently mapped into the process.
///
/// A failed probe counts as zero; the before/after load heuristic in the
/// facade degrades gracefully when the primitive is unavailable.
pub fn module_count<H: Host + ?Sized>(host: &H) -> usize {
    host.module_count().unwrap_or(0)
}

/// Ordered list of all modules currently mapped into the process.
///
/// Order is whatever the host reports, stable only for this one call.
/// Returns `None` if the primitive fails or the module set never stops
/// growing within the retry budget.
pub fn snapshot<H: Host + ?Sized>(host: &H) -> Option<Vec<ModuleHandle>> {
    let mut capacity = host.module_count()?;
    for _ in 0..MAX_SNAPSHOT_RETRIES {
        let (mut modules, needed) = host.modules(capacity)?;
        if needed <= capacity {
            modules.truncate(needed);
            return Some(modules);
        }
        capacity = needed;
    }
    None
}
