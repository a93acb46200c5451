//! Local-visibility registry.
//!
//! Tracks which loaded modules were opened under `RTLD_LOCAL` so that their
//! exports are excluded from default-scope and next-scope searches. Entries
//! are inserted and removed, never mutated; a handle appears at most once.

use std::collections::TryReserveError;

use crate::host::ModuleHandle;

/// Set of locally-scoped modules.
#[derive(Debug, Default)]
pub struct LocalRegistry {
    entries: Vec<ModuleHandle>,
}

impl LocalRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `module` is registered as locally scoped.
    pub fn contains(&self, module: ModuleHandle) -> bool {
        self.entries.contains(&module)
    }

    /// Register a module as locally scoped.
    ///
    /// Re-registering an already-present handle is a no-op. The insertion is
    /// fallible so the caller can undo a load when bookkeeping memory cannot
    /// be reserved.
    pub fn insert(&mut self, module: ModuleHandle) -> Result<(), TryReserveError> {
        if self.contains(module) {
            return Ok(());
        }
        self.entries.try_reserve(1)?;
        self.entries.push(module);
        Ok(())
    }

    /// Remove a module from the registry; absent handles are a no-op.
    pub fn remove(&mut self, module: ModuleHandle) {
        self.entries.retain(|entry| *entry != module);
    }

    /// Number of locally-scoped modules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no module is locally scoped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
