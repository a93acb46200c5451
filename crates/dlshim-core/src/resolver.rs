//! Symbol resolution across scopes.
//!
//! A lookup is classified into one of three scopes: a specific module, the
//! default scope (the program's own image plus every globally-visible
//! module), or the next scope (the first module after the caller that
//! exports the name). Locally-registered modules are invisible to the
//! default and next scopes.

use crate::enumerate;
use crate::error::DlError;
use crate::host::{Host, ModuleHandle, error_code};
use crate::registry::LocalRegistry;

/// Lookup scope for one resolution call. Not stored anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Search exactly one module.
    Module(ModuleHandle),
    /// Search the program image, then every globally-visible module.
    Default,
    /// Search past the module containing `return_address`, which the entry
    /// point captured from its own call site.
    Next { return_address: usize },
}

/// Find the first exported symbol matching `name` under `scope`.
///
/// All-or-nothing: either an address comes back or an error describing why
/// not, with the host error code positioned for the caller to format. The
/// walk order for the global search is the host's enumeration order.
pub fn resolve<H: Host + ?Sized>(
    host: &H,
    locals: &LocalRegistry,
    scope: Scope,
    name: &str,
) -> Result<usize, DlError> {
    let program = host.program_handle();

    let (direct, caller) = match scope {
        Scope::Module(handle) => (Some(handle), None),
        Scope::Default => (program, None),
        Scope::Next { return_address } => {
            let Some(caller) = host.module_from_address(return_address) else {
                host.set_last_error(error_code::ERROR_INVALID_PARAMETER);
                return Err(DlError::InvalidCaller {
                    name: name.to_owned(),
                });
            };
            (None, Some(caller))
        }
    };

    if let Some(handle) = direct {
        if let Some(address) = host.symbol_address(handle, name) {
            return Ok(address);
        }
    }

    // The program handle alone cannot see symbols in libraries the program
    // linked against, so default-scope misses continue into the full module
    // list. A plain library handle does not get that fallback.
    if caller.is_some() || direct == program {
        let Some(modules) = enumerate::snapshot(host) else {
            if host.last_error() == error_code::NO_ERROR {
                host.set_last_error(error_code::ERROR_NOT_ENOUGH_MEMORY);
            }
            return Err(DlError::SymbolNotFound {
                name: name.to_owned(),
            });
        };

        let mut pending_caller = caller;
        for module in modules {
            // Next scope: everything up to and including the caller is
            // behind us in load order.
            if let Some(caller) = pending_caller {
                if module == caller {
                    pending_caller = None;
                }
                continue;
            }
            if locals.contains(module) {
                continue;
            }
            if let Some(address) = host.symbol_address(module, name) {
                return Ok(address);
            }
        }
    }

    if host.last_error() == error_code::NO_ERROR {
        host.set_last_error(error_code::ERROR_PROC_NOT_FOUND);
    }
    Err(DlError::SymbolNotFound {
        name: name.to_owned(),
    })
}
