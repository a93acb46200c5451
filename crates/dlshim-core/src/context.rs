//! Loader facade: the POSIX-shaped call surface over one host loader.
//!
//! `DlContext` owns the process-scoped state the POSIX interface implies:
//! the local-visibility registry and the pending-error slot. It is an
//! explicit object rather than hidden statics so tests reset everything by
//! constructing a fresh context. The single-threaded contract of the
//! underlying loader carries over; nothing here synchronizes.

use crate::enumerate;
use crate::error::{DlError, ErrorState};
use crate::flags;
use crate::host::{Host, ModuleHandle, error_code};
use crate::introspect::{self, AddressInfo};
use crate::pe::{ThunkDecoder, native_decoder};
use crate::registry::LocalRegistry;
use crate::resolver::{self, Scope};

/// POSIX dynamic-loading interface over a [`Host`].
pub struct DlContext<H: Host> {
    host: H,
    locals: LocalRegistry,
    error: ErrorState,
    decoder: &'static dyn ThunkDecoder,
}

impl<H: Host> DlContext<H> {
    /// Create a context with no modules registered and no pending error.
    pub fn new(host: H) -> Self {
        Self {
            host,
            locals: LocalRegistry::new(),
            error: ErrorState::new(),
            decoder: native_decoder(),
        }
    }

    /// Replace the import-thunk decoding strategy.
    ///
    /// Attribution tests pick a fixed strategy here instead of inheriting
    /// the build target's.
    pub fn with_thunk_decoder(mut self, decoder: &'static dyn ThunkDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// The wrapped host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Open a module and return its handle (`dlopen`).
    ///
    /// `None` as the file requests the running program's own image, the
    /// handle behind the default lookup scope. The file name is length-checked
    /// in UTF-16 code units against the host's path limit, and forward
    /// slashes are normalized to the host's separator before the load. The local
    /// registry is updated from a before/after module-count delta: a
    /// fresh `RTLD_LOCAL` mapping is registered, while re-opening an
    /// already-resident module without `RTLD_LOCAL` unregisters it — once a
    /// module has been global it stays global.
    pub fn open(&mut self, file: Option<&str>, mode: i32) -> Option<ModuleHandle> {
        self.error.clear();

        let Some(file) = file else {
            return match self.host.program_handle() {
                Some(handle) => Some(handle),
                None => {
                    self.record(&DlError::LoadFailed {
                        path: "(null)".to_owned(),
                    });
                    None
                }
            };
        };

        // The host's path limit is in UTF-16 code units, its native path
        // encoding, not in UTF-8 bytes.
        if file.encode_utf16().count() >= self.host.max_path_len() {
            self.host
                .set_last_error(error_code::ERROR_FILENAME_EXCED_RANGE);
            self.record(&DlError::NameTooLong {
                path: file.to_owned(),
            });
            return None;
        }

        let path = file.replace('/', "\\");
        let before = enumerate::module_count(&self.host);
        let Some(handle) = self.host.load_library(&path) else {
            self.record(&DlError::LoadFailed { path });
            return None;
        };
        let after = enumerate::module_count(&self.host);
        let newly_mapped = before != after;

        if flags::is_local(mode) && newly_mapped {
            if self.locals.insert(handle).is_err() {
                self.host
                    .set_last_error(error_code::ERROR_NOT_ENOUGH_MEMORY);
                self.record(&DlError::OutOfMemory { path });
                self.host.free_library(handle);
                return None;
            }
        } else if !flags::is_local(mode) && !newly_mapped {
            self.locals.remove(handle);
        }

        Some(handle)
    }

    /// Close a handle (`dlclose`). Returns `0` on success, nonzero on
    /// failure — deliberately inverted from the host primitive's own
    /// convention.
    pub fn close(&mut self, handle: ModuleHandle) -> i32 {
        self.error.clear();

        if self.host.free_library(handle) {
            self.locals.remove(handle);
            0
        } else {
            self.record(&DlError::CloseFailed {
                handle: handle.base(),
            });
            1
        }
    }

    /// Resolve a symbol under a scope (`dlsym`). All-or-nothing: `None`
    /// leaves a pending error naming the symbol.
    pub fn resolve(&mut self, scope: Scope, name: &str) -> Option<usize> {
        self.error.clear();

        match resolver::resolve(&self.host, &self.locals, scope, name) {
            Ok(address) => Some(address),
            Err(error) => {
                self.record(&error);
                None
            }
        }
    }

    /// Consume the pending error message (`dlerror`).
    ///
    /// Exactly one read observes a failure; the next read returns `None`
    /// until something else fails.
    pub fn last_error(&mut self) -> Option<String> {
        self.error.take()
    }

    /// Attribute an address to a module and exported symbol (`dladdr`).
    ///
    /// Misses return `None` or partial info without disturbing the pending
    /// error slot.
    pub fn address_info(&self, address: usize) -> Option<AddressInfo> {
        introspect::address_info(&self.host, self.decoder, address)
    }

    /// Returns `true` if `module` is currently registered as local.
    pub fn is_local(&self, module: ModuleHandle) -> bool {
        self.locals.contains(module)
    }

    /// Format the pending host error into the error slot.
    ///
    /// A zero host code means the host has nothing to say and the slot is
    /// left untouched, mirroring the native loader's reporting model.
    fn record(&mut self, error: &DlError) {
        let code = self.host.last_error();
        if code == error_code::NO_ERROR {
            return;
        }
        let description = self.host.describe_error(code);
        self.error.record(&error.argument(), &description);
    }
}
