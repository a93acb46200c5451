//! Host loader abstraction.
//!
//! Everything the engine needs from the operating system is expressed here as
//! two traits: [`MemorySource`] for raw, validity-checked memory access, and
//! [`Host`] for the loader primitives proper. The production implementation
//! wraps the Win32 loader in the ABI crate; tests substitute a deterministic
//! double.
//!
//! The failure channel mirrors the native convention: a failing primitive
//! returns `None`/`false` and leaves a nonzero code readable through
//! [`Host::last_error`]. No primitive is assumed thread-safe.

/// Host error codes the engine itself sets or inspects.
///
/// Values are the native loader's own, so a production host can pass them
/// straight through to its error formatter.
pub mod error_code {
    /// No pending host error.
    pub const NO_ERROR: u32 = 0;
    /// Resource exhaustion while bookkeeping a load.
    pub const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
    /// The calling module could not be identified.
    pub const ERROR_INVALID_PARAMETER: u32 = 87;
    /// The named module could not be found.
    pub const ERROR_MOD_NOT_FOUND: u32 = 126;
    /// The named symbol could not be found.
    pub const ERROR_PROC_NOT_FOUND: u32 = 127;
    /// The supplied path exceeds the host's path-length limit.
    pub const ERROR_FILENAME_EXCED_RANGE: u32 = 206;
}

/// Opaque identifier for a mapped executable image.
///
/// Identity is the image base address; the handle is owned by the host
/// loader and never freed implicitly by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(pub usize);

impl ModuleHandle {
    /// The image base address backing this handle.
    #[inline]
    pub fn base(self) -> usize {
        self.0
    }
}

/// Validity-checked access to the process address space.
pub trait MemorySource {
    /// Returns `true` if `len` bytes starting at `address` are mapped and
    /// readable.
    fn is_readable(&self, address: usize, len: usize) -> bool;

    /// Copy `buf.len()` bytes from `address` into `buf`.
    ///
    /// Returns `false` (leaving `buf` unspecified) if any part of the range
    /// is not readable.
    fn read(&self, address: usize, buf: &mut [u8]) -> bool;
}

/// Native loader primitives consumed by the engine.
pub trait Host: MemorySource {
    /// Load a module by (already separator-normalized) path, preferring
    /// system directories over the working directory.
    fn load_library(&self, path: &str) -> Option<ModuleHandle>;

    /// Unload a module. Returns `true` on success.
    fn free_library(&self, module: ModuleHandle) -> bool;

    /// Handle of the running program's own image.
    fn program_handle(&self) -> Option<ModuleHandle>;

    /// Raw exported-symbol address in one module, or `None` if the module
    /// does not export `name`.
    fn symbol_address(&self, module: ModuleHandle, name: &str) -> Option<usize>;

    /// Probe the number of modules currently mapped into the process.
    fn module_count(&self) -> Option<usize>;

    /// Enumerate mapped modules into a buffer of `capacity` entries.
    ///
    /// Returns the filled prefix plus the count the host would have needed;
    /// the set may grow between a probe and this call, so the caller must be
    /// prepared to retry with the larger count. Order is host-defined and
    /// stable only within a single call.
    fn modules(&self, capacity: usize) -> Option<(Vec<ModuleHandle>, usize)>;

    /// Identify the module whose image contains `address`.
    fn module_from_address(&self, address: usize) -> Option<ModuleHandle>;

    /// Filesystem path of a mapped module.
    fn module_path(&self, module: ModuleHandle) -> Option<String>;

    /// Pending host error code, `0` if none.
    fn last_error(&self) -> u32;

    /// Overwrite the pending host error code.
    fn set_last_error(&self, code: u32);

    /// Localized description of a host error code.
    fn describe_error(&self, code: u32) -> String;

    /// Longest path, in bytes, the host loader accepts.
    fn max_path_len(&self) -> usize;
}
