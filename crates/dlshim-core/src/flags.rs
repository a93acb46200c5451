//! Dynamic-loading mode flags and pseudo-handles.
//!
//! Numeric values match the original `dlfcn.h` shipped with the shim. The
//! native loader resolves all imports at load time, so `RTLD_LAZY` is an
//! alias for `RTLD_NOW` rather than a distinct binding mode.

/// Relocations are performed when the object is loaded.
pub const RTLD_NOW: i32 = 0;

/// Lazy binding is not supported by the native loader; same as [`RTLD_NOW`].
pub const RTLD_LAZY: i32 = RTLD_NOW;

/// Symbols are made available for lookups through the default scope.
pub const RTLD_GLOBAL: i32 = 1 << 1;

/// Symbols are excluded from default-scope lookups.
pub const RTLD_LOCAL: i32 = 1 << 2;

/// Pseudo-handle: look up in the normal global scope.
pub const RTLD_DEFAULT: usize = 0;

/// Pseudo-handle: look up in the next object after the calling one.
pub const RTLD_NEXT: usize = usize::MAX;

/// Returns `true` if `mode` requests local visibility.
///
/// Anything without the `RTLD_LOCAL` bit is treated as global, matching
/// POSIX's default of `RTLD_GLOBAL` when neither bit is given.
#[inline]
pub fn is_local(mode: i32) -> bool {
    mode & RTLD_LOCAL != 0
}

/// Returns `true` if `handle` is a recognized pseudo-handle.
#[inline]
pub fn is_pseudo_handle(handle: usize) -> bool {
    handle == RTLD_DEFAULT || handle == RTLD_NEXT
}
