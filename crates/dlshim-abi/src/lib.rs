//! # dlshim-abi
//!
//! C-callable surface over the engine in `dlshim-core`: the POSIX
//! `dlfcn.h` entry points backed by the live Win32 loader. Built as a
//! `cdylib` for C consumers and as an `rlib` for Rust programs that want
//! the same semantics without going through the C ABI.
//!
//! Everything OS-specific is gated on Windows; on other targets the crate
//! compiles to just the flag constants so the workspace builds everywhere.

pub use dlshim_core::flags::{
    RTLD_DEFAULT, RTLD_GLOBAL, RTLD_LAZY, RTLD_LOCAL, RTLD_NEXT, RTLD_NOW,
};

#[cfg(windows)]
mod win_host;

#[cfg(windows)]
pub mod dlfcn_abi;

#[cfg(windows)]
pub use win_host::WindowsHost;
