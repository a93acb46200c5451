//! # dlshim-core
//!
//! POSIX dynamic-loading semantics (`dlopen`, `dlsym`, `dlclose`,
//! `dlerror`, `dladdr`) implemented over an abstract native loader whose
//! own interface has no visibility flags, no `RTLD_NEXT`/`RTLD_DEFAULT`,
//! and a different error-reporting model.
//!
//! The crate is pure logic: every operating-system primitive is consumed
//! through the [`host::Host`] trait, so the engine runs unchanged against
//! the real Win32 loader (see the ABI crate) and against deterministic test
//! doubles. No `unsafe` code is permitted at the crate level.
//!
//! State is explicit: a [`DlContext`] owns the local-visibility registry
//! and the single-slot pending error, and callers serialize their own
//! access — the underlying loader is documented non-thread-safe and this
//! crate makes no effort to improve on that.

#![deny(unsafe_code)]

pub mod context;
pub mod enumerate;
pub mod error;
pub mod flags;
pub mod host;
pub mod introspect;
pub mod pe;
pub mod registry;
pub mod resolver;

pub use context::DlContext;
pub use error::{DlError, ERROR_BUFFER_CAP, ErrorState};
pub use host::{Host, MemorySource, ModuleHandle};
pub use introspect::AddressInfo;
pub use registry::LocalRegistry;
pub use resolver::Scope;
