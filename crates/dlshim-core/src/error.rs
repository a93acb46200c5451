//! Error taxonomy and the single-slot pending-error state.
//!
//! Failures are reported to callers twice over: a `None`/nonzero return from
//! the failing operation, and a formatted message readable exactly once
//! through the error slot, in the POSIX `dlerror` style.

use thiserror::Error;

/// Maximum size of the formatted error message, in bytes.
///
/// The native error formatter documents 64K as the largest message it can
/// produce, so the slot is capped at that limit.
pub const ERROR_BUFFER_CAP: usize = 65535;

/// Failure kinds produced by the engine.
///
/// Each variant carries the argument of the call that failed; the argument
/// is what gets quoted into the error slot, ahead of the host-localized
/// description of the pending host error code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DlError {
    /// The supplied path exceeds the host's path-length limit.
    #[error("library name too long: {path}")]
    NameTooLong { path: String },

    /// The host loader could not load the module.
    #[error("failed to load {path}")]
    LoadFailed { path: String },

    /// The host loader could not unload the handle.
    #[error("failed to close handle {handle:#x}")]
    CloseFailed { handle: usize },

    /// No reachable module exports the symbol.
    #[error("undefined symbol: {name}")]
    SymbolNotFound { name: String },

    /// The module invoking a next-scope lookup could not be identified.
    #[error("calling module not identifiable while resolving {name}")]
    InvalidCaller { name: String },

    /// Bookkeeping memory could not be reserved while opening `path`.
    #[error("out of memory while registering {path}")]
    OutOfMemory { path: String },
}

impl DlError {
    /// The argument string quoted into the error slot.
    pub fn argument(&self) -> String {
        match self {
            Self::NameTooLong { path }
            | Self::LoadFailed { path }
            | Self::OutOfMemory { path } => path.clone(),
            Self::CloseFailed { handle } => format!("{handle:#x}"),
            Self::SymbolNotFound { name } | Self::InvalidCaller { name } => name.clone(),
        }
    }
}

/// Single-slot pending-error flag plus formatted message buffer.
///
/// `pending` is true iff an operation failed since the slot was last read.
/// Reading is destructive: exactly one read observes the message.
#[derive(Debug, Default)]
pub struct ErrorState {
    pending: bool,
    message: String,
}

impl ErrorState {
    /// Create a slot with no pending error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any pending error without reading it.
    pub fn clear(&mut self) {
        self.pending = false;
    }

    /// Returns `true` if an unread failure is pending.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Record a failure as `"<argument>": <description>`.
    ///
    /// The argument is truncated if the quoted prefix alone would overflow
    /// the buffer; a single trailing CRLF left by the host formatter is
    /// stripped, since the message must not end in a newline.
    pub fn record(&mut self, argument: &str, description: &str) {
        let mut argument = argument;
        if argument.len() > ERROR_BUFFER_CAP - 5 {
            let mut end = ERROR_BUFFER_CAP - 5;
            while !argument.is_char_boundary(end) {
                end -= 1;
            }
            argument = &argument[..end];
        }

        let mut message = format!("\"{argument}\": {description}");
        if message.len() > ERROR_BUFFER_CAP {
            let mut end = ERROR_BUFFER_CAP;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        if message.ends_with("\r\n") {
            message.truncate(message.len() - 2);
        }

        self.message = message;
        self.pending = true;
    }

    /// Destructive read: the message if a failure is pending, else `None`.
    ///
    /// Both branches leave the slot non-pending, so an immediately repeated
    /// read yields `None`.
    pub fn take(&mut self) -> Option<String> {
        let pending = std::mem::replace(&mut self.pending, false);
        pending.then(|| self.message.clone())
    }
}
