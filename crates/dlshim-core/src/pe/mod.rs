//! PE image parsing over mapped process memory.
//!
//! Just enough of the PE32/PE32+ layout to attribute an address: the header
//! chain down to the data directories, the export directory, and the
//! import-thunk trampolines that the linker emits in front of the import
//! address table. Everything is read through a [`MemorySource`] so the same
//! code runs against live process memory and against synthetic images in
//! tests.
//!
//! Every offset is checked against the containing structure before use;
//! malformed or hostile images degrade to a parse error, never to a wild
//! read.

pub mod export;
pub mod header;
pub mod thunk;

pub use export::{ExportDirectory, NearestExport};
pub use header::{DataDirectory, PeImage, directory_index};
pub use thunk::{A64Thunk, ThunkDecoder, X64Thunk, native_decoder};

use thiserror::Error;

use crate::host::MemorySource;

/// DOS header magic, `MZ`.
pub const DOS_MAGIC: u16 = 0x5A4D;

/// NT signature, `PE\0\0`.
pub const PE_SIGNATURE: u32 = 0x0000_4550;

/// Optional-header magic for PE32 images.
pub const OPTIONAL_MAGIC_PE32: u16 = 0x010B;

/// Optional-header magic for PE32+ images.
pub const OPTIONAL_MAGIC_PE32_PLUS: u16 = 0x020B;

/// Error type for PE parsing operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeError {
    /// A required range of the image is not mapped or not readable.
    #[error("image memory at {0:#x} is not readable")]
    Unreadable(usize),
    /// The DOS header does not start with `MZ`.
    #[error("invalid DOS magic")]
    InvalidDosMagic,
    /// The NT header does not carry the `PE\0\0` signature.
    #[error("invalid PE signature")]
    InvalidSignature,
    /// The optional header magic is neither PE32 nor PE32+.
    #[error("unsupported optional-header magic: {0:#x}")]
    UnsupportedMagic(u16),
    /// A header offset computation left the address space.
    #[error("header offset overflow at {0:#x}")]
    OffsetOverflow(usize),
    /// The requested data directory is absent from the image.
    #[error("data directory {0} is absent")]
    MissingDirectory(usize),
}

/// Result type for PE parsing operations.
pub type PeResult<T> = Result<T, PeError>;

pub(crate) fn read_u16<M: MemorySource + ?Sized>(mem: &M, address: usize) -> PeResult<u16> {
    let mut buf = [0u8; 2];
    if !mem.read(address, &mut buf) {
        return Err(PeError::Unreadable(address));
    }
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32<M: MemorySource + ?Sized>(mem: &M, address: usize) -> PeResult<u32> {
    let mut buf = [0u8; 4];
    if !mem.read(address, &mut buf) {
        return Err(PeError::Unreadable(address));
    }
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64<M: MemorySource + ?Sized>(mem: &M, address: usize) -> PeResult<u64> {
    let mut buf = [0u8; 8];
    if !mem.read(address, &mut buf) {
        return Err(PeError::Unreadable(address));
    }
    Ok(u64::from_le_bytes(buf))
}

/// Read a NUL-terminated string, bounded by `limit` bytes.
///
/// Returns `None` for unreadable memory, a missing terminator within the
/// limit, or non-UTF-8 content.
pub(crate) fn read_cstr<M: MemorySource + ?Sized>(
    mem: &M,
    address: usize,
    limit: usize,
) -> Option<String> {
    let mut bytes = Vec::new();
    for offset in 0..limit {
        let mut byte = [0u8; 1];
        if !mem.read(address.checked_add(offset)?, &mut byte) {
            return None;
        }
        if byte[0] == 0 {
            return String::from_utf8(bytes).ok();
        }
        bytes.push(byte[0]);
    }
    None
}
