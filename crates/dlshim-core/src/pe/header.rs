//! PE header chain: DOS header, NT signature, COFF and optional headers,
//! down to the data directories.
//!
//! Parsing happens against a module mapped in memory, so every field is
//! located by RVA from the image base rather than by file offset.

use super::{
    DOS_MAGIC, OPTIONAL_MAGIC_PE32, OPTIONAL_MAGIC_PE32_PLUS, PE_SIGNATURE, PeError, PeResult,
    read_u16, read_u32,
};
use crate::host::MemorySource;

/// Offset of `e_lfanew` within the DOS header.
const E_LFANEW_OFFSET: usize = 0x3C;

/// Size of the COFF file header, which sits between the NT signature and the
/// optional header.
const COFF_HEADER_SIZE: usize = 20;

/// The format defines at most 16 data directories.
const MAX_DATA_DIRECTORIES: u32 = 16;

/// Well-known data directory indices.
pub mod directory_index {
    /// Export directory.
    pub const EXPORT: usize = 0;
    /// Import address table.
    pub const IMPORT_ADDRESS_TABLE: usize = 12;
}

/// One data directory entry: an RVA/size pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDirectory {
    /// RVA of the described structure.
    pub rva: u32,
    /// Declared size in bytes.
    pub size: u32,
}

impl DataDirectory {
    /// Returns `true` if the directory is actually present in the image.
    pub fn is_present(&self) -> bool {
        self.rva != 0 && self.size != 0
    }

    /// Returns `true` if `rva` falls inside the directory's declared span.
    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.rva && rva - self.rva < self.size
    }
}

/// Parsed view of one mapped PE image: base, pointer width, and the data
/// directory table. Nothing else is retained; consumers re-derive structures
/// from the directories on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct PeImage {
    base: usize,
    pe32_plus: bool,
    directories: Vec<DataDirectory>,
}

impl PeImage {
    /// Parse the header chain of the image mapped at `base`.
    pub fn parse<M: MemorySource + ?Sized>(mem: &M, base: usize) -> PeResult<Self> {
        if read_u16(mem, base)? != DOS_MAGIC {
            return Err(PeError::InvalidDosMagic);
        }
        let e_lfanew = read_u32(mem, base + E_LFANEW_OFFSET)? as usize;
        let nt = base
            .checked_add(e_lfanew)
            .ok_or(PeError::OffsetOverflow(base))?;

        if read_u32(mem, nt)? != PE_SIGNATURE {
            return Err(PeError::InvalidSignature);
        }

        let optional = nt
            .checked_add(4 + COFF_HEADER_SIZE)
            .ok_or(PeError::OffsetOverflow(nt))?;
        let magic = read_u16(mem, optional)?;
        // The directory table sits at a magic-dependent offset past the
        // optional header start, preceded by its entry count.
        let (count_offset, table_offset) = match magic {
            OPTIONAL_MAGIC_PE32_PLUS => (108, 112),
            OPTIONAL_MAGIC_PE32 => (92, 96),
            other => return Err(PeError::UnsupportedMagic(other)),
        };

        let count_address = optional
            .checked_add(count_offset)
            .ok_or(PeError::OffsetOverflow(optional))?;
        let count = read_u32(mem, count_address)?.min(MAX_DATA_DIRECTORIES) as usize;
        let mut directories = Vec::with_capacity(count);
        for index in 0..count {
            let entry = optional
                .checked_add(table_offset + index * 8)
                .ok_or(PeError::OffsetOverflow(optional))?;
            directories.push(DataDirectory {
                rva: read_u32(mem, entry)?,
                size: read_u32(mem, entry + 4)?,
            });
        }

        Ok(Self {
            base,
            pe32_plus: magic == OPTIONAL_MAGIC_PE32_PLUS,
            directories,
        })
    }

    /// Image base address.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Width in bytes of a pointer slot in this image's tables.
    pub fn pointer_size(&self) -> usize {
        if self.pe32_plus { 8 } else { 4 }
    }

    /// A data directory entry, if present in the image.
    pub fn directory(&self, index: usize) -> Option<DataDirectory> {
        self.directories
            .get(index)
            .copied()
            .filter(DataDirectory::is_present)
    }

    /// Absolute address of an RVA within this image.
    pub fn rva_to_va(&self, rva: u32) -> Option<usize> {
        self.base.checked_add(rva as usize)
    }

    /// Absolute half-open span of a data directory.
    pub fn directory_span(&self, index: usize) -> Option<(usize, usize)> {
        let directory = self.directory(index)?;
        let start = self.rva_to_va(directory.rva)?;
        let end = start.checked_add(directory.size as usize)?;
        Some((start, end))
    }
}
