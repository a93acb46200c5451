//! Export directory parsing and enclosing-symbol search.
//!
//! The export directory carries three parallel tables: function RVAs
//! (indexed by unbiased ordinal), name-string RVAs, and the
//! name-index-to-ordinal mapping. Attribution scans the function table for
//! the export whose address is the largest one not past the target, then
//! walks the name tables to recover its name. Nothing is cached; each query
//! re-reads the mapped image.

use super::{PeError, PeResult, directory_index, read_u16, read_u32, read_cstr};
use super::header::{DataDirectory, PeImage};
use crate::host::MemorySource;

/// Upper bound on table entries honored from a (possibly hostile) image.
const MAX_TABLE_ENTRIES: u32 = 1 << 20;

/// Longest export name honored, in bytes.
const MAX_NAME_LEN: usize = 4096;

/// Byte offsets of the export directory fields used here.
const ORDINAL_BASE_OFFSET: usize = 16;
const FUNCTION_COUNT_OFFSET: usize = 20;
const NAME_COUNT_OFFSET: usize = 24;
const FUNCTIONS_RVA_OFFSET: usize = 28;
const NAMES_RVA_OFFSET: usize = 32;
const NAME_ORDINALS_RVA_OFFSET: usize = 36;

/// Parsed export directory of one image.
#[derive(Debug, Clone)]
pub struct ExportDirectory {
    base: usize,
    span: DataDirectory,
    function_count: u32,
    name_count: u32,
    functions_va: usize,
    names_va: usize,
    name_ordinals_va: usize,
}

/// The export whose function address most closely precedes a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearestExport {
    /// Unbiased ordinal (index into the function table).
    pub ordinal_index: u32,
    /// Absolute address of the export's entry point.
    pub address: usize,
}

impl ExportDirectory {
    /// Locate and parse the export directory of `image`.
    ///
    /// Fails with [`PeError::MissingDirectory`] when the image exports
    /// nothing.
    pub fn parse<M: MemorySource + ?Sized>(mem: &M, image: &PeImage) -> PeResult<Self> {
        let span = image
            .directory(directory_index::EXPORT)
            .ok_or(PeError::MissingDirectory(directory_index::EXPORT))?;
        let directory = image
            .rva_to_va(span.rva)
            .ok_or(PeError::OffsetOverflow(image.base()))?;

        let function_count = read_u32(mem, directory + FUNCTION_COUNT_OFFSET)?.min(MAX_TABLE_ENTRIES);
        let name_count = read_u32(mem, directory + NAME_COUNT_OFFSET)?.min(MAX_TABLE_ENTRIES);
        let functions_rva = read_u32(mem, directory + FUNCTIONS_RVA_OFFSET)?;
        let names_rva = read_u32(mem, directory + NAMES_RVA_OFFSET)?;
        let name_ordinals_rva = read_u32(mem, directory + NAME_ORDINALS_RVA_OFFSET)?;

        Ok(Self {
            base: image.base(),
            span,
            function_count,
            name_count,
            functions_va: image
                .rva_to_va(functions_rva)
                .ok_or(PeError::OffsetOverflow(image.base()))?,
            names_va: image
                .rva_to_va(names_rva)
                .ok_or(PeError::OffsetOverflow(image.base()))?,
            name_ordinals_va: image
                .rva_to_va(name_ordinals_rva)
                .ok_or(PeError::OffsetOverflow(image.base()))?,
        })
    }

    /// The export declared ordinal base (informational; queries here use
    /// unbiased indices throughout).
    pub fn ordinal_base<M: MemorySource + ?Sized>(&self, mem: &M, image: &PeImage) -> PeResult<u32> {
        let directory = image
            .rva_to_va(self.span.rva)
            .ok_or(PeError::OffsetOverflow(self.base))?;
        read_u32(mem, directory + ORDINAL_BASE_OFFSET)
    }

    /// Find the exported function whose address is the largest one not
    /// exceeding `target`, so an address pointing into a function body is
    /// attributed to that function.
    ///
    /// Forwarder entries (RVAs inside the export directory itself) name a
    /// re-export in another module, not code in this one, and are skipped.
    pub fn find_enclosing<M: MemorySource + ?Sized>(
        &self,
        mem: &M,
        target: usize,
    ) -> Option<NearestExport> {
        let mut nearest: Option<NearestExport> = None;
        for index in 0..self.function_count {
            let entry = self.functions_va.checked_add(index as usize * 4)?;
            let rva = read_u32(mem, entry).ok()?;
            if rva == 0 || self.span.contains_rva(rva) {
                continue;
            }
            let address = self.base.checked_add(rva as usize)?;
            if address > target {
                continue;
            }
            if nearest.is_none_or(|best| address > best.address) {
                nearest = Some(NearestExport {
                    ordinal_index: index,
                    address,
                });
            }
        }
        nearest
    }

    /// Recover the exported name bound to an unbiased ordinal, if any.
    ///
    /// Exports without a name-table entry (export-by-ordinal) yield `None`.
    pub fn name_of<M: MemorySource + ?Sized>(&self, mem: &M, ordinal_index: u32) -> Option<String> {
        for index in 0..self.name_count {
            let ordinal_entry = self.name_ordinals_va.checked_add(index as usize * 2)?;
            if read_u16(mem, ordinal_entry).ok()? as u32 != ordinal_index {
                continue;
            }
            let name_entry = self.names_va.checked_add(index as usize * 4)?;
            let name_rva = read_u32(mem, name_entry).ok()?;
            let name_va = self.base.checked_add(name_rva as usize)?;
            return read_cstr(mem, name_va, MAX_NAME_LEN);
        }
        None
    }
}
