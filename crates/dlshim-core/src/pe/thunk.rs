//! Import-thunk trampoline decoding.
//!
//! A call through an import lands on a short linker-generated stub that
//! jumps through a slot in the import address table. Attribution has to see
//! through that stub: the address a program takes of an imported function is
//! the thunk, not the target. Each supported instruction set gets one
//! decoding strategy; the native one is selected at build time while the
//! rest stay compiled for tests.

/// One architecture's trampoline pattern.
pub trait ThunkDecoder {
    /// Bytes that must be readable at the probe address.
    fn probe_len(&self) -> usize;

    /// If `bytes` (read at `address`) form this architecture's import
    /// thunk, the absolute address of the import-address-table slot it
    /// jumps through.
    ///
    /// A `Some` here is only a candidate: the caller still validates the
    /// slot against the owning module's declared table bounds before
    /// trusting it.
    fn decode(&self, address: usize, bytes: &[u8]) -> Option<usize>;
}

/// x86-64 thunk: `jmp qword ptr [rip + disp32]`, encoded `ff 25 xx xx xx xx`.
#[derive(Debug, Clone, Copy, Default)]
pub struct X64Thunk;

impl ThunkDecoder for X64Thunk {
    fn probe_len(&self) -> usize {
        6
    }

    fn decode(&self, address: usize, bytes: &[u8]) -> Option<usize> {
        let [0xFF, 0x25, d0, d1, d2, d3] = *bytes.get(..6)?.first_chunk::<6>()? else {
            return None;
        };
        let displacement = i32::from_le_bytes([d0, d1, d2, d3]);
        // The displacement is relative to the next instruction.
        let slot = (address as i64)
            .checked_add(6)?
            .checked_add(displacement as i64)?;
        usize::try_from(slot).ok()
    }
}

/// AArch64 thunk: a page-relative address computation into `x16` followed
/// by an indirect branch.
///
/// ```text
/// adrp x16, <page>
/// ldr  x16, [x16, #<offset>]
/// br   x16
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct A64Thunk;

const ADRP_X16_MASK: u32 = 0x9F00_001F;
const ADRP_X16_BITS: u32 = 0x9000_0010;
const LDR_X16_X16_MASK: u32 = 0xFFC0_03FF;
const LDR_X16_X16_BITS: u32 = 0xF940_0210;
const BR_X16: u32 = 0xD61F_0200;

impl ThunkDecoder for A64Thunk {
    fn probe_len(&self) -> usize {
        12
    }

    fn decode(&self, address: usize, bytes: &[u8]) -> Option<usize> {
        let words = bytes.get(..12)?;
        let adrp = u32::from_le_bytes(words[0..4].try_into().ok()?);
        let ldr = u32::from_le_bytes(words[4..8].try_into().ok()?);
        let br = u32::from_le_bytes(words[8..12].try_into().ok()?);

        if adrp & ADRP_X16_MASK != ADRP_X16_BITS
            || ldr & LDR_X16_X16_MASK != LDR_X16_X16_BITS
            || br != BR_X16
        {
            return None;
        }

        // adrp immediate: 21 bits of page delta, immlo in bits 29..31 and
        // immhi in bits 5..24, sign-extended.
        let immlo = (adrp >> 29) & 0x3;
        let immhi = (adrp >> 5) & 0x7_FFFF;
        let imm21 = (immhi << 2) | immlo;
        let page_delta = ((imm21 as i64) << 43 >> 43) << 12;

        // ldr unsigned offset, scaled by the 8-byte access size.
        let offset = ((ldr >> 10) & 0xFFF) as i64 * 8;

        let page = (address & !0xFFF) as i64;
        let slot = page.checked_add(page_delta)?.checked_add(offset)?;
        usize::try_from(slot).ok()
    }
}

/// The decoding strategy for the instruction set this crate is built for.
pub fn native_decoder() -> &'static dyn ThunkDecoder {
    #[cfg(target_arch = "aarch64")]
    {
        &A64Thunk
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        &X64Thunk
    }
}
