//! Synthetic PE32+ image builder for attribution tests.
//!
//! Produces a byte image with a real header chain (DOS header, NT
//! signature, COFF and optional headers, data directory table) plus an
//! optional export block, import-address-table slots, and arbitrary code
//! bytes placed at chosen RVAs. All offsets match the on-disk layout the
//! parser walks; only the fields it reads are populated.

const E_LFANEW: usize = 0x80;
const OPTIONAL: usize = E_LFANEW + 4 + 20;
const DIRECTORY_TABLE: usize = OPTIONAL + 112;
const EXPORT_DIR_RVA: usize = 0x200;
const EXPORT_DIR_SIZE: usize = 0x200;
const IAT_DIRECTORY_INDEX: usize = 12;

pub struct PeImageBuilder {
    size: usize,
    exports: Vec<(&'static str, u32)>,
    iat: Option<(u32, Vec<u64>)>,
    code: Vec<(u32, Vec<u8>)>,
}

impl PeImageBuilder {
    pub fn new() -> Self {
        Self {
            size: 0x1000,
            exports: Vec::new(),
            iat: None,
            code: Vec::new(),
        }
    }

    /// Export `name` at the given function RVA. RVAs must lie outside the
    /// export directory span (at or above 0x400) so they are not mistaken
    /// for forwarders. An empty name makes an export-by-ordinal entry.
    pub fn export(mut self, name: &'static str, rva: u32) -> Self {
        assert!(rva as usize >= EXPORT_DIR_RVA + EXPORT_DIR_SIZE || rva == 0);
        self.exports.push((name, rva));
        self
    }

    /// Declare an import address table at `rva` holding the given 8-byte
    /// slot values (absolute addresses of imported functions).
    pub fn iat(mut self, rva: u32, slots: Vec<u64>) -> Self {
        self.iat = Some((rva, slots));
        self
    }

    /// Place raw bytes (thunk stubs, function bodies) at an RVA.
    pub fn bytes_at(mut self, rva: u32, bytes: Vec<u8>) -> Self {
        self.size = self.size.max(rva as usize + bytes.len());
        self.code.push((rva, bytes));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut image = vec![0u8; self.size];

        // DOS header and NT signature.
        image[0..2].copy_from_slice(&0x5A4Du16.to_le_bytes());
        image[0x3C..0x40].copy_from_slice(&(E_LFANEW as u32).to_le_bytes());
        image[E_LFANEW..E_LFANEW + 4].copy_from_slice(&0x4550u32.to_le_bytes());

        // PE32+ optional header: magic and directory count.
        image[OPTIONAL..OPTIONAL + 2].copy_from_slice(&0x20Bu16.to_le_bytes());
        image[OPTIONAL + 108..OPTIONAL + 112].copy_from_slice(&16u32.to_le_bytes());

        if !self.exports.is_empty() {
            image[DIRECTORY_TABLE..DIRECTORY_TABLE + 4]
                .copy_from_slice(&(EXPORT_DIR_RVA as u32).to_le_bytes());
            image[DIRECTORY_TABLE + 4..DIRECTORY_TABLE + 8]
                .copy_from_slice(&(EXPORT_DIR_SIZE as u32).to_le_bytes());
            write_export_block(&mut image, &self.exports);
        }

        if let Some((rva, slots)) = &self.iat {
            let entry = DIRECTORY_TABLE + IAT_DIRECTORY_INDEX * 8;
            image[entry..entry + 4].copy_from_slice(&rva.to_le_bytes());
            image[entry + 4..entry + 8].copy_from_slice(&((slots.len() * 8) as u32).to_le_bytes());
            let mut offset = *rva as usize;
            for slot in slots {
                image[offset..offset + 8].copy_from_slice(&slot.to_le_bytes());
                offset += 8;
            }
        }

        for (rva, bytes) in &self.code {
            let offset = *rva as usize;
            image[offset..offset + bytes.len()].copy_from_slice(bytes);
        }

        image
    }
}

/// Export directory with its three tables and name strings laid out
/// contiguously after the 40-byte directory header.
fn write_export_block(image: &mut [u8], entries: &[(&'static str, u32)]) {
    let dir = EXPORT_DIR_RVA;
    let count = entries.len();
    let functions = dir + 40;
    let names = functions + count * 4;
    let ordinals = names + count * 4;
    let mut strings = ordinals + count * 2;

    let named: Vec<usize> = (0..count).filter(|&i| !entries[i].0.is_empty()).collect();

    // Ordinal base, function count, name count, table RVAs.
    image[dir + 16..dir + 20].copy_from_slice(&1u32.to_le_bytes());
    image[dir + 20..dir + 24].copy_from_slice(&(count as u32).to_le_bytes());
    image[dir + 24..dir + 28].copy_from_slice(&(named.len() as u32).to_le_bytes());
    image[dir + 28..dir + 32].copy_from_slice(&(functions as u32).to_le_bytes());
    image[dir + 32..dir + 36].copy_from_slice(&(names as u32).to_le_bytes());
    image[dir + 36..dir + 40].copy_from_slice(&(ordinals as u32).to_le_bytes());

    for (i, (_, rva)) in entries.iter().enumerate() {
        image[functions + i * 4..functions + i * 4 + 4].copy_from_slice(&rva.to_le_bytes());
    }
    for (row, &ordinal) in named.iter().enumerate() {
        let (name, _) = entries[ordinal];
        image[names + row * 4..names + row * 4 + 4]
            .copy_from_slice(&(strings as u32).to_le_bytes());
        image[ordinals + row * 2..ordinals + row * 2 + 2]
            .copy_from_slice(&(ordinal as u16).to_le_bytes());
        image[strings..strings + name.len()].copy_from_slice(name.as_bytes());
        strings += name.len() + 1;
    }
}

/// `jmp qword ptr [rip + disp32]` targeting an absolute slot address.
pub fn x64_thunk_to_slot(thunk_address: usize, slot_address: usize) -> Vec<u8> {
    let displacement = (slot_address as i64 - (thunk_address as i64 + 6)) as i32;
    let mut bytes = vec![0xFF, 0x25];
    bytes.extend_from_slice(&displacement.to_le_bytes());
    bytes
}
