//! Address-to-symbol attribution (the `dladdr` engine).
//!
//! Given an arbitrary address, identify the owning module and, best-effort,
//! the exported function enclosing it. Addresses that point at an
//! import-thunk trampoline are first de-indirected through the import
//! address table so the attribution lands on the real target function.
//!
//! Misses here are not errors: an unmapped address yields `None` and an
//! address with no matching export yields partial information, without ever
//! touching the pending-error slot.

use crate::host::Host;
use crate::pe::{ExportDirectory, PeImage, ThunkDecoder, directory_index, read_u32, read_u64};

/// Attribution result for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    /// Filesystem path of the owning module.
    pub module_path: String,
    /// Base address of the owning module.
    pub module_base: usize,
    /// Name of the enclosing exported function, when one could be matched.
    pub symbol_name: Option<String>,
    /// Entry address of the matched export.
    pub symbol_address: Option<usize>,
}

/// Longest probe any decoder needs.
const MAX_PROBE_LEN: usize = 16;

/// Attribute `address` to a module and, best-effort, an exported symbol.
pub fn address_info<H: Host + ?Sized>(
    host: &H,
    decoder: &dyn ThunkDecoder,
    address: usize,
) -> Option<AddressInfo> {
    if address == 0 || !host.is_readable(address, 1) {
        return None;
    }

    let address = deindirect(host, decoder, address);

    let module = host.module_from_address(address)?;
    let module_path = host.module_path(module)?;
    let mut info = AddressInfo {
        module_path,
        module_base: module.base(),
        symbol_name: None,
        symbol_address: None,
    };

    // Modules without a parseable export table still report ownership.
    if let Ok(image) = PeImage::parse(host, module.base()) {
        if let Ok(exports) = ExportDirectory::parse(host, &image) {
            if let Some(hit) = exports.find_enclosing(host, address) {
                if let Some(name) = exports.name_of(host, hit.ordinal_index) {
                    info.symbol_name = Some(name);
                    info.symbol_address = Some(hit.address);
                }
            }
        }
    }

    Some(info)
}

/// See through an import-thunk trampoline at `address`, if one is there.
///
/// The decoded slot is trusted only when it falls inside the owning
/// module's declared import-address-table bounds, is mapped, and holds a
/// mapped pointer. Anything else is treated as a pattern false positive and
/// the original address is kept.
fn deindirect<H: Host + ?Sized>(host: &H, decoder: &dyn ThunkDecoder, address: usize) -> usize {
    let len = decoder.probe_len();
    debug_assert!(len <= MAX_PROBE_LEN);
    let mut probe = [0u8; MAX_PROBE_LEN];
    if !host.read(address, &mut probe[..len]) {
        return address;
    }
    let Some(slot) = decoder.decode(address, &probe[..len]) else {
        return address;
    };

    let Some(owner) = host.module_from_address(address) else {
        return address;
    };
    let Ok(image) = PeImage::parse(host, owner.base()) else {
        return address;
    };
    let Some((iat_start, iat_end)) =
        image.directory_span(directory_index::IMPORT_ADDRESS_TABLE)
    else {
        return address;
    };
    let pointer_size = image.pointer_size();
    if slot < iat_start || slot.saturating_add(pointer_size) > iat_end {
        return address;
    }
    if !host.is_readable(slot, pointer_size) {
        return address;
    }

    let target = if pointer_size == 8 {
        read_u64(host, slot).ok().and_then(|value| usize::try_from(value).ok())
    } else {
        read_u32(host, slot).ok().map(|value| value as usize)
    };
    match target {
        Some(target) if target != 0 && host.is_readable(target, 1) => target,
        _ => address,
    }
}
