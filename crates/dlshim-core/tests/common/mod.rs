//! Deterministic host double for integration tests.
//!
//! Models just enough of a native loader for the engine's contract tests:
//! a loadable-library catalog, per-module reference counts, host-ordered
//! enumeration, a mapped-memory view, and a last-error register with fixed
//! localized descriptions (CRLF-terminated, like the real formatter).

#![allow(dead_code)]

pub mod image;

use std::cell::RefCell;
use std::collections::BTreeMap;

use dlshim_core::host::{Host, MemorySource, ModuleHandle, error_code};

/// Host code for an unload of a handle the loader does not know.
pub const ERROR_INVALID_HANDLE: u32 = 6;

/// A library the mock host is willing to load.
pub struct LibrarySpec {
    /// Canonical path, backslash-separated.
    pub path: &'static str,
    /// Base address the module maps at.
    pub base: usize,
    /// Mapped size; at least `image.len()`.
    pub size: usize,
    /// Bytes mapped at `base` (a synthetic PE image, or empty).
    pub image: Vec<u8>,
    /// Exported names and their absolute addresses.
    pub exports: Vec<(&'static str, usize)>,
}

struct Loaded {
    path: &'static str,
    base: usize,
    size: usize,
    refcount: usize,
    exports: Vec<(&'static str, usize)>,
    pinned: bool,
}

#[derive(Default)]
struct Inner {
    program: Option<usize>,
    catalog: Vec<LibrarySpec>,
    loaded: Vec<Loaded>,
    regions: BTreeMap<usize, Vec<u8>>,
    last_error: u32,
    load_attempts: usize,
    max_path: usize,
    always_grow: bool,
    fail_enumeration: bool,
    probe_shortfall: usize,
}

pub struct MockHost {
    inner: RefCell<Inner>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(Inner {
                max_path: 260,
                ..Inner::default()
            }),
        }
    }

    /// Install the running program's own module.
    pub fn with_program(self, path: &'static str, base: usize, size: usize) -> Self {
        {
            let mut inner = self.inner.borrow_mut();
            inner.program = Some(base);
            inner.loaded.push(Loaded {
                path,
                base,
                size,
                refcount: 1,
                exports: Vec::new(),
                pinned: true,
            });
        }
        self
    }

    /// Make a library available to `load_library`.
    pub fn add_library(&self, spec: LibrarySpec) {
        self.inner.borrow_mut().catalog.push(spec);
    }

    /// Load a library outside the facade, as a static import of the
    /// program would be.
    pub fn preload(&self, path: &str) -> ModuleHandle {
        self.load_library(path).expect("preload of unknown library")
    }

    /// Add an export to a module that is already loaded.
    pub fn add_export(&self, path: &str, name: &'static str, address: usize) {
        let mut inner = self.inner.borrow_mut();
        let loaded = inner
            .loaded
            .iter_mut()
            .find(|l| l.path == path)
            .expect("export target not loaded");
        loaded.exports.push((name, address));
    }

    /// Map raw bytes at an address, outside any module.
    pub fn map_region(&self, address: usize, bytes: Vec<u8>) {
        self.inner.borrow_mut().regions.insert(address, bytes);
    }

    pub fn set_max_path(&self, max_path: usize) {
        self.inner.borrow_mut().max_path = max_path;
    }

    /// Report one fewer module than is loaded from the count probe, as a
    /// host racing concurrent loads would.
    pub fn set_probe_shortfall(&self, shortfall: usize) {
        self.inner.borrow_mut().probe_shortfall = shortfall;
    }

    /// Make every fetch claim the module set grew past the buffer.
    pub fn set_always_grow(&self, always_grow: bool) {
        self.inner.borrow_mut().always_grow = always_grow;
    }

    /// Fail the enumeration primitives outright.
    pub fn set_fail_enumeration(&self, fail: bool) {
        self.inner.borrow_mut().fail_enumeration = fail;
    }

    pub fn loaded_count(&self) -> usize {
        self.inner.borrow().loaded.len()
    }

    pub fn is_loaded(&self, path: &str) -> bool {
        self.inner.borrow().loaded.iter().any(|l| l.path == path)
    }

    pub fn load_attempts(&self) -> usize {
        self.inner.borrow().load_attempts
    }
}

impl MemorySource for MockHost {
    fn is_readable(&self, address: usize, len: usize) -> bool {
        let inner = self.inner.borrow();
        inner
            .regions
            .range(..=address)
            .next_back()
            .is_some_and(|(start, bytes)| {
                let offset = address - start;
                offset <= bytes.len() && bytes.len() - offset >= len
            })
    }

    fn read(&self, address: usize, buf: &mut [u8]) -> bool {
        if !self.is_readable(address, buf.len()) {
            return false;
        }
        let inner = self.inner.borrow();
        let (start, bytes) = inner.regions.range(..=address).next_back().unwrap();
        let offset = address - start;
        buf.copy_from_slice(&bytes[offset..offset + buf.len()]);
        true
    }
}

impl Host for MockHost {
    fn load_library(&self, path: &str) -> Option<ModuleHandle> {
        let mut inner = self.inner.borrow_mut();
        inner.load_attempts += 1;

        if let Some(loaded) = inner.loaded.iter_mut().find(|l| l.path == path) {
            loaded.refcount += 1;
            let base = loaded.base;
            return Some(ModuleHandle(base));
        }

        let Some(index) = inner.catalog.iter().position(|spec| spec.path == path) else {
            inner.last_error = error_code::ERROR_MOD_NOT_FOUND;
            return None;
        };
        let spec = &inner.catalog[index];
        let (base, size, path, exports) =
            (spec.base, spec.size.max(spec.image.len()), spec.path, spec.exports.clone());
        let image = spec.image.clone();
        if !image.is_empty() {
            inner.regions.insert(base, image);
        }
        inner.loaded.push(Loaded {
            path,
            base,
            size,
            refcount: 1,
            exports,
            pinned: false,
        });
        Some(ModuleHandle(base))
    }

    fn free_library(&self, module: ModuleHandle) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(index) = inner.loaded.iter().position(|l| l.base == module.base()) else {
            inner.last_error = ERROR_INVALID_HANDLE;
            return false;
        };
        if inner.loaded[index].pinned {
            return true;
        }
        inner.loaded[index].refcount -= 1;
        if inner.loaded[index].refcount == 0 {
            let base = inner.loaded[index].base;
            inner.loaded.remove(index);
            inner.regions.remove(&base);
        }
        true
    }

    fn program_handle(&self) -> Option<ModuleHandle> {
        self.inner.borrow().program.map(ModuleHandle)
    }

    fn symbol_address(&self, module: ModuleHandle, name: &str) -> Option<usize> {
        let mut inner = self.inner.borrow_mut();
        let address = inner
            .loaded
            .iter()
            .find(|l| l.base == module.base())
            .and_then(|l| l.exports.iter().find(|(n, _)| *n == name))
            .map(|(_, address)| *address);
        if address.is_none() {
            inner.last_error = error_code::ERROR_PROC_NOT_FOUND;
        }
        address
    }

    fn module_count(&self) -> Option<usize> {
        let inner = self.inner.borrow();
        if inner.fail_enumeration {
            return None;
        }
        Some(inner.loaded.len().saturating_sub(inner.probe_shortfall))
    }

    fn modules(&self, capacity: usize) -> Option<(Vec<ModuleHandle>, usize)> {
        let inner = self.inner.borrow();
        if inner.fail_enumeration {
            return None;
        }
        if inner.always_grow {
            return Some((Vec::new(), capacity + 1));
        }
        let needed = inner.loaded.len();
        let filled = inner
            .loaded
            .iter()
            .take(capacity)
            .map(|l| ModuleHandle(l.base))
            .collect();
        Some((filled, needed))
    }

    fn module_from_address(&self, address: usize) -> Option<ModuleHandle> {
        self.inner
            .borrow()
            .loaded
            .iter()
            .find(|l| address >= l.base && address - l.base < l.size)
            .map(|l| ModuleHandle(l.base))
    }

    fn module_path(&self, module: ModuleHandle) -> Option<String> {
        self.inner
            .borrow()
            .loaded
            .iter()
            .find(|l| l.base == module.base())
            .map(|l| l.path.to_owned())
    }

    fn last_error(&self) -> u32 {
        self.inner.borrow().last_error
    }

    fn set_last_error(&self, code: u32) {
        self.inner.borrow_mut().last_error = code;
    }

    fn describe_error(&self, code: u32) -> String {
        match code {
            error_code::ERROR_NOT_ENOUGH_MEMORY => {
                "Not enough memory resources are available to process this command.\r\n".to_owned()
            }
            error_code::ERROR_INVALID_PARAMETER => "The parameter is incorrect.\r\n".to_owned(),
            error_code::ERROR_MOD_NOT_FOUND => {
                "The specified module could not be found.\r\n".to_owned()
            }
            error_code::ERROR_PROC_NOT_FOUND => {
                "The specified procedure could not be found.\r\n".to_owned()
            }
            error_code::ERROR_FILENAME_EXCED_RANGE => {
                "The filename or extension is too long.\r\n".to_owned()
            }
            ERROR_INVALID_HANDLE => "The handle is invalid.\r\n".to_owned(),
            other => format!("host error {other}\r\n"),
        }
    }

    fn max_path_len(&self) -> usize {
        self.inner.borrow().max_path
    }
}
