//! The production [`Host`]: a thin unsafe veneer over the Win32 loader.
//!
//! Each method is one loader call plus the translation between Rust types
//! and the wide/ANSI conventions of the underlying API. Failures are left
//! in the thread's last-error register for the engine to format.

use std::ffi::{CString, c_void};
use std::ptr;

use dlshim_core::host::{Host, MemorySource, ModuleHandle, error_code};
use windows_sys::Win32::Foundation::{
    FreeLibrary, GetLastError, HMODULE, MAX_PATH, SetLastError,
};
use windows_sys::Win32::System::Diagnostics::Debug::{
    FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS, FormatMessageW,
    SEM_FAILCRITICALERRORS, SetErrorMode,
};
use windows_sys::Win32::System::LibraryLoader::{
    GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS, GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
    GetModuleFileNameW, GetModuleHandleExW, GetModuleHandleW, GetProcAddress, LOAD_WITH_ALTERED_SEARCH_PATH,
    LoadLibraryExW,
};
use windows_sys::Win32::System::Memory::{
    MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_GUARD, PAGE_NOACCESS, VirtualQuery,
};
use windows_sys::Win32::System::ProcessStatus::K32EnumProcessModules;
use windows_sys::Win32::System::SystemServices::{LANG_NEUTRAL, SUBLANG_DEFAULT};
use windows_sys::Win32::System::Threading::GetCurrentProcess;

/// The live process as seen through the Win32 loader.
pub struct WindowsHost;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

impl MemorySource for WindowsHost {
    fn is_readable(&self, address: usize, len: usize) -> bool {
        if address == 0 {
            return false;
        }
        let mut cursor = address;
        let mut remaining = len.max(1);
        loop {
            let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
            let got = unsafe {
                VirtualQuery(
                    cursor as *const c_void,
                    &mut info,
                    size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if got == 0
                || info.State != MEM_COMMIT
                || info.Protect & (PAGE_NOACCESS | PAGE_GUARD) != 0
            {
                return false;
            }
            let region_end = info.BaseAddress as usize + info.RegionSize;
            let available = region_end - cursor;
            if available >= remaining {
                return true;
            }
            remaining -= available;
            cursor = region_end;
        }
    }

    fn read(&self, address: usize, buf: &mut [u8]) -> bool {
        if buf.is_empty() {
            return true;
        }
        if !self.is_readable(address, buf.len()) {
            return false;
        }
        unsafe {
            ptr::copy_nonoverlapping(address as *const u8, buf.as_mut_ptr(), buf.len());
        }
        true
    }
}

impl Host for WindowsHost {
    fn load_library(&self, path: &str) -> Option<ModuleHandle> {
        let path = wide(path);
        // Suppress the system error box a failing load would otherwise pop.
        let previous = unsafe { SetErrorMode(SEM_FAILCRITICALERRORS) };
        let module = unsafe {
            LoadLibraryExW(path.as_ptr(), ptr::null_mut(), LOAD_WITH_ALTERED_SEARCH_PATH)
        };
        unsafe { SetErrorMode(previous) };
        (!module.is_null()).then(|| ModuleHandle(module as usize))
    }

    fn free_library(&self, module: ModuleHandle) -> bool {
        unsafe { FreeLibrary(module.base() as HMODULE) != 0 }
    }

    fn program_handle(&self) -> Option<ModuleHandle> {
        let module = unsafe { GetModuleHandleW(ptr::null()) };
        (!module.is_null()).then(|| ModuleHandle(module as usize))
    }

    fn symbol_address(&self, module: ModuleHandle, name: &str) -> Option<usize> {
        let Ok(name) = CString::new(name) else {
            // A name with an interior NUL cannot match any export.
            self.set_last_error(error_code::ERROR_PROC_NOT_FOUND);
            return None;
        };
        let proc = unsafe { GetProcAddress(module.base() as HMODULE, name.as_ptr().cast()) };
        proc.map(|f| f as usize)
    }

    fn module_count(&self) -> Option<usize> {
        let mut needed = 0u32;
        let ok =
            unsafe { K32EnumProcessModules(GetCurrentProcess(), ptr::null_mut(), 0, &mut needed) };
        (ok != 0).then(|| needed as usize / size_of::<HMODULE>())
    }

    fn modules(&self, capacity: usize) -> Option<(Vec<ModuleHandle>, usize)> {
        let mut buffer: Vec<HMODULE> = vec![ptr::null_mut(); capacity];
        let mut needed = 0u32;
        let ok = unsafe {
            K32EnumProcessModules(
                GetCurrentProcess(),
                buffer.as_mut_ptr(),
                (capacity * size_of::<HMODULE>()) as u32,
                &mut needed,
            )
        };
        if ok == 0 {
            return None;
        }
        let needed = needed as usize / size_of::<HMODULE>();
        let filled = buffer[..needed.min(capacity)]
            .iter()
            .map(|&module| ModuleHandle(module as usize))
            .collect();
        Some((filled, needed))
    }

    fn module_from_address(&self, address: usize) -> Option<ModuleHandle> {
        let mut module: HMODULE = ptr::null_mut();
        let ok = unsafe {
            GetModuleHandleExW(
                GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS
                    | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
                address as *const u16,
                &mut module,
            )
        };
        (ok != 0 && !module.is_null()).then(|| ModuleHandle(module as usize))
    }

    fn module_path(&self, module: ModuleHandle) -> Option<String> {
        let mut buffer = [0u16; MAX_PATH as usize];
        let len = unsafe {
            GetModuleFileNameW(module.base() as HMODULE, buffer.as_mut_ptr(), MAX_PATH)
        } as usize;
        // A full buffer means the path was truncated.
        (len > 0 && len < buffer.len()).then(|| String::from_utf16_lossy(&buffer[..len]))
    }

    fn last_error(&self) -> u32 {
        unsafe { GetLastError() }
    }

    fn set_last_error(&self, code: u32) {
        unsafe { SetLastError(code) }
    }

    fn describe_error(&self, code: u32) -> String {
        let mut buffer = [0u16; 1024];
        let langid = SUBLANG_DEFAULT << 10 | LANG_NEUTRAL;
        let len = unsafe {
            FormatMessageW(
                FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
                ptr::null(),
                code,
                langid,
                buffer.as_mut_ptr(),
                buffer.len() as u32,
                ptr::null(),
            )
        } as usize;
        if len == 0 {
            return format!("unknown error {code}");
        }
        String::from_utf16_lossy(&buffer[..len])
    }

    fn max_path_len(&self) -> usize {
        MAX_PATH as usize
    }
}
