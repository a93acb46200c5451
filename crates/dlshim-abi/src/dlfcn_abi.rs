//! C ABI entry points: `dlopen`, `dlsym`, `dlclose`, `dlerror`, `dladdr`,
//! plus the wide-string `wdlopen` variant.
//!
//! One engine context lives per thread; so do the scratch buffers that back
//! the `char*` results, which stay valid until the next call that replaces
//! them. The surface inherits the loader's single-threaded contract: handles
//! may cross threads, but the error slot and visibility registry are
//! per-thread state.

use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr;

use dlshim_core::DlContext;
use dlshim_core::flags::{RTLD_DEFAULT, RTLD_NEXT};
use dlshim_core::host::ModuleHandle;
use dlshim_core::resolver::Scope;
use windows_sys::Win32::System::Diagnostics::Debug::RtlCaptureStackBackTrace;

use crate::win_host::WindowsHost;

thread_local! {
    static CONTEXT: RefCell<DlContext<WindowsHost>> =
        RefCell::new(DlContext::new(WindowsHost));
    static ERROR_SCRATCH: RefCell<Option<CString>> = const { RefCell::new(None) };
    static ADDR_SCRATCH: RefCell<(Option<CString>, Option<CString>)> =
        const { RefCell::new((None, None)) };
}

/// Address attribution result, laid out as the POSIX `Dl_info` struct.
#[repr(C)]
pub struct DlInfo {
    /// Path of the module containing the address.
    pub dli_fname: *const c_char,
    /// Base address of that module.
    pub dli_fbase: *mut c_void,
    /// Name of the nearest enclosing exported symbol, or NULL.
    pub dli_sname: *const c_char,
    /// Address of that symbol, or NULL.
    pub dli_saddr: *mut c_void,
}

fn open(file: Option<&str>, mode: c_int) -> *mut c_void {
    CONTEXT.with(|ctx| match ctx.borrow_mut().open(file, mode) {
        Some(handle) => handle.base() as *mut c_void,
        None => ptr::null_mut(),
    })
}

/// # Safety
///
/// `file` must be NULL or a valid NUL-terminated string.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn dlopen(file: *const c_char, mode: c_int) -> *mut c_void {
    let file = if file.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(file) }.to_string_lossy().into_owned())
    };
    open(file.as_deref(), mode)
}

/// Wide-character variant of [`dlopen`] for callers holding UTF-16 paths.
///
/// # Safety
///
/// `file` must be NULL or a valid NUL-terminated UTF-16 string.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn wdlopen(file: *const u16, mode: c_int) -> *mut c_void {
    let file = if file.is_null() {
        None
    } else {
        let mut len = 0;
        while unsafe { *file.add(len) } != 0 {
            len += 1;
        }
        let units = unsafe { std::slice::from_raw_parts(file, len) };
        Some(String::from_utf16_lossy(units))
    };
    open(file.as_deref(), mode)
}

/// # Safety
///
/// `handle` must be a value previously returned by [`dlopen`].
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn dlclose(handle: *mut c_void) -> c_int {
    CONTEXT.with(|ctx| ctx.borrow_mut().close(ModuleHandle(handle as usize)))
}

/// # Safety
///
/// `handle` must be a handle from [`dlopen`] or one of the pseudo-handles;
/// `name` must be a valid NUL-terminated string.
#[inline(never)]
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn dlsym(handle: *mut c_void, name: *const c_char) -> *mut c_void {
    // A NULL name cannot match any export; funnel it through the normal
    // miss path so a following dlerror reports the failure.
    let name = if name.is_null() {
        "(null)".to_owned()
    } else {
        unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
    };

    let scope = match handle as usize {
        RTLD_DEFAULT => Scope::Default,
        RTLD_NEXT => {
            // Frame 0 of a backtrace is the return address of the capture
            // call itself, inside this function. Skipping one frame yields
            // this function's own return address, which lands inside the
            // calling module.
            let mut frame: *mut c_void = ptr::null_mut();
            let captured =
                unsafe { RtlCaptureStackBackTrace(1, 1, &mut frame, ptr::null_mut()) };
            let return_address = if captured == 0 { 0 } else { frame as usize };
            Scope::Next { return_address }
        }
        module => Scope::Module(ModuleHandle(module)),
    };

    CONTEXT.with(|ctx| match ctx.borrow_mut().resolve(scope, &name) {
        Some(address) => address as *mut c_void,
        None => ptr::null_mut(),
    })
}

/// Returns the message for the most recent failure, or NULL if no failure
/// happened since the last read. Each message is reported exactly once.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn dlerror() -> *mut c_char {
    let message = CONTEXT.with(|ctx| ctx.borrow_mut().last_error());
    ERROR_SCRATCH.with(|scratch| {
        let mut scratch = scratch.borrow_mut();
        let Some(message) = message else {
            *scratch = None;
            return ptr::null_mut();
        };
        let Ok(message) = CString::new(message) else {
            *scratch = None;
            return ptr::null_mut();
        };
        let pointer = message.as_ptr().cast_mut();
        *scratch = Some(message);
        pointer
    })
}

/// # Safety
///
/// `info` must be NULL or point to writable memory for one [`DlInfo`].
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn dladdr(address: *const c_void, info: *mut DlInfo) -> c_int {
    if info.is_null() {
        return 0;
    }
    let Some(found) = CONTEXT.with(|ctx| ctx.borrow().address_info(address as usize)) else {
        return 0;
    };

    ADDR_SCRATCH.with(|scratch| {
        let mut scratch = scratch.borrow_mut();
        let fname = CString::new(found.module_path).ok();
        let sname = found.symbol_name.and_then(|name| CString::new(name).ok());
        let filled = DlInfo {
            dli_fname: fname.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            dli_fbase: found.module_base as *mut c_void,
            dli_sname: sname.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            dli_saddr: found.symbol_address.unwrap_or(0) as *mut c_void,
        };
        unsafe { info.write(filled) };
        *scratch = (fname, sname);
    });
    1
}
