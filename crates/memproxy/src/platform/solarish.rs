use core::ffi::{c_char, c_int, CStr};

pub const LIBC_NAME: &CStr = c"libc.so.1";

extern "C" {
    fn getexecname() -> *const c_char;
}

#[inline]
pub unsafe fn errno_location() -> *mut c_int {
    libc::___errno()
}

#[inline]
pub fn program_name() -> *const c_char {
    unsafe { getexecname() }
}
