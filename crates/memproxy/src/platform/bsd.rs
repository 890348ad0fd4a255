use core::ffi::{c_char, c_int, CStr};

#[cfg(target_os = "freebsd")]
pub const LIBC_NAME: &CStr = c"libc.so.7";
#[cfg(target_os = "openbsd")]
pub const LIBC_NAME: &CStr = c"libc.so.97.0";

#[cfg(target_os = "freebsd")]
#[inline]
pub unsafe fn errno_location() -> *mut c_int {
    libc::__error()
}

#[cfg(target_os = "openbsd")]
#[inline]
pub unsafe fn errno_location() -> *mut c_int {
    libc::__errno()
}

#[inline]
pub fn program_name() -> *const c_char {
    unsafe { libc::getprogname() }
}
