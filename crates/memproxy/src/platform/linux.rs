use core::ffi::{c_char, c_int, CStr};
use core::sync::atomic::AtomicU32;

pub const LIBC_NAME: &CStr = c"libc.so.6";

#[inline]
pub unsafe fn errno_location() -> *mut c_int {
    libc::__errno_location()
}

/// Linux has no direct accessor that survives `exec` wrappers reliably;
/// the invocation path comes from the `_` environment variable instead.
#[inline]
pub fn program_name() -> *const c_char {
    unsafe { libc::getenv(c"_".as_ptr()) }
}

/// Block while `*word == expected`. Spurious wakeups are possible.
pub fn futex_wait(word: &AtomicU32, expected: u32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32,
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            core::ptr::null::<libc::timespec>(),
        );
    }
}

/// Wake every thread blocked in [`futex_wait`] on `word`.
pub fn futex_wake_all(word: &AtomicU32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32,
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            i32::MAX,
        );
    }
}
