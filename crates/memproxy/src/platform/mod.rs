//! Thin OS layer: errno, anonymous mappings, thread identity, the program
//! name accessor, and raw stderr writes. Nothing here may allocate.

use core::ffi::{c_char, c_int};

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub use linux as sys;

#[cfg(any(target_os = "freebsd", target_os = "openbsd"))]
pub mod bsd;
#[cfg(any(target_os = "freebsd", target_os = "openbsd"))]
pub use bsd as sys;

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
pub mod solarish;
#[cfg(any(target_os = "solaris", target_os = "illumos"))]
pub use solarish as sys;

#[cfg(not(any(
    target_os = "linux",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "solaris",
    target_os = "illumos"
)))]
compile_error!("memproxy: unsupported OS");

// The system backend is loaded from glibc's `libc.so.6` by name.
#[cfg(all(target_os = "linux", not(target_env = "gnu")))]
compile_error!("memproxy: Linux targets other than glibc are unsupported");

/// Shared object name of the platform C library.
pub const LIBC_NAME: &core::ffi::CStr = sys::LIBC_NAME;

/// Set the calling thread's `errno`.
#[inline]
pub fn set_errno(value: c_int) {
    unsafe { *sys::errno_location() = value };
}

/// Read the calling thread's `errno`.
#[inline]
pub fn errno() -> c_int {
    unsafe { *sys::errno_location() }
}

/// Map anonymous, zero-filled read-write memory. Returns null on failure.
///
/// # Safety
/// `size` must be non-zero.
#[inline]
pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    let result = libc::mmap(
        core::ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANON,
        -1,
        0,
    );
    if result == libc::MAP_FAILED {
        core::ptr::null_mut()
    } else {
        result as *mut u8
    }
}

/// Identifier of the calling thread, never zero.
#[inline]
pub fn thread_id() -> usize {
    // pthread_t is an address or a small positive integer on every
    // supported platform; bias by one so zero stays free as "nobody".
    (unsafe { libc::pthread_self() } as usize).wrapping_add(1).max(1)
}

/// The host's direct "program name" accessor, if it has one.
#[inline]
pub fn program_name() -> *const c_char {
    sys::program_name()
}

/// Write `bytes` to stderr with a raw `write(2)`, retrying on short writes.
pub fn write_stderr(bytes: &[u8]) {
    let mut rest = bytes;
    while !rest.is_empty() {
        let n = unsafe { libc::write(2, rest.as_ptr().cast(), rest.len()) };
        if n <= 0 {
            if n < 0 && errno() == libc::EINTR {
                continue;
            }
            return;
        }
        rest = &rest[n as usize..];
    }
}

/// Yield the processor to another thread.
#[inline]
pub fn yield_now() {
    unsafe {
        libc::sched_yield();
    }
}

/// Unmap memory obtained from [`map_anonymous`].
///
/// # Safety
/// `ptr` must have been returned by `map_anonymous` with the same `size`.
#[inline]
pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    libc::munmap(ptr.cast(), size);
}
