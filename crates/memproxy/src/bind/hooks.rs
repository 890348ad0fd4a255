//! glibc's legacy allocation hooks (removed in glibc 2.34).
//!
//! Code inside libc that calls its own allocator polls these variables
//! before every request. When the custom backend serves the process they
//! are pointed at the direct router; otherwise they stay unset and glibc's
//! allocator, which is the system backend, runs untouched.

use crate::backend::BackendKind;
use crate::bind::DIRECT;
use core::ffi::c_void;

type MallocHook = unsafe extern "C" fn(usize, *const c_void) -> *mut c_void;
type ReallocHook = unsafe extern "C" fn(*mut c_void, usize, *const c_void) -> *mut c_void;
type FreeHook = unsafe extern "C" fn(*mut c_void, *const c_void);
type MemalignHook = unsafe extern "C" fn(usize, usize, *const c_void) -> *mut c_void;

extern "C" {
    static mut __malloc_hook: Option<MallocHook>;
    static mut __realloc_hook: Option<ReallocHook>;
    static mut __free_hook: Option<FreeHook>;
    static mut __memalign_hook: Option<MemalignHook>;
}

// Each hook ignores the caller address glibc passes last.

unsafe extern "C" fn malloc_hook(size: usize, _caller: *const c_void) -> *mut c_void {
    DIRECT.malloc(size)
}

unsafe extern "C" fn realloc_hook(
    ptr: *mut c_void,
    size: usize,
    _caller: *const c_void,
) -> *mut c_void {
    DIRECT.realloc(ptr, size)
}

unsafe extern "C" fn free_hook(ptr: *mut c_void, _caller: *const c_void) {
    DIRECT.free(ptr)
}

unsafe extern "C" fn memalign_hook(
    alignment: usize,
    size: usize,
    _caller: *const c_void,
) -> *mut c_void {
    DIRECT.memalign(alignment, size)
}

/// Point glibc's hooks at the direct router if the custom backend won.
unsafe fn install() {
    if DIRECT.backend_kind() != Some(BackendKind::Custom) {
        return;
    }
    __malloc_hook = Some(malloc_hook);
    __realloc_hook = Some(realloc_hook);
    __free_hook = Some(free_hook);
    __memalign_hook = Some(memalign_hook);
}

/// Library constructor -- called before main().
#[used]
#[link_section = ".init_array"]
static CTOR: unsafe extern "C" fn() = {
    unsafe extern "C" fn init() {
        install();
    }
    init
};
