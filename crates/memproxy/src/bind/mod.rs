//! Binding surfaces: ways to make a [`Router`] the process allocator.
//!
//! Each surface is a thin adapter with no logic of its own. Exported symbols
//! are compiled out of unit tests so the test binary keeps its own malloc.

#[cfg(any(feature = "direct", feature = "wrap"))]
use crate::backend::{CustomScope, DlResolver};
#[cfg(any(feature = "direct", feature = "wrap"))]
use crate::identity;
#[cfg(any(feature = "direct", feature = "wrap"))]
use crate::router::Router;

#[cfg(all(feature = "direct", not(test)))]
mod direct;
#[cfg(all(
    feature = "hooks",
    not(test),
    target_os = "linux",
    target_env = "gnu"
))]
mod hooks;
#[cfg(feature = "wrap")]
pub mod wrap;

/// Router behind the standard libc names. The custom backend is searched
/// after this object in load order, the system one inside libc.
#[cfg(feature = "direct")]
pub static DIRECT: Router<DlResolver> =
    Router::new(DlResolver::new(CustomScope::Next), identity::decide);

/// Router behind the `__wrap_*` names; the system backend is whatever the
/// linker binds to `__real_*`.
#[cfg(feature = "wrap")]
pub static WRAP: Router<wrap::RealResolver> = Router::new(
    wrap::RealResolver::new(DlResolver::new(CustomScope::Global)),
    identity::decide,
);

/// Export the allocation API for `$router`, each symbol named `$prefix`
/// followed by the libc name.
#[allow(unused_macros)]
macro_rules! export_allocator_api {
    ($router:expr, $prefix:literal) => {
        use core::ffi::{c_int, c_void};
        use $crate::router::noop;

        #[export_name = concat!($prefix, "malloc")]
        pub unsafe extern "C" fn malloc(size: usize) -> *mut c_void {
            $router.malloc(size)
        }

        #[export_name = concat!($prefix, "free")]
        pub unsafe extern "C" fn free(ptr: *mut c_void) {
            $router.free(ptr)
        }

        #[export_name = concat!($prefix, "calloc")]
        pub unsafe extern "C" fn calloc(count: usize, size: usize) -> *mut c_void {
            $router.calloc(count, size)
        }

        #[export_name = concat!($prefix, "realloc")]
        pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
            $router.realloc(ptr, size)
        }

        #[export_name = concat!($prefix, "memalign")]
        pub unsafe extern "C" fn memalign(alignment: usize, size: usize) -> *mut c_void {
            $router.memalign(alignment, size)
        }

        #[export_name = concat!($prefix, "aligned_alloc")]
        pub unsafe extern "C" fn aligned_alloc(alignment: usize, size: usize) -> *mut c_void {
            $router.memalign(alignment, size)
        }

        #[export_name = concat!($prefix, "posix_memalign")]
        pub unsafe extern "C" fn posix_memalign(
            memptr: *mut *mut c_void,
            alignment: usize,
            size: usize,
        ) -> c_int {
            $router.posix_memalign(memptr, alignment, size)
        }

        #[export_name = concat!($prefix, "valloc")]
        pub unsafe extern "C" fn valloc(size: usize) -> *mut c_void {
            $router.valloc(size)
        }

        #[export_name = concat!($prefix, "pvalloc")]
        pub unsafe extern "C" fn pvalloc(size: usize) -> *mut c_void {
            $router.pvalloc(size)
        }

        #[export_name = concat!($prefix, "malloc_usable_size")]
        pub unsafe extern "C" fn malloc_usable_size(ptr: *mut c_void) -> usize {
            $router.usable_size(ptr)
        }

        #[cfg(target_os = "linux")]
        #[export_name = concat!($prefix, "malloc_trim")]
        pub unsafe extern "C" fn malloc_trim(pad: usize) -> c_int {
            $router.trim(pad)
        }

        #[cfg(any(not(target_env = "gnu"), feature = "cfree"))]
        #[export_name = concat!($prefix, "cfree")]
        pub unsafe extern "C" fn cfree(ptr: *mut c_void) {
            $router.free(ptr)
        }

        #[export_name = concat!($prefix, "mallopt")]
        pub extern "C" fn mallopt(param: c_int, value: c_int) -> c_int {
            noop::mallopt(param, value)
        }

        #[export_name = concat!($prefix, "malloc_stats")]
        pub extern "C" fn malloc_stats() {
            noop::malloc_stats()
        }

        #[export_name = concat!($prefix, "malloc_get_state")]
        pub extern "C" fn malloc_get_state() -> *mut c_void {
            noop::malloc_get_state()
        }

        #[export_name = concat!($prefix, "malloc_set_state")]
        pub extern "C" fn malloc_set_state(state: *mut c_void) -> c_int {
            noop::malloc_set_state(state)
        }

        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        #[export_name = concat!($prefix, "mallinfo")]
        pub extern "C" fn mallinfo() -> libc::mallinfo {
            noop::mallinfo()
        }

        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        #[export_name = concat!($prefix, "mallinfo2")]
        pub extern "C" fn mallinfo2() -> libc::mallinfo2 {
            noop::mallinfo2()
        }
    };
}
#[allow(unused_imports)]
pub(crate) use export_allocator_api;
