//! Link-time interposition with `-Wl,--wrap=<sym>`.
//!
//! The linker sends calls to `malloc` to `__wrap_malloc` and binds
//! `__real_malloc` to the original definition. Link the final binary with
//! `--wrap` for malloc, free, calloc, realloc, memalign and
//! malloc_usable_size at least; every other wrapped name is optional.

use crate::backend::{BackendKind, DlResolver, ResolveError, SymbolResolver};
#[cfg(not(test))]
use crate::backend::SYSTEM_SYMBOLS;
use core::ffi::{c_void, CStr};
use core::ptr::NonNull;

#[cfg(not(test))]
mod exports {
    super::super::export_allocator_api!(crate::bind::WRAP, "__wrap_");
}

#[cfg(not(test))]
extern "C" {
    fn __real_malloc(size: usize) -> *mut c_void;
    fn __real_free(ptr: *mut c_void);
    fn __real_calloc(count: usize, size: usize) -> *mut c_void;
    fn __real_realloc(ptr: *mut c_void, size: usize) -> *mut c_void;
    fn __real_memalign(alignment: usize, size: usize) -> *mut c_void;
    fn __real_malloc_usable_size(ptr: *mut c_void) -> usize;
}

/// System primitives from the linker's `__real_*` bindings; custom exports
/// and the optional trim come from `inner`.
pub struct RealResolver {
    inner: DlResolver,
}

impl RealResolver {
    pub const fn new(inner: DlResolver) -> Self {
        Self { inner }
    }

    #[cfg(not(test))]
    fn real(symbol: &CStr) -> Option<*mut c_void> {
        let names = &SYSTEM_SYMBOLS;
        let addr = if symbol == names.malloc {
            __real_malloc as *mut c_void
        } else if symbol == names.free {
            __real_free as *mut c_void
        } else if symbol == names.calloc {
            __real_calloc as *mut c_void
        } else if symbol == names.realloc {
            __real_realloc as *mut c_void
        } else if symbol == names.memalign {
            __real_memalign as *mut c_void
        } else if symbol == names.usable_size {
            __real_malloc_usable_size as *mut c_void
        } else {
            return None;
        };
        Some(addr)
    }

    #[cfg(test)]
    fn real(_symbol: &CStr) -> Option<*mut c_void> {
        None
    }
}

impl SymbolResolver for RealResolver {
    fn open(&self, kind: BackendKind) -> Result<(), ResolveError> {
        self.inner.open(kind)
    }

    fn lookup(&self, kind: BackendKind, symbol: &'static CStr) -> Option<NonNull<c_void>> {
        if kind == BackendKind::System {
            if let Some(addr) = Self::real(symbol) {
                return NonNull::new(addr);
            }
        }
        self.inner.lookup(kind, symbol)
    }

    fn close(&self, kind: BackendKind) {
        self.inner.close(kind)
    }
}
