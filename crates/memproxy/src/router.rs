//! The allocation API, routed to whichever backend the registry resolved.
//!
//! Every binding surface (direct symbols, `__wrap_*`, glibc hooks) calls these
//! methods and nothing else. The methods keep the C conventions: null
//! returns, `errno`, and `posix_memalign` status codes.

use crate::backend::{Backend, BackendFns, BackendKind, ResolveError, SymbolResolver};
use crate::bootstrap::Scratch;
use crate::diag;
use crate::identity::RoutingDecision;
use crate::platform;
use crate::registry::{BackendRegistry, InitState, Lookup};
use crate::util::{checked_align_up, is_valid_alignment, page_size, MIN_ALIGN};
use core::ffi::{c_int, c_void};
use core::ptr;

enum Route<'a> {
    Backend(&'a BackendFns),
    Bootstrap,
}

/// One routing table: a registry, the resolver that fills it, and the
/// policy that picks the backend.
pub struct Router<R> {
    registry: BackendRegistry,
    scratch: Scratch,
    resolver: R,
    policy: fn() -> RoutingDecision,
}

impl<R: SymbolResolver> Router<R> {
    pub const fn new(resolver: R, policy: fn() -> RoutingDecision) -> Self {
        Self {
            registry: BackendRegistry::new(),
            scratch: Scratch::new(),
            resolver,
            policy,
        }
    }

    pub fn state(&self) -> InitState {
        self.registry.state()
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Force resolution and report which backend serves this router.
    /// Returns `None` when called from inside resolution itself.
    pub fn backend_kind(&self) -> Option<BackendKind> {
        match self.route() {
            Route::Backend(_) => match self.registry.get() {
                Some(Ok(backend)) => Some(backend.kind()),
                _ => None,
            },
            Route::Bootstrap => None,
        }
    }

    fn construct(&self) -> Result<Backend, ResolveError> {
        let decision = (self.policy)();
        Backend::resolve(&self.resolver, decision.backend_kind())
    }

    #[inline(always)]
    fn route(&self) -> Route<'_> {
        match self.registry.get_or_resolve(|| self.construct()) {
            Ok(Lookup::Ready(backend)) => Route::Backend(backend.fns()),
            Ok(Lookup::Bootstrap) => Route::Bootstrap,
            Err(e) => diag::fatal(format_args!("{e}")),
        }
    }

    /// Aligned allocation without argument validation or errno.
    #[inline]
    unsafe fn aligned(&self, alignment: usize, size: usize) -> *mut c_void {
        match self.route() {
            Route::Backend(f) => (f.memalign)(alignment, size),
            Route::Bootstrap => self.scratch.alloc(size, alignment).cast(),
        }
    }

    /// # Safety
    /// Standard `malloc` contract.
    pub unsafe fn malloc(&self, size: usize) -> *mut c_void {
        match self.route() {
            Route::Backend(f) => (f.malloc)(size),
            Route::Bootstrap => self.scratch.alloc(size, MIN_ALIGN).cast(),
        }
    }

    /// # Safety
    /// `ptr` must be null or a live pointer from this router.
    pub unsafe fn free(&self, ptr: *mut c_void) {
        if self.scratch.contains(ptr.cast()) {
            return;
        }
        if let Route::Backend(f) = self.route() {
            (f.free)(ptr);
        }
    }

    /// # Safety
    /// Standard `calloc` contract.
    pub unsafe fn calloc(&self, count: usize, size: usize) -> *mut c_void {
        match self.route() {
            Route::Backend(f) => (f.calloc)(count, size),
            Route::Bootstrap => self.scratch.alloc_zeroed(count, size).cast(),
        }
    }

    /// # Safety
    /// `ptr` must be null or a live pointer from this router.
    pub unsafe fn realloc(&self, ptr: *mut c_void, size: usize) -> *mut c_void {
        if !ptr.is_null() && self.scratch.contains(ptr.cast()) {
            // Scratch blocks cannot grow in place; move them out. The old
            // block stays where it is.
            let old_size = self.scratch.block_size(ptr.cast());
            let new = self.malloc(size);
            if !new.is_null() {
                ptr::copy_nonoverlapping(ptr.cast::<u8>(), new.cast::<u8>(), old_size.min(size));
            }
            return new;
        }
        match self.route() {
            Route::Backend(f) => (f.realloc)(ptr, size),
            Route::Bootstrap if ptr.is_null() => self.scratch.alloc(size, MIN_ALIGN).cast(),
            Route::Bootstrap => ptr::null_mut(),
        }
    }

    /// `memalign`/`aligned_alloc`: `EINVAL` for a bad alignment, `ENOMEM`
    /// when the backend fails.
    ///
    /// # Safety
    /// Standard `memalign` contract.
    pub unsafe fn memalign(&self, alignment: usize, size: usize) -> *mut c_void {
        if !is_valid_alignment(alignment) {
            platform::set_errno(libc::EINVAL);
            return ptr::null_mut();
        }
        with_enomem(self.aligned(alignment, size))
    }

    /// # Safety
    /// `memptr` must be null or valid for a pointer-sized write.
    pub unsafe fn posix_memalign(
        &self,
        memptr: *mut *mut c_void,
        alignment: usize,
        size: usize,
    ) -> c_int {
        if memptr.is_null() || !is_valid_alignment(alignment) {
            return libc::EINVAL;
        }
        let p = self.aligned(alignment, size);
        if p.is_null() {
            return libc::ENOMEM;
        }
        *memptr = p;
        0
    }

    /// # Safety
    /// Standard `valloc` contract.
    pub unsafe fn valloc(&self, size: usize) -> *mut c_void {
        with_enomem(self.aligned(page_size(), size))
    }

    /// Like [`valloc`](Self::valloc), but a zero size means one page and the
    /// size is rounded up to whole pages.
    ///
    /// # Safety
    /// Standard `pvalloc` contract.
    pub unsafe fn pvalloc(&self, size: usize) -> *mut c_void {
        let page = page_size();
        let size = if size == 0 { page } else { size };
        match checked_align_up(size, page) {
            Some(rounded) => self.valloc(rounded),
            None => {
                platform::set_errno(libc::ENOMEM);
                ptr::null_mut()
            }
        }
    }

    /// # Safety
    /// `ptr` must be null or a live pointer from this router.
    pub unsafe fn usable_size(&self, ptr: *mut c_void) -> usize {
        if !ptr.is_null() && self.scratch.contains(ptr.cast()) {
            return self.scratch.block_size(ptr.cast());
        }
        match self.route() {
            Route::Backend(f) => (f.usable_size)(ptr),
            Route::Bootstrap => 0,
        }
    }

    /// Returns the backend's answer, or 0 when it has no trim.
    ///
    /// # Safety
    /// Standard `malloc_trim` contract.
    pub unsafe fn trim(&self, pad: usize) -> c_int {
        match self.route() {
            Route::Backend(f) => f.trim.map_or(0, |trim| trim(pad)),
            Route::Bootstrap => 0,
        }
    }
}

#[inline]
fn with_enomem(p: *mut c_void) -> *mut c_void {
    if p.is_null() {
        platform::set_errno(libc::ENOMEM);
    }
    p
}

/// Entry points that exist only so callers probing for them link and run.
/// None of them tracks or reports anything.
pub mod noop {
    use core::ffi::{c_int, c_void};

    pub fn mallopt(_param: c_int, _value: c_int) -> c_int {
        1
    }

    pub fn malloc_stats() {}

    pub fn malloc_get_state() -> *mut c_void {
        core::ptr::null_mut()
    }

    pub fn malloc_set_state(_state: *mut c_void) -> c_int {
        0
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    pub fn mallinfo() -> libc::mallinfo {
        unsafe { core::mem::zeroed() }
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    pub fn mallinfo2() -> libc::mallinfo2 {
        unsafe { core::mem::zeroed() }
    }
}
