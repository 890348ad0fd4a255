//! Stub backends and resolvers shared by the integration tests.
//!
//! A stub backend is a real allocator (it sits on top of the test binary's
//! own malloc) whose blocks carry a header recording which backend produced
//! them. Each backend is identified by a `TAG`; calls are counted per tag so
//! tests running in parallel do not see each other's traffic as long as they
//! use distinct tags.

#![allow(dead_code)]

use core::ffi::{c_int, c_void, CStr};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};
use memproxy::backend::{BackendFns, BackendKind, ResolveError, SymbolResolver};

pub const MAX_TAGS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Malloc,
    Realloc,
    Calloc,
    Free,
    Memalign,
    UsableSize,
    Trim,
}

const OPS: usize = 7;

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicUsize = AtomicUsize::new(0);
#[allow(clippy::declare_interior_mutable_const)]
const ROW: [AtomicUsize; OPS] = [ZERO; OPS];
static CALLS: [[AtomicUsize; OPS]; MAX_TAGS] = [ROW; MAX_TAGS];
/// Last aligned request per tag.
static LAST_SIZE: [AtomicUsize; MAX_TAGS] = [ZERO; MAX_TAGS];
static LAST_ALIGN: [AtomicUsize; MAX_TAGS] = [ZERO; MAX_TAGS];

pub fn calls(tag: usize, op: Op) -> usize {
    CALLS[tag][op as usize].load(Ordering::SeqCst)
}

pub fn last_request(tag: usize) -> (usize, usize) {
    (
        LAST_ALIGN[tag].load(Ordering::SeqCst),
        LAST_SIZE[tag].load(Ordering::SeqCst),
    )
}

fn count(tag: usize, op: Op) {
    CALLS[tag][op as usize].fetch_add(1, Ordering::SeqCst);
}

/// Header placed in front of every stub block.
#[repr(C)]
struct Header {
    base: *mut c_void,
    size: usize,
    tag: usize,
    _pad: usize,
}

const HEADER: usize = core::mem::size_of::<Header>();

unsafe fn header<'a>(user: *mut c_void) -> &'a mut Header {
    &mut *user.cast::<Header>().sub(1)
}

/// Which stub backend produced `user`.
///
/// # Safety
/// `user` must come from a stub backend.
pub unsafe fn tag_of(user: *mut c_void) -> usize {
    header(user).tag
}

unsafe fn carve(tag: usize, alignment: usize, size: usize, zero: bool) -> *mut c_void {
    let offset = if alignment > HEADER { alignment } else { HEADER };
    let Some(total) = size.checked_add(offset) else {
        return ptr::null_mut();
    };
    let mut base: *mut c_void = ptr::null_mut();
    if libc::posix_memalign(&mut base, alignment.max(16), total) != 0 {
        return ptr::null_mut();
    }
    if zero {
        ptr::write_bytes(base.cast::<u8>(), 0, total);
    }
    let user = base.cast::<u8>().add(offset).cast::<c_void>();
    *header(user) = Header {
        base,
        size,
        tag,
        _pad: 0,
    };
    user
}

pub unsafe extern "C" fn stub_malloc<const TAG: usize>(size: usize) -> *mut c_void {
    count(TAG, Op::Malloc);
    LAST_SIZE[TAG].store(size, Ordering::SeqCst);
    carve(TAG, 16, size, false)
}

pub unsafe extern "C" fn stub_calloc<const TAG: usize>(n: usize, size: usize) -> *mut c_void {
    count(TAG, Op::Calloc);
    match n.checked_mul(size) {
        Some(total) => carve(TAG, 16, total, true),
        None => ptr::null_mut(),
    }
}

pub unsafe extern "C" fn stub_free<const TAG: usize>(user: *mut c_void) {
    count(TAG, Op::Free);
    if !user.is_null() {
        libc::free(header(user).base);
    }
}

pub unsafe extern "C" fn stub_realloc<const TAG: usize>(
    user: *mut c_void,
    size: usize,
) -> *mut c_void {
    count(TAG, Op::Realloc);
    let new = carve(TAG, 16, size, false);
    if !user.is_null() && !new.is_null() {
        let old = header(user).size;
        ptr::copy_nonoverlapping(user.cast::<u8>(), new.cast::<u8>(), old.min(size));
        libc::free(header(user).base);
    }
    new
}

pub unsafe extern "C" fn stub_memalign<const TAG: usize>(
    alignment: usize,
    size: usize,
) -> *mut c_void {
    count(TAG, Op::Memalign);
    LAST_ALIGN[TAG].store(alignment, Ordering::SeqCst);
    LAST_SIZE[TAG].store(size, Ordering::SeqCst);
    carve(TAG, alignment, size, false)
}

pub unsafe extern "C" fn stub_usable_size<const TAG: usize>(user: *mut c_void) -> usize {
    count(TAG, Op::UsableSize);
    if user.is_null() {
        0
    } else {
        header(user).size
    }
}

pub unsafe extern "C" fn stub_trim<const TAG: usize>(_pad: usize) -> c_int {
    count(TAG, Op::Trim);
    1
}

/// A backend that never has memory.
pub unsafe extern "C" fn oom_malloc(_: usize) -> *mut c_void {
    ptr::null_mut()
}

pub unsafe extern "C" fn oom_memalign(_: usize, _: usize) -> *mut c_void {
    ptr::null_mut()
}

/// The seven primitives of the stub backend `TAG`.
pub const fn tagged<const TAG: usize>() -> BackendFns {
    BackendFns {
        malloc: stub_malloc::<TAG>,
        realloc: stub_realloc::<TAG>,
        calloc: stub_calloc::<TAG>,
        free: stub_free::<TAG>,
        memalign: stub_memalign::<TAG>,
        usable_size: stub_usable_size::<TAG>,
        trim: Some(stub_trim::<TAG>),
    }
}

/// Resolver over two stub tables that counts every lookup.
pub struct StubResolver {
    custom: BackendFns,
    system: BackendFns,
    /// A symbol that must not resolve.
    missing: Option<&'static CStr>,
    /// Called from inside every lookup, to provoke nested allocations.
    on_lookup: Option<fn()>,
    lookups: AtomicUsize,
    opens: AtomicUsize,
}

impl StubResolver {
    pub const fn new(custom: BackendFns, system: BackendFns) -> Self {
        Self {
            custom,
            system,
            missing: None,
            on_lookup: None,
            lookups: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
        }
    }

    pub const fn missing(mut self, symbol: &'static CStr) -> Self {
        self.missing = Some(symbol);
        self
    }

    pub const fn on_lookup(mut self, hook: fn()) -> Self {
        self.on_lookup = Some(hook);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl SymbolResolver for StubResolver {
    fn open(&self, _kind: BackendKind) -> Result<(), ResolveError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn lookup(&self, kind: BackendKind, symbol: &'static CStr) -> Option<NonNull<c_void>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_lookup {
            hook();
        }
        if self.missing == Some(symbol) {
            return None;
        }
        let fns = match kind {
            BackendKind::Custom => &self.custom,
            BackendKind::System => &self.system,
        };
        let names = kind.symbols();
        let addr = if symbol == names.malloc {
            fns.malloc as *mut c_void
        } else if symbol == names.realloc {
            fns.realloc as *mut c_void
        } else if symbol == names.calloc {
            fns.calloc as *mut c_void
        } else if symbol == names.free {
            fns.free as *mut c_void
        } else if symbol == names.memalign {
            fns.memalign as *mut c_void
        } else if symbol == names.usable_size {
            fns.usable_size as *mut c_void
        } else if symbol == names.trim {
            fns.trim.map_or(ptr::null_mut(), |t| t as *mut c_void)
        } else {
            ptr::null_mut()
        };
        NonNull::new(addr)
    }
}
