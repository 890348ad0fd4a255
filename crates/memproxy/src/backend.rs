//! Backends and how their entry points are found.
//!
//! Because our library exports `malloc`/`free` symbols, calling `libc::malloc`
//! from within it would recurse back to us. Every backend function is a raw
//! pointer looked up by name: the custom allocator through the dynamic
//! namespace, the system allocator from the C library itself.

use core::ffi::{c_int, c_void, CStr};
use core::fmt;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, Ordering};

pub type MallocFn = unsafe extern "C" fn(usize) -> *mut c_void;
pub type ReallocFn = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;
pub type CallocFn = unsafe extern "C" fn(usize, usize) -> *mut c_void;
pub type FreeFn = unsafe extern "C" fn(*mut c_void);
pub type MemalignFn = unsafe extern "C" fn(usize, usize) -> *mut c_void;
pub type UsableSizeFn = unsafe extern "C" fn(*mut c_void) -> usize;
pub type TrimFn = unsafe extern "C" fn(usize) -> c_int;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Custom,
    System,
}

impl BackendKind {
    /// Export names for this backend's primitives.
    pub const fn symbols(self) -> &'static SymbolNames {
        match self {
            BackendKind::Custom => &CUSTOM_SYMBOLS,
            BackendKind::System => &SYSTEM_SYMBOLS,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Custom => "custom",
            BackendKind::System => "system",
        })
    }
}

/// One name per primitive operation.
#[derive(Debug)]
pub struct SymbolNames {
    pub malloc: &'static CStr,
    pub realloc: &'static CStr,
    pub calloc: &'static CStr,
    pub free: &'static CStr,
    pub memalign: &'static CStr,
    pub usable_size: &'static CStr,
    pub trim: &'static CStr,
}

impl SymbolNames {
    pub fn iter(&self) -> impl Iterator<Item = &'static CStr> {
        [
            self.malloc,
            self.realloc,
            self.calloc,
            self.free,
            self.memalign,
            self.usable_size,
            self.trim,
        ]
        .into_iter()
    }
}

/// Exports of the custom allocator. It must not export `malloc` itself.
pub static CUSTOM_SYMBOLS: SymbolNames = SymbolNames {
    malloc: c"ltmalloc",
    realloc: c"ltrealloc",
    calloc: c"ltcalloc",
    free: c"ltfree",
    memalign: c"ltmemalign",
    usable_size: c"ltmsize",
    trim: c"ltsqueeze",
};

pub static SYSTEM_SYMBOLS: SymbolNames = SymbolNames {
    malloc: c"malloc",
    realloc: c"realloc",
    calloc: c"calloc",
    free: c"free",
    memalign: c"memalign",
    usable_size: c"malloc_usable_size",
    trim: c"malloc_trim",
};

/// The seven primitives of one backend. `trim` is optional; everything else
/// must resolve for the table to exist at all.
#[derive(Clone, Copy)]
pub struct BackendFns {
    pub malloc: MallocFn,
    pub realloc: ReallocFn,
    pub calloc: CallocFn,
    pub free: FreeFn,
    pub memalign: MemalignFn,
    pub usable_size: UsableSizeFn,
    pub trim: Option<TrimFn>,
}

impl fmt::Debug for BackendFns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendFns")
            .field("malloc", &(self.malloc as *const c_void))
            .field("free", &(self.free as *const c_void))
            .field("trim", &self.trim.is_some())
            .finish_non_exhaustive()
    }
}

/// A resolved backend, tagged with where it came from.
#[derive(Clone, Copy, Debug)]
pub enum Backend {
    Custom(BackendFns),
    System(BackendFns),
}

impl Backend {
    #[inline(always)]
    pub fn fns(&self) -> &BackendFns {
        match self {
            Backend::Custom(fns) | Backend::System(fns) => fns,
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Custom(_) => BackendKind::Custom,
            Backend::System(_) => BackendKind::System,
        }
    }

    /// Look up every primitive of `kind` through `resolver`.
    pub fn resolve<R: SymbolResolver + ?Sized>(
        resolver: &R,
        kind: BackendKind,
    ) -> Result<Self, ResolveError> {
        let names = kind.symbols();
        resolver.open(kind)?;
        let fns = unsafe { resolve_fns(resolver, kind, names) };
        resolver.close(kind);
        let fns = fns?;
        Ok(match kind {
            BackendKind::Custom => Backend::Custom(fns),
            BackendKind::System => Backend::System(fns),
        })
    }
}

unsafe fn resolve_fns<R: SymbolResolver + ?Sized>(
    resolver: &R,
    kind: BackendKind,
    names: &SymbolNames,
) -> Result<BackendFns, ResolveError> {
    let required = |symbol: &'static CStr| {
        resolver
            .lookup(kind, symbol)
            .ok_or(ResolveError::MissingSymbol { kind, symbol })
    };
    // SAFETY: the resolver promises each address is the named C function,
    // whose signature is fixed by the export name.
    Ok(BackendFns {
        malloc: core::mem::transmute::<*mut c_void, MallocFn>(required(names.malloc)?.as_ptr()),
        realloc: core::mem::transmute::<*mut c_void, ReallocFn>(required(names.realloc)?.as_ptr()),
        calloc: core::mem::transmute::<*mut c_void, CallocFn>(required(names.calloc)?.as_ptr()),
        free: core::mem::transmute::<*mut c_void, FreeFn>(required(names.free)?.as_ptr()),
        memalign: core::mem::transmute::<*mut c_void, MemalignFn>(
            required(names.memalign)?.as_ptr(),
        ),
        usable_size: core::mem::transmute::<*mut c_void, UsableSizeFn>(
            required(names.usable_size)?.as_ptr(),
        ),
        trim: resolver
            .lookup(kind, names.trim)
            .map(|p| core::mem::transmute::<*mut c_void, TrimFn>(p.as_ptr())),
    })
}

/// Why a backend table could not be built. Carries no heap data so it can
/// be stored in the registry and reported without allocating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("{kind} backend: symbol `{}` not found", .symbol.to_bytes().escape_ascii())]
    MissingSymbol {
        kind: BackendKind,
        symbol: &'static CStr,
    },
    #[error("{kind} backend: cannot load `{}`", .library.to_bytes().escape_ascii())]
    LibraryUnavailable {
        kind: BackendKind,
        library: &'static CStr,
    },
}

/// Finds backend entry points by export name.
///
/// Implementations run inside registry construction: anything they do that
/// allocates is served from the bootstrap scratch region.
pub trait SymbolResolver: Sync {
    /// Prepare to resolve `kind`'s symbols (load a library, ...).
    fn open(&self, _kind: BackendKind) -> Result<(), ResolveError> {
        Ok(())
    }

    /// Address of `symbol` in `kind`'s provider, if it exists.
    fn lookup(&self, kind: BackendKind, symbol: &'static CStr) -> Option<NonNull<c_void>>;

    /// Release whatever [`open`](Self::open) acquired.
    fn close(&self, _kind: BackendKind) {}
}

/// Where the custom allocator's exports are searched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CustomScope {
    /// Objects loaded after this one (`RTLD_NEXT`), so we never find ourselves.
    Next,
    /// The global namespace (`RTLD_DEFAULT`).
    Global,
}

/// `dlsym`-based resolver.
///
/// The custom backend comes from the dynamic namespace; the system backend
/// is looked up inside the platform C library, loaded by name and released
/// once all symbols are resolved.
pub struct DlResolver {
    scope: CustomScope,
    libc_handle: AtomicPtr<c_void>,
}

impl DlResolver {
    pub const fn new(scope: CustomScope) -> Self {
        Self {
            scope,
            libc_handle: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn custom_handle(&self) -> *mut c_void {
        match self.scope {
            CustomScope::Next => libc::RTLD_NEXT,
            CustomScope::Global => libc::RTLD_DEFAULT,
        }
    }
}

impl SymbolResolver for DlResolver {
    fn open(&self, kind: BackendKind) -> Result<(), ResolveError> {
        if kind == BackendKind::Custom {
            return Ok(());
        }
        let library = crate::platform::LIBC_NAME;
        let handle = unsafe { libc::dlopen(library.as_ptr(), libc::RTLD_NOW) };
        if handle.is_null() {
            return Err(ResolveError::LibraryUnavailable { kind, library });
        }
        self.libc_handle.store(handle, Ordering::Release);
        Ok(())
    }

    fn lookup(&self, kind: BackendKind, symbol: &'static CStr) -> Option<NonNull<c_void>> {
        let handle = match kind {
            BackendKind::Custom => self.custom_handle(),
            BackendKind::System => self.libc_handle.load(Ordering::Acquire),
        };
        NonNull::new(unsafe { libc::dlsym(handle, symbol.as_ptr()) })
    }

    fn close(&self, kind: BackendKind) {
        if kind == BackendKind::Custom {
            return;
        }
        let handle = self
            .libc_handle
            .swap(ptr::null_mut(), Ordering::AcqRel);
        if !handle.is_null() {
            // libc stays mapped: the process itself links against it, so the
            // resolved addresses outlive this reference.
            unsafe { libc::dlclose(handle) };
        }
    }
}
