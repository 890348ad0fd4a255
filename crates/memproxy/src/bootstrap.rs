//! Scratch memory for the bootstrap window.
//!
//! `dlopen`, `dlsym` and the allow-list read may call back into malloc or
//! calloc before the registry has a backend. Those nested requests are served
//! here: a bump region mapped straight from the OS, zero-filled because it is
//! fresh and nothing in it is ever reused. Blocks are never freed and the
//! region is never returned.

use crate::platform;
use crate::util::MIN_ALIGN;
use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

/// Size of the mapped scratch region.
pub const SCRATCH_SIZE: usize = 64 * 1024;
/// Size of the static buffer used when the mapping itself fails.
pub const FALLBACK_SIZE: usize = 4096;

/// Every block is preceded by its requested size.
const HEADER: usize = MIN_ALIGN;

#[repr(C, align(64))]
struct FallbackBuf(UnsafeCell<[u8; FALLBACK_SIZE]>);

pub struct Scratch {
    mapped: AtomicPtr<u8>,
    used: AtomicUsize,
    degraded: AtomicBool,
    fallback: FallbackBuf,
}

unsafe impl Sync for Scratch {}

impl Scratch {
    pub const fn new() -> Self {
        Self {
            mapped: AtomicPtr::new(ptr::null_mut()),
            used: AtomicUsize::new(0),
            degraded: AtomicBool::new(false),
            fallback: FallbackBuf(UnsafeCell::new([0; FALLBACK_SIZE])),
        }
    }

    /// A scratch that behaves as if the mapping had already failed.
    #[cfg(test)]
    const fn degraded() -> Self {
        let scratch = Self::new();
        Self {
            degraded: AtomicBool::new(true),
            ..scratch
        }
    }

    fn fallback_base(&self) -> *mut u8 {
        self.fallback.0.get().cast()
    }

    /// Base and capacity of the active region, mapping it on first use.
    fn region(&self) -> (*mut u8, usize) {
        if self.degraded.load(Ordering::Acquire) {
            return (self.fallback_base(), FALLBACK_SIZE);
        }
        let base = self.mapped.load(Ordering::Acquire);
        if !base.is_null() {
            return (base, SCRATCH_SIZE);
        }
        let fresh = unsafe { platform::map_anonymous(SCRATCH_SIZE) };
        if fresh.is_null() {
            self.degraded.store(true, Ordering::Release);
            return (self.fallback_base(), FALLBACK_SIZE);
        }
        match self.mapped.compare_exchange(
            ptr::null_mut(),
            fresh,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => (fresh, SCRATCH_SIZE),
            Err(winner) => {
                unsafe { platform::unmap(fresh, SCRATCH_SIZE) };
                (winner, SCRATCH_SIZE)
            }
        }
    }

    /// Whether the mapping failed and the static fallback is in use.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Carve `size` bytes aligned to `align` (a power of two). Returns null
    /// when the region is exhausted.
    pub fn alloc(&self, size: usize, align: usize) -> *mut u8 {
        let align = align.max(MIN_ALIGN);
        let (base, capacity) = self.region();
        let base_addr = base as usize;
        // CAS loop to avoid permanently advancing the counter past capacity.
        loop {
            let offset = self.used.load(Ordering::Relaxed);
            let Some(start) = (base_addr + offset)
                .checked_add(HEADER + align - 1)
                .map(|a| (a & !(align - 1)) - base_addr)
            else {
                return ptr::null_mut();
            };
            let end = match start.checked_add(size) {
                Some(end) if end <= capacity => end,
                _ => return ptr::null_mut(),
            };
            if self
                .used
                .compare_exchange_weak(offset, end, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                unsafe {
                    let block = base.add(start);
                    block.cast::<usize>().sub(1).write(size);
                    return block;
                }
            }
        }
    }

    /// Zero-filled `count * size` bytes, null on overflow or exhaustion.
    pub fn alloc_zeroed(&self, count: usize, size: usize) -> *mut u8 {
        match count.checked_mul(size) {
            // Fresh scratch memory is never handed out twice.
            Some(total) => self.alloc(total, MIN_ALIGN),
            None => ptr::null_mut(),
        }
    }

    /// Whether `p` points into scratch memory.
    #[inline]
    pub fn contains(&self, p: *const u8) -> bool {
        let addr = p as usize;
        let mapped = self.mapped.load(Ordering::Relaxed) as usize;
        if mapped != 0 && addr >= mapped && addr < mapped + SCRATCH_SIZE {
            return true;
        }
        let fallback = self.fallback_base() as usize;
        addr >= fallback && addr < fallback + FALLBACK_SIZE
    }

    /// Requested size of a scratch block.
    ///
    /// # Safety
    /// `p` must have been returned by [`Scratch::alloc`] on `self`.
    #[inline]
    pub unsafe fn block_size(&self, p: *const u8) -> usize {
        p.cast::<usize>().sub(1).read()
    }
}

impl Default for Scratch {
    fn default() -> Self {
        Self::new()
    }
}
