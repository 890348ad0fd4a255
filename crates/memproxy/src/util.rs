use core::sync::atomic::{AtomicUsize, Ordering};

/// Align `value` up to the next multiple of `align`, or `None` on overflow.
/// `align` must be a power of two.
#[inline(always)]
pub const fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// The memalign/posix_memalign contract: a positive power of two that is
/// also a multiple of the pointer size.
#[inline(always)]
pub const fn is_valid_alignment(alignment: usize) -> bool {
    alignment.is_power_of_two() && alignment % core::mem::size_of::<*mut u8>() == 0
}

/// Minimum alignment of blocks handed out by the bootstrap scratch region.
pub const MIN_ALIGN: usize = 16;

/// Significant bytes of an executable name.
pub const NAME_CHUNK: usize = 16;

/// 0 until the first query.
static PAGE_SIZE_CACHED: AtomicUsize = AtomicUsize::new(0);

/// The OS page size, queried once and cached for the life of the process.
#[inline]
pub fn page_size() -> usize {
    let cached = PAGE_SIZE_CACHED.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }
    let ps = match page_size::get() {
        0 => 4096,
        ps => ps,
    };
    PAGE_SIZE_CACHED.store(ps, Ordering::Relaxed);
    ps
}
