//! ABI behavior tests for the direct router.
//!
//! No allow-list names the test binary, so the router resolves the system
//! backend from libc and every call must behave exactly like libc's own.

#![cfg(feature = "direct")]

use core::ffi::c_void;
use memproxy::bind::DIRECT;
use memproxy::router::noop;
use memproxy::{platform, BackendKind};
use std::ptr;

// ---------------------------------------------------------------------------
// The test binary is not allow-listed
// ---------------------------------------------------------------------------

#[test]
fn unlisted_binary_routes_to_system() {
    unsafe {
        let p = DIRECT.malloc(64);
        assert!(!p.is_null());
        DIRECT.free(p);
    }
    assert_eq!(DIRECT.backend_kind(), Some(BackendKind::System));
}

// ---------------------------------------------------------------------------
// malloc / free
// ---------------------------------------------------------------------------

#[test]
fn malloc_zero_is_freeable() {
    unsafe {
        let p = DIRECT.malloc(0);
        // glibc returns a unique pointer; other libcs may return NULL.
        DIRECT.free(p);
    }
}

#[test]
fn free_null_is_noop() {
    unsafe {
        DIRECT.free(ptr::null_mut());
    }
}

#[test]
fn malloc_returns_16_byte_aligned_pointers() {
    unsafe {
        for size in [1usize, 7, 16, 33, 100, 1000, 4096, 65536] {
            let p = DIRECT.malloc(size);
            assert!(!p.is_null(), "malloc({size}) returned NULL");
            assert_eq!(p as usize % 16, 0, "malloc({size}) misaligned");
            DIRECT.free(p);
        }
    }
}

#[test]
fn usable_size_at_least_requested() {
    unsafe {
        for size in [1usize, 24, 100, 4000, 1 << 20] {
            let p = DIRECT.malloc(size);
            assert!(!p.is_null());
            assert!(DIRECT.usable_size(p) >= size);
            DIRECT.free(p);
        }
        assert_eq!(DIRECT.usable_size(ptr::null_mut()), 0);
    }
}

// ---------------------------------------------------------------------------
// calloc
// ---------------------------------------------------------------------------

#[test]
fn calloc_returns_zeroed_memory() {
    unsafe {
        let p = DIRECT.calloc(100, 7).cast::<u8>();
        assert!(!p.is_null());
        let bytes = std::slice::from_raw_parts(p, 700);
        assert!(bytes.iter().all(|&b| b == 0));
        DIRECT.free(p.cast());
    }
}

#[test]
fn calloc_overflow_returns_null() {
    unsafe {
        assert!(DIRECT.calloc(usize::MAX, 2).is_null());
        assert!(DIRECT.calloc(usize::MAX / 2 + 1, 2).is_null());
    }
}

// ---------------------------------------------------------------------------
// realloc
// ---------------------------------------------------------------------------

#[test]
fn realloc_null_acts_as_malloc() {
    unsafe {
        let p = DIRECT.realloc(ptr::null_mut(), 64);
        assert!(!p.is_null());
        assert!(DIRECT.usable_size(p) >= 64);
        DIRECT.free(p);
    }
}

#[test]
fn allocation_round_trip() {
    unsafe {
        let p = DIRECT.malloc(64).cast::<u8>();
        assert!(!p.is_null());
        for i in 0..64u8 {
            *p.add(i as usize) = i;
        }
        let q = DIRECT.realloc(p.cast(), 8192).cast::<u8>();
        assert!(!q.is_null());
        for i in 0..64u8 {
            assert_eq!(*q.add(i as usize), i, "byte {i} lost by realloc");
        }
        let r = DIRECT.realloc(q.cast(), 16).cast::<u8>();
        assert!(!r.is_null());
        for i in 0..16u8 {
            assert_eq!(*r.add(i as usize), i);
        }
        DIRECT.free(r.cast());
    }
}

// ---------------------------------------------------------------------------
// Aligned family
// ---------------------------------------------------------------------------

#[test]
fn memalign_various_alignments() {
    unsafe {
        for shift in 3..=16 {
            let alignment = 1usize << shift;
            let p = DIRECT.memalign(alignment, 100);
            assert!(!p.is_null(), "memalign({alignment}) returned NULL");
            assert_eq!(p as usize % alignment, 0);
            DIRECT.free(p);

            let mut out: *mut c_void = ptr::null_mut();
            assert_eq!(DIRECT.posix_memalign(&mut out, alignment, 100), 0);
            assert_eq!(out as usize % alignment, 0);
            DIRECT.free(out);
        }
    }
}

#[test]
fn memalign_non_power_of_two_sets_einval() {
    unsafe {
        platform::set_errno(0);
        assert!(DIRECT.memalign(24, 100).is_null());
        assert_eq!(platform::errno(), libc::EINVAL);

        let mut out: *mut c_void = ptr::null_mut();
        assert_eq!(DIRECT.posix_memalign(&mut out, 24, 100), libc::EINVAL);
        assert_eq!(DIRECT.posix_memalign(&mut out, 0, 100), libc::EINVAL);
        assert!(out.is_null());
    }
}

#[test]
fn valloc_and_pvalloc_are_page_aligned() {
    let page = memproxy::util::page_size();
    unsafe {
        let v = DIRECT.valloc(10);
        assert!(!v.is_null());
        assert_eq!(v as usize % page, 0);
        DIRECT.free(v);

        let p = DIRECT.pvalloc(0);
        assert!(!p.is_null());
        assert_eq!(p as usize % page, 0);
        assert!(DIRECT.usable_size(p) >= page);
        DIRECT.free(p);
    }
}

// ---------------------------------------------------------------------------
// Compatibility no-ops
// ---------------------------------------------------------------------------

#[test]
fn tuning_entry_points_are_inert() {
    assert_eq!(noop::mallopt(-1, 0), 1);
    assert!(noop::malloc_get_state().is_null());
    assert_eq!(noop::malloc_set_state(ptr::null_mut()), 0);
    noop::malloc_stats();
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[test]
fn mallinfo_reports_nothing() {
    let info = noop::mallinfo2();
    assert_eq!(info.arena, 0);
    assert_eq!(info.uordblks, 0);
    assert_eq!(noop::mallinfo().hblkhd, 0);
}
