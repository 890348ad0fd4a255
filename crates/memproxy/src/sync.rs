use core::sync::atomic::{AtomicU32, Ordering};

/// A state word that threads can block on until it changes.
///
/// Built on futex (Linux) or yield-spinning elsewhere. We cannot use
/// `std::sync` primitives here because waiting must not allocate and must
/// work before the allocator routing is resolved.
pub struct StateWord {
    value: AtomicU32,
}

impl StateWord {
    pub const fn new(value: u32) -> Self {
        Self {
            value: AtomicU32::new(value),
        }
    }

    #[inline(always)]
    pub fn load(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    /// Move from `current` to `new`. Returns the observed value on failure.
    #[inline]
    pub fn transition(&self, current: u32, new: u32) -> Result<u32, u32> {
        self.value
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }

    /// Publish `value` and wake every waiter.
    pub fn publish(&self, value: u32) {
        self.value.store(value, Ordering::Release);
        self.wake_all();
    }

    /// Block until the word no longer holds `value`. Returns the new value.
    #[cold]
    pub fn wait_while(&self, value: u32) -> u32 {
        loop {
            let current = self.load();
            if current != value {
                return current;
            }
            #[cfg(target_os = "linux")]
            crate::platform::sys::futex_wait(&self.value, value);
            #[cfg(not(target_os = "linux"))]
            {
                core::hint::spin_loop();
                crate::platform::yield_now();
            }
        }
    }

    #[cold]
    fn wake_all(&self) {
        #[cfg(target_os = "linux")]
        crate::platform::sys::futex_wake_all(&self.value);
    }
}
