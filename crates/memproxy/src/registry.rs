use crate::backend::{Backend, ResolveError};
use crate::platform;
use crate::sync::StateWord;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};

const UNRESOLVED: u32 = 0;
const RESOLVING: u32 = 1;
const READY: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitState {
    Unresolved,
    Resolving,
    Ready,
}

/// What a caller gets back from the registry.
#[derive(Clone, Copy, Debug)]
pub enum Lookup<'a> {
    Ready(&'a Backend),
    /// The calling thread is the one resolving the registry: this is a
    /// nested call and must be served without a backend.
    Bootstrap,
}

/// Lazily-constructed, process-lifetime backend table.
///
/// Exactly one thread moves the registry from `Unresolved` to `Resolving`
/// and runs the construction; other threads block until `Ready`. Nested
/// calls from the constructing thread observe [`Lookup::Bootstrap`]. The
/// outcome (table or error) is written before `Ready` is published and is
/// immutable afterwards, so the hot path is a single acquire load.
pub struct BackendRegistry {
    state: StateWord,
    /// Thread id of the constructing thread while `Resolving`, else 0.
    owner: AtomicUsize,
    outcome: UnsafeCell<MaybeUninit<Result<Backend, ResolveError>>>,
}

unsafe impl Sync for BackendRegistry {}

impl BackendRegistry {
    pub const fn new() -> Self {
        Self {
            state: StateWord::new(UNRESOLVED),
            owner: AtomicUsize::new(0),
            outcome: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    pub fn state(&self) -> InitState {
        match self.state.load() {
            UNRESOLVED => InitState::Unresolved,
            RESOLVING => InitState::Resolving,
            _ => InitState::Ready,
        }
    }

    /// The construction outcome, if construction has finished.
    #[inline(always)]
    pub fn get(&self) -> Option<&Result<Backend, ResolveError>> {
        if self.state.load() == READY {
            // SAFETY: written once before READY was published with Release.
            Some(unsafe { (*self.outcome.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// Return the backend, running `construct` if nobody has yet.
    #[inline(always)]
    pub fn get_or_resolve<F>(&self, construct: F) -> Result<Lookup<'_>, ResolveError>
    where
        F: FnOnce() -> Result<Backend, ResolveError>,
    {
        match self.get() {
            Some(outcome) => lookup(outcome),
            None => self.resolve_slow(construct),
        }
    }

    #[cold]
    #[inline(never)]
    fn resolve_slow<F>(&self, construct: F) -> Result<Lookup<'_>, ResolveError>
    where
        F: FnOnce() -> Result<Backend, ResolveError>,
    {
        let me = platform::thread_id();
        match self.state.transition(UNRESOLVED, RESOLVING) {
            Ok(_) => {
                self.owner.store(me, Ordering::Release);
                let outcome = construct();
                // SAFETY: only the thread that won the transition writes, and
                // no reader looks before READY.
                unsafe { (*self.outcome.get()).write(outcome) };
                self.owner.store(0, Ordering::Relaxed);
                self.state.publish(READY);
            }
            Err(RESOLVING) => {
                if self.owner.load(Ordering::Acquire) == me {
                    return Ok(Lookup::Bootstrap);
                }
                self.state.wait_while(RESOLVING);
            }
            Err(_) => {}
        }
        match self.get() {
            Some(outcome) => lookup(outcome),
            // A waiter only returns once the state left RESOLVING, and the
            // state never goes back to UNRESOLVED.
            None => crate::diag::fatal(format_args!(
                "registry left RESOLVING without publishing"
            )),
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[inline(always)]
fn lookup(outcome: &Result<Backend, ResolveError>) -> Result<Lookup<'_>, ResolveError> {
    match outcome {
        Ok(backend) => Ok(Lookup::Ready(backend)),
        Err(e) => Err(*e),
    }
}
