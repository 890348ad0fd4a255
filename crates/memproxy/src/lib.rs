//! Process-wide allocation interposer.
//!
//! Every call of the libc allocation family is routed, per process, to one
//! of two real backends: a custom allocator found at runtime (exports named
//! `ltmalloc`, `ltfree`, ...) or the system allocator in libc. Which one is
//! decided once, on first use, by looking the executable's name up in an
//! allow-list file.
//!
//! The library is normally loaded with `LD_PRELOAD`; see [`bind`] for the
//! other ways of installing it.

extern crate libc;

pub mod backend;
pub mod bind;
pub mod bootstrap;
pub mod config;
pub mod diag;
pub mod identity;
pub mod platform;
pub mod registry;
pub mod router;
pub mod sync;
pub mod util;

pub use backend::{Backend, BackendFns, BackendKind, ResolveError, SymbolResolver};
pub use identity::{ProgramName, RoutingDecision};
pub use registry::{BackendRegistry, InitState};
pub use router::Router;
