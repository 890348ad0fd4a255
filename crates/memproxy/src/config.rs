use core::ffi::CStr;
use core::sync::atomic::{AtomicBool, Ordering};

/// Allow-list location, fixed at build time via `MEMPROXY_CONF_FILE`.
pub const CONF_FILE: &str = match option_env!("MEMPROXY_CONF_FILE") {
    Some(path) => path,
    None => "/etc/memproxy.conf",
};

/// Kill switch: when set, every process routes to the system allocator.
const DISABLE_VAR: &CStr = c"MEMPROXY_DISABLE";
/// Print the routing decision once it is made.
const VERBOSE_VAR: &CStr = c"MEMPROXY_VERBOSE";

/// Cached switches (read once during registry construction, never allocate).
static DISABLED: AtomicBool = AtomicBool::new(false);
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Read the runtime switches from the environment.
///
/// # Safety
/// Calls `libc::getenv`, which races with concurrent `setenv`; call it from
/// the registry construction path only.
pub unsafe fn read_config() {
    DISABLED.store(is_set(DISABLE_VAR), Ordering::Relaxed);
    VERBOSE.store(is_set(VERBOSE_VAR), Ordering::Relaxed);
}

pub fn is_disabled() -> bool {
    DISABLED.load(Ordering::Relaxed)
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// A variable counts as set unless it is absent, empty, or `0`.
unsafe fn is_set(key: &CStr) -> bool {
    let val = libc::getenv(key.as_ptr());
    if val.is_null() {
        return false;
    }
    !matches!(CStr::from_ptr(val).to_bytes(), b"" | b"0")
}
