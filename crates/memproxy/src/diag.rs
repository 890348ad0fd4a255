//! Allocation-free diagnostics.
//!
//! Messages are formatted into a fixed stack buffer and written to fd 2 with
//! a raw `write`. Anything that would reach the heap (`eprintln!`, `String`)
//! is off limits: the heap is what we are in the middle of routing.

use crate::platform;
use core::fmt::{self, Write};

const LINE_CAPACITY: usize = 256;

/// A `fmt::Write` sink over a fixed buffer. Output past the capacity is
/// dropped and the line is marked truncated.
pub struct LineBuf {
    buf: [u8; LINE_CAPACITY],
    len: usize,
    truncated: bool,
}

impl LineBuf {
    pub const fn new() -> Self {
        Self {
            buf: [0; LINE_CAPACITY],
            len: 0,
            truncated: false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl Default for LineBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = LINE_CAPACITY - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() {
            self.truncated = true;
        }
        Ok(())
    }
}

/// Format `args` as one `memproxy: ...` line on stderr.
pub fn emit(args: fmt::Arguments<'_>) {
    let mut line = LineBuf::new();
    let _ = line.write_str("memproxy: ");
    let _ = line.write_fmt(args);
    let _ = line.write_char('\n');
    if line.is_truncated() {
        let last = line.len - 1;
        line.buf[last] = b'\n';
    }
    platform::write_stderr(line.as_bytes());
}

/// Report an unrecoverable condition and abort the process.
#[cold]
#[inline(never)]
pub fn fatal(args: fmt::Arguments<'_>) -> ! {
    emit(args);
    unsafe { libc::abort() }
}
