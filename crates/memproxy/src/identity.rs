//! Executable identity policy: should this process use the custom backend?
//!
//! The answer comes from the allow-list file: one executable name per line,
//! `#` or `;` starting a comment. The running program's name is stripped of
//! its directory and truncated to [`NAME_CHUNK`] bytes before matching.
//!
//! [`decide`] runs inside registry construction, so it keeps everything on
//! the stack: the name, the read buffer, and the line being matched.

use crate::backend::BackendKind;
use crate::util::NAME_CHUNK;
use crate::{config, platform};
use core::ffi::CStr;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Whether the custom backend is present for this process.
///
/// Computed once per registry and never re-evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoutingDecision {
    custom_present: bool,
}

impl RoutingDecision {
    pub const CUSTOM: Self = Self {
        custom_present: true,
    };
    pub const SYSTEM: Self = Self {
        custom_present: false,
    };

    pub const fn custom_present(self) -> bool {
        self.custom_present
    }

    pub const fn backend_kind(self) -> BackendKind {
        if self.custom_present {
            BackendKind::Custom
        } else {
            BackendKind::System
        }
    }
}

impl From<bool> for RoutingDecision {
    fn from(custom_present: bool) -> Self {
        Self { custom_present }
    }
}

/// An executable's display name: last path segment, at most [`NAME_CHUNK`]
/// bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ProgramName {
    buf: [u8; NAME_CHUNK],
    len: usize,
}

impl ProgramName {
    pub const EMPTY: Self = Self {
        buf: [0; NAME_CHUNK],
        len: 0,
    };

    /// Derive the name from an invocation path such as `/usr/bin/python3`.
    pub fn from_path(path: &[u8]) -> Self {
        let base = match path.iter().rposition(|&b| b == b'/') {
            Some(slash) => &path[slash + 1..],
            None => path,
        };
        let len = base.len().min(NAME_CHUNK);
        let mut buf = [0; NAME_CHUNK];
        buf[..len].copy_from_slice(&base[..len]);
        Self { buf, len }
    }

    /// The running executable's name, or [`ProgramName::EMPTY`] when the
    /// host does not tell us.
    pub fn current() -> Self {
        let raw = platform::program_name();
        if raw.is_null() {
            return Self::EMPTY;
        }
        Self::from_path(unsafe { CStr::from_ptr(raw) }.to_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl core::fmt::Debug for ProgramName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.as_bytes().escape_ascii())
    }
}

impl core::fmt::Display for ProgramName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_bytes().escape_ascii())
    }
}

/// Normalize one allow-list line. Returns `None` for blank and comment lines.
fn entry(line: &[u8]) -> Option<&[u8]> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    match line.first() {
        None | Some(b'#') | Some(b';') => None,
        Some(_) => Some(line),
    }
}

/// Streaming membership test over allow-list text fed in arbitrary chunks.
///
/// Only the first `NAME_CHUNK + 1` bytes of a line are kept (one extra for a
/// trailing `\r`); longer lines can never equal a truncated name and are
/// discarded as overlong.
struct LineMatcher<'a> {
    name: &'a [u8],
    line: [u8; NAME_CHUNK + 1],
    len: usize,
    overlong: bool,
    matched: bool,
}

impl<'a> LineMatcher<'a> {
    fn new(name: &'a [u8]) -> Self {
        Self {
            name,
            line: [0; NAME_CHUNK + 1],
            len: 0,
            overlong: false,
            matched: false,
        }
    }

    fn feed(&mut self, chunk: &[u8]) {
        for &b in chunk {
            if b == b'\n' {
                self.end_line();
            } else if self.len < self.line.len() {
                self.line[self.len] = b;
                self.len += 1;
            } else {
                self.overlong = true;
            }
        }
    }

    fn end_line(&mut self) {
        if !self.overlong && entry(&self.line[..self.len]) == Some(self.name) {
            self.matched = true;
        }
        self.len = 0;
        self.overlong = false;
    }

    fn finish(mut self) -> bool {
        if self.len > 0 || self.overlong {
            self.end_line();
        }
        self.matched
    }
}

/// Scan `source` for `name` without allocating.
pub fn scan(mut source: impl Read, name: &ProgramName) -> io::Result<bool> {
    if name.is_empty() {
        return Ok(false);
    }
    let mut matcher = LineMatcher::new(name.as_bytes());
    let mut buf = [0u8; 512];
    loop {
        match source.read(&mut buf) {
            Ok(0) => return Ok(matcher.finish()),
            Ok(n) => {
                matcher.feed(&buf[..n]);
                if matcher.matched {
                    return Ok(true);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Decide for `name` against the allow-list at `path`. A missing or
/// unreadable file means the custom backend is absent.
pub fn decide_with(path: &Path, name: &ProgramName) -> RoutingDecision {
    let found = match File::open(path) {
        Ok(file) => scan(file, name).unwrap_or(false),
        Err(_) => false,
    };
    RoutingDecision::from(found)
}

/// Decide for the running process against the configured allow-list.
///
/// Reads the runtime switches first: `MEMPROXY_DISABLE` forces the system
/// backend, `MEMPROXY_VERBOSE` reports the outcome on stderr.
pub fn decide() -> RoutingDecision {
    unsafe { config::read_config() };
    let name = ProgramName::current();
    let decision = if config::is_disabled() {
        RoutingDecision::SYSTEM
    } else {
        decide_with(Path::new(config::CONF_FILE), &name)
    };
    if config::is_verbose() {
        crate::diag::emit(format_args!(
            "`{name}` routed to the {} allocator",
            decision.backend_kind()
        ));
    }
    decision
}
