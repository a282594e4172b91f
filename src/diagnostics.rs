//! Side channel for internal errors.
//!
//! The backend never returns steady-state I/O failures to the caller: every
//! write/flush/rename/remove/stat problem is reported once to a
//! [`DiagnosticSink`] and the operation is abandoned until the next tick or
//! the next call. The default sink writes one line per failure to standard
//! error.

use std::fmt;
use std::path::Path;

use crate::level::Level;

/// Internal operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Write,
    Flush,
    Sync,
    Open,
    Close,
    Rename,
    Remove,
    Stat,
    ReadDir,
    ParseSuffix,
}

impl Op {
    /// Short verb used in diagnostic records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Write => "write",
            Op::Flush => "flush",
            Op::Sync => "sync",
            Op::Open => "open",
            Op::Close => "close",
            Op::Rename => "rename",
            Op::Remove => "remove",
            Op::Stat => "stat",
            Op::ReadDir => "read dir",
            Op::ParseSuffix => "parse suffix",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver for non-fatal internal failures.
///
/// Implementations must be cheap and must not call back into the backend:
/// reports can be raised while the backend's lock is held.
pub trait DiagnosticSink: Send + Sync {
    /// Report one failed operation with whatever context is known.
    fn report(&self, op: Op, level: Option<Level>, path: Option<&Path>, error: &dyn fmt::Display);
}

/// Default sink: one line per failure on standard error.
#[derive(Debug, Default)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn report(&self, op: Op, level: Option<Level>, path: Option<&Path>, error: &dyn fmt::Display) {
        let mut record = format!("logshed: {op} failed");
        if let Some(level) = level {
            record.push_str(&format!(" level={level}"));
        }
        if let Some(path) = path {
            record.push_str(&format!(" path={}", path.display()));
        }
        eprintln!("{record}: {error}");
    }
}
