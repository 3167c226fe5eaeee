// SPDX-License-Identifier: GPL-2.0-or-later

//! Error kinds shared by every pipeline stage.
//!
//! One enum for every stage rather than a type per stage: callers
//! match on `kind()` the way the original dispatched on exception
//! subclass.

use std::fmt;
use std::io;

/// The error kinds shared across the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum NidasError {
    /// Underlying read/write/open failed. `EOF` is orderly, not an error path
    /// by itself -- callers that want EndOfData semantics should map it there.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A blocking operation exceeded its configured deadline.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// A socket/stream was closed out from under us.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Configuration rejected a value. Fatal at startup, non-fatal (reject
    /// and keep running) at reconfigure (§7).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Text that should have matched a grammar did not (sync header, cal
    /// file row, scanf format).
    #[error("parse error: {0}")]
    Parse(String),

    /// Configuration document malformed. Out of scope to parse (§1) but the
    /// kind is kept so callers bound by §7 can still report it uniformly.
    #[error("xml error: {0}")]
    XmlError(String),

    /// DNS lookup failed; transient from the point of view of background
    /// connect (§6).
    #[error("unknown host: {0}")]
    UnknownHost(String),

    /// Orderly termination of a bounded input (archive file exhausted,
    /// sync record reader hit EOF).
    #[error("end of data")]
    EndOfData,

    /// A programming-invariant violation. Logging at CRITICAL and aborting
    /// is the caller's job (see `fatal!`); this variant exists so the
    /// violation can still be described before the process goes down.
    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, NidasError>;

impl NidasError {
    /// Coarse kind tag, for callers that branch on kind rather than match.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Timeout(_) => ErrorKind::Io,
            Self::ConnectionLost(_) => ErrorKind::Io,
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::Parse(_) => ErrorKind::Parse,
            Self::XmlError(_) => ErrorKind::XmlError,
            Self::UnknownHost(_) => ErrorKind::UnknownHost,
            Self::EndOfData => ErrorKind::EndOfData,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// True if this IO error represents an orderly end of stream rather
    /// than a failure worth reopening over.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
            || matches!(self, Self::EndOfData)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    InvalidParameter,
    Parse,
    XmlError,
    UnknownHost,
    EndOfData,
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Io => "IO",
            Self::InvalidParameter => "InvalidParameter",
            Self::Parse => "Parse",
            Self::XmlError => "XMLError",
            Self::UnknownHost => "UnknownHost",
            Self::EndOfData => "EndOfData",
            Self::Fatal => "Fatal",
        };
        f.write_str(s)
    }
}

/// Log at CRITICAL and abort the process. The only legal response to a
/// `NidasError::Fatal` (§7): a programming-invariant violation is not
/// something any caller up the stack can recover from.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        log::error!("[CRITICAL] {}", format_args!($($arg)*));
        std::process::abort();
    }};
}
