//! Error types for Copyforge.
//!
//! Library crates use [`CopyforgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

use crate::capabilities::CapabilityError;

/// Why a source adapter could not produce a candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// The input was recognised but held no extractable product.
    NoContentFound,
    /// The source (URL, host) could not be reached.
    UnreachableSource,
    /// The input format is not one the adapter accepts.
    UnsupportedFormat,
    /// The backing capability is not configured or returned an error.
    UpstreamUnavailable,
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoContentFound => "no content found",
            Self::UnreachableSource => "unreachable source",
            Self::UnsupportedFormat => "unsupported format",
            Self::UpstreamUnavailable => "upstream unavailable",
        };
        f.write_str(s)
    }
}

/// Top-level error type for all Copyforge operations.
#[derive(Debug, thiserror::Error)]
pub enum CopyforgeError {
    /// Missing or invalid submission field, raised before any pipeline work.
    #[error("input error: {message}")]
    Input { message: String },

    /// A source adapter failed or found nothing. The message is user-facing.
    #[error("source error ({kind}): {message}")]
    Source {
        kind: SourceErrorKind,
        message: String,
    },

    /// Copy generation failed. Callers fall back to the template.
    #[error("generation error: {0}")]
    Generation(String),

    /// Description copy violated a brand voice constraint.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An external call or the whole submission ran past its budget.
    #[error("timeout: {operation} exceeded {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a capability endpoint.
    #[error("network error: {0}")]
    Network(String),

    /// Parsing error for an input file or upstream payload.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// No product with the given id in the session.
    #[error("product not found: {0}")]
    NotFound(String),

    /// Serialising the export failed.
    #[error("export error: {0}")]
    Export(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CopyforgeError>;

impl CopyforgeError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
            message: msg.into(),
        }
    }

    pub fn source_failure(kind: SourceErrorKind, msg: impl Into<String>) -> Self {
        Self::Source {
            kind,
            message: msg.into(),
        }
    }

    pub fn no_content(msg: impl Into<String>) -> Self {
        Self::source_failure(SourceErrorKind::NoContentFound, msg)
    }

    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::source_failure(SourceErrorKind::UnreachableSource, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::source_failure(SourceErrorKind::UnsupportedFormat, msg)
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::source_failure(SourceErrorKind::UpstreamUnavailable, msg)
    }

    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The source failure kind, if this is a source error.
    pub fn source_kind(&self) -> Option<SourceErrorKind> {
        match self {
            Self::Source { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Translate a boundary capability failure into the adapter failure set.
    ///
    /// A capability timeout stays a timeout so it surfaces at submission level.
    pub fn from_capability(operation: &str, err: CapabilityError) -> Self {
        match err {
            CapabilityError::Timeout { secs } => Self::timeout(operation, secs),
            CapabilityError::Unreachable(m) => Self::unreachable(format!("{operation}: {m}")),
            CapabilityError::Unsupported(m) | CapabilityError::Unreadable(m) => {
                Self::unsupported(format!("{operation}: {m}"))
            }
            CapabilityError::Unavailable(m) | CapabilityError::Malformed(m) => {
                Self::upstream(format!("{operation}: {m}"))
            }
        }
    }
}
