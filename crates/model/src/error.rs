use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParseError>;

/// Failure taxonomy shared by every parser.
///
/// Parser-level failures are captured as values attached to the artifact
/// that produced them; they never abort sibling artifacts. Only a
/// manifest-level `NotFound`/`Malformed` ends a whole solution parse.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("no parser supports {0}")]
    Unsupported(PathBuf),

    #[error("malformed artifact {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("{failed} of {total} artifacts failed to parse")]
    PartialFailure { failed: usize, total: usize },

    #[error("parse was cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// Shorthand for a malformed-artifact error.
    #[must_use]
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ParseError::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
