//! Error types for orgscan.
//!
//! Library crates use [`OrgScanError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all orgscan operations.
#[derive(Debug, thiserror::Error)]
pub enum OrgScanError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Search provider credentials are missing or were rejected.
    #[error("auth error: {0}")]
    Auth(String),

    /// Search provider returned an error status or a malformed payload.
    #[error("provider error: {0}")]
    Provider(String),

    /// Spreadsheet read/write failure.
    #[error("sheet error: {0}")]
    Sheet(String),

    /// Run journal (database) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad topic profile, missing column, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OrgScanError>;

impl OrgScanError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
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

    /// Whether this error must end the whole run rather than just the current row.
    ///
    /// Credentials stay invalid for every remaining row, and a sheet that cannot
    /// be written means nothing further would be committed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Sheet(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = OrgScanError::config("missing spreadsheet id");
        assert_eq!(err.to_string(), "config error: missing spreadsheet id");

        let err = OrgScanError::Provider("HTTP 503".into());
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn fatal_classification() {
        assert!(OrgScanError::Auth("rejected".into()).is_fatal());
        assert!(OrgScanError::Sheet("quota".into()).is_fatal());
        assert!(!OrgScanError::Provider("timeout".into()).is_fatal());
        assert!(!OrgScanError::validation("x").is_fatal());
    }
}
