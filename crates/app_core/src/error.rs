//! Application error types

use app_fs::FsError;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Recoverable Errors (report, continue) =====
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("Invalid path argument: {0}")]
    InvalidArgument(String),

    // ===== Fatal Errors (application termination) =====
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Init(String),
}

impl AppError {
    /// Is this error recoverable?
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AppError::Fs(_) | AppError::InvalidArgument(_))
    }

    /// Is this a fatal error?
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Fs(e) => e.code(),
            AppError::InvalidArgument(_) => "InvalidArgument",
            AppError::Config(_) => "Config",
            AppError::Init(_) => "Init",
        }
    }

    /// Get a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AppError::Fs(FsError::OutOfSync(uri)) => {
                format!("{} changed on disk since it was read; reload and retry", uri)
            }
            AppError::Fs(FsError::TypeConflict { from, to }) => {
                format!("Cannot replace {} with {}: one is a file, the other a directory", to, from)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_fs::Uri;

    #[test]
    fn test_classification() {
        let uri = Uri::parse("file:///tmp/a.txt").unwrap();
        let err = AppError::from(FsError::NotFound(uri));
        assert!(err.is_recoverable());
        assert_eq!(err.code(), "NotFound");
        assert_eq!(err.to_string(), "Not found: file:///tmp/a.txt");

        let err = AppError::Config("bad".to_string());
        assert!(err.is_fatal());
        assert_eq!(err.code(), "Config");
    }

    #[test]
    fn test_user_message() {
        let uri = Uri::parse("file:///tmp/a.txt").unwrap();
        let err = AppError::from(FsError::OutOfSync(uri));
        assert!(err.user_message().contains("reload and retry"));
    }
}
