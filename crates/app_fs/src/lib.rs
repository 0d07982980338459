//! wsfs File System Access Layer
//!
//! Provides a URI-addressed interface over a workspace directory, including:
//! - Uri: Normalized `file://` identifiers with navigation helpers
//! - Stat: Metadata snapshots with optional one-level expansion
//! - Content: Encoding-aware reads and optimistic-concurrency writes
//! - Tree operations: move, copy, delete, create, touch
//! - File watching with per-path coalescing
//! - FileSystemService: the async façade tying everything together

mod uri;
mod encoding;
mod stat;
mod content;
mod tree;
mod watcher;
mod service;

pub use uri::Uri;
pub use encoding::{detect_encoding, decode_bytes, encode_text, resolve_encoding, EncodingHint};
pub use stat::{FileContent, Stat};
pub use content::ContentStore;
pub use tree::MoveOptions;
pub use watcher::{
    ChangeCoalescer, ChangeKind, FileChange, FileChangeClient, FileChangesEvent, WatchState,
    WatcherOptions,
};
pub use service::{FileSystemService, ServiceOptions};

use thiserror::Error;

/// File system errors
#[derive(Error, Debug)]
pub enum FsError {
    #[error("Not found: {0}")]
    NotFound(Uri),

    #[error("Already exists: {0}")]
    AlreadyExists(Uri),

    #[error("Not a file: {0}")]
    NotAFile(Uri),

    #[error("Not a directory: {0}")]
    NotADirectory(Uri),

    #[error("Cannot replace {to} with {from}: directory/file mismatch")]
    TypeConflict { from: Uri, to: Uri },

    #[error("Directory not empty: {0}")]
    NotEmpty(Uri),

    #[error("File is out of sync: {0}")]
    OutOfSync(Uri),

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Watch failure: {0}")]
    WatchFailure(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            FsError::NotFound(_) => "NotFound",
            FsError::AlreadyExists(_) => "AlreadyExists",
            FsError::NotAFile(_) => "NotAFile",
            FsError::NotADirectory(_) => "NotADirectory",
            FsError::TypeConflict { .. } => "TypeConflict",
            FsError::NotEmpty(_) => "NotEmpty",
            FsError::OutOfSync(_) => "OutOfSync",
            FsError::UnsupportedEncoding(_) => "UnsupportedEncoding",
            FsError::WatchFailure(_) => "WatchFailure",
            FsError::InvalidUri(_) => "InvalidUri",
            FsError::InvalidOperation(_) => "InvalidOperation",
            FsError::Io(_) => "Io",
        }
    }
}

impl From<notify::Error> for FsError {
    fn from(e: notify::Error) -> Self {
        FsError::WatchFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
