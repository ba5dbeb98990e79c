//! Error types for the catalog synchronizer and the query layer
//!
//! [`ScanError`] is what a sync pass can fail with. Per-file failures are
//! logged and reported as `err` events; only store failures end the pass.
//! [`QueryError`] is what a library call returns to its caller.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanErrorKind {
    PermissionDenied,
    NotFound,
    IoError,
    /// The catalog store rejected a read or write
    DatabaseError,
    HashError,
    /// A file's tags could not be read at all
    MetadataError,
    /// The job JSON is malformed or misses a required field
    ConfigError,
}

/// Failure of one step of a sync pass, optionally tied to a file
#[derive(Debug, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct ScanError {
    pub kind: ScanErrorKind,
    pub path: Option<PathBuf>,
    pub message: String,
}

impl ScanError {
    fn new(kind: ScanErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::DatabaseError, None, message)
    }

    pub fn hash_error(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::HashError, Some(path), message)
    }

    pub fn metadata_error(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::MetadataError, Some(path), message)
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::ConfigError, None, message)
    }

    /// Tie an error converted with `?` to the file or store it concerns
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => ScanErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => ScanErrorKind::NotFound,
            _ => ScanErrorKind::IoError,
        };
        Self::new(kind, None, err.to_string())
    }
}

impl From<rusqlite::Error> for ScanError {
    fn from(err: rusqlite::Error) -> Self {
        Self::database_error(err.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        Self::config_error(err.to_string())
    }
}

/// Outcomes of query-layer operations other than success
#[derive(Debug, Error)]
pub enum QueryError {
    /// The requested path does not resolve to an accessible vpath or catalog row
    #[error("could not find file: {0}")]
    FileNotFound(String),
    /// Required fields are missing or out of range
    #[error("bad input data: {0}")]
    BadInput(String),
    /// Nothing matched the selection criteria
    #[error("no songs match the criteria")]
    NoMatch,
    /// A backing store has not been opened yet
    #[error("{0} store is not initialized")]
    NotInitialized(&'static str),
    /// The underlying store failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl QueryError {
    /// Stable machine-readable code for the outer transport layer
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::FileNotFound(_) => "file_not_found",
            QueryError::BadInput(_) => "bad_input",
            QueryError::NoMatch => "no_match",
            QueryError::NotInitialized(_) => "not_initialized",
            QueryError::Database(_) => "database",
        }
    }
}

/// Result alias for query-layer operations
pub type QueryResult<T> = Result<T, QueryError>;
