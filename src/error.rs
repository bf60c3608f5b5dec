//! Error types for the rescan engine

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds that can occur during a rescan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// Scan root is missing or cannot be resolved
    BadRoot,
    /// A path could not be canonicalized
    PathResolution,
    /// Permission denied when accessing a file or directory
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// I/O error during file operations
    IoError,
    /// Bulk read of the persisted index failed
    IndexAccess,
    /// Database operation failed
    DatabaseError,
    /// Hash computation failed
    HashError,
    /// A scan session is already running
    ScanInProgress,
}

/// Represents an error that occurred during a rescan
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct ScanError {
    /// The kind of error
    pub kind: ScanErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

impl ScanError {
    /// Create a new scan error
    pub fn new(kind: ScanErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// Create a bad root error
    pub fn bad_root(path: PathBuf) -> Self {
        Self::new(
            ScanErrorKind::BadRoot,
            Some(path.clone()),
            format!("Scan root does not exist: {:?}", path),
        )
    }

    /// Create a path resolution error
    pub fn path_resolution(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::PathResolution, Some(path), message)
    }

    /// Create a not found error
    pub fn not_found(path: PathBuf) -> Self {
        Self::new(
            ScanErrorKind::NotFound,
            Some(path.clone()),
            format!("Not found: {:?}", path),
        )
    }

    /// Create an I/O error
    pub fn io_error(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::IoError, path, message)
    }

    /// Create an index access error
    pub fn index_access(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::IndexAccess, None, message)
    }

    /// Create a database error
    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::DatabaseError, None, message)
    }

    /// Create a hash computation error
    pub fn hash_error(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::HashError, Some(path), message)
    }

    /// Create a scan-in-progress error
    pub fn scan_in_progress() -> Self {
        Self::new(
            ScanErrorKind::ScanInProgress,
            None,
            "A scan is already running",
        )
    }

    /// Attach a path to the error
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
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

impl From<walkdir::Error> for ScanError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        let kind = match err.io_error().map(|e| e.kind()) {
            Some(std::io::ErrorKind::PermissionDenied) => ScanErrorKind::PermissionDenied,
            Some(std::io::ErrorKind::NotFound) => ScanErrorKind::NotFound,
            _ => ScanErrorKind::IoError,
        };
        Self::new(kind, path, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_kind_mapping() {
        let denied: ScanError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope").into();
        assert_eq!(denied.kind, ScanErrorKind::PermissionDenied);

        let missing: ScanError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(missing.kind, ScanErrorKind::NotFound);

        let other: ScanError = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert_eq!(other.kind, ScanErrorKind::IoError);
    }

    #[test]
    fn test_display_includes_message() {
        let err = ScanError::bad_root(PathBuf::from("/missing"));
        let text = err.to_string();
        assert!(text.contains("BadRoot"));
        assert!(text.contains("/missing"));
    }
}
