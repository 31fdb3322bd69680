use fuseshim_core::{FsError, PosixResult};

/// Errors that can occur in backend operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BackendError {
    /// Path does not exist.
    #[error("Path not found: {0}")]
    NotFound(String),

    /// A path component that must be a directory is not one.
    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Path is a directory: {0}")]
    IsADirectory(String),

    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    /// Path traversal attempt detected.
    #[error("Path traversal attempt detected: {0}")]
    PathTraversal(String),

    /// Mutation attempted on a read-only mount.
    #[error("Read-only filesystem: {0}")]
    ReadOnly(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BackendError> for FsError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound(path) => FsError::NotFound(path),
            BackendError::NotADirectory(path) => FsError::NotADirectory(path),
            BackendError::IsADirectory(_) => PosixResult::EISDIR.into(),
            BackendError::NotEmpty(_) => PosixResult::ENOTEMPTY.into(),
            BackendError::AlreadyExists(_) => PosixResult::EEXIST.into(),
            BackendError::PathTraversal(_) => PosixResult::EACCES.into(),
            BackendError::ReadOnly(_) => PosixResult::EROFS.into(),
            BackendError::Io(e) => FsError::Io(e),
        }
    }
}
