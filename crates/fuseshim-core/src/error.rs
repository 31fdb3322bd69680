use std::io;

use crate::platform::{MarshalError, PlatformError};
use crate::result::PosixResult;

/// Errors a filesystem implementation can return from any operation.
///
/// Returning [`FsError::Posix`] (usually through `From<PosixResult>`) hands
/// the code to libfuse unchanged. Every other variant is classified by
/// [`FsError::to_posix`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FsError {
    #[error("{0}")]
    Posix(PosixResult),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    /// The operation is not valid for the target in its current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Name too long: {0}")]
    NameTooLong(String),

    #[error("Out of memory")]
    OutOfMemory,

    #[error("Operation interrupted")]
    Interrupted,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Marshaling error: {0}")]
    Marshal(#[from] MarshalError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type returned by filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Maps the error to the POSIX code libfuse will see. Never returns
    /// success; anything unrecognized becomes `EIO`.
    pub fn to_posix(&self) -> PosixResult {
        match self {
            FsError::Posix(result) if result.is_success() => PosixResult::EIO,
            FsError::Posix(result) => *result,
            FsError::NotFound(_) => PosixResult::ENOENT,
            FsError::PermissionDenied(_) => PosixResult::EPERM,
            FsError::NotADirectory(_) => PosixResult::ENOTDIR,
            FsError::InvalidOperation(_) => PosixResult::EOPNOTSUPP,
            FsError::Unsupported(_) => PosixResult::ENOSYS,
            FsError::NameTooLong(_) => PosixResult::ENAMETOOLONG,
            FsError::OutOfMemory => PosixResult::ENOMEM,
            FsError::Interrupted => PosixResult::EINTR,
            FsError::InvalidArgument(_) => PosixResult::EINVAL,
            FsError::Marshal(MarshalError::Overflow { .. }) => PosixResult::EOVERFLOW,
            FsError::Marshal(_) => PosixResult::EIO,
            FsError::Io(e) => io_error_to_posix(e),
            FsError::Other(_) => PosixResult::EIO,
        }
    }

    /// True for errors that are part of normal operation and not worth
    /// logging at error level.
    pub fn is_expected(&self) -> bool {
        matches!(
            self.to_posix(),
            PosixResult::ENOENT | PosixResult::ENOSYS | PosixResult::EEXIST
        )
    }
}

impl From<PosixResult> for FsError {
    fn from(result: PosixResult) -> Self {
        FsError::Posix(result)
    }
}

/// Classifies an I/O error, preferring the OS error code when present.
pub fn io_error_to_posix(e: &io::Error) -> PosixResult {
    if let Some(code) = e.raw_os_error() {
        if code > 0 {
            return PosixResult::new(code);
        }
    }
    match e.kind() {
        io::ErrorKind::NotFound => PosixResult::ENOENT,
        io::ErrorKind::PermissionDenied => PosixResult::EPERM,
        io::ErrorKind::AlreadyExists => PosixResult::EEXIST,
        io::ErrorKind::Unsupported => PosixResult::ENOSYS,
        io::ErrorKind::OutOfMemory => PosixResult::ENOMEM,
        io::ErrorKind::Interrupted => PosixResult::EINTR,
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => PosixResult::EINVAL,
        io::ErrorKind::WouldBlock => PosixResult::EAGAIN,
        io::ErrorKind::TimedOut => PosixResult::ETIMEDOUT,
        _ => PosixResult::EIO,
    }
}

/// Errors from loading libfuse and hosting a mount.
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("Failed to load libfuse: {0}")]
    Library(String),

    #[error("Invalid mount argument: {0}")]
    InvalidArgument(String),

    /// Non-zero status returned by the native main loop.
    #[error("libfuse exited with status {}", .0.value())]
    Native(PosixResult),

    #[error("Service already started")]
    AlreadyStarted,

    #[error("Mount thread panicked")]
    ThreadPanicked,

    #[error("Failed to unmount {path}: {reason}")]
    Unmount { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl MountError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            MountError::Native(status) => status.value(),
            MountError::Platform(_) => PosixResult::ENOSYS.value(),
            MountError::Library(_) => PosixResult::ENOENT.value(),
            MountError::InvalidArgument(_) => PosixResult::EINVAL.value(),
            MountError::Io(e) => io_error_to_posix(e).value(),
            MountError::AlreadyStarted
            | MountError::ThreadPanicked
            | MountError::Unmount { .. } => PosixResult::EIO.value(),
        }
    }
}

/// Text of a panic payload caught at the native boundary.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_mapping() {
        let cases: Vec<(FsError, PosixResult)> = vec![
            (FsError::NotFound("/a".into()), PosixResult::ENOENT),
            (FsError::PermissionDenied("/a".into()), PosixResult::EPERM),
            (FsError::NotADirectory("/a".into()), PosixResult::ENOTDIR),
            (FsError::InvalidOperation("x".into()), PosixResult::EOPNOTSUPP),
            (FsError::Unsupported("x".into()), PosixResult::ENOSYS),
            (FsError::NameTooLong("x".into()), PosixResult::ENAMETOOLONG),
            (FsError::OutOfMemory, PosixResult::ENOMEM),
            (FsError::Interrupted, PosixResult::EINTR),
            (FsError::InvalidArgument("x".into()), PosixResult::EINVAL),
            (FsError::Other("boom".into()), PosixResult::EIO),
        ];
        for (error, expected) in cases {
            assert_eq!(error.to_posix(), expected, "{:?}", error);
        }
    }

    #[test]
    fn test_posix_passthrough() {
        assert_eq!(FsError::from(PosixResult::EROFS).to_posix(), PosixResult::EROFS);
    }

    #[test]
    fn test_success_is_never_an_error_code() {
        assert_eq!(FsError::Posix(PosixResult::SUCCESS).to_posix(), PosixResult::EIO);
    }

    #[test]
    fn test_io_error_prefers_os_code() {
        let e = io::Error::from_raw_os_error(libc::ENOTEMPTY);
        assert_eq!(FsError::from(e).to_posix(), PosixResult::ENOTEMPTY);
    }

    #[test]
    fn test_io_error_by_kind() {
        let cases = [
            (io::ErrorKind::NotFound, PosixResult::ENOENT),
            (io::ErrorKind::PermissionDenied, PosixResult::EPERM),
            (io::ErrorKind::Unsupported, PosixResult::ENOSYS),
            (io::ErrorKind::OutOfMemory, PosixResult::ENOMEM),
            (io::ErrorKind::Interrupted, PosixResult::EINTR),
            (io::ErrorKind::InvalidInput, PosixResult::EINVAL),
            (io::ErrorKind::Other, PosixResult::EIO),
        ];
        for (kind, expected) in cases {
            assert_eq!(io_error_to_posix(&io::Error::new(kind, "x")), expected);
        }
    }

    #[test]
    fn test_marshal_overflow() {
        let e = FsError::from(MarshalError::Overflow {
            field: "st_ino",
            value: 1 << 40,
        });
        assert_eq!(e.to_posix(), PosixResult::EOVERFLOW);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("bad");
        assert_eq!(panic_message(payload.as_ref()), "bad");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("worse"));
        assert_eq!(panic_message(payload.as_ref()), "worse");
    }

    #[test]
    fn test_mount_error_exit_codes() {
        assert_eq!(MountError::Native(PosixResult::new(3)).exit_code(), 3);
        assert_eq!(
            MountError::InvalidArgument("nul".into()).exit_code(),
            PosixResult::EINVAL.value()
        );
        assert_eq!(MountError::ThreadPanicked.exit_code(), PosixResult::EIO.value());
    }
}
