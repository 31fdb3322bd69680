//! Userspace filesystems on libfuse 3.
//!
//! Implement [`FuseOperations`], then either call [`mount`] (blocking) or
//! host the mount on a background thread with [`FuseService`].

mod dirent;
mod dispatch;
mod error;
mod file_info;
mod handle;
mod memory;
mod operations;
mod service;
mod stat;
mod time;

pub mod flags;
pub mod native;
pub mod platform;
pub mod result;

pub use dirent::{dot_entries, DirEntries, FuseDirEntry};
pub use dispatch::Dispatcher;
pub use error::{io_error_to_posix, FsError, FsResult, MountError};
pub use file_info::FileInfo;
pub use flags::{
    AccessIntent, AccessMode, AllocateMode, FileInfoOptions, FillDirFlags, IoctlFlags, OpenFlags,
    PosixFileMode, ReadDirFlags,
};
pub use handle::{HandleId, HandleTable};
pub use memory::{decode_utf8, NativeMemory, NativePath, ReadOnlyNativeMemory};
pub use native::abi::{fuse_file_info, ConnCapabilities, FuseConnInfo};
pub use native::{call_main, mount, unmount};
pub use operations::{FuseOperations, IoctlRequest};
pub use platform::{MarshalError, Platform, PlatformError};
pub use result::PosixResult;
pub use service::FuseService;
pub use stat::{FileStat, VfsStat};
pub use time::TimeSpec;
