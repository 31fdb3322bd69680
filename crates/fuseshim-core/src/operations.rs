//! The trait a filesystem implements to be mounted.

use libc::c_void;

use crate::dirent::DirEntries;
use crate::error::FsResult;
use crate::file_info::FileInfo;
use crate::flags::{AccessMode, AllocateMode, IoctlFlags, PosixFileMode, ReadDirFlags};
use crate::memory::{NativeMemory, NativePath, ReadOnlyNativeMemory};
use crate::native::abi::FuseConnInfo;
use crate::result::PosixResult;
use crate::stat::{FileStat, VfsStat};
use crate::time::TimeSpec;

fn not_implemented<T>() -> FsResult<T> {
    Err(PosixResult::ENOSYS.into())
}

/// Arguments of an `ioctl` call, passed through untouched.
#[derive(Debug, Clone, Copy)]
pub struct IoctlRequest {
    pub cmd: u32,
    pub arg: *mut c_void,
    pub flags: IoctlFlags,
    pub data: *mut c_void,
}

/// Operations libfuse forwards to a filesystem.
///
/// Methods run synchronously on libfuse worker threads, possibly several at
/// once, so implementations must be `Send + Sync`. Every method either
/// returns a value or an [`FsError`](crate::FsError); returning a
/// [`PosixResult`] via `?` or `.into()` is the cheapest way to report a
/// specific code. Unimplemented operations report `ENOSYS`.
///
/// Paths and buffers are views over libfuse memory and only live for the
/// duration of the call.
pub trait FuseOperations: Send + Sync + 'static {
    /// Value attached to open files and directories through
    /// [`FileInfo::set_context`].
    type Context: Send + Sync + 'static;

    /// Called once when the filesystem is mounted.
    fn init(&self, _conn: &mut FuseConnInfo) -> FsResult<()> {
        Ok(())
    }

    /// Called once at teardown, either from libfuse's `destroy` or from the
    /// service host, whichever comes first.
    fn dispose(&self) -> FsResult<()> {
        Ok(())
    }

    fn get_attr(
        &self,
        path: &NativePath<'_>,
        info: Option<&FileInfo<'_, Self::Context>>,
    ) -> FsResult<FileStat>;

    /// Writes the NUL-terminated link target into `target`.
    fn read_link(&self, _path: &NativePath<'_>, _target: &mut NativeMemory<'_>) -> FsResult<()> {
        not_implemented()
    }

    fn mk_nod(&self, _path: &NativePath<'_>, _mode: PosixFileMode, _rdev: u64) -> FsResult<()> {
        not_implemented()
    }

    fn mk_dir(&self, _path: &NativePath<'_>, _mode: PosixFileMode) -> FsResult<()> {
        not_implemented()
    }

    fn unlink(&self, _path: &NativePath<'_>) -> FsResult<()> {
        not_implemented()
    }

    fn rm_dir(&self, _path: &NativePath<'_>) -> FsResult<()> {
        not_implemented()
    }

    /// Creates `link` pointing at `target`.
    fn sym_link(&self, _target: &NativePath<'_>, _link: &NativePath<'_>) -> FsResult<()> {
        not_implemented()
    }

    fn rename(&self, _from: &NativePath<'_>, _to: &NativePath<'_>, _flags: u32) -> FsResult<()> {
        not_implemented()
    }

    fn link(&self, _from: &NativePath<'_>, _to: &NativePath<'_>) -> FsResult<()> {
        not_implemented()
    }

    fn ch_mod(
        &self,
        _path: &NativePath<'_>,
        _mode: PosixFileMode,
        _info: Option<&FileInfo<'_, Self::Context>>,
    ) -> FsResult<()> {
        not_implemented()
    }

    /// `None` leaves the owner or group unchanged.
    fn ch_own(
        &self,
        _path: &NativePath<'_>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _info: Option<&FileInfo<'_, Self::Context>>,
    ) -> FsResult<()> {
        not_implemented()
    }

    fn truncate(
        &self,
        _path: &NativePath<'_>,
        _size: i64,
        _info: Option<&FileInfo<'_, Self::Context>>,
    ) -> FsResult<()> {
        not_implemented()
    }

    fn open(&self, _path: &NativePath<'_>, _info: &mut FileInfo<'_, Self::Context>) -> FsResult<()> {
        Ok(())
    }

    /// Fills `buf` from `offset` and returns the number of bytes read.
    fn read(
        &self,
        _path: &NativePath<'_>,
        _buf: &mut NativeMemory<'_>,
        _offset: i64,
        _info: &FileInfo<'_, Self::Context>,
    ) -> FsResult<usize> {
        not_implemented()
    }

    /// Writes `buf` at `offset` and returns the number of bytes written.
    fn write(
        &self,
        _path: &NativePath<'_>,
        _buf: &ReadOnlyNativeMemory<'_>,
        _offset: i64,
        _info: &FileInfo<'_, Self::Context>,
    ) -> FsResult<usize> {
        not_implemented()
    }

    fn stat_fs(&self, _path: &NativePath<'_>) -> FsResult<VfsStat> {
        Ok(VfsStat::default())
    }

    fn flush(&self, _path: &NativePath<'_>, _info: &FileInfo<'_, Self::Context>) -> FsResult<()> {
        Ok(())
    }

    /// The context is dropped by the dispatcher after this returns, whatever
    /// the result.
    fn release(
        &self,
        _path: &NativePath<'_>,
        _info: &mut FileInfo<'_, Self::Context>,
    ) -> FsResult<()> {
        Ok(())
    }

    fn fsync(
        &self,
        _path: &NativePath<'_>,
        _datasync: bool,
        _info: &FileInfo<'_, Self::Context>,
    ) -> FsResult<()> {
        not_implemented()
    }

    fn open_dir(
        &self,
        _path: &NativePath<'_>,
        _info: &mut FileInfo<'_, Self::Context>,
    ) -> FsResult<()> {
        Ok(())
    }

    /// Lists a directory. The dispatcher pulls entries only while libfuse
    /// has room for them and adds `.`/`..` when a listing from offset 0
    /// does not start with `.`.
    fn read_dir<'a>(
        &'a self,
        path: &NativePath<'_>,
        offset: i64,
        flags: ReadDirFlags,
        info: &FileInfo<'_, Self::Context>,
    ) -> FsResult<DirEntries<'a>>;

    fn release_dir(
        &self,
        _path: &NativePath<'_>,
        _info: &mut FileInfo<'_, Self::Context>,
    ) -> FsResult<()> {
        Ok(())
    }

    fn fsync_dir(
        &self,
        _path: &NativePath<'_>,
        _datasync: bool,
        _info: &FileInfo<'_, Self::Context>,
    ) -> FsResult<()> {
        not_implemented()
    }

    fn access(&self, _path: &NativePath<'_>, _mask: AccessMode) -> FsResult<()> {
        not_implemented()
    }

    fn create(
        &self,
        _path: &NativePath<'_>,
        _mode: PosixFileMode,
        _info: &mut FileInfo<'_, Self::Context>,
    ) -> FsResult<()> {
        not_implemented()
    }

    /// Sets access and modification times. Either may be
    /// [`TimeSpec::NOW`] or [`TimeSpec::OMIT`].
    fn utime(
        &self,
        _path: &NativePath<'_>,
        _atime: TimeSpec,
        _mtime: TimeSpec,
        _info: Option<&FileInfo<'_, Self::Context>>,
    ) -> FsResult<()> {
        not_implemented()
    }

    fn ioctl(
        &self,
        _path: &NativePath<'_>,
        _request: IoctlRequest,
        _info: &FileInfo<'_, Self::Context>,
    ) -> FsResult<()> {
        not_implemented()
    }

    fn fallocate(
        &self,
        _path: &NativePath<'_>,
        _mode: AllocateMode,
        _offset: i64,
        _length: i64,
        _info: &FileInfo<'_, Self::Context>,
    ) -> FsResult<()> {
        not_implemented()
    }
}
