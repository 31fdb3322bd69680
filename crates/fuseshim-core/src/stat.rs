//! Portable file and volume metadata.

use crate::flags::PosixFileMode;
use crate::time::TimeSpec;

/// File metadata as produced by a filesystem implementation.
///
/// Fields the target platform has no room for (birth time on Linux, BSD
/// file flags and generation) are dropped when encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: PosixFileMode,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub blksize: i64,
    pub blocks: i64,
    pub atime: TimeSpec,
    pub mtime: TimeSpec,
    pub ctime: TimeSpec,
    pub birthtime: TimeSpec,
    pub flags: u32,
    pub gen: u64,
}

impl FileStat {
    /// A directory with the given permission bits, timestamps set to now.
    pub fn directory(permissions: u16) -> Self {
        let now = TimeSpec::current();
        FileStat {
            mode: PosixFileMode::dir(permissions),
            nlink: 2,
            blksize: 4096,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
            ..Default::default()
        }
    }

    /// A regular file of `size` bytes with the given permission bits.
    pub fn regular(permissions: u16, size: i64) -> Self {
        let now = TimeSpec::current();
        FileStat {
            mode: PosixFileMode::regular(permissions),
            nlink: 1,
            size,
            blksize: 4096,
            blocks: (size.max(0) + 511) / 512,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
            ..Default::default()
        }
    }

    /// A stat carrying only type and inode, as used for plain readdir rows.
    pub fn type_only(mode: PosixFileMode, ino: u64) -> Self {
        FileStat {
            mode: mode.file_type(),
            ino,
            ..Default::default()
        }
    }

    /// All four timestamps with `NOW` resolved.
    pub(crate) fn resolved_times(&self) -> [TimeSpec; 4] {
        [
            self.atime.resolve(),
            self.mtime.resolve(),
            self.ctime.resolve(),
            self.birthtime.resolve(),
        ]
    }
}

/// Volume metadata (`statvfs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VfsStat {
    pub bsize: u64,
    pub frsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub favail: u64,
    pub fsid: u64,
    pub flag: u64,
    pub namemax: u64,
}
