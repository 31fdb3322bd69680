//! Generic 64-bit Linux layout (`asm-generic/stat.h`) as used on ARM64.
#![allow(dead_code)]

use std::mem::size_of;

use super::{narrow, native_nsec, portable_time, stat_time, MarshalError};
use crate::stat::{FileStat, VfsStat};
use crate::time::TimeSpec;

pub(crate) const UTIME_NOW: i64 = (1 << 30) - 1;
pub(crate) const UTIME_OMIT: i64 = (1 << 30) - 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Timespec {
    pub(crate) tv_sec: i64,
    pub(crate) tv_nsec: i64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Stat {
    pub(crate) st_dev: u64,
    pub(crate) st_ino: u64,
    pub(crate) st_mode: u32,
    pub(crate) st_nlink: u32,
    pub(crate) st_uid: u32,
    pub(crate) st_gid: u32,
    pub(crate) st_rdev: u64,
    pub(crate) __pad1: u64,
    pub(crate) st_size: i64,
    pub(crate) st_blksize: i32,
    pub(crate) __pad2: i32,
    pub(crate) st_blocks: i64,
    pub(crate) st_atim: Timespec,
    pub(crate) st_mtim: Timespec,
    pub(crate) st_ctim: Timespec,
    pub(crate) __unused: [i32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StatVfs {
    pub(crate) f_bsize: u64,
    pub(crate) f_frsize: u64,
    pub(crate) f_blocks: u64,
    pub(crate) f_bfree: u64,
    pub(crate) f_bavail: u64,
    pub(crate) f_files: u64,
    pub(crate) f_ffree: u64,
    pub(crate) f_favail: u64,
    pub(crate) f_fsid: u64,
    pub(crate) f_flag: u64,
    pub(crate) f_namemax: u64,
    pub(crate) __f_spare: [i32; 6],
}

const _: () = assert!(size_of::<Timespec>() == 16);
const _: () = assert!(size_of::<Stat>() == 128);
const _: () = assert!(size_of::<StatVfs>() == 112);

impl Timespec {
    pub(crate) fn from_portable(time: TimeSpec) -> Self {
        Timespec {
            tv_sec: time.sec,
            tv_nsec: native_nsec(time, UTIME_NOW, UTIME_OMIT),
        }
    }

    pub(crate) fn to_portable(self) -> TimeSpec {
        portable_time(self.tv_sec, self.tv_nsec, UTIME_NOW, UTIME_OMIT)
    }
}

impl Stat {
    pub(crate) fn from_portable(stat: &FileStat) -> Result<Self, MarshalError> {
        let [atime, mtime, ctime, _] = stat.resolved_times();
        Ok(Stat {
            st_dev: stat.dev,
            st_ino: stat.ino,
            st_mode: u32::from(stat.mode.bits()),
            st_nlink: narrow("st_nlink", stat.nlink)?,
            st_uid: stat.uid,
            st_gid: stat.gid,
            st_rdev: stat.rdev,
            st_size: stat.size,
            st_blksize: narrow("st_blksize", stat.blksize)?,
            st_blocks: stat.blocks,
            st_atim: Timespec::from_portable(stat_time(atime)),
            st_mtim: Timespec::from_portable(stat_time(mtime)),
            st_ctim: Timespec::from_portable(stat_time(ctime)),
            ..Default::default()
        })
    }
}

impl StatVfs {
    pub(crate) fn from_portable(stat: &VfsStat) -> Self {
        StatVfs {
            f_bsize: stat.bsize,
            f_frsize: stat.frsize,
            f_blocks: stat.blocks,
            f_bfree: stat.bfree,
            f_bavail: stat.bavail,
            f_files: stat.files,
            f_ffree: stat.ffree,
            f_favail: stat.favail,
            f_fsid: stat.fsid,
            f_flag: stat.flag,
            f_namemax: stat.namemax,
            __f_spare: [0; 6],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::tests::{sample_stat, sample_vfs};
    use crate::platform::{read_struct, Platform};

    #[test]
    fn test_stat_fields_survive_encoding() {
        let stat = sample_stat();
        let mut buf = [0u8; 128];
        Platform::LINUX_AARCH64.encode_stat(&stat, &mut buf).unwrap();
        let native: Stat = read_struct(&buf);
        assert_eq!(native.st_ino, stat.ino);
        assert_eq!(native.st_mode, 0o100640);
        assert_eq!(native.st_nlink, 3);
        assert_eq!(native.st_size, 10);
        assert_eq!(native.st_blksize, 4096);
        assert_eq!(native.st_atim.to_portable(), stat.atime);
        assert_eq!(native.st_ctim.to_portable(), stat.ctime);
    }

    #[test]
    fn test_link_count_is_checked() {
        let stat = FileStat {
            nlink: u64::from(u32::MAX) + 1,
            ..sample_stat()
        };
        let mut buf = [0u8; 128];
        let err = Platform::LINUX_AARCH64
            .encode_stat(&stat, &mut buf)
            .unwrap_err();
        assert!(matches!(err, MarshalError::Overflow { field: "st_nlink", .. }));
    }

    #[test]
    fn test_size_offset() {
        let stat = FileStat {
            size: 0x0A0B,
            ..Default::default()
        };
        let mut buf = [0u8; 128];
        Platform::LINUX_AARCH64.encode_stat(&stat, &mut buf).unwrap();
        assert_eq!(&buf[48..56], &0x0A0Bi64.to_ne_bytes());
    }

    #[test]
    fn test_statvfs_fields_survive_encoding() {
        let mut buf = [0u8; 112];
        Platform::LINUX_AARCH64
            .encode_statvfs(&sample_vfs(), &mut buf)
            .unwrap();
        let native: StatVfs = read_struct(&buf);
        assert_eq!(native.f_bfree, 1 << 19);
        assert_eq!(native.f_flag, 1);
    }

    #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
    #[test]
    fn test_matches_libc_stat() {
        let stat = sample_stat();
        let mut buf = [0u8; 128];
        Platform::LINUX_AARCH64.encode_stat(&stat, &mut buf).unwrap();
        let native: libc::stat = read_struct(&buf);
        assert_eq!(native.st_ino, stat.ino);
        assert_eq!(native.st_nlink, 3);
        assert_eq!(native.st_size, 10);
        assert_eq!(native.st_blksize, 4096);
    }
}
