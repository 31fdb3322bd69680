//! FreeBSD 12+ (64-bit inode) layouts on amd64.
#![allow(dead_code)]

use std::mem::size_of;

use super::{native_nsec, portable_time, stat_time, MarshalError};
use crate::stat::{FileStat, VfsStat};
use crate::time::TimeSpec;

pub(crate) const UTIME_NOW: i64 = -1;
pub(crate) const UTIME_OMIT: i64 = -2;

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
    pub(crate) st_nlink: u64,
    pub(crate) st_mode: u16,
    pub(crate) st_padding0: i16,
    pub(crate) st_uid: u32,
    pub(crate) st_gid: u32,
    pub(crate) st_padding1: i32,
    pub(crate) st_rdev: u64,
    pub(crate) st_atim: Timespec,
    pub(crate) st_mtim: Timespec,
    pub(crate) st_ctim: Timespec,
    pub(crate) st_birthtim: Timespec,
    pub(crate) st_size: i64,
    pub(crate) st_blocks: i64,
    pub(crate) st_blksize: i32,
    pub(crate) st_flags: u32,
    pub(crate) st_gen: u64,
    pub(crate) st_spare: [i64; 10],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StatVfs {
    pub(crate) f_bavail: u64,
    pub(crate) f_bfree: u64,
    pub(crate) f_blocks: u64,
    pub(crate) f_favail: u64,
    pub(crate) f_ffree: u64,
    pub(crate) f_files: u64,
    pub(crate) f_bsize: u64,
    pub(crate) f_flag: u64,
    pub(crate) f_frsize: u64,
    pub(crate) f_fsid: u64,
    pub(crate) f_namemax: u64,
}

const _: () = assert!(size_of::<Timespec>() == 16);
const _: () = assert!(size_of::<Stat>() == 224);
const _: () = assert!(size_of::<StatVfs>() == 88);

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
        let [atime, mtime, ctime, birthtime] = stat.resolved_times();
        Ok(Stat {
            st_dev: stat.dev,
            st_ino: stat.ino,
            st_nlink: stat.nlink,
            st_mode: stat.mode.bits(),
            st_uid: stat.uid,
            st_gid: stat.gid,
            st_rdev: stat.rdev,
            st_atim: Timespec::from_portable(stat_time(atime)),
            st_mtim: Timespec::from_portable(stat_time(mtime)),
            st_ctim: Timespec::from_portable(stat_time(ctime)),
            st_birthtim: Timespec::from_portable(stat_time(birthtime)),
            st_size: stat.size,
            st_blocks: stat.blocks,
            st_blksize: super::narrow("st_blksize", stat.blksize)?,
            st_flags: stat.flags,
            st_gen: stat.gen,
            ..Default::default()
        })
    }
}

impl StatVfs {
    pub(crate) fn from_portable(stat: &VfsStat) -> Self {
        StatVfs {
            f_bavail: stat.bavail,
            f_bfree: stat.bfree,
            f_blocks: stat.blocks,
            f_favail: stat.favail,
            f_ffree: stat.ffree,
            f_files: stat.files,
            f_bsize: stat.bsize,
            f_flag: stat.flag,
            f_frsize: stat.frsize,
            f_fsid: stat.fsid,
            f_namemax: stat.namemax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::tests::{sample_stat, sample_vfs};
    use crate::platform::{read_struct, Platform};

    #[test]
    fn test_stat_keeps_birth_time_and_flags() {
        let stat = sample_stat();
        let mut buf = [0u8; 224];
        Platform::FREEBSD_X86_64.encode_stat(&stat, &mut buf).unwrap();
        let native: Stat = read_struct(&buf);
        assert_eq!(native.st_mode, 0o100640);
        assert_eq!(native.st_nlink, 3);
        assert_eq!(native.st_size, 10);
        assert_eq!(native.st_birthtim.to_portable(), stat.birthtime);
        assert_eq!(native.st_flags, 0x20);
        assert_eq!(native.st_gen, 77);
        assert_eq!(native.st_spare, [0; 10]);
    }

    #[test]
    fn test_field_offsets() {
        let stat = FileStat {
            size: 0x0102,
            ..Default::default()
        };
        let mut buf = [0u8; 224];
        Platform::FREEBSD_X86_64.encode_stat(&stat, &mut buf).unwrap();
        assert_eq!(&buf[112..120], &0x0102i64.to_ne_bytes());
    }

    #[test]
    fn test_statvfs_field_order() {
        let mut buf = [0u8; 88];
        Platform::FREEBSD_X86_64
            .encode_statvfs(&sample_vfs(), &mut buf)
            .unwrap();
        let native: StatVfs = read_struct(&buf);
        assert_eq!(native.f_bavail, 1 << 18);
        assert_eq!(native.f_files, 65536);
        assert_eq!(native.f_bsize, 4096);
        assert_eq!(&buf[0..8], &(1u64 << 18).to_ne_bytes());
    }

    #[test]
    fn test_timespec_sentinels() {
        let now = Timespec::from_portable(TimeSpec::NOW);
        assert_eq!(now.tv_nsec, UTIME_NOW);
        assert!(now.to_portable().is_now());
        assert!(Timespec { tv_sec: 5, tv_nsec: -2 }.to_portable().is_omit());
    }
}
