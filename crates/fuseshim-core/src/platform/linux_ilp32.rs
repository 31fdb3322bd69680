//! 32-bit Linux (x86 and ARM) layouts with `_FILE_OFFSET_BITS=64`, which is
//! how libfuse 3 is always built.
//!
//! The structs are packed to 4 bytes, matching the i386 ABI where 64-bit
//! integers only need 4-byte alignment. `time_t` stays 32-bit. The ARM
//! catalog entry shares this 96-byte layout; it is not the ARM EABI
//! `stat64`, which aligns 64-bit fields to 8 bytes and is 104 bytes.
#![allow(dead_code)]

use std::mem::size_of;

use super::{narrow, native_nsec, portable_time, stat_time, MarshalError};
use crate::stat::{FileStat, VfsStat};
use crate::time::TimeSpec;

pub(crate) const UTIME_NOW: i64 = (1 << 30) - 1;
pub(crate) const UTIME_OMIT: i64 = (1 << 30) - 2;

#[repr(C, packed(4))]
#[derive(Clone, Copy, Default)]
pub(crate) struct Timespec {
    pub(crate) tv_sec: i32,
    pub(crate) tv_nsec: i32,
}

#[repr(C, packed(4))]
#[derive(Clone, Copy, Default)]
pub(crate) struct Stat {
    pub(crate) st_dev: u64,
    pub(crate) __pad1: u32,
    /// Legacy 32-bit inode slot.
    pub(crate) __st_ino: u32,
    pub(crate) st_mode: u32,
    pub(crate) st_nlink: u32,
    pub(crate) st_uid: u32,
    pub(crate) st_gid: u32,
    pub(crate) st_rdev: u64,
    pub(crate) __pad2: u32,
    pub(crate) st_size: i64,
    pub(crate) st_blksize: i32,
    pub(crate) st_blocks: i64,
    pub(crate) st_atim: Timespec,
    pub(crate) st_mtim: Timespec,
    pub(crate) st_ctim: Timespec,
    pub(crate) st_ino: u64,
}

#[repr(C, packed(4))]
#[derive(Clone, Copy, Default)]
pub(crate) struct StatVfs {
    pub(crate) f_bsize: u32,
    pub(crate) f_frsize: u32,
    pub(crate) f_blocks: u64,
    pub(crate) f_bfree: u64,
    pub(crate) f_bavail: u64,
    pub(crate) f_files: u64,
    pub(crate) f_ffree: u64,
    pub(crate) f_favail: u64,
    pub(crate) f_fsid: u32,
    pub(crate) __f_unused: i32,
    pub(crate) f_flag: u32,
    pub(crate) f_namemax: u32,
    pub(crate) __f_spare: [i32; 6],
}

const _: () = assert!(size_of::<Timespec>() == 8);
const _: () = assert!(size_of::<Stat>() == 96);
const _: () = assert!(size_of::<StatVfs>() == 96);

impl Timespec {
    pub(crate) fn from_portable(time: TimeSpec) -> Result<Self, MarshalError> {
        Ok(Timespec {
            tv_sec: narrow("tv_sec", time.sec)?,
            tv_nsec: narrow("tv_nsec", native_nsec(time, UTIME_NOW, UTIME_OMIT))?,
        })
    }

    pub(crate) fn to_portable(self) -> TimeSpec {
        let Timespec { tv_sec, tv_nsec } = self;
        portable_time(
            i64::from(tv_sec),
            i64::from(tv_nsec),
            UTIME_NOW,
            UTIME_OMIT,
        )
    }
}

impl Stat {
    pub(crate) fn from_portable(stat: &FileStat) -> Result<Self, MarshalError> {
        let [atime, mtime, ctime, _] = stat.resolved_times();
        Ok(Stat {
            st_dev: stat.dev,
            __st_ino: narrow("st_ino", stat.ino)?,
            st_mode: u32::from(stat.mode.bits()),
            st_nlink: narrow("st_nlink", stat.nlink)?,
            st_uid: stat.uid,
            st_gid: stat.gid,
            st_rdev: stat.rdev,
            st_size: stat.size,
            st_blksize: narrow("st_blksize", stat.blksize)?,
            st_blocks: stat.blocks,
            st_atim: Timespec::from_portable(stat_time(atime))?,
            st_mtim: Timespec::from_portable(stat_time(mtime))?,
            st_ctim: Timespec::from_portable(stat_time(ctime))?,
            st_ino: stat.ino,
            ..Default::default()
        })
    }
}

impl StatVfs {
    pub(crate) fn from_portable(stat: &VfsStat) -> Result<Self, MarshalError> {
        Ok(StatVfs {
            f_bsize: narrow("f_bsize", stat.bsize)?,
            f_frsize: narrow("f_frsize", stat.frsize)?,
            f_blocks: stat.blocks,
            f_bfree: stat.bfree,
            f_bavail: stat.bavail,
            f_files: stat.files,
            f_ffree: stat.ffree,
            f_favail: stat.favail,
            // Opaque identifier; glibc keeps the low word as well.
            f_fsid: (stat.fsid & 0xffff_ffff) as u32,
            f_flag: narrow("f_flag", stat.flag)?,
            f_namemax: narrow("f_namemax", stat.namemax)?,
            ..Default::default()
        })
    }
}
