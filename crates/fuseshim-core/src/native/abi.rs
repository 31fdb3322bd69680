//! C declarations from `fuse.h` / `fuse_common.h` (libfuse 3).
#![allow(non_camel_case_types)]

use std::mem::size_of;

use libc::{c_char, c_int, c_uint, c_void, dev_t, gid_t, mode_t, pid_t, size_t, ssize_t, uid_t};

/// libfuse 3 is always built with 64-bit file offsets, whatever `libc::off_t` is.
pub type off_t = i64;

/// `struct fuse_file_info`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct fuse_file_info {
    pub flags: c_int,
    /// `writepage`, `direct_io`, `keep_cache`, ... bit-fields.
    pub bits: u32,
    pub padding2: u32,
    pub fh: u64,
    pub lock_owner: u64,
    pub poll_events: u32,
}

#[cfg(target_pointer_width = "64")]
const _: () = assert!(size_of::<fuse_file_info>() == 40);

/// `struct fuse_context`, as returned by `fuse_get_context()`.
#[repr(C)]
#[derive(Debug)]
pub struct fuse_context {
    pub fuse: *mut c_void,
    pub uid: uid_t,
    pub gid: gid_t,
    pub pid: pid_t,
    pub private_data: *mut c_void,
    pub umask: mode_t,
}

/// `fuse_fill_dir_t`.
pub type fuse_fill_dir_t = unsafe extern "C" fn(
    buf: *mut c_void,
    name: *const c_char,
    stbuf: *const c_void,
    off: off_t,
    flags: c_int,
) -> c_int;

type Path = *const c_char;
type Fi = *mut fuse_file_info;

/// `struct fuse_operations`. Field order is ABI.
#[repr(C)]
#[derive(Default)]
pub struct fuse_operations {
    pub getattr: Option<unsafe extern "C" fn(Path, *mut c_void, Fi) -> c_int>,
    pub readlink: Option<unsafe extern "C" fn(Path, *mut c_char, size_t) -> c_int>,
    pub mknod: Option<unsafe extern "C" fn(Path, mode_t, dev_t) -> c_int>,
    pub mkdir: Option<unsafe extern "C" fn(Path, mode_t) -> c_int>,
    pub unlink: Option<unsafe extern "C" fn(Path) -> c_int>,
    pub rmdir: Option<unsafe extern "C" fn(Path) -> c_int>,
    pub symlink: Option<unsafe extern "C" fn(Path, Path) -> c_int>,
    pub rename: Option<unsafe extern "C" fn(Path, Path, c_uint) -> c_int>,
    pub link: Option<unsafe extern "C" fn(Path, Path) -> c_int>,
    pub chmod: Option<unsafe extern "C" fn(Path, mode_t, Fi) -> c_int>,
    pub chown: Option<unsafe extern "C" fn(Path, uid_t, gid_t, Fi) -> c_int>,
    pub truncate: Option<unsafe extern "C" fn(Path, off_t, Fi) -> c_int>,
    pub open: Option<unsafe extern "C" fn(Path, Fi) -> c_int>,
    pub read: Option<unsafe extern "C" fn(Path, *mut c_char, size_t, off_t, Fi) -> c_int>,
    pub write: Option<unsafe extern "C" fn(Path, *const c_char, size_t, off_t, Fi) -> c_int>,
    pub statfs: Option<unsafe extern "C" fn(Path, *mut c_void) -> c_int>,
    pub flush: Option<unsafe extern "C" fn(Path, Fi) -> c_int>,
    pub release: Option<unsafe extern "C" fn(Path, Fi) -> c_int>,
    pub fsync: Option<unsafe extern "C" fn(Path, c_int, Fi) -> c_int>,
    pub setxattr: Option<unsafe extern "C" fn(Path, Path, *const c_char, size_t, c_int) -> c_int>,
    pub getxattr: Option<unsafe extern "C" fn(Path, Path, *mut c_char, size_t) -> c_int>,
    pub listxattr: Option<unsafe extern "C" fn(Path, *mut c_char, size_t) -> c_int>,
    pub removexattr: Option<unsafe extern "C" fn(Path, Path) -> c_int>,
    pub opendir: Option<unsafe extern "C" fn(Path, Fi) -> c_int>,
    pub readdir: Option<
        unsafe extern "C" fn(Path, *mut c_void, Option<fuse_fill_dir_t>, off_t, Fi, c_int) -> c_int,
    >,
    pub releasedir: Option<unsafe extern "C" fn(Path, Fi) -> c_int>,
    pub fsyncdir: Option<unsafe extern "C" fn(Path, c_int, Fi) -> c_int>,
    pub init: Option<unsafe extern "C" fn(*mut FuseConnInfo, *mut c_void) -> *mut c_void>,
    pub destroy: Option<unsafe extern "C" fn(*mut c_void)>,
    pub access: Option<unsafe extern "C" fn(Path, c_int) -> c_int>,
    pub create: Option<unsafe extern "C" fn(Path, mode_t, Fi) -> c_int>,
    pub lock: Option<unsafe extern "C" fn(Path, Fi, c_int, *mut c_void) -> c_int>,
    pub utimens: Option<unsafe extern "C" fn(Path, *const c_void, Fi) -> c_int>,
    pub bmap: Option<unsafe extern "C" fn(Path, size_t, *mut u64) -> c_int>,
    pub ioctl: Option<
        unsafe extern "C" fn(Path, c_uint, *mut c_void, Fi, c_uint, *mut c_void) -> c_int,
    >,
    pub poll: Option<unsafe extern "C" fn(Path, Fi, *mut c_void, *mut c_uint) -> c_int>,
    pub write_buf: Option<unsafe extern "C" fn(Path, *mut c_void, off_t, Fi) -> c_int>,
    pub read_buf: Option<unsafe extern "C" fn(Path, *mut *mut c_void, size_t, off_t, Fi) -> c_int>,
    pub flock: Option<unsafe extern "C" fn(Path, Fi, c_int) -> c_int>,
    pub fallocate: Option<unsafe extern "C" fn(Path, c_int, off_t, off_t, Fi) -> c_int>,
    pub copy_file_range:
        Option<unsafe extern "C" fn(Path, Fi, off_t, Path, Fi, off_t, size_t, c_int) -> ssize_t>,
    pub lseek: Option<unsafe extern "C" fn(Path, off_t, c_int, Fi) -> off_t>,
}

const _: () = assert!(size_of::<fuse_operations>() == 42 * size_of::<usize>());

bitflags::bitflags! {
    /// `FUSE_CAP_*` connection capabilities.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConnCapabilities: u32 {
        const ASYNC_READ = 1 << 0;
        const POSIX_LOCKS = 1 << 1;
        const ATOMIC_O_TRUNC = 1 << 3;
        const EXPORT_SUPPORT = 1 << 4;
        const DONT_MASK = 1 << 6;
        const SPLICE_WRITE = 1 << 7;
        const SPLICE_MOVE = 1 << 8;
        const SPLICE_READ = 1 << 9;
        const FLOCK_LOCKS = 1 << 10;
        const IOCTL_DIR = 1 << 11;
        const AUTO_INVAL_DATA = 1 << 12;
        const READDIRPLUS = 1 << 13;
        const READDIRPLUS_AUTO = 1 << 14;
        const ASYNC_DIO = 1 << 15;
        const WRITEBACK_CACHE = 1 << 16;
        const NO_OPEN_SUPPORT = 1 << 17;
        const PARALLEL_DIROPS = 1 << 18;
        const POSIX_ACL = 1 << 19;
        const HANDLE_KILLPRIV = 1 << 20;
        const CACHE_SYMLINKS = 1 << 23;
        const NO_OPENDIR_SUPPORT = 1 << 24;
        const EXPLICIT_INVAL_DATA = 1 << 25;
    }
}

/// `struct fuse_conn_info`, handed to `init`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FuseConnInfo {
    pub proto_major: u32,
    pub proto_minor: u32,
    pub max_write: u32,
    pub max_read: u32,
    pub max_readahead: u32,
    capable: u32,
    want: u32,
    pub max_background: u32,
    pub congestion_threshold: u32,
    pub time_gran: u32,
    reserved: [u32; 22],
}

const _: () = assert!(size_of::<FuseConnInfo>() == 128);

impl FuseConnInfo {
    pub fn capable(&self) -> ConnCapabilities {
        ConnCapabilities::from_bits_retain(self.capable)
    }

    pub fn want(&self) -> ConnCapabilities {
        ConnCapabilities::from_bits_retain(self.want)
    }

    /// Requests `capabilities`, dropping any the kernel does not offer.
    pub fn set_want(&mut self, capabilities: ConnCapabilities) {
        self.want = (capabilities & self.capable()).bits();
    }
}

impl Default for FuseConnInfo {
    fn default() -> Self {
        FuseConnInfo {
            proto_major: 7,
            proto_minor: 31,
            max_write: 128 * 1024,
            max_read: 0,
            max_readahead: 128 * 1024,
            capable: (ConnCapabilities::ASYNC_READ | ConnCapabilities::READDIRPLUS).bits(),
            want: ConnCapabilities::ASYNC_READ.bits(),
            max_background: 12,
            congestion_threshold: 9,
            time_gran: 1,
            reserved: [0; 22],
        }
    }
}
