//! `extern "C"` entry points handed to libfuse.
//!
//! Each one recovers the [`Dispatcher`] from the context's private data and
//! forwards to the method of the same name.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use libc::{c_char, c_int, c_uint, c_void, dev_t, gid_t, mode_t, size_t, uid_t};

use super::abi::{fuse_file_info, fuse_fill_dir_t, fuse_operations, off_t, FuseConnInfo};
use super::library::LibFuse;
use crate::dispatch::Dispatcher;
use crate::operations::FuseOperations;
use crate::result::PosixResult;

type Path = *const c_char;
type Fi = *mut fuse_file_info;

fn guard(f: impl FnOnce() -> c_int) -> c_int {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| PosixResult::EIO.negated())
}

unsafe fn dispatcher<'a, F: FuseOperations>(data: *mut c_void) -> Option<&'a Dispatcher<F>> {
    unsafe { data.cast::<Dispatcher<F>>().as_ref() }
}

fn context_data() -> *mut c_void {
    LibFuse::get().map_or(ptr::null_mut(), |lib| lib.private_data())
}

macro_rules! forward {
    ($($name:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            unsafe extern "C" fn $name<F: FuseOperations>($($arg: $ty),*) -> c_int {
                guard(|| match unsafe { dispatcher::<F>(context_data()) } {
                    Some(d) => unsafe { d.$name($($arg),*) },
                    None => PosixResult::EIO.negated(),
                })
            }
        )*
    };
}

forward! {
    getattr(path: Path, stat: *mut c_void, fi: Fi);
    readlink(path: Path, buf: *mut c_char, size: size_t);
    mknod(path: Path, mode: mode_t, rdev: dev_t);
    mkdir(path: Path, mode: mode_t);
    unlink(path: Path);
    rmdir(path: Path);
    symlink(target: Path, link: Path);
    rename(from: Path, to: Path, flags: c_uint);
    link(from: Path, to: Path);
    chmod(path: Path, mode: mode_t, fi: Fi);
    chown(path: Path, uid: uid_t, gid: gid_t, fi: Fi);
    truncate(path: Path, size: off_t, fi: Fi);
    open(path: Path, fi: Fi);
    read(path: Path, buf: *mut c_char, size: size_t, offset: off_t, fi: Fi);
    write(path: Path, buf: *const c_char, size: size_t, offset: off_t, fi: Fi);
    statfs(path: Path, stat: *mut c_void);
    flush(path: Path, fi: Fi);
    release(path: Path, fi: Fi);
    fsync(path: Path, datasync: c_int, fi: Fi);
    opendir(path: Path, fi: Fi);
    readdir(path: Path, buf: *mut c_void, filler: Option<fuse_fill_dir_t>, offset: off_t, fi: Fi, flags: c_int);
    releasedir(path: Path, fi: Fi);
    fsyncdir(path: Path, datasync: c_int, fi: Fi);
    access(path: Path, mask: c_int);
    create(path: Path, mode: mode_t, fi: Fi);
    utimens(path: Path, ts: *const c_void, fi: Fi);
    ioctl(path: Path, cmd: c_uint, arg: *mut c_void, fi: Fi, flags: c_uint, data: *mut c_void);
    fallocate(path: Path, mode: c_int, offset: off_t, length: off_t, fi: Fi);
}

/// Returns the private data unchanged so later callbacks still find the
/// dispatcher in the context.
unsafe extern "C" fn init<F: FuseOperations>(conn: *mut FuseConnInfo, _config: *mut c_void) -> *mut c_void {
    let data = context_data();
    let _ = catch_unwind(AssertUnwindSafe(|| {
        if let Some(d) = unsafe { dispatcher::<F>(data) } {
            unsafe { d.init(conn) };
        }
    }));
    data
}

unsafe extern "C" fn destroy<F: FuseOperations>(data: *mut c_void) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        if let Some(d) = unsafe { dispatcher::<F>(data) } {
            d.destroy();
        }
    }));
}

/// The operations table for `F`. xattr, locking, `bmap`, `poll`, buffer
/// I/O, `copy_file_range` and `lseek` stay null, so libfuse answers them
/// with `ENOSYS`.
pub(crate) fn operations<F: FuseOperations>() -> fuse_operations {
    fuse_operations {
        getattr: Some(getattr::<F>),
        readlink: Some(readlink::<F>),
        mknod: Some(mknod::<F>),
        mkdir: Some(mkdir::<F>),
        unlink: Some(unlink::<F>),
        rmdir: Some(rmdir::<F>),
        symlink: Some(symlink::<F>),
        rename: Some(rename::<F>),
        link: Some(link::<F>),
        chmod: Some(chmod::<F>),
        chown: Some(chown::<F>),
        truncate: Some(truncate::<F>),
        open: Some(open::<F>),
        read: Some(read::<F>),
        write: Some(write::<F>),
        statfs: Some(statfs::<F>),
        flush: Some(flush::<F>),
        release: Some(release::<F>),
        fsync: Some(fsync::<F>),
        opendir: Some(opendir::<F>),
        readdir: Some(readdir::<F>),
        releasedir: Some(releasedir::<F>),
        fsyncdir: Some(fsyncdir::<F>),
        init: Some(init::<F>),
        destroy: Some(destroy::<F>),
        access: Some(access::<F>),
        create: Some(create::<F>),
        utimens: Some(utimens::<F>),
        ioctl: Some(ioctl::<F>),
        fallocate: Some(fallocate::<F>),
        ..Default::default()
    }
}
