//! Turns native libfuse callbacks into [`FuseOperations`] calls.
//!
//! Every entry point takes the raw arguments libfuse hands over, wraps them
//! in views, runs the operation under `catch_unwind` and returns the
//! negated-errno convention libfuse expects. Nothing an implementation does
//! can unwind across the C boundary.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};

use libc::{c_char, c_int, c_uint, c_void, dev_t, gid_t, mode_t, size_t, uid_t};
use tracing::{debug, error, info, warn};

use crate::dirent::{dot_entries, DirEntries};
use crate::error::{panic_message, FsResult};
use crate::file_info::FileInfo;
use crate::flags::{AccessMode, AllocateMode, IoctlFlags, PosixFileMode, ReadDirFlags};
use crate::handle::HandleTable;
use crate::memory::{NativeMemory, NativePath, ReadOnlyNativeMemory};
use crate::native::abi::{fuse_file_info, fuse_fill_dir_t, off_t, FuseConnInfo};
use crate::operations::{FuseOperations, IoctlRequest};
use crate::platform::Platform;
use crate::result::PosixResult;
use crate::time::TimeSpec;

/// Large enough for the native `struct stat` of every supported layout.
const STAT_SCRATCH_SIZE: usize = 256;

#[repr(C, align(8))]
struct StatScratch([u8; STAT_SCRATCH_SIZE]);

/// Routes native callbacks to a filesystem and owns the handle table of its
/// open files and directories.
pub struct Dispatcher<F: FuseOperations> {
    fs: F,
    platform: Platform,
    handles: HandleTable<F::Context>,
    disposed: AtomicBool,
}

fn status(result: Result<(), PosixResult>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => e.negated(),
    }
}

fn transferred(op: &'static str, count: usize, capacity: usize) -> c_int {
    if count > capacity {
        error!(
            "{}: reported {} bytes for a {}-byte buffer",
            op, count, capacity
        );
        return PosixResult::EIO.negated();
    }
    c_int::try_from(count).unwrap_or_else(|_| PosixResult::EOVERFLOW.negated())
}

fn optional_id(value: u32) -> Option<u32> {
    (value != u32::MAX).then_some(value)
}

impl<F: FuseOperations> Dispatcher<F> {
    pub fn new(fs: F, platform: Platform) -> Self {
        Dispatcher {
            fs,
            platform,
            handles: HandleTable::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn handles(&self) -> &HandleTable<F::Context> {
        &self.handles
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Runs the filesystem's `dispose` exactly once. Returns false when it
    /// already ran. Failures are logged.
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        info!("disposing filesystem");
        match catch_unwind(AssertUnwindSafe(|| self.fs.dispose())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("dispose failed: {}", e),
            Err(payload) => error!("dispose panicked: {}", panic_message(&*payload)),
        }
        true
    }

    /// Runs one operation, logging failures and converting them to a code.
    fn complete<T>(
        &self,
        op: &'static str,
        path: &NativePath<'_>,
        f: impl FnOnce() -> FsResult<T>,
    ) -> Result<T, PosixResult> {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let code = e.to_posix();
                if e.is_expected() {
                    debug!("{} failed: path={}, error={}", op, path, e);
                } else {
                    error!("{} failed: path={}, error={}", op, path, e);
                }
                Err(code)
            }
            Err(payload) => {
                error!(
                    "{} panicked: path={}, {}",
                    op,
                    path,
                    panic_message(&*payload)
                );
                Err(PosixResult::EIO)
            }
        }
    }

    /// Borrows the native file info, if libfuse passed one.
    unsafe fn file_info<'a>(&'a self, fi: *mut fuse_file_info) -> Option<FileInfo<'a, F::Context>> {
        unsafe { fi.as_mut() }.map(|raw| FileInfo::new(raw, &self.handles))
    }

    // ====== Metadata ======

    /// # Safety
    ///
    /// `path` must be a valid C string, `stat` must be null or point to a
    /// native `struct stat`, `fi` must be null or valid.
    pub unsafe fn getattr(&self, path: *const c_char, stat: *mut c_void, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("getattr: path={}", path);
        let info = unsafe { self.file_info(fi) };
        status(self.complete("getattr", &path, || {
            let attr = self.fs.get_attr(&path, info.as_ref())?;
            if stat.is_null() {
                return Err(PosixResult::EIO.into());
            }
            let dst = unsafe { slice::from_raw_parts_mut(stat.cast::<u8>(), self.platform.stat_size()) };
            self.platform.encode_stat(&attr, dst)?;
            Ok(())
        }))
    }

    /// # Safety
    ///
    /// `buf` must be null or writable for `size` bytes.
    pub unsafe fn readlink(&self, path: *const c_char, buf: *mut c_char, size: size_t) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("readlink: path={}", path);
        let mut target = unsafe { NativeMemory::from_raw(buf.cast(), size) };
        status(self.complete("readlink", &path, || self.fs.read_link(&path, &mut target)))
    }

    /// # Safety
    ///
    /// `path` must be a valid C string; `fi` must be null or valid.
    pub unsafe fn chmod(&self, path: *const c_char, mode: mode_t, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        let mode = PosixFileMode::from_native(u32::from(mode));
        debug!("chmod: path={}, mode={:o}", path, mode.bits());
        let info = unsafe { self.file_info(fi) };
        status(self.complete("chmod", &path, || self.fs.ch_mod(&path, mode, info.as_ref())))
    }

    /// `(uid_t)-1` and `(gid_t)-1` leave the id unchanged.
    ///
    /// # Safety
    ///
    /// `path` must be a valid C string; `fi` must be null or valid.
    pub unsafe fn chown(&self, path: *const c_char, uid: uid_t, gid: gid_t, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("chown: path={}, uid={}, gid={}", path, uid, gid);
        let info = unsafe { self.file_info(fi) };
        status(self.complete("chown", &path, || {
            self.fs
                .ch_own(&path, optional_id(uid), optional_id(gid), info.as_ref())
        }))
    }

    /// # Safety
    ///
    /// `path` must be a valid C string; `fi` must be null or valid.
    pub unsafe fn truncate(&self, path: *const c_char, size: off_t, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("truncate: path={}, size={}", path, size);
        let info = unsafe { self.file_info(fi) };
        status(self.complete("truncate", &path, || self.fs.truncate(&path, size, info.as_ref())))
    }

    /// A null `ts` sets both times to now.
    ///
    /// # Safety
    ///
    /// `ts` must be null or point to two native `struct timespec`.
    pub unsafe fn utimens(&self, path: *const c_char, ts: *const c_void, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("utimens: path={}", path);
        let info = unsafe { self.file_info(fi) };
        status(self.complete("utimens", &path, || {
            let (atime, mtime) = if ts.is_null() {
                (TimeSpec::NOW, TimeSpec::NOW)
            } else {
                let stride = self.platform.timespec_size();
                let raw = unsafe { slice::from_raw_parts(ts.cast::<u8>(), stride * 2) };
                (
                    self.platform.decode_timespec(&raw[..stride])?,
                    self.platform.decode_timespec(&raw[stride..])?,
                )
            };
            self.fs.utime(&path, atime, mtime, info.as_ref())
        }))
    }

    /// # Safety
    ///
    /// `path` must be a valid C string.
    pub unsafe fn access(&self, path: *const c_char, mask: c_int) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        let mask = AccessMode::from_bits_retain(mask);
        debug!("access: path={}, mask={:?}", path, mask);
        status(self.complete("access", &path, || self.fs.access(&path, mask)))
    }

    /// # Safety
    ///
    /// `stat` must be null or point to a native `struct statvfs`.
    pub unsafe fn statfs(&self, path: *const c_char, stat: *mut c_void) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("statfs: path={}", path);
        status(self.complete("statfs", &path, || {
            let vfs = self.fs.stat_fs(&path)?;
            if stat.is_null() {
                return Err(PosixResult::EIO.into());
            }
            let dst = unsafe { slice::from_raw_parts_mut(stat.cast::<u8>(), self.platform.statvfs_size()) };
            self.platform.encode_statvfs(&vfs, dst)?;
            Ok(())
        }))
    }

    // ====== Namespace ======

    /// # Safety
    ///
    /// `path` must be a valid C string.
    pub unsafe fn mknod(&self, path: *const c_char, mode: mode_t, rdev: dev_t) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        let mode = PosixFileMode::from_native(u32::from(mode));
        debug!("mknod: path={}, mode={:o}", path, mode.bits());
        #[allow(clippy::useless_conversion)]
        let rdev = u64::from(rdev);
        status(self.complete("mknod", &path, || self.fs.mk_nod(&path, mode, rdev)))
    }

    /// # Safety
    ///
    /// `path` must be a valid C string.
    pub unsafe fn mkdir(&self, path: *const c_char, mode: mode_t) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        let mode = PosixFileMode::from_native(u32::from(mode));
        debug!("mkdir: path={}, mode={:o}", path, mode.bits());
        status(self.complete("mkdir", &path, || self.fs.mk_dir(&path, mode)))
    }

    /// # Safety
    ///
    /// `path` must be a valid C string.
    pub unsafe fn unlink(&self, path: *const c_char) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("unlink: path={}", path);
        status(self.complete("unlink", &path, || self.fs.unlink(&path)))
    }

    /// # Safety
    ///
    /// `path` must be a valid C string.
    pub unsafe fn rmdir(&self, path: *const c_char) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("rmdir: path={}", path);
        status(self.complete("rmdir", &path, || self.fs.rm_dir(&path)))
    }

    /// # Safety
    ///
    /// Both arguments must be valid C strings.
    pub unsafe fn symlink(&self, target: *const c_char, link: *const c_char) -> c_int {
        let target = unsafe { NativePath::from_ptr(target) };
        let link = unsafe { NativePath::from_ptr(link) };
        debug!("symlink: target={}, link={}", target, link);
        status(self.complete("symlink", &link, || self.fs.sym_link(&target, &link)))
    }

    /// # Safety
    ///
    /// Both paths must be valid C strings.
    pub unsafe fn rename(&self, from: *const c_char, to: *const c_char, flags: c_uint) -> c_int {
        let from = unsafe { NativePath::from_ptr(from) };
        let to = unsafe { NativePath::from_ptr(to) };
        debug!("rename: from={}, to={}, flags={}", from, to, flags);
        status(self.complete("rename", &from, || self.fs.rename(&from, &to, flags)))
    }

    /// # Safety
    ///
    /// Both paths must be valid C strings.
    pub unsafe fn link(&self, from: *const c_char, to: *const c_char) -> c_int {
        let from = unsafe { NativePath::from_ptr(from) };
        let to = unsafe { NativePath::from_ptr(to) };
        debug!("link: from={}, to={}", from, to);
        status(self.complete("link", &from, || self.fs.link(&from, &to)))
    }

    // ====== Files ======

    /// A context left behind by a failed open is dropped.
    ///
    /// # Safety
    ///
    /// `path` must be a valid C string; `fi` must be null or valid.
    pub unsafe fn open(&self, path: *const c_char, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        debug!("open: path={}, flags={:#o}", path, raw.flags);
        let mut info = FileInfo::new(raw, &self.handles);
        let result = self.complete("open", &path, || self.fs.open(&path, &mut info));
        if result.is_err() {
            info.clear_context();
        }
        status(result)
    }

    /// # Safety
    ///
    /// `path` must be a valid C string; `fi` must be null or valid.
    pub unsafe fn create(&self, path: *const c_char, mode: mode_t, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        let mode = PosixFileMode::from_native(u32::from(mode));
        debug!("create: path={}, mode={:o}", path, mode.bits());
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        let mut info = FileInfo::new(raw, &self.handles);
        let result = self.complete("create", &path, || self.fs.create(&path, mode, &mut info));
        if result.is_err() {
            info.clear_context();
        }
        status(result)
    }

    /// Returns the number of bytes read.
    ///
    /// # Safety
    ///
    /// `buf` must be null or writable for `size` bytes.
    pub unsafe fn read(
        &self,
        path: *const c_char,
        buf: *mut c_char,
        size: size_t,
        offset: off_t,
        fi: *mut fuse_file_info,
    ) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("read: path={}, offset={}, size={}", path, offset, size);
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        let info = FileInfo::new(raw, &self.handles);
        let mut memory = unsafe { NativeMemory::from_raw(buf.cast(), size) };
        let capacity = memory.len();
        match self.complete("read", &path, || self.fs.read(&path, &mut memory, offset, &info)) {
            Ok(count) => transferred("read", count, capacity),
            Err(e) => e.negated(),
        }
    }

    /// Returns the number of bytes written.
    ///
    /// # Safety
    ///
    /// `buf` must be null or readable for `size` bytes.
    pub unsafe fn write(
        &self,
        path: *const c_char,
        buf: *const c_char,
        size: size_t,
        offset: off_t,
        fi: *mut fuse_file_info,
    ) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("write: path={}, offset={}, size={}", path, offset, size);
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        let info = FileInfo::new(raw, &self.handles);
        let memory = unsafe { ReadOnlyNativeMemory::from_raw(buf.cast(), size) };
        match self.complete("write", &path, || self.fs.write(&path, &memory, offset, &info)) {
            Ok(count) => transferred("write", count, memory.len()),
            Err(e) => e.negated(),
        }
    }

    /// # Safety
    ///
    /// `path` must be a valid C string; `fi` must be null or valid.
    pub unsafe fn flush(&self, path: *const c_char, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("flush: path={}", path);
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        let info = FileInfo::new(raw, &self.handles);
        status(self.complete("flush", &path, || self.fs.flush(&path, &info)))
    }

    /// The handle's context is dropped whatever the operation returns.
    ///
    /// # Safety
    ///
    /// `path` must be a valid C string; `fi` must be null or valid.
    pub unsafe fn release(&self, path: *const c_char, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("release: path={}", path);
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        let mut info = FileInfo::new(raw, &self.handles);
        let result = self.complete("release", &path, || self.fs.release(&path, &mut info));
        info.clear_context();
        status(result)
    }

    /// # Safety
    ///
    /// `path` must be a valid C string; `fi` must be null or valid.
    pub unsafe fn fsync(&self, path: *const c_char, datasync: c_int, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("fsync: path={}, datasync={}", path, datasync);
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        let info = FileInfo::new(raw, &self.handles);
        status(self.complete("fsync", &path, || self.fs.fsync(&path, datasync != 0, &info)))
    }

    /// # Safety
    ///
    /// `arg` and `data` are passed through untouched; `fi` must be null or
    /// valid.
    pub unsafe fn ioctl(
        &self,
        path: *const c_char,
        cmd: c_uint,
        arg: *mut c_void,
        fi: *mut fuse_file_info,
        flags: c_uint,
        data: *mut c_void,
    ) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("ioctl: path={}, cmd={:#x}", path, cmd);
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        let info = FileInfo::new(raw, &self.handles);
        let request = IoctlRequest {
            cmd,
            arg,
            flags: IoctlFlags::from_bits_retain(flags),
            data,
        };
        status(self.complete("ioctl", &path, || self.fs.ioctl(&path, request, &info)))
    }

    /// # Safety
    ///
    /// `path` must be a valid C string; `fi` must be null or valid.
    pub unsafe fn fallocate(
        &self,
        path: *const c_char,
        mode: c_int,
        offset: off_t,
        length: off_t,
        fi: *mut fuse_file_info,
    ) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("fallocate: path={}, offset={}, length={}", path, offset, length);
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        let info = FileInfo::new(raw, &self.handles);
        let mode = AllocateMode::from_bits_retain(mode);
        status(self.complete("fallocate", &path, || {
            self.fs.fallocate(&path, mode, offset, length, &info)
        }))
    }

    // ====== Directories ======

    /// # Safety
    ///
    /// `path` must be a valid C string; `fi` must be null or valid.
    pub unsafe fn opendir(&self, path: *const c_char, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("opendir: path={}", path);
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        let mut info = FileInfo::new(raw, &self.handles);
        let result = self.complete("opendir", &path, || self.fs.open_dir(&path, &mut info));
        if result.is_err() {
            info.clear_context();
        }
        status(result)
    }

    /// Streams entries into `filler` until the listing ends or libfuse
    /// reports its buffer full.
    ///
    /// # Safety
    ///
    /// `buf` and `filler` must be the pair libfuse passed in.
    pub unsafe fn readdir(
        &self,
        path: *const c_char,
        buf: *mut c_void,
        filler: Option<fuse_fill_dir_t>,
        offset: off_t,
        fi: *mut fuse_file_info,
        flags: c_int,
    ) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("readdir: path={}, offset={}", path, offset);
        let Some(filler) = filler else {
            error!("readdir: no fill function for path={}", path);
            return PosixResult::EIO.negated();
        };
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        let info = FileInfo::new(raw, &self.handles);
        let flags = ReadDirFlags::from_bits_retain(flags);
        status(self.complete("readdir", &path, || {
            let entries = self.fs.read_dir(&path, offset, flags, &info)?;
            unsafe { self.fill(entries, offset, buf, filler) }
        }))
    }

    unsafe fn fill(
        &self,
        entries: DirEntries<'_>,
        offset: i64,
        buf: *mut c_void,
        filler: fuse_fill_dir_t,
    ) -> FsResult<()> {
        let mut entries = entries.peekable();
        let needs_dots = offset == 0 && !entries.peek().is_some_and(|entry| entry.is_dot());
        let head = needs_dots.then(dot_entries).into_iter().flatten();

        let mut stat = StatScratch([0; STAT_SCRATCH_SIZE]);
        let mut name: Vec<u8> = Vec::new();
        for entry in head.chain(entries) {
            if !entry.has_valid_name() {
                warn!("readdir: skipping entry with invalid name {:?}", entry.name);
                continue;
            }
            name.clear();
            name.extend_from_slice(entry.name_bytes());
            name.push(0);
            self.platform.encode_stat(&entry.stat, &mut stat.0)?;
            let full = unsafe {
                filler(
                    buf,
                    name.as_ptr().cast(),
                    stat.0.as_ptr().cast(),
                    entry.offset,
                    entry.flags.bits(),
                )
            };
            if full != 0 {
                break;
            }
        }
        Ok(())
    }

    /// # Safety
    ///
    /// `path` must be a valid C string; `fi` must be null or valid.
    pub unsafe fn releasedir(&self, path: *const c_char, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("releasedir: path={}", path);
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        let mut info = FileInfo::new(raw, &self.handles);
        let result = self.complete("releasedir", &path, || self.fs.release_dir(&path, &mut info));
        info.clear_context();
        status(result)
    }

    /// # Safety
    ///
    /// `path` must be a valid C string; `fi` must be null or valid.
    pub unsafe fn fsyncdir(&self, path: *const c_char, datasync: c_int, fi: *mut fuse_file_info) -> c_int {
        let path = unsafe { NativePath::from_ptr(path) };
        debug!("fsyncdir: path={}", path);
        let mut scratch = fuse_file_info::default();
        let raw = unsafe { fi.as_mut() }.unwrap_or(&mut scratch);
        let info = FileInfo::new(raw, &self.handles);
        status(self.complete("fsyncdir", &path, || self.fs.fsync_dir(&path, datasync != 0, &info)))
    }

    // ====== Lifecycle ======

    /// # Safety
    ///
    /// `conn` must be null or point to a valid `fuse_conn_info`.
    pub unsafe fn init(&self, conn: *mut FuseConnInfo) {
        let mut fallback = FuseConnInfo::default();
        let conn = unsafe { conn.as_mut() }.unwrap_or(&mut fallback);
        info!(
            "init: protocol {}.{}, max_write={}",
            conn.proto_major, conn.proto_minor, conn.max_write
        );
        let _ = self.complete("init", &NativePath::default(), || self.fs.init(conn));
    }

    /// libfuse's `destroy`. Same as [`Dispatcher::dispose`].
    pub fn destroy(&self) {
        self.dispose();
    }
}
