//! Per-file contexts seen from a filesystem written outside the crate.

use std::ffi::CString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fuseshim_core::{
    fuse_file_info, DirEntries, Dispatcher, FileInfo, FileStat, FsResult, FuseOperations,
    NativeMemory, NativePath, Platform, PosixResult, ReadDirFlags,
};

/// Context that counts how often it is dropped.
struct Tracked {
    label: String,
    drops: Arc<AtomicUsize>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

struct Labelled {
    drops: Arc<AtomicUsize>,
}

impl FuseOperations for Labelled {
    type Context = Tracked;

    fn get_attr(&self, _path: &NativePath<'_>, _info: Option<&FileInfo<'_, Tracked>>) -> FsResult<FileStat> {
        Ok(FileStat::regular(0o644, 0))
    }

    fn open(&self, path: &NativePath<'_>, info: &mut FileInfo<'_, Tracked>) -> FsResult<()> {
        info.set_context(Tracked {
            label: path.to_str().into_owned(),
            drops: Arc::clone(&self.drops),
        });
        Ok(())
    }

    fn read(
        &self,
        _path: &NativePath<'_>,
        buf: &mut NativeMemory<'_>,
        _offset: i64,
        info: &FileInfo<'_, Tracked>,
    ) -> FsResult<usize> {
        let context = info.context().ok_or(PosixResult::EBADF)?;
        Ok(buf.copy_from(context.label.as_bytes()))
    }

    fn flush(&self, _path: &NativePath<'_>, _info: &FileInfo<'_, Tracked>) -> FsResult<()> {
        Err(PosixResult::EIO.into())
    }

    fn read_dir<'a>(
        &'a self,
        _path: &NativePath<'_>,
        _offset: i64,
        _flags: ReadDirFlags,
        _info: &FileInfo<'_, Tracked>,
    ) -> FsResult<DirEntries<'a>> {
        Ok(Box::new(std::iter::empty()))
    }
}

#[test]
fn test_context_survives_failed_flush_and_drops_once() {
    let drops = Arc::new(AtomicUsize::new(0));
    let d = Dispatcher::new(Labelled { drops: Arc::clone(&drops) }, Platform::LINUX_X86_64);
    let path = CString::new("/a/b.txt").unwrap();
    let mut fi = fuse_file_info::default();

    assert_eq!(unsafe { d.open(path.as_ptr(), &mut fi) }, 0);
    assert_ne!(fi.fh, 0);

    let mut buf = [0u8; 32];
    let n = unsafe { d.read(path.as_ptr(), buf.as_mut_ptr().cast(), buf.len(), 0, &mut fi) };
    assert_eq!(n, 8);
    assert_eq!(&buf[..8], b"/a/b.txt");

    assert_eq!(unsafe { d.flush(path.as_ptr(), &mut fi) }, PosixResult::EIO.negated());
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    assert_eq!(unsafe { d.release(path.as_ptr(), &mut fi) }, 0);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(d.handles().is_empty());

    // A second release finds nothing to drop.
    assert_eq!(unsafe { d.release(path.as_ptr(), &mut fi) }, 0);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_handles_are_independent() {
    let drops = Arc::new(AtomicUsize::new(0));
    let d = Dispatcher::new(Labelled { drops: Arc::clone(&drops) }, Platform::LINUX_X86_64);
    let first = CString::new("/one").unwrap();
    let second = CString::new("/two").unwrap();
    let mut fi_one = fuse_file_info::default();
    let mut fi_two = fuse_file_info::default();

    assert_eq!(unsafe { d.open(first.as_ptr(), &mut fi_one) }, 0);
    assert_eq!(unsafe { d.open(second.as_ptr(), &mut fi_two) }, 0);
    assert_ne!(fi_one.fh, fi_two.fh);
    assert_eq!(d.handles().len(), 2);

    let mut buf = [0u8; 8];
    let n = unsafe { d.read(second.as_ptr(), buf.as_mut_ptr().cast(), buf.len(), 0, &mut fi_two) };
    assert_eq!(&buf[..n as usize], b"/two");

    unsafe { d.release(first.as_ptr(), &mut fi_one) };
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(d.handles().len(), 1);
    unsafe { d.release(second.as_ptr(), &mut fi_two) };
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}
