//! Passthrough filesystem exposing a directory of the host.

use std::ffi::{CString, OsStr};
use std::fs::{self, File, Metadata, OpenOptions};
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{
    symlink, DirEntryExt, FileExt, FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt,
};
use std::path::{Component, Path, PathBuf};

use fuseshim_core::{
    dot_entries, AccessIntent, AccessMode, DirEntries, FileInfo, FileStat, FsError, FsResult,
    FuseDirEntry, FuseOperations, NativeMemory, NativePath, PosixFileMode, PosixResult,
    ReadDirFlags, ReadOnlyNativeMemory, TimeSpec, VfsStat,
};
use tracing::{debug, warn};

use crate::error::BackendError;

/// Mirrors every operation onto the tree under a base directory.
pub struct MirrorFs {
    root: PathBuf,
    read_only: bool,
}

fn to_c_path(path: &Path) -> FsResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| PosixResult::EINVAL.into())
}

fn check(status: libc::c_int) -> FsResult<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error().into())
    }
}

fn native_time(time: TimeSpec) -> libc::timespec {
    let nsec = if time.is_omit() {
        libc::UTIME_OMIT
    } else if time.is_now() {
        libc::UTIME_NOW
    } else {
        time.nsec as _
    };
    libc::timespec {
        tv_sec: time.sec as _,
        tv_nsec: nsec,
    }
}

fn file_type_mode(file_type: fs::FileType) -> PosixFileMode {
    if file_type.is_dir() {
        PosixFileMode::DIRECTORY
    } else if file_type.is_symlink() {
        PosixFileMode::SYMLINK
    } else if file_type.is_fifo() {
        PosixFileMode::FIFO
    } else if file_type.is_char_device() {
        PosixFileMode::CHARACTER
    } else if file_type.is_block_device() {
        PosixFileMode::BLOCK
    } else if file_type.is_socket() {
        PosixFileMode::SOCKET
    } else {
        PosixFileMode::REGULAR
    }
}

fn to_file_stat(metadata: &Metadata) -> FileStat {
    FileStat {
        dev: metadata.dev(),
        ino: metadata.ino(),
        mode: PosixFileMode::from_native(metadata.mode()),
        nlink: metadata.nlink(),
        uid: metadata.uid(),
        gid: metadata.gid(),
        rdev: metadata.rdev(),
        size: metadata.size() as i64,
        blksize: metadata.blksize() as i64,
        blocks: metadata.blocks() as i64,
        atime: TimeSpec::new(metadata.atime(), metadata.atime_nsec()),
        mtime: TimeSpec::new(metadata.mtime(), metadata.mtime_nsec()),
        ctime: TimeSpec::new(metadata.ctime(), metadata.ctime_nsec()),
        birthtime: metadata
            .created()
            .map(TimeSpec::from)
            .unwrap_or(TimeSpec::EPOCH),
        ..Default::default()
    }
}

impl MirrorFs {
    /// Mirrors `base`, which must be an existing directory.
    pub fn new(base: impl AsRef<Path>) -> Result<Self, BackendError> {
        let root = base.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(BackendError::NotADirectory(root.display().to_string()));
        }
        Ok(MirrorFs {
            root,
            read_only: false,
        })
    }

    /// Rejects every mutation with `EROFS` when set.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a mount path onto the host, refusing anything that escapes the root.
    fn resolve_path(&self, path: &NativePath<'_>) -> Result<PathBuf, BackendError> {
        let trimmed = path.as_os_str().as_bytes();
        let trimmed = OsStr::from_bytes(trimmed.strip_prefix(b"/").unwrap_or(trimmed));
        let rel = Path::new(trimmed);

        for component in rel.components() {
            match component {
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(BackendError::PathTraversal(path.to_string()));
                }
                _ => {}
            }
        }

        if rel.as_os_str().is_empty() {
            return Ok(self.root.clone());
        }

        let full_path = self.root.join(rel);

        // The last component may be a symlink pointing anywhere; only its
        // parent has to resolve under the root.
        let mut ancestor = full_path.parent().unwrap_or(&self.root);
        while !ancestor.exists() {
            match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => break,
            }
        }

        let canonical_ancestor = ancestor.canonicalize()?;
        if !canonical_ancestor.starts_with(&self.root) {
            return Err(BackendError::PathTraversal(path.to_string()));
        }

        Ok(full_path)
    }

    fn writable_path(&self, path: &NativePath<'_>) -> Result<PathBuf, BackendError> {
        if self.read_only {
            return Err(BackendError::ReadOnly(path.to_string()));
        }
        self.resolve_path(path)
    }

    fn file(info: &FileInfo<'_, File>) -> FsResult<std::sync::Arc<File>> {
        info.context().ok_or(FsError::Posix(PosixResult::EBADF))
    }
}

impl FuseOperations for MirrorFs {
    type Context = File;

    fn get_attr(&self, path: &NativePath<'_>, info: Option<&FileInfo<'_, File>>) -> FsResult<FileStat> {
        if let Some(file) = info.and_then(|info| info.context()) {
            return Ok(to_file_stat(&file.metadata()?));
        }
        let full = self.resolve_path(path)?;
        Ok(to_file_stat(&fs::symlink_metadata(full)?))
    }

    fn read_link(&self, path: &NativePath<'_>, target: &mut NativeMemory<'_>) -> FsResult<()> {
        let link = fs::read_link(self.resolve_path(path)?)?;
        target.write_c_str(link.as_os_str().as_bytes());
        Ok(())
    }

    fn mk_nod(&self, path: &NativePath<'_>, mode: PosixFileMode, rdev: u64) -> FsResult<()> {
        let full = self.writable_path(path)?;
        if mode.file_type().is_empty() || mode.is_regular() {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(u32::from(mode.permissions().bits()))
                .open(full)?;
            return Ok(());
        }
        let c_path = to_c_path(&full)?;
        check(unsafe { libc::mknod(c_path.as_ptr(), mode.bits() as libc::mode_t, rdev as libc::dev_t) })
    }

    fn mk_dir(&self, path: &NativePath<'_>, mode: PosixFileMode) -> FsResult<()> {
        let full = self.writable_path(path)?;
        fs::create_dir(&full)?;
        fs::set_permissions(&full, fs::Permissions::from_mode(u32::from(mode.permissions().bits())))?;
        Ok(())
    }

    fn unlink(&self, path: &NativePath<'_>) -> FsResult<()> {
        fs::remove_file(self.writable_path(path)?)?;
        Ok(())
    }

    fn rm_dir(&self, path: &NativePath<'_>) -> FsResult<()> {
        fs::remove_dir(self.writable_path(path)?)?;
        Ok(())
    }

    fn sym_link(&self, target: &NativePath<'_>, link: &NativePath<'_>) -> FsResult<()> {
        symlink(target.as_path(), self.writable_path(link)?)?;
        Ok(())
    }

    fn rename(&self, from: &NativePath<'_>, to: &NativePath<'_>, flags: u32) -> FsResult<()> {
        let from = self.writable_path(from)?;
        let to = self.writable_path(to)?;
        if flags == 0 {
            fs::rename(from, to)?;
            return Ok(());
        }
        #[cfg(target_os = "linux")]
        {
            let (from, to) = (to_c_path(&from)?, to_c_path(&to)?);
            check(unsafe {
                libc::renameat2(libc::AT_FDCWD, from.as_ptr(), libc::AT_FDCWD, to.as_ptr(), flags)
            })
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = (from, to);
            Err(PosixResult::EINVAL.into())
        }
    }

    fn link(&self, from: &NativePath<'_>, to: &NativePath<'_>) -> FsResult<()> {
        fs::hard_link(self.writable_path(from)?, self.writable_path(to)?)?;
        Ok(())
    }

    fn ch_mod(&self, path: &NativePath<'_>, mode: PosixFileMode, _info: Option<&FileInfo<'_, File>>) -> FsResult<()> {
        let full = self.writable_path(path)?;
        fs::set_permissions(full, fs::Permissions::from_mode(u32::from(mode.permissions().bits())))?;
        Ok(())
    }

    fn ch_own(
        &self,
        path: &NativePath<'_>,
        uid: Option<u32>,
        gid: Option<u32>,
        _info: Option<&FileInfo<'_, File>>,
    ) -> FsResult<()> {
        std::os::unix::fs::lchown(self.writable_path(path)?, uid, gid)?;
        Ok(())
    }

    fn truncate(&self, path: &NativePath<'_>, size: i64, info: Option<&FileInfo<'_, File>>) -> FsResult<()> {
        let full = self.writable_path(path)?;
        let size = u64::try_from(size).map_err(|_| PosixResult::EINVAL)?;
        match info.and_then(|info| info.context()) {
            Some(file) => file.set_len(size)?,
            None => OpenOptions::new().write(true).open(full)?.set_len(size)?,
        }
        Ok(())
    }

    fn open(&self, path: &NativePath<'_>, info: &mut FileInfo<'_, File>) -> FsResult<()> {
        let flags = info.flags();
        let full = if flags.is_write_class() {
            self.writable_path(path)?
        } else {
            self.resolve_path(path)?
        };
        let intent = flags.access_intent();
        let file = OpenOptions::new()
            .read(intent != AccessIntent::Write)
            .write(intent != AccessIntent::Read)
            .custom_flags(flags.bits() & !libc::O_ACCMODE)
            .open(full)?;
        debug!("mirror open: {} flags={:?}", path, flags);
        info.set_context(file);
        Ok(())
    }

    fn read(
        &self,
        _path: &NativePath<'_>,
        buf: &mut NativeMemory<'_>,
        offset: i64,
        info: &FileInfo<'_, File>,
    ) -> FsResult<usize> {
        let file = Self::file(info)?;
        let mut offset = u64::try_from(offset).map_err(|_| PosixResult::EINVAL)?;
        let out = buf.as_mut_slice();
        let mut filled = 0;
        while filled < out.len() {
            match file.read_at(&mut out[filled..], offset) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    offset += n as u64;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn write(
        &self,
        path: &NativePath<'_>,
        buf: &ReadOnlyNativeMemory<'_>,
        offset: i64,
        info: &FileInfo<'_, File>,
    ) -> FsResult<usize> {
        if self.read_only {
            return Err(BackendError::ReadOnly(path.to_string()).into());
        }
        let file = Self::file(info)?;
        let offset = u64::try_from(offset).map_err(|_| PosixResult::EINVAL)?;
        file.write_all_at(buf.as_slice(), offset)?;
        Ok(buf.len())
    }

    fn stat_fs(&self, _path: &NativePath<'_>) -> FsResult<VfsStat> {
        let root = to_c_path(&self.root)?;
        let mut raw = MaybeUninit::<libc::statvfs>::zeroed();
        check(unsafe { libc::statvfs(root.as_ptr(), raw.as_mut_ptr()) })?;
        let raw = unsafe { raw.assume_init() };
        let mut flag = raw.f_flag as u64;
        if self.read_only {
            flag |= libc::ST_RDONLY as u64;
        }
        Ok(VfsStat {
            bsize: raw.f_bsize as u64,
            frsize: raw.f_frsize as u64,
            blocks: raw.f_blocks as u64,
            bfree: raw.f_bfree as u64,
            bavail: raw.f_bavail as u64,
            files: raw.f_files as u64,
            ffree: raw.f_ffree as u64,
            favail: raw.f_favail as u64,
            fsid: raw.f_fsid as u64,
            flag,
            namemax: raw.f_namemax as u64,
        })
    }

    fn flush(&self, _path: &NativePath<'_>, _info: &FileInfo<'_, File>) -> FsResult<()> {
        Ok(())
    }

    fn fsync(&self, _path: &NativePath<'_>, datasync: bool, info: &FileInfo<'_, File>) -> FsResult<()> {
        let file = Self::file(info)?;
        if datasync {
            file.sync_data()?;
        } else {
            file.sync_all()?;
        }
        Ok(())
    }

    fn read_dir<'a>(
        &'a self,
        path: &NativePath<'_>,
        _offset: i64,
        _flags: ReadDirFlags,
        _info: &FileInfo<'_, File>,
    ) -> FsResult<DirEntries<'a>> {
        let full = self.resolve_path(path)?;
        let entries = fs::read_dir(&full)?.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("mirror readdir: skipping entry in {}: {}", full.display(), e);
                    return None;
                }
            };
            let mode = entry
                .file_type()
                .map(file_type_mode)
                .unwrap_or(PosixFileMode::REGULAR);
            Some(FuseDirEntry::new(
                entry.file_name(),
                FileStat::type_only(mode, entry.ino()),
            ))
        });
        Ok(Box::new(dot_entries().into_iter().chain(entries)))
    }

    fn fsync_dir(&self, path: &NativePath<'_>, _datasync: bool, _info: &FileInfo<'_, File>) -> FsResult<()> {
        File::open(self.resolve_path(path)?)?.sync_all()?;
        Ok(())
    }

    fn access(&self, path: &NativePath<'_>, mask: AccessMode) -> FsResult<()> {
        if mask.is_write_class() && self.read_only {
            return Err(BackendError::ReadOnly(path.to_string()).into());
        }
        let full = self.resolve_path(path)?;
        fs::symlink_metadata(&full)?;
        if mask.is_empty() {
            return Ok(());
        }
        let c_path = to_c_path(&full)?;
        check(unsafe { libc::access(c_path.as_ptr(), mask.bits()) })
    }

    fn create(&self, path: &NativePath<'_>, mode: PosixFileMode, info: &mut FileInfo<'_, File>) -> FsResult<()> {
        let full = self.writable_path(path)?;
        let flags = info.flags();
        let file = OpenOptions::new()
            .read(flags.access_intent() != AccessIntent::Write)
            .write(true)
            .create_new(true)
            .mode(u32::from(mode.permissions().bits()))
            .open(full)?;
        debug!("mirror create: {}", path);
        info.set_context(file);
        Ok(())
    }

    fn utime(
        &self,
        path: &NativePath<'_>,
        atime: TimeSpec,
        mtime: TimeSpec,
        _info: Option<&FileInfo<'_, File>>,
    ) -> FsResult<()> {
        let c_path = to_c_path(&self.writable_path(path)?)?;
        let times = [native_time(atime), native_time(mtime)];
        check(unsafe {
            libc::utimensat(
                libc::AT_FDCWD,
                c_path.as_ptr(),
                times.as_ptr(),
                libc::AT_SYMLINK_NOFOLLOW,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuseshim_core::{fuse_file_info, HandleTable, OpenFlags};
    use tempfile::TempDir;

    fn fixture() -> (TempDir, MirrorFs) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("foo.txt"), b"0123456789").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let mirror = MirrorFs::new(dir.path()).unwrap();
        (dir, mirror)
    }

    fn code<T: std::fmt::Debug>(result: FsResult<T>) -> PosixResult {
        result.unwrap_err().to_posix()
    }

    // ====== Path Tests ======

    #[test]
    fn test_resolve_path_stays_under_root() {
        let (_dir, mirror) = fixture();
        let full = mirror.resolve_path(&NativePath::from_c_str(c"/foo.txt")).unwrap();
        assert_eq!(full, mirror.root().join("foo.txt"));
        let root = mirror.resolve_path(&NativePath::from_c_str(c"/")).unwrap();
        assert_eq!(root, mirror.root());
    }

    #[test]
    fn test_resolve_path_rejects_traversal() {
        let (_dir, mirror) = fixture();
        let err = mirror.resolve_path(&NativePath::from_c_str(c"/../etc/passwd"));
        assert!(matches!(err, Err(BackendError::PathTraversal(_))));
    }

    #[test]
    fn test_symlinked_directory_outside_root_is_rejected() {
        let outside = TempDir::new().unwrap();
        let (dir, mirror) = fixture();
        symlink(outside.path(), dir.path().join("escape")).unwrap();
        let err = mirror.resolve_path(&NativePath::from_c_str(c"/escape/file"));
        assert!(matches!(err, Err(BackendError::PathTraversal(_))));
        // The link itself is still visible.
        let stat = mirror.get_attr(&NativePath::from_c_str(c"/escape"), None).unwrap();
        assert!(stat.mode.is_symlink());
    }

    #[test]
    fn test_new_requires_directory() {
        let (dir, _mirror) = fixture();
        assert!(matches!(
            MirrorFs::new(dir.path().join("foo.txt")),
            Err(BackendError::NotADirectory(_))
        ));
        assert!(matches!(
            MirrorFs::new(dir.path().join("missing")),
            Err(BackendError::Io(_))
        ));
    }

    // ====== Operation Tests ======

    #[test]
    fn test_getattr_reports_host_metadata() {
        let (_dir, mirror) = fixture();
        let stat = mirror.get_attr(&NativePath::from_c_str(c"/foo.txt"), None).unwrap();
        assert!(stat.mode.is_regular());
        assert_eq!(stat.size, 10);
        let sub = mirror.get_attr(&NativePath::from_c_str(c"/sub"), None).unwrap();
        assert!(sub.mode.is_dir());
        assert_eq!(
            code(mirror.get_attr(&NativePath::from_c_str(c"/missing"), None)),
            PosixResult::ENOENT
        );
    }

    #[test]
    fn test_open_read_uses_context() {
        let (_dir, mirror) = fixture();
        let handles = HandleTable::new();
        let mut raw = fuse_file_info::default();
        let mut info = FileInfo::new(&mut raw, &handles);
        let path = NativePath::from_c_str(c"/foo.txt");
        mirror.open(&path, &mut info).unwrap();

        let mut buf = [0u8; 4];
        let n = mirror
            .read(&path, &mut NativeMemory::from_slice(&mut buf), 6, &info)
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"6789");
        info.clear_context();

        let mut buf = [0u8; 4];
        assert_eq!(
            code(mirror.read(&path, &mut NativeMemory::from_slice(&mut buf), 0, &info)),
            PosixResult::EBADF
        );
    }

    #[test]
    fn test_create_write_and_truncate() {
        let (dir, mirror) = fixture();
        let handles = HandleTable::new();
        let mut raw = fuse_file_info {
            flags: libc::O_WRONLY | libc::O_CREAT,
            ..Default::default()
        };
        let mut info = FileInfo::new(&mut raw, &handles);
        let path = NativePath::from_c_str(c"/new.txt");
        mirror.create(&path, PosixFileMode::regular(0o640), &mut info).unwrap();
        let n = mirror
            .write(&path, &ReadOnlyNativeMemory::from_slice(b"hello world"), 0, &info)
            .unwrap();
        assert_eq!(n, 11);
        mirror.truncate(&path, 5, Some(&info)).unwrap();
        info.clear_context();
        assert_eq!(fs::read(dir.path().join("new.txt")).unwrap(), b"hello");
        let mut raw = fuse_file_info::default();
        let mut again = FileInfo::new(&mut raw, &handles);
        assert_eq!(
            code(mirror.create(&path, PosixFileMode::regular(0o640), &mut again)),
            PosixResult::EEXIST
        );
    }

    #[test]
    fn test_readdir_lists_dots_and_children() {
        let (_dir, mirror) = fixture();
        let handles = HandleTable::new();
        let mut raw = fuse_file_info::default();
        let info = FileInfo::new(&mut raw, &handles);
        let mut entries: Vec<(String, bool)> = mirror
            .read_dir(&NativePath::from_c_str(c"/"), 0, ReadDirFlags::empty(), &info)
            .unwrap()
            .map(|e| (e.name.to_string_lossy().into_owned(), e.stat.mode.is_dir()))
            .collect();
        assert_eq!(entries[0], (".".to_string(), true));
        assert_eq!(entries[1], ("..".to_string(), true));
        entries.sort();
        assert!(entries.contains(&("foo.txt".to_string(), false)));
        assert!(entries.contains(&("sub".to_string(), true)));
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_namespace_operations() {
        let (dir, mirror) = fixture();
        let bar = NativePath::from_c_str(c"/d/bar.txt");
        let ln = NativePath::from_c_str(c"/ln");
        mirror
            .mk_dir(&NativePath::from_c_str(c"/d"), PosixFileMode::dir(0o750))
            .unwrap();
        mirror.rename(&NativePath::from_c_str(c"/foo.txt"), &bar, 0).unwrap();
        assert!(dir.path().join("d/bar.txt").exists());
        mirror
            .sym_link(&NativePath::from_c_str(c"d/bar.txt"), &ln)
            .unwrap();

        let mut buf = [0u8; 64];
        mirror
            .read_link(&ln, &mut NativeMemory::from_slice(&mut buf))
            .unwrap();
        assert_eq!(&buf[..10], b"d/bar.txt\0");

        mirror.unlink(&ln).unwrap();
        mirror.unlink(&bar).unwrap();
        mirror.rm_dir(&NativePath::from_c_str(c"/d")).unwrap();
        assert!(!dir.path().join("d").exists());
    }

    #[test]
    fn test_utime_sets_mtime() {
        let (_dir, mirror) = fixture();
        let path = NativePath::from_c_str(c"/foo.txt");
        let mtime = TimeSpec::new(1_000_000, 0);
        mirror.utime(&path, TimeSpec::OMIT, mtime, None).unwrap();
        assert_eq!(mirror.get_attr(&path, None).unwrap().mtime, mtime);
    }

    #[test]
    fn test_chmod() {
        let (_dir, mirror) = fixture();
        let path = NativePath::from_c_str(c"/foo.txt");
        mirror
            .ch_mod(&path, PosixFileMode::from_bits_retain(0o600), None)
            .unwrap();
        let stat = mirror.get_attr(&path, None).unwrap();
        assert_eq!(stat.mode.permissions().bits(), 0o600);
    }

    #[test]
    fn test_statfs_reports_host_volume() {
        let (_dir, mirror) = fixture();
        let stat = mirror.stat_fs(&NativePath::from_c_str(c"/")).unwrap();
        assert!(stat.bsize > 0);
        assert!(stat.namemax > 0);
    }

    // ====== Read-only Tests ======

    #[test]
    fn test_read_only_mirror() {
        let (dir, mirror) = fixture();
        let mirror = mirror.with_read_only(true);
        assert_eq!(
            code(mirror.unlink(&NativePath::from_c_str(c"/foo.txt"))),
            PosixResult::EROFS
        );
        assert_eq!(
            code(mirror.access(&NativePath::from_c_str(c"/missing"), AccessMode::WRITE)),
            PosixResult::EROFS
        );
        assert_eq!(
            code(mirror.access(&NativePath::from_c_str(c"/missing"), AccessMode::READ)),
            PosixResult::ENOENT
        );

        let handles = HandleTable::new();
        let mut raw = fuse_file_info {
            flags: OpenFlags::READ_WRITE.bits(),
            ..Default::default()
        };
        let mut info = FileInfo::new(&mut raw, &handles);
        assert_eq!(
            code(mirror.open(&NativePath::from_c_str(c"/foo.txt"), &mut info)),
            PosixResult::EROFS
        );
        assert!(dir.path().join("foo.txt").exists());
    }
}
