//! A writable filesystem that lives entirely in memory.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::ops::Bound;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use fuseshim_core::{
    AccessMode, DirEntries, FileInfo, FileStat, FsResult, FuseDirEntry, FuseOperations,
    NativeMemory, NativePath, OpenFlags, PosixFileMode, PosixResult, ReadDirFlags,
    ReadOnlyNativeMemory, TimeSpec, VfsStat,
};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::BackendError;

/// Path of the file every new [`MemoryFs`] starts with.
pub const SEED_PATH: &str = "/test.txt";
pub const SEED_CONTENT: &[u8] = b"Hello world!\n";

const BLOCK_SIZE: u64 = 4096;
/// Largest file this filesystem will hold; growing past it is EFBIG.
pub const MAX_FILE_SIZE: usize = 1 << 30;
const RENAME_NOREPLACE: u32 = 1;
const RENAME_EXCHANGE: u32 = 2;

#[derive(Debug, Clone)]
enum Content {
    File(Vec<u8>),
    Directory,
    Symlink(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Node {
    ino: u64,
    permissions: u16,
    uid: u32,
    gid: u32,
    content: Content,
    atime: TimeSpec,
    mtime: TimeSpec,
    ctime: TimeSpec,
    birthtime: TimeSpec,
}

impl Node {
    fn mode(&self) -> PosixFileMode {
        match self.content {
            Content::File(_) => PosixFileMode::regular(self.permissions),
            Content::Directory => PosixFileMode::dir(self.permissions),
            Content::Symlink(_) => PosixFileMode::symlink(),
        }
    }

    fn size(&self) -> i64 {
        match &self.content {
            Content::File(data) | Content::Symlink(data) => data.len() as i64,
            Content::Directory => BLOCK_SIZE as i64,
        }
    }

    fn stat(&self) -> FileStat {
        let size = self.size();
        FileStat {
            ino: self.ino,
            mode: self.mode(),
            nlink: if self.is_dir() { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            size,
            blksize: BLOCK_SIZE as i64,
            blocks: (size + 511) / 512,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            birthtime: self.birthtime,
            ..Default::default()
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.content, Content::Directory)
    }

    fn touch(&mut self) {
        let now = TimeSpec::current();
        self.mtime = now;
        self.ctime = now;
    }
}

/// In-memory filesystem of files, directories and symlinks keyed by path.
pub struct MemoryFs {
    nodes: RwLock<BTreeMap<PathBuf, Node>>,
    next_ino: AtomicU64,
    read_only: bool,
    uid: u32,
    gid: u32,
}

/// Resizes file content without letting an oversized request abort the process.
fn resize(data: &mut Vec<u8>, len: usize) -> FsResult<()> {
    if len > MAX_FILE_SIZE {
        return Err(PosixResult::EFBIG.into());
    }
    if let Some(extra) = len.checked_sub(data.len()) {
        data.try_reserve_exact(extra).map_err(|_| PosixResult::ENOMEM)?;
    }
    data.resize(len, 0);
    Ok(())
}

fn key(path: &NativePath<'_>) -> PathBuf {
    let bytes = path.as_bytes();
    let trimmed = match bytes {
        [] | b"/" => return PathBuf::from("/"),
        [rest @ .., b'/'] => rest,
        _ => bytes,
    };
    if trimmed.first() == Some(&b'/') {
        PathBuf::from(OsStr::from_bytes(trimmed))
    } else {
        Path::new("/").join(OsStr::from_bytes(trimmed))
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

impl MemoryFs {
    /// A filesystem holding only `/test.txt`.
    pub fn new() -> Self {
        let fs = Self::empty();
        {
            let mut nodes = fs.nodes.write();
            let node = fs.node(Content::File(SEED_CONTENT.to_vec()), 0o644);
            nodes.insert(PathBuf::from(SEED_PATH), node);
        }
        fs
    }

    /// A filesystem with an empty root directory.
    pub fn empty() -> Self {
        let fs = MemoryFs {
            nodes: RwLock::new(BTreeMap::new()),
            next_ino: AtomicU64::new(1),
            read_only: false,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        };
        let root = fs.node(Content::Directory, 0o755);
        fs.nodes.write().insert(PathBuf::from("/"), root);
        fs
    }

    /// Rejects every mutation with `EROFS` when set.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn node(&self, content: Content, permissions: u16) -> Node {
        let now = TimeSpec::current();
        Node {
            ino: self.next_ino.fetch_add(1, Ordering::Relaxed),
            permissions: permissions & PosixFileMode::PERMISSION_MASK,
            uid: self.uid,
            gid: self.gid,
            content,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
        }
    }

    fn check_writable(&self, path: &Path) -> Result<(), BackendError> {
        if self.read_only {
            return Err(BackendError::ReadOnly(display(path)));
        }
        Ok(())
    }

    /// Adds a new entry under an existing directory.
    fn insert(&self, path: &Path, content: Content, permissions: u16) -> FsResult<()> {
        self.check_writable(path)?;
        let parent = path
            .parent()
            .ok_or_else(|| BackendError::AlreadyExists(display(path)))?;
        let mut nodes = self.nodes.write();
        match nodes.get(parent) {
            None => return Err(BackendError::NotFound(display(parent)).into()),
            Some(node) if !node.is_dir() => {
                return Err(BackendError::NotADirectory(display(parent)).into())
            }
            Some(_) => {}
        }
        if nodes.contains_key(path) {
            return Err(BackendError::AlreadyExists(display(path)).into());
        }
        let node = self.node(content, permissions);
        nodes.insert(path.to_path_buf(), node);
        if let Some(parent) = nodes.get_mut(parent) {
            parent.touch();
        }
        Ok(())
    }

    fn with_node<T>(&self, path: &Path, f: impl FnOnce(&Node) -> FsResult<T>) -> FsResult<T> {
        let nodes = self.nodes.read();
        let node = nodes
            .get(path)
            .ok_or_else(|| BackendError::NotFound(display(path)))?;
        f(node)
    }

    fn with_node_mut<T>(&self, path: &Path, f: impl FnOnce(&mut Node) -> FsResult<T>) -> FsResult<T> {
        self.check_writable(path)?;
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(path)
            .ok_or_else(|| BackendError::NotFound(display(path)))?;
        f(node)
    }

    fn has_children(nodes: &BTreeMap<PathBuf, Node>, dir: &Path) -> bool {
        nodes
            .range::<Path, _>((Bound::Excluded(dir), Bound::Unbounded))
            .next()
            .is_some_and(|(child, _)| child.starts_with(dir))
    }

    fn remove(&self, path: &Path, want_dir: bool) -> FsResult<()> {
        self.check_writable(path)?;
        let mut nodes = self.nodes.write();
        let node = nodes
            .get(path)
            .ok_or_else(|| BackendError::NotFound(display(path)))?;
        match (want_dir, node.is_dir()) {
            (true, false) => return Err(BackendError::NotADirectory(display(path)).into()),
            (false, true) => return Err(BackendError::IsADirectory(display(path)).into()),
            (true, true) if path == Path::new("/") => return Err(PosixResult::EBUSY.into()),
            (true, true) if Self::has_children(&nodes, path) => {
                return Err(BackendError::NotEmpty(display(path)).into())
            }
            _ => {}
        }
        nodes.remove(path);
        if let Some(parent) = path.parent().and_then(|p| nodes.get_mut(p)) {
            parent.touch();
        }
        Ok(())
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FuseOperations for MemoryFs {
    type Context = ();

    fn get_attr(&self, path: &NativePath<'_>, _info: Option<&FileInfo<'_, ()>>) -> FsResult<FileStat> {
        self.with_node(&key(path), |node| Ok(node.stat()))
    }

    fn read_link(&self, path: &NativePath<'_>, target: &mut NativeMemory<'_>) -> FsResult<()> {
        self.with_node(&key(path), |node| match &node.content {
            Content::Symlink(link) => {
                target.write_c_str(link);
                Ok(())
            }
            _ => Err(PosixResult::EINVAL.into()),
        })
    }

    fn mk_nod(&self, path: &NativePath<'_>, mode: PosixFileMode, _rdev: u64) -> FsResult<()> {
        let file_type = mode.file_type();
        if !file_type.is_empty() && !mode.is_regular() {
            return Err(PosixResult::EPERM.into());
        }
        self.insert(&key(path), Content::File(Vec::new()), mode.permissions().bits())
    }

    fn mk_dir(&self, path: &NativePath<'_>, mode: PosixFileMode) -> FsResult<()> {
        debug!("memory mkdir: {}", path);
        self.insert(&key(path), Content::Directory, mode.permissions().bits())
    }

    fn unlink(&self, path: &NativePath<'_>) -> FsResult<()> {
        self.remove(&key(path), false)
    }

    fn rm_dir(&self, path: &NativePath<'_>) -> FsResult<()> {
        self.remove(&key(path), true)
    }

    fn sym_link(&self, target: &NativePath<'_>, link: &NativePath<'_>) -> FsResult<()> {
        self.insert(&key(link), Content::Symlink(target.as_bytes().to_vec()), 0o777)
    }

    fn rename(&self, from: &NativePath<'_>, to: &NativePath<'_>, flags: u32) -> FsResult<()> {
        let (from, to) = (key(from), key(to));
        self.check_writable(&from)?;
        if flags & RENAME_EXCHANGE != 0 {
            return Err(PosixResult::EINVAL.into());
        }
        if from == to {
            return Ok(());
        }
        if to.starts_with(&from) || from == Path::new("/") {
            return Err(PosixResult::EINVAL.into());
        }

        let mut nodes = self.nodes.write();
        let source_is_dir = nodes
            .get(&from)
            .ok_or_else(|| BackendError::NotFound(display(&from)))?
            .is_dir();
        let parent = to.parent().unwrap_or(Path::new("/"));
        match nodes.get(parent) {
            None => return Err(BackendError::NotFound(display(parent)).into()),
            Some(node) if !node.is_dir() => {
                return Err(BackendError::NotADirectory(display(parent)).into())
            }
            Some(_) => {}
        }
        if let Some(existing) = nodes.get(&to) {
            if flags & RENAME_NOREPLACE != 0 {
                return Err(BackendError::AlreadyExists(display(&to)).into());
            }
            match (source_is_dir, existing.is_dir()) {
                (false, true) => return Err(BackendError::IsADirectory(display(&to)).into()),
                (true, false) => return Err(BackendError::NotADirectory(display(&to)).into()),
                (true, true) if Self::has_children(&nodes, &to) => {
                    return Err(BackendError::NotEmpty(display(&to)).into())
                }
                _ => {}
            }
            nodes.remove(&to);
        }

        let moved: Vec<PathBuf> = nodes
            .range::<Path, _>((Bound::Included(from.as_path()), Bound::Unbounded))
            .map(|(path, _)| path)
            .take_while(|path| path.starts_with(&from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(mut node) = nodes.remove(&old) {
                let suffix = old.strip_prefix(&from).unwrap_or(Path::new(""));
                let new = if suffix.as_os_str().is_empty() {
                    to.clone()
                } else {
                    to.join(suffix)
                };
                if old == from {
                    node.ctime = TimeSpec::current();
                }
                nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn ch_mod(&self, path: &NativePath<'_>, mode: PosixFileMode, _info: Option<&FileInfo<'_, ()>>) -> FsResult<()> {
        self.with_node_mut(&key(path), |node| {
            node.permissions = mode.permissions().bits();
            node.ctime = TimeSpec::current();
            Ok(())
        })
    }

    fn ch_own(
        &self,
        path: &NativePath<'_>,
        uid: Option<u32>,
        gid: Option<u32>,
        _info: Option<&FileInfo<'_, ()>>,
    ) -> FsResult<()> {
        self.with_node_mut(&key(path), |node| {
            if let Some(uid) = uid {
                node.uid = uid;
            }
            if let Some(gid) = gid {
                node.gid = gid;
            }
            node.ctime = TimeSpec::current();
            Ok(())
        })
    }

    fn truncate(&self, path: &NativePath<'_>, size: i64, _info: Option<&FileInfo<'_, ()>>) -> FsResult<()> {
        let size = usize::try_from(size).map_err(|_| PosixResult::EINVAL)?;
        let path = key(path);
        self.with_node_mut(&path, |node| match &mut node.content {
            Content::File(data) => {
                resize(data, size)?;
                node.touch();
                Ok(())
            }
            Content::Directory => Err(BackendError::IsADirectory(display(&path)).into()),
            Content::Symlink(_) => Err(PosixResult::EINVAL.into()),
        })
    }

    fn open(&self, path: &NativePath<'_>, info: &mut FileInfo<'_, ()>) -> FsResult<()> {
        let path = key(path);
        let flags = info.flags();
        let is_dir = self.with_node(&path, |node| Ok(node.is_dir()))?;
        if flags.is_write_class() {
            self.check_writable(&path)?;
            if is_dir {
                return Err(BackendError::IsADirectory(display(&path)).into());
            }
        }
        if flags.contains(OpenFlags::TRUNCATE) {
            self.with_node_mut(&path, |node| {
                if let Content::File(data) = &mut node.content {
                    data.clear();
                    node.touch();
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    fn read(
        &self,
        path: &NativePath<'_>,
        buf: &mut NativeMemory<'_>,
        offset: i64,
        _info: &FileInfo<'_, ()>,
    ) -> FsResult<usize> {
        let offset = usize::try_from(offset).map_err(|_| PosixResult::EINVAL)?;
        let path = key(path);
        self.with_node(&path, |node| match &node.content {
            Content::File(data) => Ok(buf.copy_from(data.get(offset..).unwrap_or(&[]))),
            Content::Directory => Err(BackendError::IsADirectory(display(&path)).into()),
            Content::Symlink(_) => Err(PosixResult::EINVAL.into()),
        })
    }

    fn write(
        &self,
        path: &NativePath<'_>,
        buf: &ReadOnlyNativeMemory<'_>,
        offset: i64,
        info: &FileInfo<'_, ()>,
    ) -> FsResult<usize> {
        let offset = usize::try_from(offset).map_err(|_| PosixResult::EINVAL)?;
        let append = info.flags().contains(OpenFlags::APPEND);
        let path = key(path);
        self.with_node_mut(&path, |node| {
            let Content::File(data) = &mut node.content else {
                return Err(BackendError::IsADirectory(display(&path)).into());
            };
            let bytes = buf.as_slice();
            let start = if append { data.len() } else { offset };
            let end = start.checked_add(bytes.len()).ok_or(PosixResult::EFBIG)?;
            if data.len() < end {
                resize(data, end)?;
            }
            data[start..end].copy_from_slice(bytes);
            node.touch();
            Ok(bytes.len())
        })
    }

    fn stat_fs(&self, _path: &NativePath<'_>) -> FsResult<VfsStat> {
        let nodes = self.nodes.read();
        let used: u64 = nodes
            .values()
            .map(|node| (node.size() as u64).div_ceil(BLOCK_SIZE))
            .sum();
        let total = used.max(1) * 4;
        Ok(VfsStat {
            bsize: BLOCK_SIZE,
            frsize: BLOCK_SIZE,
            blocks: total,
            bfree: total - used,
            bavail: total - used,
            files: nodes.len() as u64,
            ffree: u32::MAX as u64,
            favail: u32::MAX as u64,
            fsid: 0,
            flag: if self.read_only { libc::ST_RDONLY as u64 } else { 0 },
            namemax: 255,
        })
    }

    fn fsync(&self, _path: &NativePath<'_>, _datasync: bool, _info: &FileInfo<'_, ()>) -> FsResult<()> {
        Ok(())
    }

    fn read_dir<'a>(
        &'a self,
        path: &NativePath<'_>,
        _offset: i64,
        _flags: ReadDirFlags,
        _info: &FileInfo<'_, ()>,
    ) -> FsResult<DirEntries<'a>> {
        let dir = key(path);
        let nodes = self.nodes.read();
        let node = nodes
            .get(&dir)
            .ok_or_else(|| BackendError::NotFound(display(&dir)))?;
        if !node.is_dir() {
            return Err(BackendError::NotADirectory(display(&dir)).into());
        }
        let entries: Vec<FuseDirEntry> = nodes
            .range::<Path, _>((Bound::Excluded(dir.as_path()), Bound::Unbounded))
            .take_while(|(child, _)| child.starts_with(&dir))
            .filter(|(child, _)| child.parent() == Some(dir.as_path()))
            .filter_map(|(child, node)| {
                let name = child.file_name()?.to_os_string();
                Some(FuseDirEntry::new(name, FileStat::type_only(node.mode(), node.ino)))
            })
            .collect();
        Ok(Box::new(entries.into_iter()))
    }

    fn fsync_dir(&self, _path: &NativePath<'_>, _datasync: bool, _info: &FileInfo<'_, ()>) -> FsResult<()> {
        Ok(())
    }

    fn access(&self, path: &NativePath<'_>, mask: AccessMode) -> FsResult<()> {
        let path = key(path);
        if mask.is_write_class() {
            self.check_writable(&path)?;
        }
        self.with_node(&path, |_| Ok(()))
    }

    fn create(&self, path: &NativePath<'_>, mode: PosixFileMode, _info: &mut FileInfo<'_, ()>) -> FsResult<()> {
        debug!("memory create: {}", path);
        self.insert(&key(path), Content::File(Vec::new()), mode.permissions().bits())
    }

    fn utime(
        &self,
        path: &NativePath<'_>,
        atime: TimeSpec,
        mtime: TimeSpec,
        _info: Option<&FileInfo<'_, ()>>,
    ) -> FsResult<()> {
        self.with_node_mut(&key(path), |node| {
            if !atime.is_omit() {
                node.atime = atime.resolve();
            }
            if !mtime.is_omit() {
                node.mtime = mtime.resolve();
            }
            node.ctime = TimeSpec::current();
            Ok(())
        })
    }
}
