//! Bit sets exchanged with libfuse and filesystem implementations.

use bitflags::bitflags;

bitflags! {
    /// `st_mode`: file type plus permission bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PosixFileMode: u16 {
        const OTHERS_EXECUTE = 0o001;
        const OTHERS_WRITE = 0o002;
        const OTHERS_READ = 0o004;
        const GROUP_EXECUTE = 0o010;
        const GROUP_WRITE = 0o020;
        const GROUP_READ = 0o040;
        const OWNER_EXECUTE = 0o100;
        const OWNER_WRITE = 0o200;
        const OWNER_READ = 0o400;
        const STICKY = 0o1000;
        const SET_GID = 0o2000;
        const SET_UID = 0o4000;

        const FIFO = 0x1000;
        const CHARACTER = 0x2000;
        const DIRECTORY = 0x4000;
        const BLOCK = 0x6000;
        const REGULAR = 0x8000;
        const SYMLINK = 0xA000;
        const SOCKET = 0xC000;
        const WHITEOUT = 0xE000;
    }
}

impl PosixFileMode {
    pub const TYPE_MASK: u16 = 0xF000;
    pub const PERMISSION_MASK: u16 = 0o7777;

    /// Type bits only.
    pub const fn file_type(self) -> PosixFileMode {
        PosixFileMode::from_bits_retain(self.bits() & Self::TYPE_MASK)
    }

    /// Permission, sticky and set-id bits only.
    pub const fn permissions(self) -> PosixFileMode {
        PosixFileMode::from_bits_retain(self.bits() & Self::PERMISSION_MASK)
    }

    pub fn is_dir(self) -> bool {
        self.file_type() == PosixFileMode::DIRECTORY
    }

    pub fn is_regular(self) -> bool {
        self.file_type() == PosixFileMode::REGULAR
    }

    pub fn is_symlink(self) -> bool {
        self.file_type() == PosixFileMode::SYMLINK
    }

    /// Builds a mode from a native `mode_t`, keeping the low 16 bits.
    pub fn from_native(mode: u32) -> PosixFileMode {
        PosixFileMode::from_bits_retain((mode & 0xFFFF) as u16)
    }

    pub fn dir(permissions: u16) -> PosixFileMode {
        PosixFileMode::DIRECTORY | PosixFileMode::from_bits_retain(permissions & Self::PERMISSION_MASK)
    }

    pub fn regular(permissions: u16) -> PosixFileMode {
        PosixFileMode::REGULAR | PosixFileMode::from_bits_retain(permissions & Self::PERMISSION_MASK)
    }

    pub fn symlink() -> PosixFileMode {
        PosixFileMode::SYMLINK | PosixFileMode::from_bits_retain(0o777)
    }
}

bitflags! {
    /// `open(2)` flags as delivered in `fuse_file_info.flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: i32 {
        const WRITE_ONLY = libc::O_WRONLY;
        const READ_WRITE = libc::O_RDWR;
        const APPEND = libc::O_APPEND;
        const CREATE = libc::O_CREAT;
        const TRUNCATE = libc::O_TRUNC;
        const EXCLUSIVE = libc::O_EXCL;
        const NON_BLOCK = libc::O_NONBLOCK;
        const SYNC = libc::O_SYNC;
        const DIRECTORY = libc::O_DIRECTORY;
        const NO_FOLLOW = libc::O_NOFOLLOW;
        const CLOSE_ON_EXEC = libc::O_CLOEXEC;
    }
}

/// Read/write intent extracted from [`OpenFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    Read,
    Write,
    ReadWrite,
}

impl OpenFlags {
    pub fn access_intent(self) -> AccessIntent {
        match self.bits() & libc::O_ACCMODE {
            libc::O_WRONLY => AccessIntent::Write,
            libc::O_RDWR => AccessIntent::ReadWrite,
            _ => AccessIntent::Read,
        }
    }

    /// True when the open can modify the file or its size.
    pub fn is_write_class(self) -> bool {
        self.access_intent() != AccessIntent::Read
            || self.intersects(OpenFlags::TRUNCATE | OpenFlags::APPEND | OpenFlags::CREATE)
    }
}

bitflags! {
    /// `access(2)` mask. The empty set is `F_OK`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessMode: i32 {
        const EXECUTE = 1;
        const WRITE = 2;
        const READ = 4;
    }
}

impl AccessMode {
    pub const EXISTS: AccessMode = AccessMode::empty();

    pub fn is_write_class(self) -> bool {
        self.contains(AccessMode::WRITE)
    }
}

bitflags! {
    /// Option bits of `fuse_file_info` that an implementation may set from
    /// `open`/`create`/`opendir`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileInfoOptions: u32 {
        const WRITE_PAGE = 0x01;
        const DIRECT_IO = 0x02;
        const KEEP_CACHE = 0x04;
        const FLUSH = 0x08;
        const NON_SEEKABLE = 0x10;
        const FLOCK_RELEASE = 0x20;
        const CACHE_READDIR = 0x40;
        const NO_FLUSH = 0x80;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IoctlFlags: u32 {
        const COMPAT = 1;
        const UNRESTRICTED = 2;
        const RETRY = 4;
        const DIR = 16;
    }
}

bitflags! {
    /// `fallocate(2)` mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AllocateMode: i32 {
        const KEEP_SIZE = 1;
        const PUNCH_HOLE = 2;
    }
}

bitflags! {
    /// Flags libfuse passes to `readdir`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReadDirFlags: i32 {
        /// The kernel asked for a READDIRPLUS listing.
        const PLUS = 1;
    }
}

bitflags! {
    /// Flags handed to the fill callback with each entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FillDirFlags: i32 {
        /// Every stat field is valid, not just the type and inode bits.
        const PLUS = 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_extraction() {
        let mode = PosixFileMode::regular(0o644);
        assert_eq!(mode.file_type(), PosixFileMode::REGULAR);
        assert_eq!(mode.permissions().bits(), 0o644);
        assert!(mode.is_regular());
        assert!(!mode.is_dir());

        let dir = PosixFileMode::dir(0o755);
        assert!(dir.is_dir());
        assert_eq!(dir.bits(), 0o040755);

        // BLOCK shares bits with CHARACTER and DIRECTORY; the type test is exact.
        assert!(!PosixFileMode::BLOCK.is_dir());
        assert_eq!(PosixFileMode::symlink().bits(), 0o120777);
    }

    #[test]
    fn test_from_native_mode() {
        assert_eq!(PosixFileMode::from_native(0o100600), PosixFileMode::regular(0o600));
    }

    #[test]
    fn test_open_flags_intent() {
        assert_eq!(OpenFlags::empty().access_intent(), AccessIntent::Read);
        assert_eq!(OpenFlags::WRITE_ONLY.access_intent(), AccessIntent::Write);
        assert_eq!(OpenFlags::READ_WRITE.access_intent(), AccessIntent::ReadWrite);
        assert!(!OpenFlags::empty().is_write_class());
        assert!(OpenFlags::TRUNCATE.is_write_class());
        assert!(OpenFlags::from_bits_retain(libc::O_WRONLY | libc::O_CREAT).is_write_class());
    }

    #[test]
    fn test_access_mode() {
        assert!(AccessMode::EXISTS.is_empty());
        assert!((AccessMode::READ | AccessMode::WRITE).is_write_class());
        assert!(!AccessMode::READ.is_write_class());
    }
}
