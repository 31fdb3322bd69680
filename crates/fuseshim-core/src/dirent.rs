use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use crate::flags::{FillDirFlags, PosixFileMode};
use crate::stat::FileStat;

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuseDirEntry {
    pub name: Cow<'static, OsStr>,
    /// Offset of the next entry, or 0 when the listing cannot be resumed.
    pub offset: i64,
    pub flags: FillDirFlags,
    pub stat: FileStat,
}

/// The entries produced for one `readdir` call, pulled lazily.
pub type DirEntries<'a> = Box<dyn Iterator<Item = FuseDirEntry> + 'a>;

impl FuseDirEntry {
    /// An entry whose stat only carries meaningful type and inode bits.
    pub fn new(name: impl Into<OsString>, stat: FileStat) -> Self {
        FuseDirEntry {
            name: Cow::Owned(name.into()),
            offset: 0,
            flags: FillDirFlags::empty(),
            stat,
        }
    }

    /// An entry with a fully populated stat.
    pub fn plus(name: impl Into<OsString>, stat: FileStat) -> Self {
        FuseDirEntry {
            flags: FillDirFlags::PLUS,
            ..Self::new(name, stat)
        }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn dot() -> Self {
        Self::synthetic(".")
    }

    pub fn dot_dot() -> Self {
        Self::synthetic("..")
    }

    fn synthetic(name: &'static str) -> Self {
        FuseDirEntry {
            name: Cow::Borrowed(OsStr::new(name)),
            offset: 0,
            flags: FillDirFlags::empty(),
            stat: FileStat::type_only(PosixFileMode::DIRECTORY, 0),
        }
    }

    pub fn name_bytes(&self) -> &[u8] {
        self.name.as_bytes()
    }

    /// Names may not be empty or contain `/` or NUL.
    pub fn has_valid_name(&self) -> bool {
        let bytes = self.name_bytes();
        !bytes.is_empty() && !bytes.iter().any(|b| *b == b'/' || *b == 0)
    }

    pub fn is_dot(&self) -> bool {
        self.name_bytes() == b"."
    }
}

/// `.` and `..` for the head of a listing.
pub fn dot_entries() -> [FuseDirEntry; 2] {
    [FuseDirEntry::dot(), FuseDirEntry::dot_dot()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_entries_are_directories() {
        for entry in dot_entries() {
            assert!(entry.stat.mode.is_dir());
            assert!(entry.has_valid_name());
        }
        assert!(FuseDirEntry::dot().is_dot());
        assert!(!FuseDirEntry::dot_dot().is_dot());
    }

    #[test]
    fn test_name_validation() {
        let stat = FileStat::default();
        assert!(FuseDirEntry::new("ok.txt", stat).has_valid_name());
        assert!(!FuseDirEntry::new("a/b", stat).has_valid_name());
        assert!(!FuseDirEntry::new("a\0b", stat).has_valid_name());
        assert!(!FuseDirEntry::new("", stat).has_valid_name());
    }

    #[test]
    fn test_plus_sets_flag() {
        let entry = FuseDirEntry::plus("f", FileStat::regular(0o644, 1)).with_offset(3);
        assert_eq!(entry.flags, FillDirFlags::PLUS);
        assert_eq!(entry.offset, 3);
    }
}
