use std::fmt;
use std::sync::Arc;

use crate::flags::{FileInfoOptions, OpenFlags};
use crate::handle::{HandleId, HandleTable};
use crate::native::abi::fuse_file_info;

/// Per-open-file state passed to file and directory operations.
///
/// Wraps the native `fuse_file_info` for one call. The context set here
/// travels with the handle to every later operation on it and is dropped
/// once the handle is released.
pub struct FileInfo<'a, C> {
    raw: &'a mut fuse_file_info,
    handles: &'a HandleTable<C>,
}

impl<'a, C> FileInfo<'a, C> {
    pub fn new(raw: &'a mut fuse_file_info, handles: &'a HandleTable<C>) -> Self {
        FileInfo { raw, handles }
    }

    pub fn flags(&self) -> OpenFlags {
        OpenFlags::from_bits_retain(self.raw.flags)
    }

    pub fn options(&self) -> FileInfoOptions {
        FileInfoOptions::from_bits_retain(self.raw.bits)
    }

    pub fn set_options(&mut self, options: FileInfoOptions) {
        self.raw.bits = options.bits();
    }

    pub fn lock_owner(&self) -> u64 {
        self.raw.lock_owner
    }

    /// Id stored in the native `fh` field; zero when no context is attached.
    pub fn handle_id(&self) -> HandleId {
        self.raw.fh
    }

    pub fn context(&self) -> Option<Arc<C>> {
        self.handles.get(self.raw.fh)
    }

    /// Attaches `context`, dropping any context attached before.
    pub fn set_context(&mut self, context: C) {
        self.clear_context();
        self.raw.fh = self.handles.insert(context);
    }

    /// Detaches and drops the current context, if any.
    pub fn clear_context(&mut self) {
        self.handles.remove(self.raw.fh);
        self.raw.fh = 0;
    }
}

impl<C> fmt::Debug for FileInfo<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInfo")
            .field("flags", &self.flags())
            .field("fh", &self.raw.fh)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_round_trip() {
        let handles = HandleTable::new();
        let mut raw = fuse_file_info::default();
        let mut info = FileInfo::new(&mut raw, &handles);
        assert!(info.context().is_none());
        info.set_context(String::from("stream"));
        assert_eq!(info.context().as_deref().map(String::as_str), Some("stream"));
        let id = info.handle_id();
        assert_ne!(id, 0);
        assert_eq!(raw.fh, id);
    }

    #[test]
    fn test_replacing_context_frees_previous_slot() {
        let handles = HandleTable::new();
        let mut raw = fuse_file_info::default();
        let mut info = FileInfo::new(&mut raw, &handles);
        info.set_context(1u32);
        let first = info.handle_id();
        info.set_context(2u32);
        assert!(handles.get(first).is_none());
        assert_eq!(handles.len(), 1);
        info.clear_context();
        assert!(handles.is_empty());
        assert_eq!(info.handle_id(), 0);
    }

    #[test]
    fn test_options() {
        let handles: HandleTable<()> = HandleTable::new();
        let mut raw = fuse_file_info {
            flags: libc::O_RDWR,
            ..Default::default()
        };
        let mut info = FileInfo::new(&mut raw, &handles);
        info.set_options(FileInfoOptions::DIRECT_IO | FileInfoOptions::KEEP_CACHE);
        assert!(info.flags().contains(OpenFlags::READ_WRITE));
        assert_eq!(raw.bits, 0x06);
    }
}
