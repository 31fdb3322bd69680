//! Table of live per-file contexts keyed by the id stored in
//! `fuse_file_info.fh`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Id written into `fh`. Zero means "no context".
pub type HandleId = u64;

/// Owns the contexts attached to open files and directories.
///
/// A context is dropped when its id is removed (release, replacement or a
/// failed open) and the last outstanding `Arc` clone goes away.
pub struct HandleTable<C> {
    entries: RwLock<HashMap<HandleId, Arc<C>>>,
    next_id: AtomicU64,
}

impl<C> HandleTable<C> {
    pub fn new() -> Self {
        HandleTable {
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Stores `context` and returns its fresh, non-zero id.
    pub fn insert(&self, context: C) -> HandleId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(id, Arc::new(context));
        id
    }

    pub fn get(&self, id: HandleId) -> Option<Arc<C>> {
        if id == 0 {
            return None;
        }
        self.entries.read().get(&id).cloned()
    }

    /// Removes the entry. Removing an unknown id (or zero) is a no-op.
    pub fn remove(&self, id: HandleId) -> Option<Arc<C>> {
        if id == 0 {
            return None;
        }
        self.entries.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<C> Default for HandleTable<C> {
    fn default() -> Self {
        Self::new()
    }
}
