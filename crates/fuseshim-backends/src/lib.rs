//! Ready-made filesystems: an in-memory tree and a passthrough mirror.

mod error;
mod memory;
mod mirror;

pub use error::BackendError;
pub use memory::{MemoryFs, SEED_CONTENT, SEED_PATH};
pub use mirror::MirrorFs;
