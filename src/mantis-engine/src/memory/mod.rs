//! Buffer pool and on-disk storage of matrix objects.

mod cache;
mod manager;
mod pool;
pub mod spill;

pub use cache::{Lineage, LineageResolver, LocalReplay, MatrixHandle, MatrixObject, Residency};
pub use manager::{MemoryManager, TrackingMemoryManager};
pub use pool::{BufferPool, ScratchSpace};
