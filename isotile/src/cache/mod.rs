//! Per-worker cache of decoded chunks.
//!
//! Every composite of neighbouring render-tiles reloads the same chunk
//! columns, so each worker keeps a bounded cache in front of its
//! [`ChunkSource`](crate::source::ChunkSource). Caches are never shared
//! between workers.

mod memory;
mod stats;
mod r#trait;

pub use memory::LruCache;
pub use r#trait::{load_through, ChunkCache, NoOpCache};
pub use stats::CacheStats;
