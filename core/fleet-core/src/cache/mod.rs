//! Two-tier TTL cache in front of the discovery pipeline.
//!
//! - [`MemoryCache`]: in-process, a few seconds, one captured `Instant`.
//! - [`FileCache`]: shared across separate `fleetctl` invocations, mtime based.
//!
//! The tiers are independent and may briefly disagree. Both are latency
//! optimizations only: the pipeline is correct with either tier disabled, and
//! every cache failure degrades to a live recomputation.

mod file;
mod memory;

pub use file::FileCache;
pub use memory::{CacheEntry, MemoryCache};
