//! Cache module for holding recent fetch results in memory
//!
//! This module provides a cache manager that keeps the last accepted result per
//! key with a TTL (time-to-live). Validity is evaluated lazily on every read and
//! an expired entry is never served as fresh; it simply waits to be overwritten
//! by the next successful fetch. Nothing is persisted across restarts.

mod manager;

pub use manager::{CacheEntry, CacheManager, CacheTtls};
