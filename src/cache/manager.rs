//! In-memory TTL cache manager
//!
//! Provides a `CacheManager` that stores cloneable data with a capture time and
//! TTL. Entries are overwritten whole on every `put`, never merged.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::data::DataKind;

/// Per-kind cache lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Weather entries, 10 minutes by default
    pub weather: Option<Duration>,
    /// Holiday entries, 24 hours by default
    pub holidays: Option<Duration>,
    /// Live sensor readings are not cached by default
    pub temperature: Option<Duration>,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            weather: Some(Duration::from_secs(10 * 60)),
            holidays: Some(Duration::from_secs(24 * 60 * 60)),
            temperature: None,
        }
    }
}

impl CacheTtls {
    /// TTL for a kind, or `None` when the kind always re-fetches
    pub fn for_kind(&self, kind: DataKind) -> Option<Duration> {
        let ttl = match kind {
            DataKind::Temperature => self.temperature,
            DataKind::Weather => self.weather,
            DataKind::Holidays => self.holidays,
        };
        ttl.filter(|ttl| !ttl.is_zero())
    }
}

/// A cached value with its capture time and lifetime
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached data
    pub data: T,
    /// When the data was cached
    pub captured_at: Instant,
    /// How long the entry stays valid
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// An entry is valid iff `now - captured_at < ttl`
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.captured_at) < self.ttl
    }
}

/// Keeps the last accepted value per key
///
/// Clones share the same underlying store. The lock is never held across an
/// await point, and each `put` replaces the whole entry, so concurrent readers
/// see either the previous entry or the new one.
#[derive(Debug)]
pub struct CacheManager<T> {
    entries: Arc<RwLock<HashMap<String, CacheEntry<T>>>>,
}

impl<T> Clone for CacheManager<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for CacheManager<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: Clone> CacheManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw entry for `key`, valid or not
    pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn is_valid(&self, key: &str) -> bool {
        self.is_valid_at(key, Instant::now())
    }

    pub fn is_valid_at(&self, key: &str, now: Instant) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .map(|entry| entry.is_valid_at(now))
            .unwrap_or(false)
    }

    /// Returns the data for `key` only while it is still valid
    pub fn get_valid(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| entry.is_valid_at(now))
            .map(|entry| entry.data.clone())
    }

    /// Stores `data` under `key`, replacing any previous entry
    pub fn put(&self, key: &str, data: T, ttl: Duration) {
        let entry = CacheEntry {
            data,
            captured_at: Instant::now(),
            ttl,
        };
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
