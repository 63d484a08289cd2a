//! In-process shared cache

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::SharedCache;
use crate::error::CacheError;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// [`SharedCache`] backed by a concurrent map
///
/// Suitable for single-process deployments and tests. Clones share the same
/// storage. [`MemoryCache::expire`] forces an entry past its TTL without
/// waiting.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the entry under `key` behave as if its TTL had elapsed
    pub fn expire(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Instant::now();
        }
    }

    /// Remaining TTL of a live entry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entry = self.entries.get(key)?;
        let remaining = entry.expires_at.checked_duration_since(Instant::now())?;
        (!remaining.is_zero()).then_some(remaining)
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if Instant::now() < entry.expires_at {
                return Ok(Some(entry.value.clone()));
            }
            // Entry expired, remove it unless a writer replaced it meanwhile
            drop(entry); // Release the lock
            self.entries
                .remove_if(key, |_, entry| Instant::now() >= entry.expires_at);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Backend(format!("TTL out of range: {ttl:?}")))?;

        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}
