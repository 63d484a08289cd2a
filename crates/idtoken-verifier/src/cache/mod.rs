//! Shared key-value cache abstraction
//!
//! The certificate cache keeps its entry in a store shared by every
//! verifier in the deployment (memcache, Redis, ...). The store is injected
//! as an `Arc<dyn SharedCache>`; [`MemoryCache`] is the in-process
//! implementation.
//!
//! The contract is atomic `get` / `set` / `delete` on
//! opaque bytes with a TTL. No compare-and-swap is required, and callers
//! treat every operation as best effort.

mod memory;

pub use memory::MemoryCache;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// Shared cache backend
#[async_trait]
pub trait SharedCache: Send + Sync + std::fmt::Debug {
    /// Read the value stored under `key`
    ///
    /// `Ok(None)` is a miss, including an entry whose TTL has elapsed.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, replacing any previous value, for `ttl`
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remove the value under `key`; removing a missing key succeeds
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
