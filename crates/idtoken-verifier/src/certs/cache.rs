//! Certificate cache on top of a shared key-value store
//!
//! One entry, under a fixed key, holds the whole certificate set plus the
//! absolute time it stops being fresh. The entry is written only after a
//! network fetch and is always replaced wholesale, never merged.
//!
//! Freshness has a single source: the expiration computed at fetch time from
//! the response's `Cache-Control` (or the default window). That timestamp is
//! stored inside the entry, so a hit is trusted exactly until then, even if
//! the backing store keeps entries longer than asked.
//!
//! Concurrent misses may each fetch and each write the same fresh set. That
//! duplicate work is accepted instead of holding a lock across the fetch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::KeyResolver;
use super::keyset::{KeySet, PublicKey};
use super::store::{CertificateFetch, CertificateStore};
use crate::cache::SharedCache;
use crate::config::VerifierConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::metrics;

/// Wire form of a cache entry
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    /// Unix seconds
    expires_at: u64,
    /// `{kid: pem}`, same shape as the provider document
    certs: BTreeMap<String, String>,
}

/// A key set with its absolute expiration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    keys: KeySet,
    expires_at: SystemTime,
}

impl CacheEntry {
    /// Create an entry
    pub fn new(keys: KeySet, expires_at: SystemTime) -> Self {
        Self { keys, expires_at }
    }

    /// The cached keys
    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    /// When the entry stops being fresh
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// Whether the entry may still be used at `now`
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }

    /// Serialize for the shared cache
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if the entry cannot be serialized.
    pub fn encode(&self) -> VerifyResult<Vec<u8>> {
        let expires_at = self
            .expires_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        serde_json::to_vec(&StoredEntry {
            expires_at,
            certs: self.keys.to_pem_map(),
        })
        .map_err(|e| VerifyError::Fetch(format!("failed to serialize cache entry: {e}")))
    }

    /// Deserialize an entry read from the shared cache
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if the bytes are not a valid entry, the
    /// expiry is out of range, or a stored certificate no longer parses.
    pub fn decode(bytes: &[u8]) -> VerifyResult<Self> {
        let stored: StoredEntry = serde_json::from_slice(bytes)
            .map_err(|e| VerifyError::Fetch(format!("invalid cache entry: {e}")))?;

        let expires_at = UNIX_EPOCH
            .checked_add(Duration::from_secs(stored.expires_at))
            .ok_or_else(|| VerifyError::Fetch("invalid cache entry expiry".to_string()))?;

        // Certificates are stored as PEM and re-parsed on every hit
        Ok(Self {
            keys: KeySet::from_pem_map(&stored.certs)?,
            expires_at,
        })
    }
}

/// Certificate lookups amortized through a shared cache
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use idtoken_verifier::{CertificateCache, MemoryCache, VerifierConfig};
/// # tokio_test::block_on(async {
/// let certs = CertificateCache::new(&VerifierConfig::default(), Arc::new(MemoryCache::new()))?;
///
/// // Fetches on the first call, then served from the shared cache
/// let key = certs.get_cert("d4b1f3a9").await?;
/// println!("resolved {}", key.kid());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct CertificateCache {
    store: CertificateStore,
    shared: Arc<dyn SharedCache>,
    cache_key: String,
}

impl CertificateCache {
    /// Create a certificate cache over `shared`
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Configuration`] if the configuration is invalid.
    pub fn new(config: &VerifierConfig, shared: Arc<dyn SharedCache>) -> VerifyResult<Self> {
        Ok(Self::with_store(
            CertificateStore::new(config)?,
            shared,
            config.cache_key.clone(),
        ))
    }

    /// Create a certificate cache around an existing store
    pub fn with_store(
        store: CertificateStore,
        shared: Arc<dyn SharedCache>,
        cache_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            shared,
            cache_key: cache_key.into(),
        }
    }

    /// Resolve a key id to its public key
    ///
    /// A fresh cached entry is used as-is. Otherwise (miss, read error,
    /// undecodable or stale entry) the document is fetched and written back.
    /// A key id missing from the set in use is reported, never substituted.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::UnknownKey`] if `kid` is not in the current set
    /// - [`VerifyError::Fetch`] if a fetch was needed and failed
    pub async fn get_cert(&self, kid: &str) -> VerifyResult<PublicKey> {
        if let Some(entry) = self.read_entry().await {
            return entry.keys().lookup(kid).inspect_err(|_| {
                warn!(
                    key_id = kid,
                    cache_key = %self.cache_key,
                    "Key id not in cached certificates (possible rotation)"
                );
            });
        }

        let fetch = self.fetch_and_store().await?;
        fetch.lookup(kid).inspect_err(|_| {
            warn!(
                key_id = kid,
                cert_url = %self.store.url(),
                "Key id not in freshly fetched certificates"
            );
        })
    }

    /// Current key set, from the cache or the network
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if a fetch was needed and failed.
    pub async fn key_set(&self) -> VerifyResult<KeySet> {
        match self.read_entry().await {
            Some(entry) => Ok(entry.keys),
            None => Ok(self.fetch_and_store().await?.into_keys()),
        }
    }

    /// Fetch the document now and overwrite the shared entry
    ///
    /// Callers use this after [`VerifyError::UnknownKey`] to pick up a
    /// rotated key before verifying again.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if the fetch fails; the existing entry
    /// is left untouched in that case.
    pub async fn refresh(&self) -> VerifyResult<KeySet> {
        Ok(self.fetch_and_store().await?.into_keys())
    }

    /// Drop the shared entry (best effort)
    pub async fn invalidate(&self) {
        if let Err(e) = self.shared.delete(&self.cache_key).await {
            warn!(cache_key = %self.cache_key, error = %e, "Failed to invalidate certificate cache");
        }
    }

    /// The underlying store
    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    /// Shared cache key
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    async fn read_entry(&self) -> Option<CacheEntry> {
        let bytes = match self.shared.get(&self.cache_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(cache_key = %self.cache_key, "Certificate cache miss");
                metrics::record_cert_cache("miss");
                return None;
            }
            Err(e) => {
                warn!(cache_key = %self.cache_key, error = %e, "Certificate cache read failed, fetching");
                metrics::record_cert_cache("error");
                return None;
            }
        };

        let entry = match CacheEntry::decode(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(cache_key = %self.cache_key, error = %e, "Discarding undecodable certificate cache entry");
                metrics::record_cert_cache("error");
                return None;
            }
        };

        if !entry.is_fresh(SystemTime::now()) {
            debug!(cache_key = %self.cache_key, "Cached certificates are stale");
            metrics::record_cert_cache("stale");
            return None;
        }

        debug!(
            cache_key = %self.cache_key,
            key_count = entry.keys().len(),
            "Using cached certificates"
        );
        metrics::record_cert_cache("hit");
        Some(entry)
    }

    async fn fetch_and_store(&self) -> VerifyResult<CertificateFetch> {
        let fetch = self.store.fetch().await?;
        self.try_store(&fetch).await;
        Ok(fetch)
    }

    /// Write-back is best effort: a failure costs a future fetch, not
    /// correctness, so it is logged and dropped.
    async fn try_store(&self, fetch: &CertificateFetch) {
        let ttl = fetch.max_age();
        if ttl.is_zero() {
            debug!(cache_key = %self.cache_key, "Certificate response not cacheable, skipping write");
            return;
        }

        let entry = CacheEntry::new(fetch.keys().clone(), fetch.expires_at());
        let bytes = match entry.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(cache_key = %self.cache_key, error = %e, "Failed to encode certificate cache entry");
                return;
            }
        };

        match self.shared.set(&self.cache_key, bytes, ttl).await {
            Ok(()) => debug!(
                cache_key = %self.cache_key,
                ttl_secs = ttl.as_secs(),
                "Stored certificates in shared cache"
            ),
            Err(e) => {
                warn!(cache_key = %self.cache_key, error = %e, "Failed to store certificates in shared cache");
                metrics::record_cert_cache_write_failure();
            }
        }
    }
}

#[async_trait]
impl KeyResolver for CertificateCache {
    async fn resolve_key(&self, kid: &str) -> VerifyResult<PublicKey> {
        self.get_cert(kid).await
    }

    async fn refresh(&self) -> VerifyResult<()> {
        CertificateCache::refresh(self).await.map(|_| ())
    }
}
