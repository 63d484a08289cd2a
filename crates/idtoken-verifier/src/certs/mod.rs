//! Provider signing certificates
//!
//! ```text
//!   TokenVerifier ──resolve_key(kid)──▶ CertificateCache ──get/set──▶ SharedCache
//!                                              │
//!                                              └──fetch() on miss──▶ CertificateStore ──GET──▶ provider
//! ```
//!
//! - [`store`] - fetching and parsing the certificate document
//! - [`keyset`] - key id to RSA public key mapping
//! - [`cache`] - the shared-cache backed certificate cache

pub mod cache;
pub mod keyset;
pub mod store;

pub use cache::{CacheEntry, CertificateCache};
pub use keyset::{KeySet, PublicKey};
pub use store::{CertificateFetch, CertificateStore};

use async_trait::async_trait;

use crate::error::VerifyResult;

/// Resolves a token's key id to the public key that must have signed it
#[async_trait]
pub trait KeyResolver: Send + Sync + std::fmt::Debug {
    /// Look up the key published under `kid`
    ///
    /// Fails with [`VerifyError::UnknownKey`](crate::VerifyError::UnknownKey)
    /// when the key is not currently published.
    async fn resolve_key(&self, kid: &str) -> VerifyResult<PublicKey>;

    /// Pick up newly published keys, if the resolver has a source to refresh from
    async fn refresh(&self) -> VerifyResult<()> {
        Ok(())
    }
}

/// A fixed key set resolves without any I/O
#[async_trait]
impl KeyResolver for KeySet {
    async fn resolve_key(&self, kid: &str) -> VerifyResult<PublicKey> {
        self.lookup(kid)
    }
}
