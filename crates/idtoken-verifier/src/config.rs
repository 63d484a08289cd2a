//! Verifier configuration
//!
//! [`VerifierConfig`] is process-level configuration: where the provider's
//! certificates live, how long they may be cached, and how much clock skew is
//! tolerated. [`ValidationConfig`] is derived from it for every verification
//! call and carries the per-tenant expectations.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};

use crate::error::{VerifyError, VerifyResult};

/// Public certificates (PEM X.509, keyed by `kid`) used to sign Firebase Auth ID tokens
pub const SECURETOKEN_CERT_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

/// Shared cache key under which the certificate set is stored
pub const DEFAULT_CERT_CACHE_KEY: &str = "CERT_CACHE.FIREBASE";

/// Issuer prefix; the tenant (project) id is appended
pub const DEFAULT_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Default expiry leeway
pub const DEFAULT_ACCEPTABLE_EXP_SKEW: Duration = Duration::from_secs(300);

/// Freshness window used when the certificate response has no `max-age`
pub const DEFAULT_CERT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Upper bound on any freshness window, whatever the origin says
pub const MAX_CERT_CACHE_TTL: Duration = Duration::from_secs(86400);

/// Inclusive bounds on the `sub` claim length, in characters
pub const MIN_SUBJECT_LEN: usize = 1;
/// See [`MIN_SUBJECT_LEN`]
pub const MAX_SUBJECT_LEN: usize = 128;

/// Configuration for [`TokenVerifier`](crate::TokenVerifier)
///
/// Deserializes with defaults for every missing field, so an empty document
/// yields the production Firebase settings:
///
/// ```rust
/// use idtoken_verifier::VerifierConfig;
///
/// let config: VerifierConfig = serde_json::from_str(r#"{ "acceptable_exp_skew": 60 }"#).unwrap();
/// assert_eq!(config.acceptable_exp_skew.as_secs(), 60);
/// assert_eq!(config.cache_key, "CERT_CACHE.FIREBASE");
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// URL of the certificate document (HTTPS; plain HTTP only for loopback)
    pub cert_url: String,

    /// Key of the certificate entry in the shared cache
    pub cache_key: String,

    /// Issuer prefix; the expected `iss` is this prefix followed by the tenant id
    pub issuer_prefix: String,

    /// Clock skew tolerated on `exp` and `iat` (default: 300 seconds)
    #[serde_as(as = "DurationSeconds<u64>")]
    pub acceptable_exp_skew: Duration,

    /// Freshness window when the response carries no `max-age` (default: 1 hour)
    #[serde_as(as = "DurationSeconds<u64>")]
    pub default_cache_ttl: Duration,

    /// Cap on the freshness window (default: 24 hours)
    #[serde_as(as = "DurationSeconds<u64>")]
    pub max_cache_ttl: Duration,

    /// HTTP timeout for the certificate fetch (default: 10 seconds)
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,

    /// Maximum size of the certificate document in bytes (default: 64 KiB)
    pub max_response_size: usize,

    /// User agent for the certificate fetch
    pub user_agent: String,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            cert_url: SECURETOKEN_CERT_URL.to_string(),
            cache_key: DEFAULT_CERT_CACHE_KEY.to_string(),
            issuer_prefix: DEFAULT_ISSUER_PREFIX.to_string(),
            acceptable_exp_skew: DEFAULT_ACCEPTABLE_EXP_SKEW,
            default_cache_ttl: DEFAULT_CERT_CACHE_TTL,
            max_cache_ttl: MAX_CERT_CACHE_TTL,
            request_timeout: Duration::from_secs(10),
            max_response_size: 64 * 1024,
            user_agent: format!("idtoken-verifier/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl VerifierConfig {
    /// Point the certificate fetch at a different URL
    pub fn with_cert_url(mut self, url: impl Into<String>) -> Self {
        self.cert_url = url.into();
        self
    }

    /// Store the certificate set under a different shared cache key
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = key.into();
        self
    }

    /// Use a different issuer prefix
    pub fn with_issuer_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.issuer_prefix = prefix.into();
        self
    }

    /// Set the tolerated clock skew
    pub fn with_exp_skew(mut self, skew: Duration) -> Self {
        self.acceptable_exp_skew = skew;
        self
    }

    /// Set the fallback freshness window
    pub fn with_default_cache_ttl(mut self, ttl: Duration) -> Self {
        self.default_cache_ttl = ttl;
        self
    }

    /// Set the certificate fetch timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Check the configuration before building a verifier
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Configuration`] if the certificate URL does not
    /// parse, is not HTTPS (plain HTTP is accepted for loopback hosts only),
    /// or a window/limit is zero.
    pub fn validate(&self) -> VerifyResult<()> {
        let url = url::Url::parse(&self.cert_url).map_err(|e| {
            VerifyError::Configuration(format!("invalid certificate URL '{}': {e}", self.cert_url))
        })?;

        match url.scheme() {
            "https" => {}
            "http" if is_loopback(&url) => {}
            scheme => {
                return Err(VerifyError::Configuration(format!(
                    "certificate URL must use https (http only allowed for loopback), got '{scheme}'"
                )));
            }
        }

        if self.issuer_prefix.is_empty() {
            return Err(VerifyError::Configuration(
                "issuer prefix must not be empty".to_string(),
            ));
        }

        if self.cache_key.is_empty() {
            return Err(VerifyError::Configuration(
                "cache key must not be empty".to_string(),
            ));
        }

        if self.max_cache_ttl.is_zero() || self.request_timeout.is_zero() {
            return Err(VerifyError::Configuration(
                "cache TTL cap and request timeout must be non-zero".to_string(),
            ));
        }

        if self.max_response_size == 0 {
            return Err(VerifyError::Configuration(
                "max response size must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Expected issuer for a tenant
    pub fn issuer_for(&self, tenant_id: &str) -> String {
        format!("{}{}", self.issuer_prefix, tenant_id)
    }
}

fn is_loopback(url: &url::Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain == "localhost",
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Per-call claim expectations
///
/// Built from the caller's tenant id and the verifier configuration; never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Expected `aud` (the tenant / project id)
    pub audience: String,
    /// Expected `iss`
    pub issuer: String,
    /// Clock skew tolerated on `exp` and `iat`
    pub acceptable_exp_skew: Duration,
    /// Minimum `sub` length in characters
    pub min_subject_len: usize,
    /// Maximum `sub` length in characters
    pub max_subject_len: usize,
}

impl ValidationConfig {
    /// Expectations for tokens issued to `tenant_id`
    pub fn for_tenant(tenant_id: &str, config: &VerifierConfig) -> Self {
        Self {
            audience: tenant_id.to_string(),
            issuer: config.issuer_for(tenant_id),
            acceptable_exp_skew: config.acceptable_exp_skew,
            min_subject_len: MIN_SUBJECT_LEN,
            max_subject_len: MAX_SUBJECT_LEN,
        }
    }

    /// Override the tolerated clock skew
    pub fn with_exp_skew(mut self, skew: Duration) -> Self {
        self.acceptable_exp_skew = skew;
        self
    }
}
