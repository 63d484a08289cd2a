//! Certificate document fetching
//!
//! The provider publishes its signing certificates as a JSON object mapping
//! key id to PEM X.509 certificate, and advertises how long the document may
//! be cached through `Cache-Control: max-age`.

use std::time::{Duration, SystemTime};

use reqwest::header::{CACHE_CONTROL, HeaderMap};
use tracing::{debug, error, info};

use super::keyset::{KeySet, PublicKey};
use crate::config::VerifierConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::metrics;

/// Result of one fetch of the certificate document
#[derive(Debug, Clone)]
pub struct CertificateFetch {
    keys: KeySet,
    max_age: Duration,
    fetched_at: SystemTime,
}

impl CertificateFetch {
    /// Wrap a key set fetched at `fetched_at` with freshness `max_age`
    pub fn new(keys: KeySet, max_age: Duration, fetched_at: SystemTime) -> Self {
        Self {
            keys,
            max_age,
            fetched_at,
        }
    }

    /// Key lookup within this fetch
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::UnknownKey`] if `kid` was not published in this
    /// document. During key rotation this is expected until the cache is
    /// refreshed.
    pub fn lookup(&self, kid: &str) -> VerifyResult<PublicKey> {
        self.keys.lookup(kid)
    }

    /// The fetched keys
    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    /// Consume into the key set
    pub fn into_keys(self) -> KeySet {
        self.keys
    }

    /// Freshness window derived from the response headers
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Absolute time after which the keys must be fetched again
    pub fn expires_at(&self) -> SystemTime {
        self.fetched_at + self.max_age
    }
}

/// Fetches the provider's certificate document
///
/// Holds no state between fetches beyond its HTTP client.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    client: reqwest::Client,
    url: String,
    default_ttl: Duration,
    max_ttl: Duration,
    max_response_size: usize,
}

impl CertificateStore {
    /// Create a store from the verifier configuration
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Configuration`] if the configuration is
    /// invalid or the HTTP client cannot be built.
    pub fn new(config: &VerifierConfig) -> VerifyResult<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                VerifyError::Configuration(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            url: config.cert_url.clone(),
            default_ttl: config.default_cache_ttl,
            max_ttl: config.max_cache_ttl,
            max_response_size: config.max_response_size,
        })
    }

    /// Certificate document URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET the certificate document and parse it
    ///
    /// Dropping the returned future aborts the request, so a caller's
    /// timeout bounds the fetch as well as the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] on transport failure, non-success
    /// status, an oversized body, or a document that does not parse.
    pub async fn fetch(&self) -> VerifyResult<CertificateFetch> {
        info!(cert_url = %self.url, "Fetching signing certificates");

        let result = self.fetch_inner().await;
        metrics::record_cert_fetch(result.is_ok());
        result
    }

    async fn fetch_inner(&self) -> VerifyResult<CertificateFetch> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            error!(cert_url = %self.url, error = %e, "Failed to fetch signing certificates");
            VerifyError::Fetch(format!("request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(
                cert_url = %self.url,
                status = %status,
                "Certificate endpoint returned error status"
            );
            return Err(VerifyError::Fetch(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        // Extract cache headers before consuming response
        let max_age = self.parse_cache_headers(response.headers());

        if let Some(content_length) = response.content_length()
            && content_length > self.max_response_size as u64
        {
            return Err(VerifyError::Fetch(format!(
                "certificate document exceeds {} bytes",
                self.max_response_size
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            error!(cert_url = %self.url, error = %e, "Failed to read certificate response");
            VerifyError::Fetch(format!("failed to read response: {e}"))
        })?;

        if body.len() > self.max_response_size {
            return Err(VerifyError::Fetch(format!(
                "certificate document exceeds {} bytes",
                self.max_response_size
            )));
        }

        let keys = KeySet::from_json(&body).inspect_err(|e| {
            error!(cert_url = %self.url, error = %e, "Failed to parse certificate document");
        })?;

        info!(
            cert_url = %self.url,
            key_count = keys.len(),
            max_age_secs = max_age.as_secs(),
            "Fetched signing certificates"
        );

        Ok(CertificateFetch::new(keys, max_age, SystemTime::now()))
    }

    /// Freshness window from `Cache-Control`
    ///
    /// `max-age` wins (capped); `no-cache` / `no-store` without `max-age`
    /// mean zero; otherwise the default window applies.
    pub fn parse_cache_headers(&self, headers: &HeaderMap) -> Duration {
        if let Some(cache_control) = headers.get(CACHE_CONTROL)
            && let Ok(value) = cache_control.to_str()
        {
            for directive in value.split(',') {
                let directive = directive.trim();
                if let Some(max_age) = directive.strip_prefix("max-age=")
                    && let Ok(seconds) = max_age.trim_matches('"').parse::<u64>()
                {
                    return Duration::from_secs(seconds).min(self.max_ttl);
                }
            }

            if value.contains("no-cache") || value.contains("no-store") {
                debug!(cert_url = %self.url, "Certificate response is not cacheable");
                return Duration::ZERO;
            }
        }

        self.default_ttl
    }
}
