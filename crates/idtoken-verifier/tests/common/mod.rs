//! Common test utilities for integration tests
//!
//! Provides a mock certificate endpoint, fixture keys and token signing
//! helpers shared by the verifier and certificate cache tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use idtoken_verifier::{CacheError, SharedCache, VerifierConfig};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const PRIMARY_KEY: &str = include_str!("../fixtures/primary.key.pem");
pub const PRIMARY_CERT: &str = include_str!("../fixtures/primary.cert.pem");
pub const ROTATED_KEY: &str = include_str!("../fixtures/rotated.key.pem");
pub const ROTATED_CERT: &str = include_str!("../fixtures/rotated.cert.pem");
pub const EC_CERT: &str = include_str!("../fixtures/ec.cert.pem");

pub const TENANT: &str = "tenant1";
pub const CERT_PATH: &str = "/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

/// Mock provider certificate endpoint
pub struct MockCertServer {
    pub server: MockServer,
    pub cert_url: String,
}

impl MockCertServer {
    /// Start a mock server with nothing mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let cert_url = format!("{}{}", server.uri(), CERT_PATH);
        Self { server, cert_url }
    }

    /// Verifier configuration pointing at this server
    pub fn config(&self) -> VerifierConfig {
        VerifierConfig::default().with_cert_url(self.cert_url.clone())
    }

    /// Serve `{kid: pem}` with the given `Cache-Control`, expecting exactly
    /// `expected_calls` requests when set
    pub async fn mock_certs(
        &self,
        certs: &[(&str, &str)],
        cache_control: &str,
        expected_calls: Option<u64>,
    ) {
        let body: BTreeMap<&str, &str> = certs.iter().copied().collect();

        let mut mock = Mock::given(method("GET")).and(path(CERT_PATH)).respond_with(
            ResponseTemplate::new(200)
                .insert_header("Cache-Control", cache_control)
                .set_body_json(json!(body)),
        );
        if let Some(n) = expected_calls {
            mock = mock.expect(n);
        }
        mock.mount(&self.server).await;
    }

    /// Serve the primary certificate under `abc`, cacheable for an hour
    pub async fn mock_primary(&self) {
        self.mock_certs(
            &[("abc", PRIMARY_CERT)],
            "public, max-age=3600, must-revalidate, no-transform",
            None,
        )
        .await;
    }

    /// Respond with an error status
    pub async fn mock_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(CERT_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Drop every mounted mock and recorded request
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of certificate document requests received
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }
}

/// Sign `claims` with RS256 under `kid`
pub fn sign_token(claims: &serde_json::Value, kid: &str, private_key: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    header.typ = Some("JWT".to_string());

    let key = EncodingKey::from_rsa_pem(private_key.as_bytes()).expect("Invalid RSA key");
    encode(&header, &claims, &key).expect("Failed to encode test token")
}

/// Get current Unix timestamp
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}

/// Valid claims for `tenant`, expiring `exp_offset_secs` from now
pub fn token_claims(tenant: &str, sub: &str, exp_offset_secs: i64) -> serde_json::Value {
    let now = current_timestamp();
    json!({
        "iss": format!("https://securetoken.google.com/{tenant}"),
        "aud": tenant,
        "sub": sub,
        "user_id": sub,
        "iat": now,
        "exp": (now as i64 + exp_offset_secs) as u64,
        "auth_time": now,
        "email": "user42@example.com",
        "email_verified": true,
        "firebase": {
            "identities": {"email": ["user42@example.com"]},
            "sign_in_provider": "password"
        }
    })
}

/// Shared cache whose every operation fails
#[derive(Debug, Default)]
pub struct FailingCache;

#[async_trait]
impl SharedCache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

/// Shared cache that reads normally but rejects every write
#[derive(Debug, Default)]
pub struct ReadOnlyCache {
    pub inner: idtoken_verifier::MemoryCache,
}

#[async_trait]
impl SharedCache for ReadOnlyCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("read-only replica".to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }
}

/// Install a test subscriber once, honoring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn shared<C: SharedCache + 'static>(cache: C) -> Arc<dyn SharedCache> {
    Arc::new(cache)
}
