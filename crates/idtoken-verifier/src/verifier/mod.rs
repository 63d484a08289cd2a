//! Token verification pipeline
//!
//! [`TokenVerifier`] runs the three stages in order and stops at the first
//! failure:
//!
//! 1. parse the compact token ([`DecodedToken::parse`])
//! 2. verify the RS256 signature against the key named by `kid`
//!    ([`SignatureVerifier`])
//! 3. validate the claims for the caller's tenant ([`ClaimsValidator`])
//!
//! A token is only ever returned as a [`VerifiedToken`] once all three pass.

pub mod claims;
pub mod signature;

pub use claims::ClaimsValidator;
pub use signature::{ALLOWED_ALGORITHM, SignatureVerifier, verify_signature};

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::cache::SharedCache;
use crate::certs::{CertificateCache, KeyResolver};
use crate::config::{ValidationConfig, VerifierConfig};
use crate::error::{VerifyError, VerifyResult};
use crate::metrics;
use crate::token::{DecodedToken, VerifiedToken};

/// Verifies provider-issued ID tokens
///
/// Cheap to clone; clones share the key resolver.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use idtoken_verifier::{MemoryCache, TokenVerifier, VerifierConfig};
/// # tokio_test::block_on(async {
/// let verifier = TokenVerifier::new(VerifierConfig::default(), Arc::new(MemoryCache::new()))?;
///
/// let token = verifier.verify_token("my-project", "eyJhbGciOi...").await?;
/// println!("authenticated {}", token.subject());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    signature: SignatureVerifier,
    config: VerifierConfig,
}

impl TokenVerifier {
    /// Create a verifier that fetches certificates through `shared`
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Configuration`] if the configuration is invalid.
    pub fn new(config: VerifierConfig, shared: Arc<dyn SharedCache>) -> VerifyResult<Self> {
        let certs = CertificateCache::new(&config, shared)?;
        Ok(Self::with_resolver(config, Arc::new(certs)))
    }

    /// Create a verifier around any key resolver
    pub fn with_resolver(config: VerifierConfig, resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            signature: SignatureVerifier::new(resolver),
            config,
        }
    }

    /// The verifier configuration
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// The key resolver
    pub fn resolver(&self) -> &Arc<dyn KeyResolver> {
        self.signature.resolver()
    }

    /// Verify `token` as issued to `tenant_id`
    ///
    /// The expected audience is `tenant_id` and the expected issuer is the
    /// configured issuer prefix followed by `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns the specific [`VerifyError`] of the first failing stage.
    /// [`VerifyError::UnknownKey`] may be transient during key rotation; see
    /// [`TokenVerifier::verify_with_key_refresh`].
    pub async fn verify_token(&self, tenant_id: &str, token: &str) -> VerifyResult<VerifiedToken> {
        let validation = ValidationConfig::for_tenant(tenant_id, &self.config);
        self.verify_with_config(&validation, token).await
    }

    /// Verify `token` against explicit claim expectations
    ///
    /// # Errors
    ///
    /// Returns the specific [`VerifyError`] of the first failing stage.
    pub async fn verify_with_config(
        &self,
        validation: &ValidationConfig,
        token: &str,
    ) -> VerifyResult<VerifiedToken> {
        let start = Instant::now();
        let result = self.run_pipeline(validation, token).await;

        let reason = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_verification(reason, start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            warn!(
                audience = %validation.audience,
                reason,
                error = %e,
                "Token rejected"
            );
        }
        result
    }

    /// Verify, and on an unknown key id refresh the certificates and try once more
    ///
    /// Only [`VerifyError::UnknownKey`] triggers the refresh. Every other
    /// failure, and any failure of the second attempt, is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if the refresh fails, otherwise the
    /// result of the verification.
    pub async fn verify_with_key_refresh(
        &self,
        tenant_id: &str,
        token: &str,
    ) -> VerifyResult<VerifiedToken> {
        match self.verify_token(tenant_id, token).await {
            Err(VerifyError::UnknownKey(kid)) => {
                info!(key_id = %kid, "Unknown key id, refreshing certificates");
                self.resolver().refresh().await?;
                self.verify_token(tenant_id, token).await
            }
            other => other,
        }
    }

    async fn run_pipeline(
        &self,
        validation: &ValidationConfig,
        token: &str,
    ) -> VerifyResult<VerifiedToken> {
        let decoded = DecodedToken::parse(token)?;
        self.signature.verify(&decoded).await?;
        ClaimsValidator::new(validation.clone()).validate(decoded.claims())?;

        debug!(
            audience = %validation.audience,
            key_id = decoded.key_id().unwrap_or_default(),
            "Token verified"
        );
        Ok(VerifiedToken::new(decoded))
    }
}
