//! Signature verification
//!
//! Exactly one algorithm is accepted: RS256. The declared `alg` is compared
//! against that single value and never used to choose how to verify, which
//! closes off algorithm confusion (`none`, HS256 keyed with the public
//! certificate, ...).

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode};
use tracing::{debug, warn};

use crate::certs::{KeyResolver, PublicKey};
use crate::error::{VerifyError, VerifyResult};
use crate::token::DecodedToken;

/// The only accepted `alg` header value
pub const ALLOWED_ALGORITHM: &str = "RS256";

/// Checks a token's signature against the key its `kid` names
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    resolver: Arc<dyn KeyResolver>,
}

impl SignatureVerifier {
    /// Create a verifier resolving keys through `resolver`
    pub fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self { resolver }
    }

    /// Verify the token's signature, returning the key that verified it
    ///
    /// No retries: a failure is final for this token. An
    /// [`VerifyError::UnknownKey`] tells the caller a refreshed key set might
    /// contain the key.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::MalformedToken`] if the header has no `kid`
    /// - [`VerifyError::UnsupportedAlgorithm`] if `alg` is not RS256
    /// - [`VerifyError::UnknownKey`] / [`VerifyError::Fetch`] from key resolution
    /// - [`VerifyError::InvalidSignature`] if the signature does not verify
    pub async fn verify(&self, token: &DecodedToken) -> VerifyResult<PublicKey> {
        let kid = token.key_id().ok_or_else(|| {
            warn!("Token header has no kid");
            VerifyError::MalformedToken("token header has no 'kid'".to_string())
        })?;

        let alg = &token.header().alg;
        if alg != ALLOWED_ALGORITHM {
            warn!(algorithm = %alg, key_id = kid, "Token algorithm not allowed");
            return Err(VerifyError::UnsupportedAlgorithm(alg.clone()));
        }

        let key = self.resolver.resolve_key(kid).await?;
        verify_signature(token, &key)?;

        debug!(key_id = kid, "Token signature verified");
        Ok(key)
    }

    /// The key resolver
    pub fn resolver(&self) -> &Arc<dyn KeyResolver> {
        &self.resolver
    }
}

/// Check an RS256 signature over the token's signing input
///
/// Only the signature is checked here; claims are left to the claims
/// validator.
///
/// # Errors
///
/// Returns [`VerifyError::InvalidSignature`] on a cryptographic mismatch and
/// [`VerifyError::MalformedToken`] if the token cannot be processed at all.
pub fn verify_signature(token: &DecodedToken, key: &PublicKey) -> VerifyResult<()> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<serde_json::Value>(token.raw(), key.decoding_key(), &validation)
        .map(|_| ())
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => {
                warn!(key_id = key.kid(), "Token signature mismatch");
                VerifyError::InvalidSignature
            }
            ErrorKind::InvalidAlgorithm => {
                VerifyError::UnsupportedAlgorithm(token.header().alg.clone())
            }
            _ => VerifyError::MalformedToken(format!("signature check failed: {e}")),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::KeySet;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;
    use std::collections::BTreeMap;

    const PRIMARY_KEY: &str = include_str!("../../tests/fixtures/primary.key.pem");
    const PRIMARY_CERT: &str = include_str!("../../tests/fixtures/primary.cert.pem");
    const ROTATED_CERT: &str = include_str!("../../tests/fixtures/rotated.cert.pem");

    fn resolver(entries: &[(&str, &str)]) -> Arc<dyn KeyResolver> {
        let certs: BTreeMap<String, String> = entries
            .iter()
            .map(|(kid, pem)| ((*kid).to_string(), (*pem).to_string()))
            .collect();
        Arc::new(KeySet::from_pem_map(&certs).unwrap())
    }

    fn signed(kid: Option<&str>) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_string);
        encode(
            &header,
            &json!({"sub": "user42"}),
            &EncodingKey::from_rsa_pem(PRIMARY_KEY.as_bytes()).unwrap(),
        )
        .unwrap()
    }

    fn with_header(token: &str, header: serde_json::Value) -> String {
        let (_, rest) = token.split_once('.').unwrap();
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap()),
            rest
        )
    }

    #[tokio::test]
    async fn test_valid_signature() {
        let verifier = SignatureVerifier::new(resolver(&[("abc", PRIMARY_CERT)]));
        let token = DecodedToken::parse(&signed(Some("abc"))).unwrap();

        let key = verifier.verify(&token).await.unwrap();
        assert_eq!(key.kid(), "abc");
    }

    #[tokio::test]
    async fn test_missing_kid() {
        let verifier = SignatureVerifier::new(resolver(&[("abc", PRIMARY_CERT)]));
        let token = DecodedToken::parse(&signed(None)).unwrap();

        assert!(matches!(
            verifier.verify(&token).await,
            Err(VerifyError::MalformedToken(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_kid() {
        let verifier = SignatureVerifier::new(resolver(&[("abc", PRIMARY_CERT)]));
        let token = DecodedToken::parse(&signed(Some("other"))).unwrap();

        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            VerifyError::UnknownKey("other".to_string())
        );
    }

    #[tokio::test]
    async fn test_wrong_key_for_kid() {
        // kid names a certificate whose key did not sign the token
        let verifier = SignatureVerifier::new(resolver(&[("abc", ROTATED_CERT)]));
        let token = DecodedToken::parse(&signed(Some("abc"))).unwrap();

        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_disallowed_algorithms() {
        let verifier = SignatureVerifier::new(resolver(&[("abc", PRIMARY_CERT)]));
        let token = signed(Some("abc"));

        for alg in ["HS256", "RS384", "PS256", "ES256", "none", "rs256"] {
            let forged = with_header(&token, json!({"alg": alg, "kid": "abc"}));
            let decoded = DecodedToken::parse(&forged).unwrap();

            assert_eq!(
                verifier.verify(&decoded).await.unwrap_err(),
                VerifyError::UnsupportedAlgorithm(alg.to_string()),
                "{alg} must be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_header_tampering_breaks_signature() {
        let verifier = SignatureVerifier::new(resolver(&[("abc", PRIMARY_CERT)]));
        let token = signed(Some("abc"));

        let tampered = with_header(&token, json!({"alg": "RS256", "kid": "abc", "typ": "JWT", "x": 1}));
        let decoded = DecodedToken::parse(&tampered).unwrap();

        assert_eq!(
            verifier.verify(&decoded).await.unwrap_err(),
            VerifyError::InvalidSignature
        );
    }
}
