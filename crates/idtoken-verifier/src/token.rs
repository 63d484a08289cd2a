//! Token parsing and the verified token type
//!
//! [`DecodedToken::parse`] splits a compact JWS into its header and claims
//! and checks the signature segment's encoding, without trusting any of it. A [`VerifiedToken`] can only be
//! built by the verifier after both the signature and the claims checks
//! pass.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::{VerifyError, VerifyResult};

/// Tokens larger than this are rejected before decoding
pub const MAX_TOKEN_LEN: usize = 16 * 1024;

/// JOSE header fields the verifier looks at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Declared signing algorithm
    pub alg: String,

    /// Key identifier naming the certificate that signed the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Token type, normally `JWT`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// `aud` may be a single string or an array per RFC 7519
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience
    Single(String),
    /// Multiple audiences
    Many(Vec<String>),
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(aud) => f.write_str(aud),
            Self::Many(auds) => write!(f, "[{}]", auds.join(", ")),
        }
    }
}

/// Claims carried by an ID token
///
/// Registered claims are typed; provider-specific fields (`email`,
/// `firebase`, custom claims) land in `additional`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TokenClaims {
    /// Issuer (iss)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience (aud)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Subject (sub) - the provider's user id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issued At (iat) - Unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    /// Expiration Time (exp) - Unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    /// Time the end user authenticated - Unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<u64>,

    /// Everything else
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

/// A parsed but unverified token
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    raw: String,
    header: TokenHeader,
    claims: TokenClaims,
}

impl DecodedToken {
    /// Parse a compact JWS (`header.payload.signature`)
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::MalformedToken`] if the token is oversized, does
    /// not have exactly three non-empty segments, a segment is not base64url,
    /// or the header/payload is not the expected JSON.
    pub fn parse(token: &str) -> VerifyResult<Self> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(VerifyError::MalformedToken(format!(
                "token exceeds {MAX_TOKEN_LEN} bytes"
            )));
        }

        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(VerifyError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            ));
        };

        if header_b64.is_empty() || payload_b64.is_empty() || signature_b64.is_empty() {
            return Err(VerifyError::MalformedToken(
                "token segments must not be empty".to_string(),
            ));
        }

        let header_json = decode_segment(header_b64, "header")?;
        let payload_json = decode_segment(payload_b64, "payload")?;
        // Signature bytes are checked by jsonwebtoken against raw()
        decode_segment(signature_b64, "signature")?;

        let header: TokenHeader = serde_json::from_slice(&header_json)
            .map_err(|e| VerifyError::MalformedToken(format!("invalid header: {e}")))?;
        let claims: TokenClaims = serde_json::from_slice(&payload_json)
            .map_err(|e| VerifyError::MalformedToken(format!("invalid claims: {e}")))?;

        Ok(Self {
            raw: token.to_string(),
            header,
            claims,
        })
    }

    /// The token exactly as received
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// JOSE header
    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    /// Payload claims
    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// Key identifier from the header
    pub fn key_id(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }
}

fn decode_segment(segment: &str, name: &str) -> VerifyResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| VerifyError::MalformedToken(format!("invalid {name} encoding: {e}")))
}

/// A token whose signature and claims have both been checked
///
/// This is the only thing the verifier hands back on success.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedToken {
    token: DecodedToken,
}

impl VerifiedToken {
    pub(crate) fn new(token: DecodedToken) -> Self {
        Self { token }
    }

    /// Subject (`sub`), the provider's stable user id
    pub fn subject(&self) -> &str {
        // Presence and length are enforced by the claims validator
        self.token.claims.sub.as_deref().unwrap_or_default()
    }

    /// `user_id` claim, which Firebase sets equal to `sub`
    pub fn user_id(&self) -> Option<&str> {
        self.claim("user_id").and_then(serde_json::Value::as_str)
    }

    /// Issuer (`iss`)
    pub fn issuer(&self) -> &str {
        self.token.claims.iss.as_deref().unwrap_or_default()
    }

    /// Audience (`aud`)
    pub fn audience(&self) -> Option<&Audience> {
        self.token.claims.aud.as_ref()
    }

    /// Key id of the certificate that signed the token
    pub fn key_id(&self) -> &str {
        self.token.key_id().unwrap_or_default()
    }

    /// When the token was issued
    pub fn issued_at(&self) -> Option<SystemTime> {
        self.token.claims.iat.and_then(unix_time)
    }

    /// When the token expires
    ///
    /// `None` if `exp` is absent or too large to represent.
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.token.claims.exp.and_then(unix_time)
    }

    /// When the end user last authenticated
    pub fn auth_time(&self) -> Option<SystemTime> {
        self.token.claims.auth_time.and_then(unix_time)
    }

    /// `email` claim
    pub fn email(&self) -> Option<&str> {
        self.claim("email").and_then(serde_json::Value::as_str)
    }

    /// `email_verified` claim, `false` when absent
    pub fn email_verified(&self) -> bool {
        self.claim("email_verified")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// `firebase.sign_in_provider` (e.g. `password`, `google.com`)
    pub fn sign_in_provider(&self) -> Option<&str> {
        self.claim("firebase")
            .and_then(|firebase| firebase.get("sign_in_provider"))
            .and_then(serde_json::Value::as_str)
    }

    /// Any non-registered claim by name
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.token.claims.additional.get(name)
    }

    /// All claims
    pub fn claims(&self) -> &TokenClaims {
        &self.token.claims
    }

    /// JOSE header
    pub fn header(&self) -> &TokenHeader {
        &self.token.header
    }

    /// The token exactly as received
    pub fn as_str(&self) -> &str {
        self.token.raw()
    }
}

/// `None` when the timestamp is beyond what `SystemTime` can represent
fn unix_time(secs: u64) -> Option<SystemTime> {
    UNIX_EPOCH.checked_add(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    fn compact(header: &serde_json::Value, claims: &serde_json::Value) -> String {
        format!(
            "{}.{}.{}",
            encode(header),
            encode(claims),
            URL_SAFE_NO_PAD.encode(b"signature-bytes")
        )
    }

    #[test]
    fn test_parse_well_formed_token() {
        let token = compact(
            &json!({"alg": "RS256", "kid": "abc", "typ": "JWT"}),
            &json!({
                "iss": "https://securetoken.google.com/tenant1",
                "aud": "tenant1",
                "sub": "user42",
                "iat": 1_700_000_000u64,
                "exp": 1_700_003_600u64,
                "email": "user42@example.com",
            }),
        );

        let decoded = DecodedToken::parse(&token).unwrap();
        assert_eq!(decoded.header().alg, "RS256");
        assert_eq!(decoded.key_id(), Some("abc"));
        assert_eq!(decoded.claims().sub.as_deref(), Some("user42"));
        assert_eq!(
            decoded.claims().aud,
            Some(Audience::Single("tenant1".to_string()))
        );
        assert_eq!(decoded.claims().exp, Some(1_700_003_600));
        assert_eq!(
            decoded.claims().additional.get("email"),
            Some(&json!("user42@example.com"))
        );
    }

    #[test]
    fn test_missing_kid_still_parses() {
        let token = compact(&json!({"alg": "RS256"}), &json!({"sub": "u"}));
        let decoded = DecodedToken::parse(&token).unwrap();
        assert_eq!(decoded.key_id(), None);
    }

    #[test]
    fn test_wrong_segment_count() {
        for token in ["", "abc", "a.b", "a.b.c.d"] {
            assert!(
                matches!(DecodedToken::parse(token), Err(VerifyError::MalformedToken(_))),
                "{token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_empty_signature_rejected() {
        // alg=none style token
        let token = format!(
            "{}.{}.",
            encode(&json!({"alg": "none"})),
            encode(&json!({"sub": "u"}))
        );
        assert!(matches!(
            DecodedToken::parse(&token),
            Err(VerifyError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let token = format!("{}.!!!.{}", encode(&json!({"alg": "RS256"})), "c2ln");
        assert!(matches!(
            DecodedToken::parse(&token),
            Err(VerifyError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_non_json_header_rejected() {
        let token = format!(
            "{}.{}.c2ln",
            URL_SAFE_NO_PAD.encode(b"not json"),
            encode(&json!({"sub": "u"}))
        );
        assert!(matches!(
            DecodedToken::parse(&token),
            Err(VerifyError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_non_numeric_exp_rejected() {
        let token = compact(&json!({"alg": "RS256"}), &json!({"exp": "tomorrow"}));
        assert!(matches!(
            DecodedToken::parse(&token),
            Err(VerifyError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_oversized_token_rejected() {
        let token = "a".repeat(MAX_TOKEN_LEN + 1);
        assert!(matches!(
            DecodedToken::parse(&token),
            Err(VerifyError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_audience_array_parses() {
        let token = compact(
            &json!({"alg": "RS256"}),
            &json!({"aud": ["tenant1", "tenant2"]}),
        );
        let decoded = DecodedToken::parse(&token).unwrap();
        assert_eq!(
            decoded.claims().aud,
            Some(Audience::Many(vec![
                "tenant1".to_string(),
                "tenant2".to_string()
            ]))
        );
    }

    #[test]
    fn test_verified_token_accessors() {
        let token = compact(
            &json!({"alg": "RS256", "kid": "abc"}),
            &json!({
                "iss": "https://securetoken.google.com/tenant1",
                "aud": "tenant1",
                "sub": "user42",
                "user_id": "user42",
                "iat": 1_700_000_000u64,
                "exp": 1_700_003_600u64,
                "auth_time": 1_699_999_000u64,
                "email": "user42@example.com",
                "email_verified": true,
                "firebase": {"sign_in_provider": "password", "identities": {}},
            }),
        );
        let verified = VerifiedToken::new(DecodedToken::parse(&token).unwrap());

        assert_eq!(verified.subject(), "user42");
        assert_eq!(verified.user_id(), Some("user42"));
        assert_eq!(verified.key_id(), "abc");
        assert_eq!(verified.issuer(), "https://securetoken.google.com/tenant1");
        assert_eq!(verified.email(), Some("user42@example.com"));
        assert!(verified.email_verified());
        assert_eq!(verified.sign_in_provider(), Some("password"));
        assert_eq!(
            verified.expires_at(),
            Some(UNIX_EPOCH + Duration::from_secs(1_700_003_600))
        );
        assert_eq!(
            verified.auth_time(),
            Some(UNIX_EPOCH + Duration::from_secs(1_699_999_000))
        );
        assert_eq!(verified.as_str(), token);
    }

    #[test]
    fn test_out_of_range_timestamps() {
        let token = compact(
            &json!({"alg": "RS256", "kid": "abc"}),
            &json!({
                "sub": "user42",
                "iat": u64::MAX,
                "exp": u64::MAX,
                "auth_time": u64::MAX,
            }),
        );
        let verified = VerifiedToken::new(DecodedToken::parse(&token).unwrap());

        assert_eq!(verified.claims().exp, Some(u64::MAX));
        assert_eq!(verified.expires_at(), None);
        assert_eq!(verified.issued_at(), None);
        assert_eq!(verified.auth_time(), None);
    }
}
