//! Error types for ID token verification
//!
//! Every way a token can be refused has its own [`VerifyError`] variant so
//! callers can tell a rotated signing key (retryable) apart from a forged or
//! expired token (definitive). Nothing in this crate turns an error into a
//! partially trusted token.

use thiserror::Error;

/// Result alias used throughout the crate
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Token verification errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The token is not a well-formed three-segment JWS, or its header is
    /// missing a required field such as `kid`
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The token declares a signing algorithm other than RS256
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The key identifier is absent from the current key set.
    ///
    /// This happens legitimately during key rotation; refresh the
    /// certificate cache and verify again.
    #[error("Unknown signing key id: {0}")]
    UnknownKey(String),

    /// The provider's certificate document could not be retrieved or parsed
    #[error("Certificate fetch failed: {0}")]
    Fetch(String),

    /// The signature does not match the signing input under the resolved key
    #[error("Invalid token signature")]
    InvalidSignature,

    /// `exp` is in the past beyond the accepted clock skew, or missing
    #[error("Token expired")]
    ExpiredToken,

    /// `iat` is in the future beyond the accepted clock skew, or missing
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// `aud` does not equal the expected tenant identifier
    #[error("Audience mismatch: expected '{expected}', found '{found}'")]
    AudienceMismatch {
        /// The tenant identifier the caller asked for
        expected: String,
        /// The audience the token carries
        found: String,
    },

    /// `iss` does not equal the issuer derived from the tenant identifier
    #[error("Issuer mismatch: expected '{expected}', found '{found}'")]
    IssuerMismatch {
        /// The issuer derived from the tenant identifier
        expected: String,
        /// The issuer the token carries
        found: String,
    },

    /// `sub` is missing, empty, or longer than allowed
    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    /// The verifier could not be constructed from its configuration.
    ///
    /// Only returned by constructors, never by a verification call.
    #[error("Invalid verifier configuration: {0}")]
    Configuration(String),
}

impl VerifyError {
    /// Whether verifying the same token again may succeed after a cache
    /// refresh or once the provider endpoint is reachable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UnknownKey(_) | Self::Fetch(_))
    }

    /// Short, stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) => "malformed_token",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::UnknownKey(_) => "unknown_key",
            Self::Fetch(_) => "fetch",
            Self::InvalidSignature => "invalid_signature",
            Self::ExpiredToken => "expired_token",
            Self::TokenNotYetValid => "token_not_yet_valid",
            Self::AudienceMismatch { .. } => "audience_mismatch",
            Self::IssuerMismatch { .. } => "issuer_mismatch",
            Self::InvalidSubject(_) => "invalid_subject",
            Self::Configuration(_) => "configuration",
        }
    }
}

/// Shared cache backend errors
///
/// These never reach a verification caller: a failed read is treated as a
/// miss and a failed write is logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The backend could not be reached
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused or failed the operation
    #[error("Cache operation failed: {0}")]
    Backend(String),
}
