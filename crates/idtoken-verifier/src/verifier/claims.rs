//! Claims validation
//!
//! Checks run in a fixed order and the first failure is returned. Each check
//! is also exposed on its own so it can be exercised in isolation.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::config::ValidationConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::token::{Audience, TokenClaims};

/// Validates the claims of a token whose signature already verified
#[derive(Debug, Clone)]
pub struct ClaimsValidator {
    config: ValidationConfig,
}

impl ClaimsValidator {
    /// Create a validator with the given expectations
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// The expectations in use
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate against the current time
    ///
    /// # Errors
    ///
    /// Returns the first failing check's error.
    pub fn validate(&self, claims: &TokenClaims) -> VerifyResult<()> {
        self.validate_at(claims, unix_now())
    }

    /// Validate as of `now` (Unix seconds)
    ///
    /// # Errors
    ///
    /// Returns the first failing check's error, in order: expiration,
    /// issued-at, audience, issuer, subject.
    pub fn validate_at(&self, claims: &TokenClaims, now: u64) -> VerifyResult<()> {
        self.check_expiration(claims, now)?;
        self.check_issued_at(claims, now)?;
        self.check_audience(claims)?;
        self.check_issuer(claims)?;
        self.check_subject(claims)?;

        debug!(audience = %self.config.audience, "Token claims validated");
        Ok(())
    }

    /// `exp` must not be further in the past than the tolerated skew
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::ExpiredToken`] if expired or `exp` is absent.
    pub fn check_expiration(&self, claims: &TokenClaims, now: u64) -> VerifyResult<()> {
        let exp = claims.exp.ok_or(VerifyError::ExpiredToken)?;
        let skew = self.config.acceptable_exp_skew.as_secs();

        if now > exp.saturating_add(skew) {
            debug!(exp, now, skew, "Token expired");
            return Err(VerifyError::ExpiredToken);
        }
        Ok(())
    }

    /// `iat` must not be further in the future than the tolerated skew
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::TokenNotYetValid`] if issued in the future or
    /// `iat` is absent.
    pub fn check_issued_at(&self, claims: &TokenClaims, now: u64) -> VerifyResult<()> {
        let iat = claims.iat.ok_or(VerifyError::TokenNotYetValid)?;
        let skew = self.config.acceptable_exp_skew.as_secs();

        if iat > now.saturating_add(skew) {
            debug!(iat, now, skew, "Token issued in the future");
            return Err(VerifyError::TokenNotYetValid);
        }
        Ok(())
    }

    /// `aud` must be exactly the tenant id
    ///
    /// An audience array never matches, even one containing the tenant id.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::AudienceMismatch`].
    pub fn check_audience(&self, claims: &TokenClaims) -> VerifyResult<()> {
        let expected = &self.config.audience;

        match &claims.aud {
            Some(Audience::Single(aud)) if !expected.is_empty() && aud == expected => Ok(()),
            other => Err(VerifyError::AudienceMismatch {
                expected: expected.clone(),
                found: other.as_ref().map(ToString::to_string).unwrap_or_default(),
            }),
        }
    }

    /// `iss` must be exactly the issuer derived from the tenant id
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::IssuerMismatch`].
    pub fn check_issuer(&self, claims: &TokenClaims) -> VerifyResult<()> {
        let expected = &self.config.issuer;

        match claims.iss.as_deref() {
            Some(iss) if !self.config.audience.is_empty() && iss == expected => Ok(()),
            other => Err(VerifyError::IssuerMismatch {
                expected: expected.clone(),
                found: other.unwrap_or_default().to_string(),
            }),
        }
    }

    /// `sub` must be present and within the configured length, in characters
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidSubject`].
    pub fn check_subject(&self, claims: &TokenClaims) -> VerifyResult<()> {
        let sub = claims
            .sub
            .as_deref()
            .ok_or_else(|| VerifyError::InvalidSubject("missing 'sub' claim".to_string()))?;

        let len = sub.chars().count();
        if len < self.config.min_subject_len {
            return Err(VerifyError::InvalidSubject(format!(
                "subject shorter than {} characters",
                self.config.min_subject_len
            )));
        }
        if len > self.config.max_subject_len {
            return Err(VerifyError::InvalidSubject(format!(
                "subject longer than {} characters ({len})",
                self.config.max_subject_len
            )));
        }
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
