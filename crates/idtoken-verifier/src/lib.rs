//! # idtoken-verifier - Firebase / securetoken ID token verification
//!
//! Verifies RS256 ID tokens issued by Google's securetoken service (Firebase
//! Authentication) for a given project / tenant id. The provider's signing
//! certificates are fetched over HTTPS and kept in an injected shared
//! key-value cache so that many processes can share one copy.
//!
//! ## Architecture
//!
//! - [`verifier`] - the pipeline: parse, signature, claims
//! - [`certs`] - certificate document fetching, key sets and the certificate cache
//! - [`cache`] - the [`SharedCache`] seam and an in-process implementation
//! - [`token`] - token structure and the [`VerifiedToken`] handed back on success
//! - [`config`] - [`VerifierConfig`] and per-call [`ValidationConfig`]
//! - [`error`] - the [`VerifyError`] taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use idtoken_verifier::{MemoryCache, TokenVerifier, VerifierConfig, VerifyError};
//!
//! # tokio_test::block_on(async {
//! let verifier = TokenVerifier::new(VerifierConfig::default(), Arc::new(MemoryCache::new()))?;
//!
//! match verifier.verify_token("my-project", "eyJhbGciOi...").await {
//!     Ok(token) => println!("user {}", token.subject()),
//!     Err(VerifyError::ExpiredToken) => println!("please sign in again"),
//!     Err(e) => println!("rejected: {e}"),
//! }
//! # Ok::<(), VerifyError>(())
//! # });
//! ```
//!
//! ## Guarantees
//!
//! - Only RS256 is accepted; the token's `alg` never selects the algorithm.
//! - `aud` must equal the tenant id and `iss` must equal
//!   `https://securetoken.google.com/<tenant id>`, both exactly.
//! - `exp` and `iat` are checked with a clock skew (300 seconds by default).
//! - Cached certificates are trusted until the expiration the provider's
//!   `Cache-Control` allowed at fetch time, never longer.
//! - Shared cache failures only cost an extra fetch; they never fail or pass
//!   a verification on their own.
//!
//! ## Feature Flags
//!
//! - `metrics` - counters and histograms via the `metrics` facade

pub mod cache;
pub mod certs;
pub mod config;
pub mod error;
pub mod metrics;
pub mod token;
pub mod verifier;

pub use cache::{MemoryCache, SharedCache};
pub use certs::{CertificateCache, CertificateStore, KeyResolver, KeySet, PublicKey};
pub use config::{ValidationConfig, VerifierConfig};
pub use error::{CacheError, VerifyError, VerifyResult};
pub use metrics::init_metrics;
pub use token::{Audience, TokenClaims, VerifiedToken};
pub use verifier::{ClaimsValidator, TokenVerifier};
