//! Verification metrics
//!
//! Enable with the `metrics` feature flag. Requires a `metrics` recorder
//! to be installed (e.g., via `metrics-exporter-prometheus`).
//!
//! ## Metrics Provided
//!
//! - `idtoken_verifications_total` - Counter for verification outcomes (labels: status, reason)
//! - `idtoken_verification_duration_seconds` - Histogram for verification duration
//! - `idtoken_cert_cache_total` - Counter for certificate cache reads (labels: result)
//! - `idtoken_cert_cache_write_failures_total` - Counter for dropped cache writes
//! - `idtoken_cert_fetches_total` - Counter for certificate fetches (labels: status)

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Initialize metric descriptions. Call once at startup.
///
/// Idempotent; only the first call registers the descriptions.
#[cfg(feature = "metrics")]
pub fn init_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "idtoken_verifications_total",
            "Total token verifications (success and failure)"
        );
        describe_histogram!(
            "idtoken_verification_duration_seconds",
            "Token verification duration in seconds"
        );
        describe_counter!(
            "idtoken_cert_cache_total",
            "Certificate cache reads by result (hit, miss, stale, error)"
        );
        describe_counter!(
            "idtoken_cert_cache_write_failures_total",
            "Certificate cache writes that failed and were dropped"
        );
        describe_counter!(
            "idtoken_cert_fetches_total",
            "Certificate document fetches"
        );
    });
}

/// Record a verification outcome
///
/// `reason` is the error kind, or `"ok"`.
#[cfg(feature = "metrics")]
pub(crate) fn record_verification(reason: &'static str, duration_seconds: f64) {
    let status = if reason == "ok" { "success" } else { "failure" };
    counter!(
        "idtoken_verifications_total",
        "status" => status,
        "reason" => reason
    )
    .increment(1);
    histogram!("idtoken_verification_duration_seconds").record(duration_seconds);
}

/// Record a certificate cache read
#[cfg(feature = "metrics")]
pub(crate) fn record_cert_cache(result: &'static str) {
    counter!("idtoken_cert_cache_total", "result" => result).increment(1);
}

/// Record a dropped certificate cache write
#[cfg(feature = "metrics")]
pub(crate) fn record_cert_cache_write_failure() {
    counter!("idtoken_cert_cache_write_failures_total").increment(1);
}

/// Record a certificate fetch
#[cfg(feature = "metrics")]
pub(crate) fn record_cert_fetch(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("idtoken_cert_fetches_total", "status" => status).increment(1);
}

// No-op versions when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub fn init_metrics() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_verification(_reason: &'static str, _duration_seconds: f64) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_cert_cache(_result: &'static str) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_cert_cache_write_failure() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_cert_fetch(_success: bool) {}
