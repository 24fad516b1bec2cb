//! Validation metrics
//!
//! Enable with the `metrics` feature flag. Requires a `metrics` recorder
//! to be installed (e.g., via `metrics-exporter-prometheus`). Without the
//! feature every recorder is a no-op.
//!
//! ## Metrics Provided
//!
//! - `issuergate_validations_total` - Counter (labels: issuer, outcome)
//! - `issuergate_backwards_verifications_total` - Counter (labels: issuer, result)
//!   where result is `cache_hit`, `confirmed`, `rejected`, `degraded` or `unreachable`
//! - `issuergate_validation_duration_seconds` - Histogram (labels: issuer)
//!
//! `outcome` is `success` or an error kind such as `signature_invalid`.

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Initialize metric descriptions. Idempotent.
///
/// ```rust
/// issuergate_auth::init_auth_metrics();
/// ```
#[cfg(feature = "metrics")]
pub fn init_auth_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "issuergate_validations_total",
            "Token validations by issuer and outcome"
        );
        describe_counter!(
            "issuergate_backwards_verifications_total",
            "Backwards verification results, including cache hits and degraded fallbacks"
        );
        describe_histogram!(
            "issuergate_validation_duration_seconds",
            "Token validation duration in seconds"
        );
    });
}

#[cfg(feature = "metrics")]
pub(crate) fn record_validation(issuer: &str, outcome: &'static str) {
    counter!(
        "issuergate_validations_total",
        "issuer" => issuer.to_owned(),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(feature = "metrics")]
pub(crate) fn record_backwards_verification(issuer: &str, result: &'static str) {
    counter!(
        "issuergate_backwards_verifications_total",
        "issuer" => issuer.to_owned(),
        "result" => result
    )
    .increment(1);
}

#[cfg(feature = "metrics")]
pub(crate) fn record_validation_duration(issuer: &str, duration_seconds: f64) {
    histogram!(
        "issuergate_validation_duration_seconds",
        "issuer" => issuer.to_owned()
    )
    .record(duration_seconds);
}

// No-op versions when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub fn init_auth_metrics() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_validation(_issuer: &str, _outcome: &'static str) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_backwards_verification(_issuer: &str, _result: &'static str) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_validation_duration(_issuer: &str, _duration_seconds: f64) {}
