//! Prometheus metrics for declarative validation.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `declarative_validation_mismatch_total` | Counter | none |

use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use thiserror::Error;

pub const MISMATCH_METRIC_NAME: &str = "declarative_validation_mismatch_total";

/// Errors from registering or encoding metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Validation metrics registered on a caller-supplied registry.
///
/// Cheap to clone; clones share the same counters.
#[derive(Clone)]
pub struct ValidationMetrics {
    registry: Registry,
    mismatch_total: IntCounter,
}

impl ValidationMetrics {
    /// # Errors
    ///
    /// Fails if the counter is already registered on `registry`.
    pub fn new(registry: &Registry) -> MetricsResult<Self> {
        let mismatch_total = IntCounter::with_opts(Opts::new(
            MISMATCH_METRIC_NAME,
            "Number of times declarative and hand written validation results differed",
        ))?;
        registry.register(Box::new(mismatch_total.clone()))?;
        Ok(Self {
            registry: registry.clone(),
            mismatch_total,
        })
    }

    pub fn record_mismatch(&self) {
        self.mismatch_total.inc();
    }

    pub fn mismatch_count(&self) -> u64 {
        self.mismatch_total.get()
    }

    /// Prometheus text exposition of every metric on the registry.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}

impl std::fmt::Debug for ValidationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationMetrics")
            .field("mismatch_total", &self.mismatch_total.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_and_exposition() {
        let registry = Registry::new();
        let metrics = ValidationMetrics::new(&registry).unwrap();
        metrics.record_mismatch();
        metrics.clone().record_mismatch();
        assert_eq!(metrics.mismatch_count(), 2);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("declarative_validation_mismatch_total 2"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        ValidationMetrics::new(&registry).unwrap();
        assert!(matches!(
            ValidationMetrics::new(&registry),
            Err(MetricsError::RegistrationFailed(_))
        ));
    }
}
