//! Request metrics for a provider executor.
//!
//! Each executor owns its own counters so concurrent runs against different
//! providers do not mix their numbers.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters for requests sent by one executor.
#[derive(Debug, Default)]
pub struct TranslationMetrics {
    /// Number of HTTP requests sent to the provider
    api_calls: AtomicUsize,

    /// Number of backoff retries after transient failures
    retries: AtomicUsize,

    /// Number of 429 responses received
    rate_limited: AtomicUsize,

    /// Number of OAuth recoveries after a 401
    reauthentications: AtomicUsize,

    /// Number of requests that ended in an error
    failures: AtomicUsize,
}

impl TranslationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_api_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reauthentication(&self) {
        self.reauthentications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn api_calls(&self) -> usize {
        self.api_calls.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn rate_limited(&self) -> usize {
        self.rate_limited.load(Ordering::Relaxed)
    }

    pub fn reauthentications(&self) -> usize {
        self.reauthentications.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    /// Generate a metrics report.
    ///
    /// The failure rate is relative to logical requests (API calls minus
    /// retries and re-sends), so a request that needed three attempts and
    /// then succeeded counts as one success.
    pub fn report(&self) -> MetricsReport {
        let calls = self.api_calls();
        let retries = self.retries();
        let rate_limited = self.rate_limited();
        let reauthentications = self.reauthentications();
        let failures = self.failures();

        let logical = calls.saturating_sub(retries + rate_limited + reauthentications);
        let failure_rate = if logical > 0 {
            (failures.min(logical) as f64 / logical as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            api_calls: calls,
            retries,
            rate_limited,
            reauthentications,
            failures,
            failure_rate,
        }
    }
}

/// Snapshot of an executor's counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub api_calls: usize,
    pub retries: usize,
    pub rate_limited: usize,
    pub reauthentications: usize,
    pub failures: usize,

    /// Failed logical requests as a percentage (0-100)
    pub failure_rate: f64,
}
