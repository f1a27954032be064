//! Reload metrics tracking using OpenTelemetry.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::time::Instant;

/// Metrics collector for reload operations.
///
/// Tracks reload attempts and their outcomes, reload latency, the current
/// generation and the number of callbacks dispatched.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_flags::metrics::ReloadMetrics;
/// use opentelemetry::global;
///
/// let metrics = ReloadMetrics::new(global::meter("hotswap-flags"));
///
/// let timer = metrics.start_reload();
/// // ... perform reload ...
/// metrics.record_reload_success(timer, 2, 3);
/// ```
#[derive(Clone)]
pub struct ReloadMetrics {
    reload_attempts: Counter<u64>,
    reload_success: Counter<u64>,
    reload_unchanged: Counter<u64>,
    reload_failures: Counter<u64>,
    reload_duration: Histogram<f64>,
    generation: Gauge<u64>,
    callbacks_dispatched: Counter<u64>,
}

impl ReloadMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let reload_attempts = meter
            .u64_counter("hotswap_flags.reload.attempts")
            .with_description("Total number of reload attempts")
            .build();

        let reload_success = meter
            .u64_counter("hotswap_flags.reload.success")
            .with_description("Number of reloads that changed at least one flag")
            .build();

        let reload_unchanged = meter
            .u64_counter("hotswap_flags.reload.unchanged")
            .with_description("Number of reloads that changed nothing")
            .build();

        let reload_failures = meter
            .u64_counter("hotswap_flags.reload.failures")
            .with_description("Number of failed reloads")
            .build();

        let reload_duration = meter
            .f64_histogram("hotswap_flags.reload.duration")
            .with_description("Duration of reload operations in seconds")
            .with_unit("s")
            .build();

        let generation = meter
            .u64_gauge("hotswap_flags.generation")
            .with_description("Current flag generation")
            .build();

        let callbacks_dispatched = meter
            .u64_counter("hotswap_flags.callbacks.dispatched")
            .with_description("Number of flag change callbacks started")
            .build();

        Self {
            reload_attempts,
            reload_success,
            reload_unchanged,
            reload_failures,
            reload_duration,
            generation,
            callbacks_dispatched,
        }
    }

    /// Start a reload operation timer.
    pub fn start_reload(&self) -> Instant {
        self.reload_attempts.add(1, &[]);
        Instant::now()
    }

    /// Record a reload that committed changes.
    pub fn record_reload_success(&self, start: Instant, generation: u64, callbacks: usize) {
        self.reload_success.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
        self.generation.record(generation, &[]);
        self.callbacks_dispatched.add(callbacks as u64, &[]);
    }

    /// Record a reload that parsed cleanly but changed nothing.
    pub fn record_reload_unchanged(&self, start: Instant) {
        self.reload_unchanged.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a failed reload operation.
    pub fn record_reload_failure(&self, start: Instant) {
        self.reload_failures.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
    }
}
