//! Metrics collection and reporting
//!
//! Tracks command volume, clock progress, audit-trail throughput and
//! store failures. Counters are lock-free atomics; a snapshot can be
//! rendered as Prometheus text for the `/metrics` endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Central metrics collector for the service
#[derive(Debug)]
pub struct MetricsCollector {
    /// Control commands accepted for processing
    commands: AtomicU64,
    /// Clock ticks handled
    ticks: AtomicU64,
    /// Detail rows written to the store
    details_written: AtomicU64,
    /// Store appends or amendments that failed
    store_errors: AtomicU64,
    /// Long-poll status requests served
    long_polls: AtomicU64,
    /// Start time for uptime reporting
    start_time: Instant,
}

impl MetricsCollector {
    /// Create a new collector
    #[must_use]
    pub fn new() -> Self {
        Self {
            commands: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            details_written: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            long_polls: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record an accepted control command
    pub fn record_command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handled clock tick
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `count` detail rows written this tick
    pub fn record_details(&self, count: u64) {
        self.details_written.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a failed store write
    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a served long-poll request
    pub fn record_long_poll(&self) {
        self.long_polls.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of metrics
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands: self.commands.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            details_written: self.details_written.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            long_polls: self.long_polls.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Render the current counters in Prometheus text format
    #[must_use]
    pub fn prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            "# HELP climatizar_commands_total Control commands accepted\n\
             # TYPE climatizar_commands_total counter\n\
             climatizar_commands_total {}\n\
             # HELP climatizar_ticks_total Clock ticks handled\n\
             # TYPE climatizar_ticks_total counter\n\
             climatizar_ticks_total {}\n\
             # HELP climatizar_details_written_total Detail rows persisted\n\
             # TYPE climatizar_details_written_total counter\n\
             climatizar_details_written_total {}\n\
             # HELP climatizar_store_errors_total Failed store writes\n\
             # TYPE climatizar_store_errors_total counter\n\
             climatizar_store_errors_total {}\n\
             # HELP climatizar_long_polls_total Long-poll requests served\n\
             # TYPE climatizar_long_polls_total counter\n\
             climatizar_long_polls_total {}\n\
             # HELP climatizar_uptime_seconds Service uptime\n\
             # TYPE climatizar_uptime_seconds gauge\n\
             climatizar_uptime_seconds {}\n",
            s.commands, s.ticks, s.details_written, s.store_errors, s.long_polls, s.uptime_secs,
        )
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the collected counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Control commands accepted
    pub commands: u64,
    /// Clock ticks handled
    pub ticks: u64,
    /// Detail rows written
    pub details_written: u64,
    /// Failed store writes
    pub store_errors: u64,
    /// Long-poll requests served
    pub long_polls: u64,
    /// Seconds since the collector was created
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.record_command();
        metrics.record_command();
        metrics.record_tick();
        metrics.record_details(4);
        metrics.record_store_error();
        metrics.record_long_poll();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.commands, 2);
        assert_eq!(snapshot.ticks, 1);
        assert_eq!(snapshot.details_written, 4);
        assert_eq!(snapshot.store_errors, 1);
        assert_eq!(snapshot.long_polls, 1);
    }

    #[test]
    fn test_prometheus_rendering() {
        let metrics = MetricsCollector::new();
        metrics.record_command();
        let text = metrics.prometheus();
        assert!(text.contains("climatizar_commands_total 1"));
        assert!(text.contains("# TYPE climatizar_ticks_total counter"));
    }
}
