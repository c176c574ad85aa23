//! Metrics sink with a discard default.
//!
//! The engine reports a small fixed vocabulary of counters, gauges and
//! histograms. Consumers plug in a collector through
//! [`ClientConfig`](crate::config::ClientConfig); without one, everything
//! goes to [`NoOpMetrics`].

/// Sink for engine metrics.
pub trait MetricsCollector: Send + Sync {
    /// Increments a named counter.
    fn incr_counter(&self, name: &'static str, value: u64);

    /// Records the current value of a named gauge.
    fn record_gauge(&self, name: &'static str, value: f64);

    /// Records one observation into a named histogram.
    fn observe_histogram(&self, name: &'static str, value: f64);
}

/// A [`MetricsCollector`] that discards all metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsCollector for NoOpMetrics {
    fn incr_counter(&self, _name: &'static str, _value: u64) {}

    fn record_gauge(&self, _name: &'static str, _value: f64) {}

    fn observe_histogram(&self, _name: &'static str, _value: f64) {}
}
