//! Process-wide counters describing the tracker itself, exported in the
//! prometheus text format.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    pub static ref EVENTS_RECORDED: IntCounter = register_int_counter!(
        "footfall_events_recorded_total",
        "Total number of events appended to the label store"
    ).unwrap();

    pub static ref EVENTS_DROPPED: IntCounterVec = register_int_counter_vec!(
        "footfall_events_dropped_total",
        "Total number of events discarded by the tracking policy",
        &["reason"]
    ).unwrap();

    pub static ref STORAGE_APPEND_FAILURES: IntCounter = register_int_counter!(
        "footfall_storage_append_failures_total",
        "Total number of failed appends to the label store"
    ).unwrap();

    pub static ref QUERY_DURATION: Histogram = register_histogram!(
        "footfall_query_duration_seconds",
        "Time spent reading from the label store",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();
}

pub fn record_event() {
    EVENTS_RECORDED.inc();
}

pub fn record_drop(reason: &str) {
    EVENTS_DROPPED.with_label_values(&[reason]).inc();
}

pub fn record_append_failure() {
    STORAGE_APPEND_FAILURES.inc();
}

/// Observes the time until drop into [`QUERY_DURATION`].
pub struct QueryTimer {
    start: Instant,
}

impl QueryTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for QueryTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        QUERY_DURATION.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Encodes every metric of the default registry.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_tracker_metrics() {
        record_event();
        record_drop("bot");
        drop(QueryTimer::new());

        let text = render();
        assert!(text.contains("footfall_events_recorded_total"));
        assert!(text.contains("footfall_events_dropped_total{reason=\"bot\"}"));
        assert!(text.contains("footfall_query_duration_seconds"));
    }
}
