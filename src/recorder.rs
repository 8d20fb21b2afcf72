//! Write path: appends classified events and request durations.

use std::future::Future;
use std::time::Instant;

use tracing::{debug, warn};

use crate::classifier::merge_labels;
use crate::metrics;
use crate::models::*;
use crate::request::TrackedRequest;
use crate::tracker::Tracker;
use crate::Result;

impl Tracker {
    /// Appends one point stamped with the current second.
    pub fn track(&self, metric: &str, labels: &MetricLabels, value: f64) -> Result<()> {
        let mut labels = labels.clone();
        labels.insert(METRIC_NAME_LABEL.to_string(), metric.to_string());

        let ts = chrono::Utc::now().timestamp();
        match self.store.append(&labels, ts, value) {
            Ok(()) => {
                metrics::record_event();
                Ok(())
            }
            Err(e) => {
                metrics::record_append_failure();
                warn!("Failed to append {} point: {}", metric, e);
                Err(e)
            }
        }
    }

    pub fn track_one(&self, metric: &str, labels: &MetricLabels) -> Result<()> {
        self.track(metric, labels, 1.0)
    }

    /// Classifies `req` and appends a point carrying `labels` merged under
    /// the request labels. Returns whether a point was written; events
    /// dropped by policy are not an error.
    pub fn track_with_request(
        &self,
        metric: &str,
        labels: &MetricLabels,
        value: f64,
        req: &TrackedRequest,
    ) -> Result<bool> {
        let classified = self.classify(req, labels);
        if let Some(reason) = classified.dropped {
            debug!(reason = reason.as_str(), path = %req.path, "Dropping {} event", metric);
            metrics::record_drop(reason.as_str());
            return Ok(false);
        }

        self.track(metric, &classified.labels, value)?;
        Ok(true)
    }

    pub fn record_occurrence(
        &self,
        metric: &str,
        labels: &MetricLabels,
        req: &TrackedRequest,
    ) -> Result<bool> {
        self.track_with_request(metric, labels, 1.0, req)
    }

    /// Records one HTTP request occurrence.
    pub fn track_request(&self, req: &TrackedRequest) -> Result<bool> {
        self.record_occurrence(HTTP_REQ_METRIC, &MetricLabels::new(), req)
    }

    /// Runs `work` and records its wall-clock duration in fractional
    /// milliseconds. The point is written once `work` returns or unwinds;
    /// whatever `work` returns is handed back untouched.
    pub fn measure_duration<T>(&self, req: &TrackedRequest, work: impl FnOnce() -> T) -> T {
        let _guard = DurationGuard::new(self, req);
        work()
    }

    /// Async counterpart of [`measure_duration`](Tracker::measure_duration).
    /// A future dropped before completion still records the time it ran.
    pub async fn measure_future<F: Future>(&self, req: &TrackedRequest, fut: F) -> F::Output {
        let _guard = DurationGuard::new(self, req);
        fut.await
    }
}

struct DurationGuard<'a> {
    tracker: &'a Tracker,
    labels: MetricLabels,
    start: Instant,
}

impl<'a> DurationGuard<'a> {
    fn new(tracker: &'a Tracker, req: &TrackedRequest) -> Self {
        let request: MetricLabels = [
            (HTTP_METHOD_LABEL, &req.method),
            (HTTP_PATH_LABEL, &req.path),
            (HTTP_ROUTE_LABEL, &req.route),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect();
        let labels = merge_labels([request]);

        Self {
            tracker,
            labels,
            start: Instant::now(),
        }
    }
}

impl Drop for DurationGuard<'_> {
    fn drop(&mut self) {
        // as_millis() would truncate to whole milliseconds
        let ms = self.start.elapsed().as_nanos() as f64 / 1e6;
        let _ = self
            .tracker
            .track(HTTP_REQ_DURATION_METRIC, &self.labels, ms);
    }
}
