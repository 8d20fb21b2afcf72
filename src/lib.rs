//! Self-hosted web analytics: classify incoming HTTP requests into labelled
//! events, store them as time series and aggregate them into reports.

pub mod api;
pub mod classifier;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod geo;
pub mod histogram;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod query;
pub mod recorder;
pub mod request;
pub mod storage;
pub mod timeframe;
pub mod tracker;
pub mod user_agent;

pub use crate::config::TrackerOptions;
pub use crate::dashboard::{Dashboard, Report, StatSpec};
pub use crate::error::{FootfallError, Result};
pub use crate::models::{not_equal, AggregatedMetric, AggregationMethod, Metric, MetricLabels};
pub use crate::query::{group_by_label, group_by_route};
pub use crate::request::TrackedRequest;
pub use crate::tracker::Tracker;
