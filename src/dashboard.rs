//! Declarative dashboard: a list of stat queries and the report they load.
//!
//! A [`Dashboard`] is a template. [`Dashboard::load`] runs it against a
//! tracker and returns a fresh [`Report`]; the declaration itself is never
//! modified, so one value can serve any number of concurrent requests.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::FootfallError;
use crate::models::*;
use crate::query::{group_by_label, group_by_route};
use crate::timeframe;
use crate::tracker::Tracker;
use crate::Result;

pub type GroupFn = Arc<dyn Fn(&Metric) -> String + Send + Sync>;
pub type LabelFormatter = Arc<dyn Fn(&AggregatedMetric) -> String + Send + Sync>;

/// One table on the dashboard.
#[derive(Clone)]
pub struct StatSpec {
    pub title: String,
    pub unit_label: String,
    pub count_label: String,

    pub metric: String,
    pub label: Option<String>,
    pub group_by: Option<GroupFn>,
    pub filters: MetricLabels,
    pub by_visitor: bool,
    pub aggregate_by: AggregationMethod,
    pub exclude_bots: bool,

    pub format_label: Option<LabelFormatter>,
}

impl fmt::Debug for StatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatSpec")
            .field("title", &self.title)
            .field("metric", &self.metric)
            .field("label", &self.label)
            .field("group_by", &self.group_by.is_some())
            .field("filters", &self.filters)
            .field("by_visitor", &self.by_visitor)
            .field("aggregate_by", &self.aggregate_by)
            .field("exclude_bots", &self.exclude_bots)
            .finish()
    }
}

impl StatSpec {
    pub fn new(title: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            unit_label: String::new(),
            count_label: String::new(),
            metric: metric.into(),
            label: None,
            group_by: None,
            filters: MetricLabels::new(),
            by_visitor: false,
            aggregate_by: AggregationMethod::Count,
            exclude_bots: false,
            format_label: None,
        }
    }

    pub fn with_units(mut self, unit: impl Into<String>, count: impl Into<String>) -> Self {
        self.unit_label = unit.into();
        self.count_label = count.into();
        self
    }

    pub fn by_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn group_by<F>(mut self, f: F) -> Self
    where
        F: Fn(&Metric) -> String + Send + Sync + 'static,
    {
        self.group_by = Some(Arc::new(f));
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn by_visitor(mut self) -> Self {
        self.by_visitor = true;
        self
    }

    pub fn aggregate_by(mut self, method: AggregationMethod) -> Self {
        self.aggregate_by = method;
        self
    }

    pub fn excluding_bots(mut self) -> Self {
        self.exclude_bots = true;
        self
    }

    pub fn format_label<F>(mut self, f: F) -> Self
    where
        F: Fn(&AggregatedMetric) -> String + Send + Sync + 'static,
    {
        self.format_label = Some(Arc::new(f));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.metric.is_empty() {
            return Err(FootfallError::Validation(format!(
                "stat '{}' is missing a metric",
                self.title
            )));
        }

        match (&self.label, &self.group_by) {
            (None, None) => Err(FootfallError::Validation(format!(
                "stat '{}' needs a grouping label or a grouping function",
                self.title
            ))),
            (Some(_), Some(_)) => Err(FootfallError::Validation(format!(
                "stat '{}' sets both a grouping label and a grouping function",
                self.title
            ))),
            _ => Ok(()),
        }
    }

    /// Runs the stat's query over `[start, end)`.
    pub fn run(&self, tracker: &Tracker, start: i64, end: i64) -> Result<Vec<AggregatedMetric>> {
        self.validate()?;

        let filters = self.effective_filters();
        let mut data = match (&self.label, &self.group_by) {
            (Some(label), _) if self.by_visitor => tracker
                .count_distinct_by_visitor_and_label(&self.metric, label, &filters, start, end)?,
            (Some(label), _) => tracker.aggregate_distinct(
                &self.metric,
                group_by_label(label),
                &filters,
                self.aggregate_by,
                start,
                end,
            )?,
            (None, Some(group_by)) if self.by_visitor => tracker
                .count_distinct_by_visitor(&self.metric, group_by.as_ref(), &filters, start, end)?,
            (None, Some(group_by)) => tracker.aggregate_distinct(
                &self.metric,
                group_by.as_ref(),
                &filters,
                self.aggregate_by,
                start,
                end,
            )?,
            (None, None) => Vec::new(),
        };

        if let Some(format) = &self.format_label {
            for row in data.iter_mut() {
                row.label = format(row);
            }
        }

        Ok(data)
    }

    fn effective_filters(&self) -> MetricLabels {
        let mut filters = self.filters.clone();
        if self.exclude_bots {
            filters.insert(not_equal(BROWSER_FORM_FACTOR_LABEL), FORM_FACTOR_BOT.to_string());
        }
        filters
    }
}

/// Bar of a time-bucketed chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChartData {
    pub timestamp: i64,
    pub value: i64,
    /// Share of the tallest bar, 0 to 100.
    pub percent: f64,
}

/// Current value next to the value of the preceding period of equal length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub current: i64,
    pub previous: i64,
    /// `(current - previous) / previous * 100`; absent when there is no
    /// previous value to compare against. The preceding period is only an
    /// approximation for calendar windows such as `mtd`.
    pub percent_change: Option<f64>,
}

impl Trend {
    pub fn new(current: i64, previous: i64) -> Self {
        let percent_change = if previous == 0 {
            None
        } else {
            Some((current - previous) as f64 / previous as f64 * 100.0)
        };

        Self {
            current,
            previous,
            percent_change,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub data: Vec<BarChartData>,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatReport {
    pub title: String,
    pub unit_label: String,
    pub count_label: String,
    pub data: Vec<AggregatedMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub title: String,
    pub start: i64,
    pub end: i64,
    pub visitors: Chart,
    pub views: Chart,
    pub rows: Vec<Vec<StatReport>>,
}

#[derive(Debug, Clone)]
pub struct Dashboard {
    pub title: String,
    pub rows: Vec<Vec<StatSpec>>,
}

impl Dashboard {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<StatSpec>) -> Self {
        self.rows.push(row);
        self
    }

    /// Loads the report for a named timeframe, see [`timeframe::resolve`].
    pub fn load_timeframe(&self, tracker: &Tracker, token: &str) -> Report {
        let (start, end) = timeframe::resolve_now(token);
        self.load(tracker, start, end)
    }

    /// Runs every chart and stat over `[start, end)`. Failures are reported
    /// on the affected stat and never abort the others.
    pub fn load(&self, tracker: &Tracker, start: i64, end: i64) -> Report {
        let prev_start = start - (end - start);
        let humans = MetricLabels::from([(
            not_equal(BROWSER_FORM_FACTOR_LABEL),
            FORM_FACTOR_BOT.to_string(),
        )]);

        let visitors = tracker.visitors_histogram(HTTP_REQ_METRIC, &humans, start, end);
        let prev_visitors = tracker
            .count_visitors(HTTP_REQ_METRIC, &humans, prev_start, start)
            .unwrap_or_else(|e| {
                warn!("Failed to count visitors of the previous period: {}", e);
                0
            });

        let views = tracker.count_histogram(HTTP_REQ_METRIC, start, end);
        let prev_views = tracker
            .count(HTTP_REQ_METRIC, prev_start, start)
            .unwrap_or_else(|e| {
                warn!("Failed to count views of the previous period: {}", e);
                0
            });

        let rows = self
            .rows
            .iter()
            .map(|row| row.iter().map(|stat| load_stat(tracker, stat, start, end)).collect())
            .collect();

        Report {
            title: self.title.clone(),
            start,
            end,
            visitors: chart(&visitors, prev_visitors as i64),
            views: chart(&views, prev_views as i64),
            rows,
        }
    }
}

fn load_stat(tracker: &Tracker, stat: &StatSpec, start: i64, end: i64) -> StatReport {
    let (data, error) = match stat.run(tracker, start, end) {
        Ok(data) => {
            debug!(stat = %stat.title, rows = data.len(), "Loaded dashboard stat");
            (data, None)
        }
        Err(e) => {
            warn!("Error while running dashboard query {}: {}", stat.title, e);
            (Vec::new(), Some(e.to_string()))
        }
    };

    StatReport {
        title: stat.title.clone(),
        unit_label: stat.unit_label.clone(),
        count_label: stat.count_label.clone(),
        data,
        error,
    }
}

fn chart(buckets: &[Bucket], previous: i64) -> Chart {
    let total: i64 = buckets.iter().map(|(_, v)| v).sum();
    let max = buckets.iter().map(|(_, v)| *v).max().unwrap_or(0);

    let data = buckets
        .iter()
        .map(|&(timestamp, value)| BarChartData {
            timestamp,
            value,
            percent: if max > 0 {
                value as f64 / max as f64 * 100.0
            } else {
                0.0
            },
        })
        .collect();

    Chart {
        data,
        trend: Trend::new(total, previous),
    }
}

/// Prefixes a two-letter country code with its flag, `CH` becomes `🇨🇭 CH`.
/// Anything else is returned as is.
pub fn country_flag(row: &AggregatedMetric) -> String {
    let cc = row.label.as_bytes();
    if cc.len() != 2 || !cc.iter().all(u8::is_ascii_uppercase) {
        return row.label.clone();
    }

    let flag: String = cc
        .iter()
        .filter_map(|&c| char::from_u32(0x1F1E6 + (c - b'A') as u32))
        .collect();
    format!("{} {}", flag, row.label)
}

pub fn form_factor_label(row: &AggregatedMetric) -> String {
    match row.label.as_str() {
        FORM_FACTOR_BOT => "🤖 Bot".to_string(),
        FORM_FACTOR_MOBILE => "📱 Mobile".to_string(),
        FORM_FACTOR_TABLET => "💻 Tablet".to_string(),
        FORM_FACTOR_DESKTOP => "🖥️ Desktop".to_string(),
        other => other.to_string(),
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Dashboard::new("App stats")
            .with_row(vec![
                StatSpec::new("Top pages", HTTP_REQ_METRIC)
                    .with_units("Page", "Visitors")
                    .by_label(HTTP_PATH_LABEL)
                    .by_visitor()
                    .excluding_bots(),
                StatSpec::new("Top referrals", HTTP_REQ_METRIC)
                    .with_units("Site", "Visitors")
                    .by_label(REFERRER_DOMAIN_LABEL)
                    .by_visitor()
                    .excluding_bots(),
                StatSpec::new("Top locations", HTTP_REQ_METRIC)
                    .with_units("Country", "Visitors")
                    .by_label(COUNTRY_LABEL)
                    .by_visitor()
                    .excluding_bots()
                    .format_label(country_flag),
            ])
            .with_row(vec![
                StatSpec::new("Top form factors", HTTP_REQ_METRIC)
                    .with_units("Form factor", "Visitors")
                    .by_label(BROWSER_FORM_FACTOR_LABEL)
                    .by_visitor()
                    .format_label(form_factor_label),
                StatSpec::new("Top browsers", HTTP_REQ_METRIC)
                    .with_units("Browser", "Visitors")
                    .by_label(BROWSER_NAME_LABEL)
                    .by_visitor()
                    .excluding_bots(),
                StatSpec::new("Top operating systems", HTTP_REQ_METRIC)
                    .with_units("Operating system", "Visitors")
                    .by_label(BROWSER_OS_LABEL)
                    .by_visitor()
                    .excluding_bots(),
            ])
            .with_row(vec![
                StatSpec::new("Top routes", HTTP_REQ_METRIC)
                    .with_units("Route", "Visitors")
                    .by_label(HTTP_ROUTE_LABEL)
                    .by_visitor(),
                StatSpec::new("Slowest routes", HTTP_REQ_DURATION_METRIC)
                    .with_units("Route", "avg ms")
                    .group_by(group_by_route)
                    .aggregate_by(AggregationMethod::Avg),
                StatSpec::new("Top bots and libraries", HTTP_REQ_METRIC)
                    .with_units("Bot", "Rqs")
                    .by_label(BROWSER_NAME_LABEL)
                    .with_filter(BROWSER_FORM_FACTOR_LABEL, FORM_FACTOR_BOT),
            ])
    }
}
