//! Label store contract consumed by the tracker, plus the bundled adapters.
//!
//! A store keeps series of `(timestamp, value)` samples, each series
//! identified by its full label set (the metric name included under
//! [`METRIC_NAME_LABEL`](crate::models::METRIC_NAME_LABEL)). Implementations
//! must be safe to share between request handlers without outside locking.

pub mod duckdb_store;
pub mod memory;

use regex::Regex;

use crate::models::MetricLabels;
use crate::{FootfallError, Result};

pub use self::duckdb_store::DuckDbStore;
pub use self::memory::MemoryStore;

pub trait LabelStore: Send + Sync {
    /// Appends one sample to the series identified by `labels`.
    fn append(&self, labels: &MetricLabels, ts: i64, value: f64) -> Result<()>;

    /// Returns every series matching all `matchers`, restricted to samples
    /// with `start <= ts < end`. Series without samples in range are omitted.
    fn range_query(&self, matchers: &[Matcher], start: i64, end: i64) -> Result<Vec<Series>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub labels: MetricLabels,
    pub samples: Vec<(i64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Equal,
    NotEqual,
    Regex,
}

/// A constraint on one label. A label missing from a series compares as the
/// empty string.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub op: MatchOp,
    pub name: String,
    pub value: String,
    re: Option<Regex>,
}

impl Matcher {
    pub fn new(op: MatchOp, name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let value = value.into();

        if name.is_empty()
            || !name.is_ascii()
            || name
                .chars()
                .any(|c| c.is_ascii_whitespace() || c == '=' || c == '!')
        {
            return Err(FootfallError::InvalidMatcher(format!(
                "invalid label name {:?}",
                name
            )));
        }

        let re = match op {
            MatchOp::Regex => Some(
                Regex::new(&format!("^(?:{})$", value))
                    .map_err(|e| FootfallError::InvalidMatcher(e.to_string()))?,
            ),
            _ => None,
        };

        Ok(Self { op, name, value, re })
    }

    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::new(MatchOp::Equal, name, value)
    }

    pub fn not_equal(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::new(MatchOp::NotEqual, name, value)
    }

    pub fn regex(name: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        Self::new(MatchOp::Regex, name, pattern)
    }

    pub fn matches(&self, labels: &MetricLabels) -> bool {
        let actual = labels.get(&self.name).map(String::as_str).unwrap_or("");
        match self.op {
            MatchOp::Equal => actual == self.value,
            MatchOp::NotEqual => actual != self.value,
            MatchOp::Regex => self.re.as_ref().map_or(false, |re| re.is_match(actual)),
        }
    }
}

pub(crate) fn matches_all(matchers: &[Matcher], labels: &MetricLabels) -> bool {
    matchers.iter().all(|m| m.matches(labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> MetricLabels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_label_compares_as_empty() {
        let set = labels(&[("__name__", "http_req")]);

        assert!(Matcher::not_equal("$browser_form_factor", "bot")
            .unwrap()
            .matches(&set));
        assert!(Matcher::equal("$city", "").unwrap().matches(&set));
        assert!(!Matcher::equal("$city", "Zurich").unwrap().matches(&set));
    }

    #[test]
    fn test_regex_is_anchored() {
        let set = labels(&[("__name__", "http_req_dur")]);

        assert!(!Matcher::regex("__name__", "http_req").unwrap().matches(&set));
        assert!(Matcher::regex("__name__", "http_req.*").unwrap().matches(&set));
        assert!(Matcher::regex("__name__", ".*").unwrap().matches(&set));
    }

    #[test]
    fn test_invalid_matchers_are_rejected() {
        assert!(matches!(
            Matcher::equal("", "x"),
            Err(FootfallError::InvalidMatcher(_))
        ));
        assert!(matches!(
            Matcher::equal("$country!", "CH"),
            Err(FootfallError::InvalidMatcher(_))
        ));
        assert!(matches!(
            Matcher::regex("$path", "(unclosed"),
            Err(FootfallError::InvalidMatcher(_))
        ));
    }
}
