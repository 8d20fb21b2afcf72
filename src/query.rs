//! Read path: label-filtered range queries and the aggregations built on them.

use std::collections::{HashMap, HashSet};

use crate::metrics::QueryTimer;
use crate::models::*;
use crate::storage::Matcher;
use crate::tracker::Tracker;
use crate::Result;

impl Tracker {
    /// Returns every point of `metric` matching `filters` with
    /// `start <= ts < end`, most recent first.
    ///
    /// A filter key ending in `!=` selects points whose label differs from
    /// the value; all other keys require equality. With neither a metric
    /// nor filters, every point in range is returned.
    pub fn query(
        &self,
        metric: &str,
        filters: &MetricLabels,
        start: i64,
        end: i64,
    ) -> Result<Vec<Metric>> {
        let _timer = QueryTimer::new();
        let matchers = matchers_for_labels(metric, filters)?;
        let series = self.store.range_query(&matchers, start, end)?;

        let mut metrics = Vec::with_capacity(series.iter().map(|s| s.samples.len()).sum());
        for s in series {
            let name = s.labels.get(METRIC_NAME_LABEL).cloned().unwrap_or_default();
            for (ts, value) in s.samples {
                metrics.push(Metric {
                    ts,
                    name: name.clone(),
                    labels: s.labels.clone(),
                    value,
                });
            }
        }

        metrics.sort_by(|a, b| b.ts.cmp(&a.ts));
        Ok(metrics)
    }

    /// Number of points of `metric` in range, without decoding them.
    pub fn count(&self, metric: &str, start: i64, end: i64) -> Result<usize> {
        let _timer = QueryTimer::new();
        let matchers = matchers_for_labels(metric, &MetricLabels::new())?;
        let series = self.store.range_query(&matchers, start, end)?;

        Ok(series.iter().map(|s| s.samples.len()).sum())
    }

    /// Number of distinct visitors with at least one matching point.
    pub fn count_visitors(
        &self,
        metric: &str,
        filters: &MetricLabels,
        start: i64,
        end: i64,
    ) -> Result<usize> {
        let visitors: HashSet<String> = self
            .query(metric, filters, start, end)?
            .into_iter()
            .filter_map(|mut m| m.labels.remove(VISITOR_ID_LABEL))
            .filter(|id| !id.is_empty())
            .collect();

        Ok(visitors.len())
    }

    /// Counts distinct visitors per group. Points without a visitor id, and
    /// points whose group key is empty, are left out.
    pub fn count_distinct_by_visitor<F>(
        &self,
        metric: &str,
        group_by: F,
        filters: &MetricLabels,
        start: i64,
        end: i64,
    ) -> Result<Vec<AggregatedMetric>>
    where
        F: Fn(&Metric) -> String,
    {
        let mut groups: Groups<HashSet<String>> = Groups::default();
        for m in self.query(metric, filters, start, end)? {
            let visitor = m.label(VISITOR_ID_LABEL);
            if visitor.is_empty() {
                continue;
            }
            let key = group_by(&m);
            if !key.is_empty() {
                groups.entry(key).insert(visitor.to_string());
            }
        }

        Ok(sorted(
            groups
                .into_iter()
                .map(|(label, visitors)| AggregatedMetric {
                    label,
                    value: visitors.len() as f64,
                })
                .collect(),
        ))
    }

    /// Groups by the value of `label`. Grouping by the route label also
    /// takes the HTTP method into account, see [`group_by_route`].
    pub fn count_distinct_by_visitor_and_label(
        &self,
        metric: &str,
        label: &str,
        filters: &MetricLabels,
        start: i64,
        end: i64,
    ) -> Result<Vec<AggregatedMetric>> {
        if label == HTTP_ROUTE_LABEL {
            return self.count_distinct_by_visitor(metric, group_by_route, filters, start, end);
        }

        self.count_distinct_by_visitor(metric, group_by_label(label), filters, start, end)
    }

    /// Groups matching points by `group_by` and reduces each group with
    /// `method`. Points with an empty group key are skipped.
    ///
    /// ```no_run
    /// # use footfall::{Tracker, TrackerOptions, AggregationMethod, not_equal, group_by_label};
    /// # use footfall::models::*;
    /// # fn main() -> footfall::Result<()> {
    /// let tracker = Tracker::open(TrackerOptions::default())?;
    /// let filters = MetricLabels::from([
    ///     (COUNTRY_LABEL.to_string(), "CH".to_string()),
    ///     (not_equal(REGION_LABEL), "Zurich".to_string()),
    /// ]);
    /// let by_city = tracker.aggregate_distinct(
    ///     HTTP_REQ_METRIC,
    ///     group_by_label(CITY_LABEL),
    ///     &filters,
    ///     AggregationMethod::Count,
    ///     0,
    ///     chrono::Utc::now().timestamp(),
    /// )?;
    /// for row in by_city {
    ///     println!("{} requests from {}", row.value, row.label);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Results are sorted by highest value first.
    pub fn aggregate_distinct<F>(
        &self,
        metric: &str,
        group_by: F,
        filters: &MetricLabels,
        method: AggregationMethod,
        start: i64,
        end: i64,
    ) -> Result<Vec<AggregatedMetric>>
    where
        F: Fn(&Metric) -> String,
    {
        let mut groups: Groups<(usize, f64)> = Groups::default();
        for m in self.query(metric, filters, start, end)? {
            let key = group_by(&m);
            if key.is_empty() {
                continue;
            }
            let (count, sum) = groups.entry(key);
            *count += 1;
            *sum += m.value;
        }

        Ok(sorted(
            groups
                .into_iter()
                .map(|(label, (count, sum))| AggregatedMetric {
                    label,
                    value: match method {
                        AggregationMethod::Count => count as f64,
                        AggregationMethod::Sum => sum,
                        AggregationMethod::Avg => sum / count as f64,
                    },
                })
                .collect(),
        ))
    }
}

/// Groups by the value of `label`; points without it are excluded.
pub fn group_by_label(label: &str) -> impl Fn(&Metric) -> String + Send + Sync + Clone {
    let label = label.to_string();
    move |m: &Metric| m.label(&label).to_string()
}

/// Groups by `METHOD route`, so that `GET /user/:id` and `POST /user/:id`
/// stay apart. Points missing either label are excluded.
pub fn group_by_route(m: &Metric) -> String {
    let method = m.label(HTTP_METHOD_LABEL);
    let route = m.label(HTTP_ROUTE_LABEL);
    if method.is_empty() || route.is_empty() {
        return String::new();
    }

    format!("{} {}", method.to_uppercase(), route)
}

/// Translates a metric name and filter map into store matchers. Malformed
/// filter keys are an error rather than being skipped.
pub fn matchers_for_labels(metric: &str, filters: &MetricLabels) -> Result<Vec<Matcher>> {
    let mut matchers = Vec::with_capacity(filters.len() + 1);
    if !metric.is_empty() {
        matchers.push(Matcher::equal(METRIC_NAME_LABEL, metric)?);
    }

    for (key, value) in filters {
        let matcher = match key.strip_suffix(NOT_EQUAL_SUFFIX) {
            Some(name) => Matcher::not_equal(name, value.as_str())?,
            None => Matcher::equal(key.as_str(), value.as_str())?,
        };
        matchers.push(matcher);
    }

    if matchers.is_empty() {
        matchers.push(Matcher::regex(METRIC_NAME_LABEL, ".*")?);
    }

    Ok(matchers)
}

/// Insertion-ordered grouping, so that equal results keep the order in
/// which their groups were first seen.
struct Groups<T> {
    entries: Vec<(String, T)>,
    index: HashMap<String, usize>,
}

impl<T> Default for Groups<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Default> Groups<T> {
    fn entry(&mut self, key: String) -> &mut T {
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.entries.push((key.clone(), T::default()));
                self.index.insert(key, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }
}

impl<T> IntoIterator for Groups<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

fn sorted(mut results: Vec<AggregatedMetric>) -> Vec<AggregatedMetric> {
    results.sort_by(|a, b| b.value.total_cmp(&a.value));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerOptions;
    use crate::storage::{LabelStore, MemoryStore, Series};
    use crate::FootfallError;
    use std::sync::Arc;
    use pretty_assertions::assert_eq;

    struct OfflineStore;

    impl LabelStore for OfflineStore {
        fn append(&self, _: &MetricLabels, _: i64, _: f64) -> Result<()> {
            Ok(())
        }

        fn range_query(&self, _: &[Matcher], _: i64, _: i64) -> Result<Vec<Series>> {
            Err(FootfallError::StorageUnavailable("reader closed".into()))
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> MetricLabels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn point(store: &MemoryStore, metric: &str, pairs: &[(&str, &str)], ts: i64, value: f64) {
        let mut set = labels(pairs);
        set.insert(METRIC_NAME_LABEL.to_string(), metric.to_string());
        store.append(&set, ts, value).unwrap();
    }

    fn fixture() -> Tracker {
        let store = Arc::new(MemoryStore::new());
        let s = store.as_ref();
        point(s, HTTP_REQ_METRIC, &[(VISITOR_ID_LABEL, "v1"), (HTTP_PATH_LABEL, "/"), (COUNTRY_LABEL, "CH")], 100, 1.0);
        point(s, HTTP_REQ_METRIC, &[(VISITOR_ID_LABEL, "v1"), (HTTP_PATH_LABEL, "/"), (COUNTRY_LABEL, "CH")], 130, 1.0);
        point(s, HTTP_REQ_METRIC, &[(VISITOR_ID_LABEL, "v2"), (HTTP_PATH_LABEL, "/"), (COUNTRY_LABEL, "DE")], 110, 1.0);
        point(s, HTTP_REQ_METRIC, &[(VISITOR_ID_LABEL, "v2"), (HTTP_PATH_LABEL, "/about"), (COUNTRY_LABEL, "DE")], 120, 1.0);
        point(s, HTTP_REQ_METRIC, &[(HTTP_PATH_LABEL, "/about"), (COUNTRY_LABEL, "CH")], 125, 1.0);
        point(s, HTTP_REQ_METRIC, &[(VISITOR_ID_LABEL, "v3"), (HTTP_PATH_LABEL, "/late")], 500, 1.0);
        point(s, HTTP_REQ_DURATION_METRIC, &[(HTTP_METHOD_LABEL, "get"), (HTTP_ROUTE_LABEL, "/x")], 100, 10.0);
        point(s, HTTP_REQ_DURATION_METRIC, &[(HTTP_METHOD_LABEL, "GET"), (HTTP_ROUTE_LABEL, "/x")], 101, 30.0);
        point(s, HTTP_REQ_DURATION_METRIC, &[(HTTP_METHOD_LABEL, "POST"), (HTTP_ROUTE_LABEL, "/x")], 102, 5.0);
        point(s, HTTP_REQ_DURATION_METRIC, &[(HTTP_METHOD_LABEL, "POST")], 103, 99.0);

        Tracker::new(TrackerOptions::default(), store).unwrap()
    }

    #[test]
    fn test_query_sorts_most_recent_first() {
        let tracker = fixture();
        let rows = tracker.query(HTTP_REQ_METRIC, &MetricLabels::new(), 0, 200).unwrap();

        let ts: Vec<i64> = rows.iter().map(|m| m.ts).collect();
        assert_eq!(ts, vec![130, 125, 120, 110, 100]);
        assert!(rows.iter().all(|m| m.name == HTTP_REQ_METRIC));
    }

    #[test]
    fn test_query_filters() {
        let tracker = fixture();

        let ch = tracker
            .query(HTTP_REQ_METRIC, &labels(&[(COUNTRY_LABEL, "CH")]), 0, 1_000)
            .unwrap();
        assert_eq!(ch.len(), 3);

        let not_ch = tracker
            .query(HTTP_REQ_METRIC, &labels(&[(not_equal(COUNTRY_LABEL).as_str(), "CH")]), 0, 1_000)
            .unwrap();
        assert_eq!(not_ch.len(), 3);
        assert!(not_ch.iter().all(|m| m.label(COUNTRY_LABEL) != "CH"));

        let everything = tracker.query("", &MetricLabels::new(), 0, 1_000).unwrap();
        assert_eq!(everything.len(), 10);

        assert!(tracker
            .query(HTTP_REQ_METRIC, &MetricLabels::new(), 1_000, 2_000)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_malformed_filter_is_an_error() {
        let tracker = fixture();
        let result = tracker.query(HTTP_REQ_METRIC, &labels(&[("!=", "x")]), 0, 1_000);
        assert!(matches!(result, Err(FootfallError::InvalidMatcher(_))));
    }

    #[test]
    fn test_count_matches_query_length() {
        let tracker = fixture();
        for (metric, start, end) in [(HTTP_REQ_METRIC, 0, 1_000), (HTTP_REQ_METRIC, 110, 126), (HTTP_REQ_DURATION_METRIC, 0, 102), ("missing", 0, 1_000)] {
            let queried = tracker.query(metric, &MetricLabels::new(), start, end).unwrap();
            assert_eq!(tracker.count(metric, start, end).unwrap(), queried.len());
        }
    }

    #[test]
    fn test_storage_unavailable_propagates() {
        let tracker = Tracker::new(TrackerOptions::default(), Arc::new(OfflineStore)).unwrap();
        assert!(matches!(
            tracker.query(HTTP_REQ_METRIC, &MetricLabels::new(), 0, 10),
            Err(FootfallError::StorageUnavailable(_))
        ));
        assert!(matches!(
            tracker.count(HTTP_REQ_METRIC, 0, 10),
            Err(FootfallError::StorageUnavailable(_))
        ));
    }

    #[test]
    fn test_count_distinct_skips_points_without_visitor() {
        let tracker = fixture();
        let by_path = tracker
            .count_distinct_by_visitor_and_label(HTTP_REQ_METRIC, HTTP_PATH_LABEL, &MetricLabels::new(), 0, 200)
            .unwrap();

        assert_eq!(
            by_path,
            vec![
                AggregatedMetric { label: "/".into(), value: 2.0 },
                AggregatedMetric { label: "/about".into(), value: 1.0 },
            ]
        );

        assert_eq!(tracker.count_visitors(HTTP_REQ_METRIC, &MetricLabels::new(), 0, 1_000).unwrap(), 3);
        assert_eq!(
            tracker
                .count_visitors(HTTP_REQ_METRIC, &labels(&[(COUNTRY_LABEL, "CH")]), 0, 1_000)
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_count_and_sum_agree_for_unit_values() {
        let tracker = fixture();
        let run = |method| {
            tracker
                .aggregate_distinct(HTTP_REQ_METRIC, group_by_label(COUNTRY_LABEL), &MetricLabels::new(), method, 0, 1_000)
                .unwrap()
        };

        let counted = run(AggregationMethod::Count);
        assert_eq!(counted, run(AggregationMethod::Sum));
        assert_eq!(counted[0], AggregatedMetric { label: "CH".into(), value: 3.0 });
    }

    #[test]
    fn test_route_grouping_keeps_methods_apart() {
        let tracker = fixture();
        let avg = tracker
            .aggregate_distinct(
                HTTP_REQ_DURATION_METRIC,
                group_by_route,
                &MetricLabels::new(),
                AggregationMethod::Avg,
                0,
                1_000,
            )
            .unwrap();

        assert_eq!(
            avg,
            vec![
                AggregatedMetric { label: "GET /x".into(), value: 20.0 },
                AggregatedMetric { label: "POST /x".into(), value: 5.0 },
            ]
        );
    }

    #[test]
    fn test_ties_keep_encounter_order() {
        let tracker = fixture();
        let rows = tracker
            .aggregate_distinct(
                HTTP_REQ_METRIC,
                group_by_label(HTTP_PATH_LABEL),
                &MetricLabels::new(),
                AggregationMethod::Count,
                100,
                126,
            )
            .unwrap();

        // Most recent point first: /about (125) is seen before / (110).
        assert_eq!(rows[0], AggregatedMetric { label: "/about".into(), value: 2.0 });
        assert_eq!(rows[1], AggregatedMetric { label: "/".into(), value: 2.0 });
    }
}
