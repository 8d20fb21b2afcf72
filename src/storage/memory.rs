use std::collections::HashMap;

use parking_lot::RwLock;

use super::{matches_all, LabelStore, Matcher, Series};
use crate::models::MetricLabels;
use crate::Result;

/// Volatile label store. Samples are kept in insertion order per series;
/// nothing expires.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    series: Vec<Series>,
    index: HashMap<MetricLabels, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of samples across all series.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .series
            .iter()
            .map(|s| s.samples.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LabelStore for MemoryStore {
    fn append(&self, labels: &MetricLabels, ts: i64, value: f64) -> Result<()> {
        let mut inner = self.inner.write();
        let idx = match inner.index.get(labels) {
            Some(&idx) => idx,
            None => {
                let idx = inner.series.len();
                inner.series.push(Series {
                    labels: labels.clone(),
                    samples: Vec::new(),
                });
                inner.index.insert(labels.clone(), idx);
                idx
            }
        };
        inner.series[idx].samples.push((ts, value));
        Ok(())
    }

    fn range_query(&self, matchers: &[Matcher], start: i64, end: i64) -> Result<Vec<Series>> {
        let inner = self.inner.read();
        let matched = inner
            .series
            .iter()
            .filter(|s| matches_all(matchers, &s.labels))
            .filter_map(|s| {
                let samples: Vec<(i64, f64)> = s
                    .samples
                    .iter()
                    .copied()
                    .filter(|(ts, _)| *ts >= start && *ts < end)
                    .collect();
                if samples.is_empty() {
                    None
                } else {
                    Some(Series {
                        labels: s.labels.clone(),
                        samples,
                    })
                }
            })
            .collect();

        Ok(matched)
    }
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
    fn test_samples_group_into_series() {
        let store = MemoryStore::new();
        let a = labels(&[("__name__", "http_req"), ("$http_path", "/a")]);
        let b = labels(&[("__name__", "http_req"), ("$http_path", "/b")]);

        store.append(&a, 10, 1.0).unwrap();
        store.append(&b, 11, 1.0).unwrap();
        store.append(&a, 12, 1.0).unwrap();

        let all = store
            .range_query(&[Matcher::equal("__name__", "http_req").unwrap()], 0, 100)
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].samples, vec![(10, 1.0), (12, 1.0)]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_range_is_half_open() {
        let store = MemoryStore::new();
        let a = labels(&[("__name__", "http_req")]);
        for ts in [9, 10, 19, 20] {
            store.append(&a, ts, 1.0).unwrap();
        }

        let series = store.range_query(&[], 10, 20).unwrap();
        assert_eq!(series[0].samples, vec![(10, 1.0), (19, 1.0)]);
        assert!(store.range_query(&[], 30, 40).unwrap().is_empty());
    }
}
