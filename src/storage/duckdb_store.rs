use std::path::Path;
use std::time::Duration;

use duckdb::{params, Connection};
use parking_lot::Mutex;
use tracing::info;

use super::{matches_all, LabelStore, MatchOp, Matcher, Series};
use crate::models::{MetricLabels, METRIC_NAME_LABEL};
use crate::{FootfallError, Result};

/// Durable label store backed by a single DuckDB table.
///
/// Label sets are stored as canonical JSON objects; the metric name is also
/// kept in its own column so that equality on the metric name is pushed
/// down into SQL. Every other matcher is applied after decoding.
pub struct DuckDbStore {
    db: Mutex<Connection>,
    retention: Option<Duration>,
}

impl DuckDbStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                FootfallError::Configuration(format!(
                    "cannot create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| FootfallError::Configuration(format!("cannot open database: {}", e)))?;
        info!("Opened label store at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS points (
                metric VARCHAR NOT NULL,
                labels VARCHAR NOT NULL,
                ts BIGINT NOT NULL,
                value DOUBLE NOT NULL
            );
        ",
        )?;

        Ok(Self {
            db: Mutex::new(conn),
            retention: None,
        })
    }

    /// Hides points older than `retention` from queries. Call [`compact`]
    /// to physically remove them.
    ///
    /// [`compact`]: DuckDbStore::compact
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Deletes every point that fell out of the retention window, returning
    /// how many were removed.
    pub fn compact(&self) -> Result<usize> {
        let Some(cutoff) = self.retention_cutoff() else {
            return Ok(0);
        };

        let conn = self.db.lock();
        let removed = conn.execute("DELETE FROM points WHERE ts < ?", params![cutoff])?;
        info!("Compacted {} expired points", removed);
        Ok(removed)
    }

    fn retention_cutoff(&self) -> Option<i64> {
        self.retention
            .map(|r| chrono::Utc::now().timestamp() - r.as_secs() as i64)
    }
}

impl LabelStore for DuckDbStore {
    fn append(&self, labels: &MetricLabels, ts: i64, value: f64) -> Result<()> {
        let metric = labels
            .get(METRIC_NAME_LABEL)
            .map(String::as_str)
            .unwrap_or("");
        let encoded = serde_json::to_string(labels)?;

        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO points (metric, labels, ts, value) VALUES (?, ?, ?, ?)",
            params![metric, encoded, ts, value],
        )?;

        Ok(())
    }

    fn range_query(&self, matchers: &[Matcher], start: i64, end: i64) -> Result<Vec<Series>> {
        let start = match self.retention_cutoff() {
            Some(cutoff) => start.max(cutoff),
            None => start,
        };
        let metric = matchers
            .iter()
            .find(|m| m.op == MatchOp::Equal && m.name == METRIC_NAME_LABEL)
            .map(|m| m.value.clone());

        let unavailable = |e: duckdb::Error| FootfallError::StorageUnavailable(e.to_string());

        let rows: Vec<(String, i64, f64)> = {
            let conn = self.db.lock();
            let read = |row: &duckdb::Row<'_>| -> duckdb::Result<(String, i64, f64)> {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            };
            match metric {
                Some(metric) => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT labels, ts, value FROM points
                             WHERE metric = ? AND ts >= ? AND ts < ?
                             ORDER BY labels, ts",
                        )
                        .map_err(unavailable)?;
                    let rows = stmt
                        .query_map(params![metric, start, end], read)
                        .map_err(unavailable)?;
                    rows.collect::<std::result::Result<_, _>>()
                        .map_err(unavailable)?
                }
                None => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT labels, ts, value FROM points
                             WHERE ts >= ? AND ts < ?
                             ORDER BY labels, ts",
                        )
                        .map_err(unavailable)?;
                    let rows = stmt
                        .query_map(params![start, end], read)
                        .map_err(unavailable)?;
                    rows.collect::<std::result::Result<_, _>>()
                        .map_err(unavailable)?
                }
            }
        };

        let mut series: Vec<Series> = Vec::new();
        let mut current: Option<(String, bool)> = None;
        for (encoded, ts, value) in rows {
            let same = matches!(&current, Some((prev, _)) if *prev == encoded);
            if !same {
                let labels: MetricLabels = serde_json::from_str(&encoded)?;
                let keep = matches_all(matchers, &labels);
                if keep {
                    series.push(Series {
                        labels,
                        samples: Vec::new(),
                    });
                }
                current = Some((encoded, keep));
            }

            if let (Some((_, true)), Some(last)) = (&current, series.last_mut()) {
                last.samples.push((ts, value));
            }
        }

        Ok(series)
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
    fn test_round_trip_with_matchers() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let home = labels(&[("__name__", "http_req"), ("$http_path", "/")]);
        let about = labels(&[("__name__", "http_req"), ("$http_path", "/about")]);
        let dur = labels(&[("__name__", "http_req_dur"), ("$http_path", "/")]);

        store.append(&home, 100, 1.0).unwrap();
        store.append(&about, 101, 1.0).unwrap();
        store.append(&home, 102, 1.0).unwrap();
        store.append(&dur, 102, 12.5).unwrap();

        let matchers = vec![
            Matcher::equal("__name__", "http_req").unwrap(),
            Matcher::not_equal("$http_path", "/about").unwrap(),
        ];
        let series = store.range_query(&matchers, 0, 1_000).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].labels, home);
        assert_eq!(series[0].samples, vec![(100, 1.0), (102, 1.0)]);

        let everything = store
            .range_query(&[Matcher::regex("__name__", ".*").unwrap()], 0, 1_000)
            .unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[test]
    fn test_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("points.duckdb");
        let set = labels(&[("__name__", "http_req")]);

        {
            let store = DuckDbStore::open(&path).unwrap();
            store.append(&set, 5, 1.0).unwrap();
        }

        let store = DuckDbStore::open(&path).unwrap();
        let series = store.range_query(&[], 0, 10).unwrap();
        assert_eq!(series[0].samples, vec![(5, 1.0)]);
    }

    #[test]
    fn test_retention_hides_and_compacts_old_points() {
        let store = DuckDbStore::open_in_memory()
            .unwrap()
            .with_retention(Duration::from_secs(3_600));
        let set = labels(&[("__name__", "http_req")]);
        let now = chrono::Utc::now().timestamp();

        store.append(&set, now - 7_200, 1.0).unwrap();
        store.append(&set, now - 60, 1.0).unwrap();

        let series = store.range_query(&[], 0, now + 1).unwrap();
        assert_eq!(series[0].samples.len(), 1);
        assert_eq!(store.compact().unwrap(), 1);
    }
}
