use std::sync::Arc;

use tracing::info;

use crate::classifier::{Classification, Classifier};
use crate::config::TrackerOptions;
use crate::geo::{GeoLookup, GeoTable};
use crate::models::MetricLabels;
use crate::request::TrackedRequest;
use crate::storage::{DuckDbStore, LabelStore};
use crate::user_agent::UserAgentParser;
use crate::Result;

/// Entry point for recording and querying events.
///
/// A tracker is cheap to share behind an `Arc`; it holds no mutable state of
/// its own and delegates all synchronization to the label store.
pub struct Tracker {
    pub(crate) store: Arc<dyn LabelStore>,
    pub(crate) classifier: Classifier,
    pub(crate) options: TrackerOptions,
}

impl Tracker {
    /// Builds a tracker over an existing store. Loads the geo database named
    /// in `options`, failing if it cannot be read.
    pub fn new(options: TrackerOptions, store: Arc<dyn LabelStore>) -> Result<Self> {
        options.validate()?;

        let mut classifier = Classifier::new(&options);
        if let Some(path) = &options.geo_db_path {
            let table = GeoTable::open(path)?;
            info!("Loaded {} geo networks from {}", table.len(), path.display());
            classifier = classifier.with_geo_lookup(Arc::new(table));
        }

        Ok(Self {
            store,
            classifier,
            options,
        })
    }

    /// Opens (or creates) the DuckDB store at `options.db_path`.
    pub fn open(options: TrackerOptions) -> Result<Self> {
        options.validate()?;

        let mut store = DuckDbStore::open(&options.db_path)?;
        if let Some(retention) = options.retention {
            store = store.with_retention(retention);
        }

        Self::new(options, Arc::new(store))
    }

    pub fn with_geo_lookup(mut self, geo: Arc<dyn GeoLookup>) -> Self {
        self.classifier = self.classifier.with_geo_lookup(geo);
        self
    }

    pub fn with_user_agent_parser(mut self, parser: Arc<dyn UserAgentParser>) -> Self {
        self.classifier = self.classifier.with_user_agent_parser(parser);
        self
    }

    pub fn options(&self) -> &TrackerOptions {
        &self.options
    }

    pub fn dashboard_path(&self) -> &str {
        &self.options.dashboard_path
    }

    pub fn store(&self) -> &Arc<dyn LabelStore> {
        &self.store
    }

    /// Whether requests to `path` are recorded at all.
    pub fn should_track(&self, path: &str) -> bool {
        self.classifier.should_track(path)
    }

    pub fn classify(&self, req: &TrackedRequest, custom: &MetricLabels) -> Classification {
        self.classifier.classify(req, custom)
    }
}
