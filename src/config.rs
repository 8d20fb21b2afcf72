use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{FootfallError, Result};

pub const DEFAULT_DASHBOARD_PATH: &str = "/_footfall";
pub const DEFAULT_DB_PATH: &str = "./footfall.duckdb";

/// Construction options for a [`Tracker`](crate::Tracker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerOptions {
    pub db_path: PathBuf,
    /// Points older than this are hidden by the bundled DuckDB store.
    #[serde(with = "opt_secs")]
    pub retention: Option<Duration>,
    pub dashboard_path: String,
    pub pixel_path: Option<String>,
    pub geo_db_path: Option<PathBuf>,
    pub measure_request_duration: bool,
    pub ignore_common_paths: bool,
    pub ignored_prefixes: Vec<String>,
    pub ignore_bots: bool,
    /// Track requests even when they carry `DNT: 1`.
    pub ignore_dnt: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            retention: None,
            dashboard_path: DEFAULT_DASHBOARD_PATH.to_string(),
            pixel_path: None,
            geo_db_path: None,
            measure_request_duration: false,
            ignore_common_paths: false,
            ignored_prefixes: Vec::new(),
            ignore_bots: false,
            ignore_dnt: false,
        }
    }
}

impl TrackerOptions {
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn with_dashboard_path(mut self, path: impl Into<String>) -> Self {
        self.dashboard_path = path.into();
        self
    }

    pub fn with_pixel_path(mut self, path: impl Into<String>) -> Self {
        self.pixel_path = Some(path.into());
        self
    }

    pub fn with_geo_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.geo_db_path = Some(path.into());
        self
    }

    pub fn with_request_measurements(mut self, value: bool) -> Self {
        self.measure_request_duration = value;
        self
    }

    /// Skips favicons, scripts, styles, images, fonts, media, common scraper
    /// probes (`.php`, `.asp`, ...) and paths starting with `/.`, `/_`,
    /// `/wp-` or `/public`.
    pub fn with_web_assets_ignored(mut self, value: bool) -> Self {
        self.ignore_common_paths = value;
        self
    }

    pub fn with_ignored_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_prefixes.push(prefix.into());
        self
    }

    pub fn with_bots_ignored(mut self, value: bool) -> Self {
        self.ignore_bots = value;
        self
    }

    pub fn with_dnt_ignored(mut self, value: bool) -> Self {
        self.ignore_dnt = value;
        self
    }

    /// Reads `FOOTFALL_*` variables, falling back to the defaults.
    pub fn from_env() -> Result<Self> {
        let mut options = Self::default();

        if let Ok(path) = env::var("FOOTFALL_DB_PATH") {
            options.db_path = PathBuf::from(path);
        }
        if let Ok(days) = env::var("FOOTFALL_RETENTION_DAYS") {
            let days: u64 = days.parse().map_err(|_| {
                FootfallError::Configuration(format!("invalid FOOTFALL_RETENTION_DAYS {:?}", days))
            })?;
            options.retention = Some(Duration::from_secs(days * 24 * 3600));
        }
        if let Ok(path) = env::var("FOOTFALL_DASHBOARD_PATH") {
            options.dashboard_path = path;
        }
        if let Ok(path) = env::var("FOOTFALL_PIXEL_PATH") {
            options.pixel_path = Some(path);
        }
        if let Ok(path) = env::var("FOOTFALL_GEOIP_DB") {
            options.geo_db_path = Some(PathBuf::from(path));
        }
        if let Ok(prefixes) = env::var("FOOTFALL_IGNORED_PREFIXES") {
            options.ignored_prefixes = prefixes
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        options.measure_request_duration =
            env_flag("FOOTFALL_MEASURE_REQUESTS", options.measure_request_duration)?;
        options.ignore_common_paths =
            env_flag("FOOTFALL_IGNORE_ASSETS", options.ignore_common_paths)?;
        options.ignore_bots = env_flag("FOOTFALL_IGNORE_BOTS", options.ignore_bots)?;
        options.ignore_dnt = env_flag("FOOTFALL_IGNORE_DNT", options.ignore_dnt)?;

        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_path_arg(&self.dashboard_path) {
            return Err(FootfallError::Configuration(
                "dashboard path must start with / and have at least one more character".into(),
            ));
        }
        if let Some(pixel) = &self.pixel_path {
            if !is_valid_path_arg(pixel) {
                return Err(FootfallError::Configuration(
                    "pixel path must start with / and have at least one more character".into(),
                ));
            }
        }
        if let Some(geo) = &self.geo_db_path {
            if geo.as_os_str().is_empty() {
                return Err(FootfallError::Configuration("GeoIP database path is empty".into()));
            }
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(FootfallError::Configuration("missing database path".into()));
        }

        Ok(())
    }
}

fn is_valid_path_arg(path: &str) -> bool {
    path.len() >= 2 && path.starts_with('/')
}

fn env_flag(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(FootfallError::Configuration(format!(
                "invalid boolean {:?} for {}",
                value, name
            ))),
        },
        Err(_) => Ok(default),
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = TrackerOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.dashboard_path, DEFAULT_DASHBOARD_PATH);
        assert!(!options.ignore_bots);
    }

    #[test]
    fn test_invalid_paths_rejected() {
        for path in ["/", "", "stats"] {
            let options = TrackerOptions::default().with_dashboard_path(path);
            assert!(matches!(
                options.validate(),
                Err(FootfallError::Configuration(_))
            ));
        }

        let options = TrackerOptions::default().with_pixel_path("/");
        assert!(options.validate().is_err());

        let options = TrackerOptions::default().with_geo_db("");
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_builder_applies_options() {
        let options = TrackerOptions::default()
            .with_bots_ignored(true)
            .with_dashboard_path("/stats")
            .with_ignored_prefix("/healthz")
            .with_retention(Duration::from_secs(60));

        assert!(options.ignore_bots);
        assert_eq!(options.dashboard_path, "/stats");
        assert_eq!(options.ignored_prefixes, vec!["/healthz".to_string()]);
        assert_eq!(options.retention, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_deserialize_partial_json() {
        let options: TrackerOptions =
            serde_json::from_str(r#"{"dashboard_path": "/stats", "retention": 3600, "ignore_bots": true}"#)
                .unwrap();
        assert_eq!(options.dashboard_path, "/stats");
        assert_eq!(options.retention, Some(Duration::from_secs(3600)));
        assert!(options.ignore_bots);
        assert_eq!(options.db_path, PathBuf::from(DEFAULT_DB_PATH));
    }
}
