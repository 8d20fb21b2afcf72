//! Optional tracing subscriber for binaries embedding footfall.
//!
//! The library only emits `tracing` events; a host application that already
//! installs its own subscriber should skip this module.

use std::env;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    /// One JSON object per line, for log shippers.
    Json,
}

impl LogFormat {
    /// Reads `FOOTFALL_LOG_FORMAT`; anything other than `json` is compact.
    pub fn from_env() -> Self {
        Self::parse(&env::var("FOOTFALL_LOG_FORMAT").unwrap_or_default())
    }

    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }
}

/// Directives used when `RUST_LOG` is unset: `crate_name` at info, plus the
/// request spans of `tower_http::trace`.
pub fn default_directives(crate_name: &str) -> String {
    format!("{crate_name}=info,tower_http=info")
}

/// Installs a global subscriber filtered by `RUST_LOG`, or by
/// [`default_directives`] for `crate_name`.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_logger(crate_name: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(crate_name)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match LogFormat::from_env() {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false).with_line_number(true))
            .try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse(""), LogFormat::Compact);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Compact);
    }

    #[test]
    fn test_default_directives_parse() {
        let directives = default_directives("footfall");
        assert_eq!(directives, "footfall=info,tower_http=info");
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_second_install_is_refused() {
        init_logger("footfall");
        assert!(!init_logger("footfall"));
    }
}
