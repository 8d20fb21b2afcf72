//! Turns a [`TrackedRequest`] into the label set stored with each event and
//! decides whether the event is recorded at all.

use std::borrow::Cow;
use std::net::IpAddr;
use std::sync::Arc;

use axum::http::Uri;
use sha2::{Digest, Sha256};

use crate::config::TrackerOptions;
use crate::geo::GeoLookup;
use crate::models::*;
use crate::request::TrackedRequest;
use crate::user_agent::{is_http_client_library, BuiltinUserAgentParser, UserAgent, UserAgentParser};

const FAVICON_PATH: &str = "/favicon.ico";

pub const COMMON_ASSET_PREFIXES: &[&str] = &[
    "/.",
    "/_",
    // wordpress probes
    "/wp-",
    "/public",
];

pub const COMMON_ASSET_SUFFIXES: &[&str] = &[
    ".js", ".css", ".map",
    ".png", ".jpg", ".jpeg", ".webp", ".avif", ".gif", ".svg", ".ico",
    ".woff", ".woff2", ".otf", ".ttf", ".eot",
    ".mov", ".mp3", ".mp4", ".mpg", ".webm", ".wav", ".ogg",
    // scraper probes
    ".php", ".asp", ".aspx", ".cgi", ".env",
];

/// Query parameters copied into labels, and the label each one lands in.
const UTM_PARAMS: &[(&str, &str)] = &[
    ("utm_content", UTM_CONTENT_LABEL),
    ("utm_medium", UTM_MEDIUM_LABEL),
    ("utm_source", UTM_SOURCE_LABEL),
    ("utm_campaign", UTM_CAMPAIGN_LABEL),
    ("utm_term", UTM_TERM_LABEL),
    ("gclid", CLICK_ID_GOOGLE_LABEL),
    ("fbclid", CLICK_ID_FB_LABEL),
    ("msclkid", CLICK_ID_MS_LABEL),
    ("twclid", CLICK_ID_TW_LABEL),
];

type FormFactorRule = (fn(&UserAgent, &str) -> bool, &'static str);

/// Evaluated in order; the last rule that matches decides the form factor,
/// so bot detection always has the final say.
const FORM_FACTOR_RULES: &[FormFactorRule] = &[
    (|ua, _| ua.desktop, FORM_FACTOR_DESKTOP),
    (|ua, _| ua.mobile, FORM_FACTOR_MOBILE),
    (|ua, _| ua.tablet, FORM_FACTOR_TABLET),
    (|ua, raw| ua.bot || is_http_client_library(raw), FORM_FACTOR_BOT),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    DoNotTrack,
    Bot,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::DoNotTrack => "dnt",
            DropReason::Bot => "bot",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub labels: MetricLabels,
    /// Set when the event must be discarded without an error.
    pub dropped: Option<DropReason>,
}

impl Classification {
    pub fn is_dropped(&self) -> bool {
        self.dropped.is_some()
    }
}

pub struct Classifier {
    dashboard_path: String,
    pixel_path: Option<String>,
    ignore_common_paths: bool,
    ignored_prefixes: Vec<String>,
    ignore_bots: bool,
    ignore_dnt: bool,
    geo: Option<Arc<dyn GeoLookup>>,
    user_agents: Arc<dyn UserAgentParser>,
}

impl Classifier {
    pub fn new(options: &TrackerOptions) -> Self {
        Self {
            dashboard_path: options.dashboard_path.clone(),
            pixel_path: options.pixel_path.clone(),
            ignore_common_paths: options.ignore_common_paths,
            ignored_prefixes: options.ignored_prefixes.clone(),
            ignore_bots: options.ignore_bots,
            ignore_dnt: options.ignore_dnt,
            geo: None,
            user_agents: Arc::new(BuiltinUserAgentParser),
        }
    }

    pub fn with_geo_lookup(mut self, geo: Arc<dyn GeoLookup>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn with_user_agent_parser(mut self, parser: Arc<dyn UserAgentParser>) -> Self {
        self.user_agents = parser;
        self
    }

    pub fn should_track(&self, path: &str) -> bool {
        if path.starts_with(&self.dashboard_path) {
            return false;
        }
        if self.pixel_path.as_deref() == Some(path) {
            return false;
        }
        if self
            .ignored_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return false;
        }

        if self.ignore_common_paths {
            if path == FAVICON_PATH {
                return false;
            }
            if COMMON_ASSET_PREFIXES.iter().any(|p| path.starts_with(p)) {
                return false;
            }
            if COMMON_ASSET_SUFFIXES.iter().any(|s| path.ends_with(s)) {
                return false;
            }
        }

        true
    }

    /// Computes the full label set for `req`, with `custom` labels taking the
    /// lowest precedence.
    pub fn classify(&self, req: &TrackedRequest, custom: &MetricLabels) -> Classification {
        let client_ip = req.resolve_client_ip();

        let labels = merge_labels([
            custom.clone(),
            request_labels(req),
            visitor_labels(&client_ip, req),
            self.location_labels(&client_ip),
            self.user_agent_labels(&req.header("user-agent")),
            referrer_labels(&req.header("referer")),
            utm_labels(req),
        ]);

        let dropped = if !self.ignore_dnt && opted_out(req) {
            Some(DropReason::DoNotTrack)
        } else if self.ignore_bots
            && labels.get(BROWSER_FORM_FACTOR_LABEL).map(String::as_str) == Some(FORM_FACTOR_BOT)
        {
            Some(DropReason::Bot)
        } else {
            None
        };

        Classification { labels, dropped }
    }

    fn location_labels(&self, client_ip: &str) -> MetricLabels {
        let Some(geo) = &self.geo else {
            return MetricLabels::new();
        };

        let location = client_ip
            .parse::<IpAddr>()
            .ok()
            .and_then(|ip| geo.lookup(ip))
            .unwrap_or_default();

        labels_from([
            (COUNTRY_LABEL, location.country),
            (REGION_LABEL, location.region),
            (CITY_LABEL, location.city),
        ])
    }

    fn user_agent_labels(&self, raw: &str) -> MetricLabels {
        let ua = self.user_agents.parse(raw);
        let form_factor = form_factor(&ua, raw);

        labels_from([
            (BROWSER_NAME_LABEL, ua.name),
            (BROWSER_VERSION_LABEL, ua.version),
            (BROWSER_DEVICE_LABEL, ua.device),
            (BROWSER_OS_LABEL, ua.os),
            (BROWSER_OS_VERSION_LABEL, ua.os_version),
            (BROWSER_FORM_FACTOR_LABEL, form_factor.to_string()),
        ])
    }
}

/// Hex SHA-256 of the pipe-joined client IP and content negotiation headers.
pub fn visitor_id(client_ip: &str, req: &TrackedRequest) -> String {
    let id = [
        Cow::Borrowed(client_ip),
        req.header("user-agent"),
        req.header("accept"),
        req.header("accept-encoding"),
        req.header("accept-language"),
    ]
    .join("|");

    hex::encode(Sha256::digest(id.as_bytes()))
}

pub fn form_factor(ua: &UserAgent, raw: &str) -> &'static str {
    FORM_FACTOR_RULES
        .iter()
        .filter(|(applies, _)| applies(ua, raw))
        .last()
        .map(|(_, label)| *label)
        .unwrap_or("")
}

/// Merges label groups in order. A later group only replaces a key when its
/// value is non-empty, and empty values are never stored.
pub fn merge_labels<I>(groups: I) -> MetricLabels
where
    I: IntoIterator<Item = MetricLabels>,
{
    let mut merged = MetricLabels::new();
    for group in groups {
        for (key, value) in group {
            if !value.is_empty() {
                merged.insert(key, value);
            }
        }
    }
    merged
}

fn opted_out(req: &TrackedRequest) -> bool {
    req.header("dnt").trim() == "1" || req.header("sec-gpc").trim() == "1"
}

fn request_labels(req: &TrackedRequest) -> MetricLabels {
    labels_from([
        (HTTP_METHOD_LABEL, req.method.clone()),
        (HTTP_PATH_LABEL, req.path.clone()),
        (HTTP_ROUTE_LABEL, req.route.clone()),
    ])
}

fn visitor_labels(client_ip: &str, req: &TrackedRequest) -> MetricLabels {
    labels_from([(VISITOR_ID_LABEL, visitor_id(client_ip, req))])
}

fn referrer_labels(referrer: &str) -> MetricLabels {
    let host = referrer
        .parse::<Uri>()
        .ok()
        .and_then(|uri| uri.host().map(str::to_string))
        .unwrap_or_default();

    labels_from([
        (REFERRER_LABEL, referrer.to_string()),
        (REFERRER_DOMAIN_LABEL, host),
    ])
}

fn utm_labels(req: &TrackedRequest) -> MetricLabels {
    UTM_PARAMS
        .iter()
        .map(|(param, label)| {
            let value = req.query.get(*param).cloned().unwrap_or_default();
            (label.to_string(), value)
        })
        .collect()
}

fn labels_from<const N: usize>(pairs: [(&str, String); N]) -> MetricLabels {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
