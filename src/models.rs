use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label key to label value. Ordered so that a label set has one canonical
/// form, which is what identifies a series.
pub type MetricLabels = BTreeMap<String, String>;

/// Reserved label holding the metric name of a point.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Suffix appended to a filter key to switch it from equality to inequality.
pub const NOT_EQUAL_SUFFIX: &str = "!=";

pub const HTTP_REQ_METRIC: &str = "http_req";
pub const HTTP_REQ_DURATION_METRIC: &str = "http_req_dur";

pub const HTTP_METHOD_LABEL: &str = "$http_method";
pub const HTTP_PATH_LABEL: &str = "$http_path";
pub const HTTP_ROUTE_LABEL: &str = "$http_route";
pub const BROWSER_NAME_LABEL: &str = "$browser_name";
pub const BROWSER_VERSION_LABEL: &str = "$browser_version";
pub const BROWSER_DEVICE_LABEL: &str = "$browser_device";
pub const BROWSER_OS_LABEL: &str = "$browser_os";
pub const BROWSER_OS_VERSION_LABEL: &str = "$browser_os_version";
pub const BROWSER_FORM_FACTOR_LABEL: &str = "$browser_form_factor";
pub const REFERRER_LABEL: &str = "$referrer";
pub const REFERRER_DOMAIN_LABEL: &str = "$referrer_domain";
pub const UTM_CONTENT_LABEL: &str = "$utm_content";
pub const UTM_MEDIUM_LABEL: &str = "$utm_medium";
pub const UTM_SOURCE_LABEL: &str = "$utm_source";
pub const UTM_CAMPAIGN_LABEL: &str = "$utm_campaign";
pub const UTM_TERM_LABEL: &str = "$utm_term";
pub const CLICK_ID_GOOGLE_LABEL: &str = "$clid_go";
pub const CLICK_ID_FB_LABEL: &str = "$clid_fb";
pub const CLICK_ID_MS_LABEL: &str = "$clid_ms";
pub const CLICK_ID_TW_LABEL: &str = "$clid_tw";
pub const COUNTRY_LABEL: &str = "$country";
pub const REGION_LABEL: &str = "$region";
pub const CITY_LABEL: &str = "$city";
pub const VISITOR_ID_LABEL: &str = "$visitor_id";

pub const FORM_FACTOR_DESKTOP: &str = "desktop";
pub const FORM_FACTOR_MOBILE: &str = "mobile";
pub const FORM_FACTOR_TABLET: &str = "tablet";
pub const FORM_FACTOR_BOT: &str = "bot";

/// Builds the filter key selecting points whose `label` differs from the
/// filter value.
pub fn not_equal(label: &str) -> String {
    format!("{}{}", label, NOT_EQUAL_SUFFIX)
}

/// A single decoded observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(rename = "timestamp")]
    pub ts: i64,
    pub name: String,
    pub labels: MetricLabels,
    pub value: f64,
}

impl Metric {
    pub fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or("")
    }
}

/// A group key together with the value its group reduced to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetric {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    /// Number of matched points per group.
    #[default]
    Count,
    /// Sum of the matched point values per group.
    Sum,
    /// Sum divided by count.
    Avg,
}

/// One histogram bucket: bucket start and its aggregated value.
pub type Bucket = (i64, i64);
