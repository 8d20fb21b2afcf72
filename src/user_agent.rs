//! `User-Agent` classification.

/// What a user-agent parser extracts from the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgent {
    pub name: String,
    pub version: String,
    pub device: String,
    pub os: String,
    pub os_version: String,
    pub desktop: bool,
    pub mobile: bool,
    pub tablet: bool,
    pub bot: bool,
}

pub trait UserAgentParser: Send + Sync {
    fn parse(&self, ua: &str) -> UserAgent;
}

/// HTTP client libraries, scripting tools and probes. Matched
/// case-insensitively against the start of the header.
pub const HTTP_CLIENT_LIBRARIES: &[&str] = &[
    // go
    "go-http-client",
    "github.com/monaco-io",
    "gentleman",
    // node.js
    "node-fetch",
    "undici",
    "axios",
    // objective-c + swift
    "alamofire",
    "nsurlconnection",
    "nsurlsession",
    "urlsession",
    "swifthttp",
    // python-urllib3, python-requests
    "python-",
    // java
    "apache-httpclient",
    "okhttp",
    // php
    "php-",
    "zend",
    "laminas",
    "guzzlehttp",
    // rust
    "reqwest",
    "hyper",
    // tools
    "curl",
    "wget",
    "httpie",
    "rapidapi",
    "postman",
    // apple app site association
    "aasa",
    // rss readers
    "linkship",
    "feedbin",
    "feedly",
    "artykul",
    "x11",
    // health checks and scanners
    "render",
    "dataprovider.com",
    "researchscan",
    "zgrab",
    "netcraftsurveyagent",
];

/// Whether `ua` is empty or names a known HTTP client library.
pub fn is_http_client_library(ua: &str) -> bool {
    if ua.is_empty() {
        return true;
    }

    let ua = ua.to_ascii_lowercase();
    HTTP_CLIENT_LIBRARIES
        .iter()
        .any(|client| ua.starts_with(client))
}

const BOT_MARKERS: &[&str] = &[
    "bot",
    "crawler",
    "crawling",
    "spider",
    "slurp",
    "headlesschrome",
    "lighthouse",
    "facebookexternalhit",
    "mediapartners",
];

const BROWSERS: &[(&str, &str)] = &[
    ("Edg/", "Edge"),
    ("EdgA/", "Edge"),
    ("EdgiOS/", "Edge"),
    ("OPR/", "Opera"),
    ("SamsungBrowser/", "Samsung Browser"),
    ("YaBrowser/", "Yandex Browser"),
    ("FxiOS/", "Firefox"),
    ("Firefox/", "Firefox"),
    ("CriOS/", "Chrome"),
    ("HeadlessChrome/", "Headless Chrome"),
    ("Chrome/", "Chrome"),
];

const DESKTOP_OSES: &[&str] = &["Windows", "macOS", "Linux", "ChromeOS"];

/// Substring heuristics over the common browser, OS and crawler tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinUserAgentParser;

impl UserAgentParser for BuiltinUserAgentParser {
    fn parse(&self, ua: &str) -> UserAgent {
        let lower = ua.to_ascii_lowercase();
        let mut parsed = UserAgent {
            bot: BOT_MARKERS.iter().any(|m| lower.contains(m)),
            ..Default::default()
        };

        let (os, os_version, device) = detect_os(ua, &lower);
        parsed.os = os.to_string();
        parsed.os_version = os_version;
        parsed.device = device.to_string();

        let android = os == "Android";
        parsed.tablet = lower.contains("ipad")
            || lower.contains("tablet")
            || (android && !lower.contains("mobile"));
        parsed.mobile = !parsed.tablet
            && (lower.contains("iphone") || lower.contains("mobile") || android);
        parsed.desktop = !parsed.mobile && !parsed.tablet && DESKTOP_OSES.contains(&os);

        let (name, version) = detect_browser(ua, parsed.bot);
        parsed.name = name;
        parsed.version = version;

        parsed
    }
}

fn detect_os(ua: &str, lower: &str) -> (&'static str, String, &'static str) {
    if let Some(v) = value_after(ua, lower, "windows phone ") {
        return ("Windows Phone", v, "");
    }
    if let Some(v) = value_after(ua, lower, "windows nt ") {
        let version = match v.as_str() {
            "10.0" => "10".to_string(),
            "6.3" => "8.1".to_string(),
            "6.2" => "8".to_string(),
            "6.1" => "7".to_string(),
            _ => v,
        };
        return ("Windows", version, "");
    }
    if lower.contains("ipad") {
        let v = value_after(ua, lower, "cpu os ").unwrap_or_default();
        return ("iOS", v.replace('_', "."), "iPad");
    }
    if lower.contains("iphone") {
        let v = value_after(ua, lower, "iphone os ").unwrap_or_default();
        return ("iOS", v.replace('_', "."), "iPhone");
    }
    if lower.contains("android") {
        let v = value_after(ua, lower, "android ").unwrap_or_default();
        return ("Android", v, "");
    }
    if lower.contains("cros ") {
        return ("ChromeOS", String::new(), "");
    }
    if let Some(v) = value_after(ua, lower, "mac os x ") {
        return ("macOS", v.replace('_', "."), "");
    }
    if lower.contains("macintosh") {
        return ("macOS", String::new(), "");
    }
    if lower.contains("linux") {
        return ("Linux", String::new(), "");
    }

    ("", String::new(), "")
}

fn detect_browser(ua: &str, bot: bool) -> (String, String) {
    if bot {
        if let Some(found) = bot_product(ua) {
            return found;
        }
    }

    for (token, name) in BROWSERS {
        if let Some(pos) = ua.find(token) {
            return (name.to_string(), take_version(&ua[pos + token.len()..]));
        }
    }

    if ua.contains("Safari/") {
        if let Some(pos) = ua.find("Version/") {
            return ("Safari".to_string(), take_version(&ua[pos + "Version/".len()..]));
        }
    }

    // Non-browser clients lead with their own product token, e.g. `curl/8.4.0`.
    match ua.split_whitespace().next() {
        Some(product) if !product.starts_with("Mozilla/") => {
            let (name, version) = product.split_once('/').unwrap_or((product, ""));
            (name.to_string(), take_version(version))
        }
        _ => (String::new(), String::new()),
    }
}

/// Finds a `Name/version` token naming a crawler, as in
/// `Mozilla/5.0 (compatible; Googlebot/2.1; +http://...)`.
fn bot_product(ua: &str) -> Option<(String, String)> {
    ua.split(|c: char| c.is_whitespace() || c == ';' || c == '(' || c == ')')
        .filter(|token| token.contains('/') && !token.starts_with("+http"))
        .find(|token| {
            let lower = token.to_ascii_lowercase();
            BOT_MARKERS.iter().any(|m| lower.contains(m))
        })
        .map(|token| {
            let (name, version) = token.split_once('/').unwrap_or((token, ""));
            (name.to_string(), take_version(version))
        })
}

fn value_after(ua: &str, lower: &str, marker: &str) -> Option<String> {
    lower
        .find(marker)
        .map(|pos| take_version(&ua[pos + marker.len()..]))
}

fn take_version(rest: &str) -> String {
    rest.chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const SAFARI_IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1";
    const CHROME_ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
    const FIREFOX_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0";
    const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    #[test]
    fn test_desktop_browsers() {
        let ua = BuiltinUserAgentParser.parse(CHROME_WINDOWS);
        assert_eq!(ua.name, "Chrome");
        assert_eq!(ua.version, "120.0.0.0");
        assert_eq!(ua.os, "Windows");
        assert_eq!(ua.os_version, "10");
        assert!(ua.desktop && !ua.mobile && !ua.tablet && !ua.bot);

        let ua = BuiltinUserAgentParser.parse(FIREFOX_MAC);
        assert_eq!(ua.name, "Firefox");
        assert_eq!(ua.os, "macOS");
        assert_eq!(ua.os_version, "10.15");
        assert!(ua.desktop);
    }

    #[test]
    fn test_handheld_devices() {
        let ua = BuiltinUserAgentParser.parse(SAFARI_IPHONE);
        assert_eq!(ua.name, "Safari");
        assert_eq!(ua.version, "17.1");
        assert_eq!(ua.os, "iOS");
        assert_eq!(ua.os_version, "17.1");
        assert_eq!(ua.device, "iPhone");
        assert!(ua.mobile && !ua.tablet && !ua.desktop);

        let ua = BuiltinUserAgentParser.parse(SAFARI_IPAD);
        assert_eq!(ua.device, "iPad");
        assert!(ua.tablet && !ua.mobile);

        let ua = BuiltinUserAgentParser.parse(CHROME_ANDROID_TABLET);
        assert_eq!(ua.os, "Android");
        assert_eq!(ua.os_version, "13");
        assert!(ua.tablet);
    }

    #[test]
    fn test_crawlers_and_libraries() {
        let ua = BuiltinUserAgentParser.parse(GOOGLEBOT);
        assert!(ua.bot);
        assert_eq!(ua.name, "Googlebot");
        assert_eq!(ua.version, "2.1");

        let ua = BuiltinUserAgentParser.parse("curl/8.4.0");
        assert_eq!(ua.name, "curl");
        assert_eq!(ua.version, "8.4.0");
        assert!(!ua.bot);
    }

    #[test]
    fn test_http_client_library_detection() {
        assert!(is_http_client_library(""));
        assert!(is_http_client_library("curl/8.4.0"));
        assert!(is_http_client_library("Python-urllib/3.11"));
        assert!(is_http_client_library("Go-http-client/2.0"));
        assert!(is_http_client_library("NetcraftSurveyAgent/1.0"));
        assert!(!is_http_client_library(CHROME_WINDOWS));
        assert!(!is_http_client_library("my-curl-wrapper"));
    }
}
