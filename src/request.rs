use std::borrow::Cow;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use axum::extract::Query;
use axum::http::{HeaderMap, Method, Request, Uri};

/// The parts of an HTTP request the classifier looks at. Built once per
/// request and consumed by a single tracking call.
#[derive(Debug, Clone, Default)]
pub struct TrackedRequest {
    pub method: String,
    pub path: String,
    /// Route pattern the framework matched, e.g. `/user/:id`.
    pub route: String,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    /// Overrides header-based client IP resolution when non-empty.
    pub client_ip: String,
    pub remote_addr: String,
}

impl TrackedRequest {
    pub fn new(method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        Self {
            method: method.to_string(),
            path: uri.path().to_string(),
            headers: headers.clone(),
            query: parse_query(uri),
            ..Default::default()
        }
    }

    pub fn from_http<B>(req: &Request<B>) -> Self {
        Self::new(req.method(), req.uri(), req.headers())
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: impl ToString) -> Self {
        self.remote_addr = addr.to_string();
        self
    }

    /// Header value with invalid UTF-8 replaced, or `""` when absent.
    pub fn header(&self, name: &str) -> Cow<'_, str> {
        header_value(&self.headers, name)
    }

    /// Resolved client IP: the explicit override, then proxy headers, then
    /// the transport address.
    pub fn resolve_client_ip(&self) -> String {
        if !self.client_ip.is_empty() {
            return self.client_ip.clone();
        }
        client_ip(&self.headers, &self.remote_addr)
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Cow<'a, str> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
        .unwrap_or(Cow::Borrowed(""))
}

fn parse_query(uri: &Uri) -> HashMap<String, String> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .map(|Query(q)| q)
        .unwrap_or_default()
}

/// Picks the client IP from, in order: `CF-Connecting-IP`, the first entry
/// of `X-Forwarded-For`, `X-Real-IP`, and the host part of `remote_addr`.
pub fn client_ip(headers: &HeaderMap, remote_addr: &str) -> String {
    let cf = header_value(headers, "cf-connecting-ip");
    if cf.trim().len() > 1 {
        return cf.trim().to_string();
    }

    let forwarded = header_value(headers, "x-forwarded-for");
    if forwarded.trim().len() > 1 {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
            return first.to_string();
        }
    }

    let real = header_value(headers, "x-real-ip");
    if real.trim().len() > 1 {
        return real.trim().to_string();
    }

    if let Ok(addr) = remote_addr.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    if let Ok(ip) = remote_addr.parse::<IpAddr>() {
        return ip.to_string();
    }

    String::new()
}
