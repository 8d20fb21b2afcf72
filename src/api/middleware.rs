use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::block_in_place;
use tracing::warn;

use super::{Accounts, ApiState};
use crate::request::TrackedRequest;

/// Records every trackable request, and its duration when enabled.
pub(crate) async fn track_requests(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.tracker.should_track(req.uri().path()) {
        return next.run(req).await;
    }

    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    let tracked = TrackedRequest::from_http(&req)
        .with_route(route)
        .with_remote_addr(remote_addr);

    if let Err(e) = blocking_append(|| state.tracker.track_request(&tracked)) {
        warn!("Failed to track request to {}: {}", tracked.path, e);
    }

    if state.tracker.options().measure_request_duration {
        state.tracker.measure_future(&tracked, next.run(req)).await
    } else {
        next.run(req).await
    }
}

/// Runs a synchronous store write. On a multi-threaded runtime the worker is
/// handed off first so other tasks keep running; `block_in_place` panics on a
/// current-thread runtime, where the write runs inline.
pub(crate) fn blocking_append<R>(write: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => block_in_place(write),
        _ => write(),
    }
}

/// HTTP basic auth against the configured accounts.
pub(crate) async fn basic_auth(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Response {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|value| check_credentials(&state.accounts, value));

    if authorized {
        return next.run(req).await;
    }

    warn!("Rejected dashboard request to {}", req.uri().path());
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"footfall\"")],
    )
        .into_response()
}

fn check_credentials(accounts: &Accounts, header_value: &str) -> bool {
    let Some(encoded) = header_value.strip_prefix("Basic ") else {
        return false;
    };

    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };

    match decoded.split_once(':') {
        Some((user, pass)) => accounts.get(user).is_some_and(|expected| expected == pass),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_credentials() {
        let accounts = Accounts::from([("admin".to_string(), "s3cret:with:colons".to_string())]);
        let header = |raw: &str| format!("Basic {}", STANDARD.encode(raw));

        assert!(check_credentials(&accounts, &header("admin:s3cret:with:colons")));
        assert!(!check_credentials(&accounts, &header("admin:s3cret")));
        assert!(!check_credentials(&accounts, &header("root:s3cret:with:colons")));
        assert!(!check_credentials(&accounts, &header("admin")));
        assert!(!check_credentials(&accounts, "Bearer abc"));
        assert!(!check_credentials(&accounts, "Basic !!!"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_append_on_multi_thread_runtime() {
        assert_eq!(blocking_append(|| 1 + 1), 2);
    }

    #[tokio::test]
    async fn test_blocking_append_on_current_thread_runtime() {
        assert_eq!(blocking_append(|| 1 + 1), 2);
    }

    #[test]
    fn test_blocking_append_outside_runtime() {
        assert_eq!(blocking_append(|| "inline"), "inline");
    }
}
