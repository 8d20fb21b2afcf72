use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, warn};

use super::middleware::blocking_append;
use super::ApiState;
use crate::dashboard::Report;
use crate::request::TrackedRequest;
use crate::{FootfallError, Result};

/// 1x1 transparent GIF.
pub const PIXEL: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

const PIXEL_EXPIRES: &str = "Thu, 01 Jan 1970 00:00:00 GMT";
const PIXEL_CACHE_CONTROL: &str = "private, max-age=0, no-cache, must-revalidate, proxy-revalidate";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DashboardParams {
    #[serde(default)]
    t: String,
}

pub(crate) async fn dashboard(
    State(state): State<ApiState>,
    Query(params): Query<DashboardParams>,
) -> Result<Json<Report>> {
    debug!("Loading dashboard for timeframe {:?}", params.t);

    // Queries hit the store synchronously.
    let report = tokio::task::spawn_blocking(move || {
        state.dashboard.load_timeframe(&state.tracker, &params.t)
    })
    .await
    .map_err(|e| FootfallError::Storage(format!("Dashboard task failed: {}", e)))?;

    Ok(Json(report))
}

/// Records a view of the page named by `Referer` and answers with
/// [`PIXEL`]. The pixel request's own route is not recorded.
pub(crate) async fn pixel(State(state): State<ApiState>, req: Request) -> impl IntoResponse {
    let referer_path = req
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Uri>().ok())
        .map(|uri| uri.path().to_string())
        .filter(|path| !path.is_empty());

    if let Some(path) = referer_path {
        if state.tracker.should_track(&path) {
            let mut tracked = TrackedRequest::from_http(&req).with_route("");
            tracked.path = path;
            tracked.headers.remove(header::REFERER);

            if let Err(e) = blocking_append(|| state.tracker.track_request(&tracked)) {
                warn!("Failed to track pixel view of {}: {}", tracked.path, e);
            }
        }
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::EXPIRES, PIXEL_EXPIRES),
            (header::CACHE_CONTROL, PIXEL_CACHE_CONTROL),
        ],
        Bytes::from_static(&PIXEL),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_is_a_gif() {
        assert_eq!(&PIXEL[..6], b"GIF89a");
        assert_eq!(PIXEL[PIXEL.len() - 1], 0x3b);
    }
}
