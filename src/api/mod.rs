//! axum integration: request tracking, the dashboard endpoint and the pixel.

mod handlers;
mod middleware;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tracing::info;

use crate::dashboard::Dashboard;
use crate::tracker::Tracker;

pub use handlers::PIXEL;

/// Username to password, for the dashboard's basic auth.
pub type Accounts = HashMap<String, String>;

#[derive(Clone)]
pub(crate) struct ApiState {
    pub tracker: Arc<Tracker>,
    pub dashboard: Arc<Dashboard>,
    pub accounts: Arc<Accounts>,
}

/// Mounts tracking on `router` with the default dashboard.
///
/// Every route of `router` is tracked, subject to
/// [`Tracker::should_track`]. The dashboard report is served as JSON at the
/// tracker's dashboard path behind basic auth, and the tracking pixel at its
/// pixel path when one is configured.
pub fn mount(router: Router, tracker: Arc<Tracker>, accounts: Accounts) -> Router {
    mount_with_dashboard(router, tracker, accounts, Dashboard::default())
}

pub fn mount_with_dashboard(
    router: Router,
    tracker: Arc<Tracker>,
    accounts: Accounts,
    dashboard: Dashboard,
) -> Router {
    let state = ApiState {
        tracker: tracker.clone(),
        dashboard: Arc::new(dashboard),
        accounts: Arc::new(accounts),
    };

    let dashboard_path = tracker.dashboard_path().to_string();
    info!("Serving dashboard at {}", dashboard_path);
    let dashboard_routes = Router::new()
        .route(&dashboard_path, get(handlers::dashboard))
        .route_layer(from_fn_with_state(state.clone(), middleware::basic_auth))
        .with_state(state.clone());

    let mut router = router.merge(dashboard_routes);

    if let Some(pixel_path) = &tracker.options().pixel_path {
        info!("Serving tracking pixel at {}", pixel_path);
        router = router.merge(
            Router::new()
                .route(pixel_path, get(handlers::pixel))
                .with_state(state.clone()),
        );
    }

    router.layer(from_fn_with_state(state, middleware::track_requests))
}
