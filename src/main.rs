use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::Path, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use footfall::{api, logging, metrics, Result, Tracker, TrackerOptions};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logger("footfall");

    let options = TrackerOptions::from_env()?;
    info!("Opening event store at {}", options.db_path.display());
    let tracker = Arc::new(Tracker::open(options)?);

    let user = env::var("FOOTFALL_DASHBOARD_USER").unwrap_or_else(|_| "admin".to_string());
    let password = env::var("FOOTFALL_DASHBOARD_PASSWORD").unwrap_or_else(|_| {
        warn!("FOOTFALL_DASHBOARD_PASSWORD is not set, using the default password");
        "admin".to_string()
    });

    let site = Router::new()
        .route("/", get(|| async { "Hello from footfall" }))
        .route("/hello/:name", get(hello));

    let app = api::mount(site, tracker, api::Accounts::from([(user, password)]))
        .route("/metrics", get(|| async { metrics::render() }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{}", port);
    info!("Starting footfall demo on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn hello(Path(name): Path<String>) -> String {
    format!("Hello, {}!", name)
}
