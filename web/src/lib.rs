//! HTTP surface for starting, stopping and inspecting monitoring sessions.

pub mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use monitor_service::MonitorService;
use std::path::Path;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub fn router(service: Arc<MonitorService>, static_dir: Option<&Path>) -> Router {
    let app = Router::new()
        .route("/monitor", post(routes::start_monitoring))
        .route("/stop_monitoring", post(routes::stop_monitoring))
        .route("/interactions", get(routes::interactions))
        .route("/status", get(routes::status))
        .route("/health", get(routes::health));

    let app = match static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    };

    app.layer(TraceLayer::new_for_http()).with_state(service)
}
