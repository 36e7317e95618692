use axum::{Router, routing::get};

use crate::AppState;

mod dashboard;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(get_healthz))
        .route("/api/snapshot", get(dashboard::get_snapshot))
        // Every other path renders the dashboard
        .fallback(get(dashboard::get_dashboard))
}

async fn get_healthz() -> &'static str { "ok" }
