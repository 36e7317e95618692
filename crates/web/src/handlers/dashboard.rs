use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use dashboard_core::{
    AppError,
    models::{RepoEntry, Snapshot},
};
use serde::Serialize;
use tokio::time::error::Elapsed;

use crate::{AppState, templates::render};

#[derive(Serialize)]
struct HomeContext<'a> {
    org: &'a str,
    branches: &'a [String],
    repos: &'a [RepoEntry],
    generated_in_ms: u64,
}

pub async fn get_dashboard(State(state): State<AppState>) -> Result<Response, AppError> {
    let start = Instant::now();
    let snapshot = take_snapshot(&state).await?;
    let rendered = render(&state.templates, "home.html", HomeContext {
        org: &state.config.dashboard.org,
        branches: &snapshot.branches,
        repos: &snapshot.repos,
        generated_in_ms: start.elapsed().as_millis() as u64,
    })?;
    Ok(Html(rendered).into_response())
}

pub async fn get_snapshot(State(state): State<AppState>) -> Result<Json<Snapshot>, AppError> {
    Ok(Json(take_snapshot(&state).await?))
}

async fn take_snapshot(state: &AppState) -> Result<Snapshot, AppError> {
    let timeout = Duration::from_secs(state.config.server.timeout_secs);
    state.aggregator.snapshot_with_timeout(timeout).await.map_err(pass_error)
}

fn pass_error(err: anyhow::Error) -> AppError {
    if err.is::<Elapsed>() {
        tracing::error!("{:#}", err);
        return AppError::Status(StatusCode::GATEWAY_TIMEOUT);
    }
    AppError::Internal(err)
}

#[cfg(test)]
mod tests {
    use anyhow::{Context, anyhow};

    use super::*;

    #[tokio::test]
    async fn timeout_maps_to_gateway_timeout() {
        let elapsed = tokio::time::timeout(Duration::from_millis(1), std::future::pending::<()>())
            .await
            .context("Snapshot timed out")
            .unwrap_err();
        assert!(matches!(pass_error(elapsed), AppError::Status(StatusCode::GATEWAY_TIMEOUT)));
        assert!(matches!(pass_error(anyhow!("discovery failed")), AppError::Internal(_)));
    }
}
