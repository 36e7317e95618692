mod handlers;
mod templates;

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    Router,
    extract::{ConnectInfo, FromRef},
    http::{Method, Request, StatusCode, header},
};
use dashboard_core::config::{Config, ServerConfig};
use dashboard_drone::Drone;
use dashboard_github::GitHub;
use dashboard_status::{Aggregator, AggregatorSettings};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt,
    cors::{self, CorsLayer},
    normalize_path::NormalizePathLayer,
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, MakeSpan, TraceLayer},
};
use tracing::{Level, Span};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use crate::{handlers::build_router, templates::Templates};

pub type StatusAggregator = Aggregator<GitHub, Drone>;

#[derive(Clone, FromRef)]
pub struct AppState {
    config: Arc<Config>,
    aggregator: Arc<StatusAggregator>,
    templates: Templates,
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_path = std::env::var("DASHBOARD_CONFIG").unwrap_or_else(|_| "config.yml".into());
    let config = Arc::new(Config::load(&config_path).expect("Failed to load config"));
    tracing::info!(
        "Tracking {} branches of {} ({} topics, {} exclusions)",
        config.dashboard.branches.len(),
        config.dashboard.org,
        config.dashboard.topics.len(),
        config.dashboard.exclusions.len()
    );

    let github = GitHub::new(&config.github).await.expect("Failed to create GitHub client");
    let drone = Arc::new(Drone::new(&config.drone).expect("Failed to create Drone client"));
    let aggregator =
        Arc::new(Aggregator::new(AggregatorSettings::from(&config.dashboard), github, drone));
    let templates = templates::create(config.server.templates.clone());
    let state = AppState { config: config.clone(), aggregator, templates };

    if let Err(e) = serve(app(state), &config.server).await.context("Web server error") {
        tracing::error!("{e:?}");
    }
    tracing::info!("Shut down gracefully");
}

async fn serve(router: Router, server: &ServerConfig) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(path) = &server.socket {
            // Left behind by a previous run
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            let listener = tokio::net::UnixListener::bind(path)?;
            tracing::info!("Web server: Listening on {}", path.display());
            return axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(shutdown_signal())
                .await;
        }
    }
    #[cfg(not(unix))]
    {
        if server.socket.is_some() {
            tracing::warn!("Unix sockets are not supported on this platform, using port {}", server.port);
        }
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, server.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Web server: Listening on {}", addr);
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

fn app(state: AppState) -> Router {
    let sensitive_headers: Arc<[_]> = vec![header::AUTHORIZATION, header::COOKIE].into();
    // A little longer than a snapshot pass, so the pass reports its own timeout
    let request_timeout = Duration::from_secs(state.config.server.timeout_secs + 2);
    let middleware = ServiceBuilder::new()
        .sensitive_request_headers(sensitive_headers.clone())
        .sensitive_response_headers(sensitive_headers)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(RequestSpan)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(CorsLayer::new().allow_methods([Method::GET]).allow_origin(cors::Any))
        .compression();
    build_router().with_state(state).layer(middleware)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}

#[derive(Debug, Clone)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let cf_connecting_ip = request.headers().get("CF-Connecting-IP");
        let ip = if let Some(v) = cf_connecting_ip {
            v.to_str().ok().and_then(|s| IpAddr::from_str(s).ok())
        } else {
            request.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.ip())
        };
        let ip = ip.unwrap_or(IpAddr::from([0, 0, 0, 0]));
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("[unknown]");
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            ip = %ip,
            user_agent = %user_agent,
        )
    }
}
