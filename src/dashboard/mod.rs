//! Dashboard — Axum web server for the edge table.
//!
//! Serves a REST API and a self-contained HTML page.
//! CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    response::Html,
    routing::{get, post, put},
    Router,
};
use std::future::Future;
use tower_http::cors::CorsLayer;
use tracing::info;

use routes::AppState;

/// The embedded dashboard HTML (compiled into the binary).
const DASHBOARD_HTML: &str = include_str!("templates/index.html");

/// Bind `host:port` and serve until `shutdown` resolves.
pub async fn run_dashboard(
    state: AppState,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind dashboard address {addr}"))?;
    info!(%addr, "Dashboard listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Dashboard server error")?;
    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // API routes
        .route("/api/rows", get(routes::get_rows))
        .route("/api/sort", post(routes::post_sort))
        .route(
            "/api/estimates",
            get(routes::get_estimates).put(routes::put_estimates),
        )
        .route(
            "/api/estimates/:slug",
            put(routes::put_probability).delete(routes::delete_estimate),
        )
        .route("/api/selections", post(routes::post_selection))
        .route(
            "/api/import",
            get(routes::get_raw_data).post(routes::post_import),
        )
        .route("/api/refresh", post(routes::post_refresh))
        .route("/api/bets", post(routes::post_bet))
        .route("/api/autobet", post(routes::post_autobet))
        .route("/api/api-key", put(routes::put_api_key))
        .route("/api/search", get(routes::search))
        .route("/health", get(routes::health))
        // Dashboard HTML
        .route("/", get(serve_dashboard))
        .layer(cors)
        .with_state(state)
}

/// Serve the embedded HTML dashboard.
async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
