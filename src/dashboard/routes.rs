//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`;
//! the tracker sits behind a mutex so every mutation sees the rows left by
//! the previous one.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::engine::executor::ExecutionReport;
use crate::engine::importer::ImportReport;
use crate::engine::reconciler::ReconcileOutcome;
use crate::engine::Tracker;
use crate::platforms::PredictionPlatform;
use crate::types::{
    BetReceipt, EdgeRow, MarketQuote, SortDirection, SortKey, SortOrder, TrackerError,
    UserEstimate,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub tracker: Mutex<Tracker>,
    /// Used for search so typing in the search box never waits on the tracker.
    pub platform: Arc<dyn PredictionPlatform>,
    pub search_limit: u32,
    pub started: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(tracker: Tracker, search_limit: u32) -> Self {
        Self {
            platform: tracker.platform(),
            tracker: Mutex::new(tracker),
            search_limit,
            started: Utc::now(),
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A tracker error mapped onto an HTTP status with a JSON `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        let status = match &err {
            TrackerError::InvalidProbability(_)
            | TrackerError::DegenerateMarket { .. }
            | TrackerError::EmptySlug
            | TrackerError::UnknownSortKey(_)
            | TrackerError::UnknownSortDirection(_)
            | TrackerError::UnknownSide(_)
            | TrackerError::InvalidAmount(_)
            | TrackerError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            TrackerError::NotTracked(_) => StatusCode::NOT_FOUND,
            TrackerError::Sort { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            TrackerError::MissingApiKey => StatusCode::UNAUTHORIZED,
            TrackerError::Fetch { .. } | TrackerError::Bet { .. } => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "Request failed");
        }
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

/// `0.625` → `"62.5%"`.
pub fn float_to_percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Round to two significant figures.
pub fn round_2sf(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let digits = 1 - value.abs().log10().floor() as i32;
    if digits >= 0 {
        let factor = 10f64.powi(digits);
        (value * factor).round() / factor
    } else {
        let factor = 10f64.powi(-digits);
        (value / factor).round() * factor
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A table row with its display strings.
#[derive(Debug, Clone, Serialize)]
pub struct RowView {
    #[serde(flatten)]
    pub row: EdgeRow,
    pub market_percent: String,
    pub user_percent: String,
    pub market_return_display: f64,
    pub kelly_display: f64,
    pub roi_display: f64,
    pub has_edge: bool,
}

impl From<&EdgeRow> for RowView {
    fn from(row: &EdgeRow) -> Self {
        Self {
            market_percent: float_to_percent(row.market_probability),
            user_percent: float_to_percent(row.user_probability),
            market_return_display: round_2sf(row.market_return),
            kelly_display: round_2sf(row.kelly_fraction),
            roi_display: round_2sf(row.roi),
            has_edge: row.has_edge(),
            row: row.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowsResponse {
    pub rows: Vec<RowView>,
    pub sort: SortOrder,
    pub has_api_key: bool,
    pub dry_run: bool,
    pub default_bet: Decimal,
    pub autobet_budget: Decimal,
}

impl RowsResponse {
    fn from_tracker(tracker: &Tracker) -> Self {
        Self {
            rows: tracker.rows().iter().map(RowView::from).collect(),
            sort: tracker.sort_order(),
            has_api_key: tracker.has_api_key(),
            dry_run: tracker.is_dry_run(),
            default_bet: tracker.default_bet(),
            autobet_budget: tracker.autobet_budget(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SortQuery {
    pub sort: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SortRequest {
    pub key: String,
    /// Omitted: behave like a header click and toggle.
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EstimateInput {
    pub slug: String,
    pub probability: f64,
}

#[derive(Debug, Deserialize)]
pub struct ProbabilityUpdate {
    /// Entered as a percentage, 0–100.
    pub percent: f64,
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    pub url: String,
    pub probability: f64,
}

#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub already_tracked: bool,
    pub outcome: Option<ReconcileOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub raw: String,
}

#[derive(Debug, Serialize)]
pub struct RawDataResponse {
    pub raw_data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BetRequest {
    pub slug: String,
    pub amount: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AutobetRequest {
    pub budget: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyRequest {
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub configured: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: i64,
    pub tracked: usize,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let tracked = state.tracker.lock().await.estimates().len();
    Json(HealthResponse {
        status: "ok",
        uptime_secs: (Utc::now() - state.started).num_seconds(),
        tracked,
    })
}

/// GET /api/rows?sort=roi&direction=desc
pub async fn get_rows(
    State(state): State<AppState>,
    Query(query): Query<SortQuery>,
) -> ApiResult<RowsResponse> {
    let mut tracker = state.tracker.lock().await;
    if let Some(key) = query.sort.as_deref() {
        let key: SortKey = key.parse()?;
        let direction = match query.direction.as_deref() {
            Some(d) => d.parse()?,
            None => tracker.sort_order().direction,
        };
        tracker.sort_by(key, direction)?;
    }
    Ok(Json(RowsResponse::from_tracker(&tracker)))
}

/// POST /api/sort
pub async fn post_sort(
    State(state): State<AppState>,
    Json(req): Json<SortRequest>,
) -> ApiResult<RowsResponse> {
    let key: SortKey = req.key.parse()?;
    let mut tracker = state.tracker.lock().await;
    match req.direction.as_deref() {
        Some(d) => {
            let direction: SortDirection = d.parse()?;
            tracker.sort_by(key, direction)?;
        }
        None => {
            tracker.toggle_sort(key)?;
        }
    }
    Ok(Json(RowsResponse::from_tracker(&tracker)))
}

/// GET /api/estimates
pub async fn get_estimates(State(state): State<AppState>) -> Json<Vec<UserEstimate>> {
    Json(state.tracker.lock().await.estimates().to_vec())
}

/// PUT /api/estimates
pub async fn put_estimates(
    State(state): State<AppState>,
    Json(inputs): Json<Vec<EstimateInput>>,
) -> ApiResult<ReconcileOutcome> {
    let estimates = inputs
        .into_iter()
        .map(|e| UserEstimate::new(e.slug, e.probability))
        .collect::<Result<Vec<_>, _>>()?;
    let outcome = state.tracker.lock().await.set_estimates(estimates).await;
    Ok(Json(outcome))
}

/// PUT /api/estimates/:slug
pub async fn put_probability(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(update): Json<ProbabilityUpdate>,
) -> ApiResult<ReconcileOutcome> {
    let outcome = state
        .tracker
        .lock()
        .await
        .set_probability(&slug, update.percent)
        .await?;
    Ok(Json(outcome))
}

/// DELETE /api/estimates/:slug
pub async fn delete_estimate(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.tracker.lock().await.remove(&slug)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/selections
pub async fn post_selection(
    State(state): State<AppState>,
    Json(req): Json<SelectionRequest>,
) -> ApiResult<SelectionResponse> {
    let outcome = state
        .tracker
        .lock()
        .await
        .select_market(&req.url, req.probability)
        .await?;
    Ok(Json(SelectionResponse {
        already_tracked: outcome.is_none(),
        outcome,
    }))
}

/// GET /api/import
pub async fn get_raw_data(State(state): State<AppState>) -> Json<RawDataResponse> {
    let tracker = state.tracker.lock().await;
    Json(RawDataResponse {
        raw_data: tracker.raw_data().map(str::to_string),
    })
}

/// POST /api/import
pub async fn post_import(
    State(state): State<AppState>,
    Json(req): Json<ImportRequest>,
) -> Json<ImportReport> {
    Json(state.tracker.lock().await.import(&req.raw).await)
}

/// POST /api/refresh
pub async fn post_refresh(State(state): State<AppState>) -> Json<ReconcileOutcome> {
    Json(state.tracker.lock().await.refresh().await)
}

/// POST /api/bets
pub async fn post_bet(
    State(state): State<AppState>,
    Json(req): Json<BetRequest>,
) -> ApiResult<BetReceipt> {
    let receipt = state
        .tracker
        .lock()
        .await
        .place_bet(&req.slug, req.amount)
        .await?;
    Ok(Json(receipt))
}

/// POST /api/autobet
pub async fn post_autobet(
    State(state): State<AppState>,
    body: Option<Json<AutobetRequest>>,
) -> ApiResult<ExecutionReport> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let report = state.tracker.lock().await.autobet(req.budget).await?;
    Ok(Json(report))
}

/// PUT /api/api-key
pub async fn put_api_key(
    State(state): State<AppState>,
    Json(req): Json<ApiKeyRequest>,
) -> Json<ApiKeyResponse> {
    let mut tracker = state.tracker.lock().await;
    tracker.set_api_key(req.api_key);
    Json(ApiKeyResponse {
        configured: tracker.has_api_key(),
    })
}

/// GET /api/search?q=term
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<MarketQuote>> {
    let term = query.q.trim();
    if term.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let limit = query.limit.unwrap_or(state.search_limit).min(100);
    let markets = state
        .platform
        .search_markets(term, limit)
        .await
        .map_err(|e| ApiError {
            status: StatusCode::BAD_GATEWAY,
            message: format!("Search failed: {e:#}"),
        })?;
    Ok(Json(markets))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
