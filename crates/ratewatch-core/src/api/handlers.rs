//! API handlers for the HTTP REST API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{
    AlertSubscription, Corridor, CycleSummary, EvaluationReport, RateView, SubscriptionRequest,
};
use crate::service::RateWatch;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Engine behind every endpoint
    pub engine: Arc<RateWatch>,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

fn error_response(err: Error) -> (StatusCode, String) {
    let status = match &err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::CycleInProgress(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the server is up
    pub status: String,
    /// Crate version
    pub version: String,
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// --- Corridors & rates ---

/// List supported corridors
pub async fn list_corridors(State(state): State<AppState>) -> Json<Vec<Corridor>> {
    Json(state.engine.corridors().to_vec())
}

/// Ranked rate table response
#[derive(Serialize)]
pub struct RatesResponse {
    /// Requested corridor
    pub corridor: Corridor,
    /// Recommended provider
    pub recommended: String,
    /// Rows ranked by net value
    pub rates: Vec<RateView>,
}

/// Get the ranked rate table for a corridor
pub async fn list_rates(
    State(state): State<AppState>,
    Path((country, base, quote)): Path<(String, String, String)>,
) -> ApiResult<Json<RatesResponse>> {
    let corridor = Corridor::new(country, base, quote);
    let rates = state
        .engine
        .list_rates(&corridor)
        .await
        .map_err(error_response)?;
    let recommended = state
        .engine
        .recommended(&corridor)
        .await
        .map_err(error_response)?;

    Ok(Json(RatesResponse {
        corridor,
        recommended,
        rates,
    }))
}

/// Recommended provider for a corridor
#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendedResponse {
    /// Requested corridor
    pub corridor: Corridor,
    /// Recommended provider
    pub provider: String,
}

/// Get the recommended provider
pub async fn get_recommended(
    State(state): State<AppState>,
    Path((country, base, quote)): Path<(String, String, String)>,
) -> ApiResult<Json<RecommendedResponse>> {
    let corridor = Corridor::new(country, base, quote);
    let provider = state
        .engine
        .recommended(&corridor)
        .await
        .map_err(error_response)?;

    Ok(Json(RecommendedResponse { corridor, provider }))
}

/// Recommendation override request
#[derive(Debug, Deserialize)]
pub struct SetRecommendedRequest {
    /// Provider to mark as recommended
    pub provider: String,
}

/// Override the recommended provider
pub async fn set_recommended(
    State(state): State<AppState>,
    Path((country, base, quote)): Path<(String, String, String)>,
    Json(req): Json<SetRecommendedRequest>,
) -> ApiResult<Json<RecommendedResponse>> {
    let corridor = Corridor::new(country, base, quote);
    state
        .engine
        .set_recommended(&corridor, &req.provider)
        .await
        .map_err(error_response)?;

    Ok(Json(RecommendedResponse {
        corridor,
        provider: req.provider,
    }))
}

// --- Subscriptions ---

/// Create a subscription
pub async fn create_subscription(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<AlertSubscription>)> {
    let subscription = state
        .engine
        .create_subscription(req)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(subscription)))
}

/// Get a subscription by ID
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AlertSubscription>> {
    state
        .engine
        .get_subscription(id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Deactivate a subscription
pub async fn deactivate_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AlertSubscription>> {
    state
        .engine
        .deactivate_subscription(id)
        .await
        .map(Json)
        .map_err(error_response)
}

// --- Manual cycle triggers ---

/// Run an ingestion cycle now
pub async fn run_ingestion(State(state): State<AppState>) -> ApiResult<Json<CycleSummary>> {
    state
        .engine
        .run_ingestion_cycle()
        .await
        .map(Json)
        .map_err(error_response)
}

/// Run an evaluation pass now
pub async fn run_evaluation(State(state): State<AppState>) -> ApiResult<Json<EvaluationReport>> {
    state
        .engine
        .run_evaluation_pass()
        .await
        .map(Json)
        .map_err(error_response)
}
