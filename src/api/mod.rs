use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::error::PredictError;
use crate::predictor::numerology;
use crate::predictor::PredictionService;

#[derive(Clone)]
pub struct AppState {
    pub service: PredictionService,
}

type ApiError = (StatusCode, String);

/// Build the Axum router for the prediction API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/predictions/game/:id", get(game_handler))
        .route("/api/predictions/weekly", get(weekly_handler))
        .route("/api/predictions/upcoming", get(upcoming_handler))
        .route("/api/predictions/parlay", post(parlay_handler))
        .route("/api/features/:id", get(features_handler))
        .route("/api/numerology", get(numerology_handler))
        .route("/api/models", get(models_handler))
        .route("/api/models/feature-importance", get(feature_importance_handler))
        .route("/api/evaluation/backtest", get(backtest_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn to_response(e: PredictError) -> ApiError {
    match e {
        PredictError::ContestNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        PredictError::Storage(_) => {
            error!("Request failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/predictions/game/:id
async fn game_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .service
        .predict_contest(id)
        .await
        .map(Json)
        .map_err(to_response)
}

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    pub season: i32,
    pub week: i32,
}

/// GET /api/predictions/weekly?season=2025&week=7
async fn weekly_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<WeekQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .service
        .weekly(q.season, q.week)
        .await
        .map(Json)
        .map_err(to_response)
}

/// GET /api/predictions/upcoming
async fn upcoming_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .service
        .upcoming()
        .await
        .map(Json)
        .map_err(to_response)
}

#[derive(Debug, Deserialize)]
pub struct ParlayRequest {
    pub game_ids: Vec<i64>,
    pub max_selections: Option<usize>,
    pub target_odds: Option<f64>,
}

/// POST /api/predictions/parlay
async fn parlay_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ParlayRequest>,
) -> impl IntoResponse {
    Json(
        state
            .service
            .optimize_parlay(&req.game_ids, req.max_selections, req.target_odds)
            .await,
    )
}

/// GET /api/features/:id
async fn features_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let features = state.service.features_for(id).await.map_err(to_response)?;
    let named: serde_json::Map<String, serde_json::Value> = features
        .named()
        .into_iter()
        .map(|(name, value)| (name.to_string(), serde_json::json!(value)))
        .collect();
    Ok(Json(serde_json::json!({
        "contest_id": id,
        "features": named,
        "vector": features.as_slice(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct NumerologyQuery {
    pub home: String,
    pub away: String,
}

/// GET /api/numerology?home=Chiefs&away=Bills
async fn numerology_handler(Query(q): Query<NumerologyQuery>) -> impl IntoResponse {
    Json(numerology::analyze(&q.home, &q.away))
}

/// GET /api/models
async fn models_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.models())
}

/// GET /api/models/feature-importance
async fn feature_importance_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.feature_importance())
}

#[derive(Debug, Deserialize)]
pub struct BacktestQuery {
    pub season: i32,
    pub week_start: Option<i32>,
    pub week_end: Option<i32>,
}

/// GET /api/evaluation/backtest?season=2024&week_start=1&week_end=18
async fn backtest_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<BacktestQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .service
        .backtest(q.season, q.week_start, q.week_end)
        .await
        .map(Json)
        .map_err(to_response)
}
