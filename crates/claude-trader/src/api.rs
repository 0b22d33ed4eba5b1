//! REST API over the strategy registry and the analysis pipeline.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use trader_agents::{AgentError, BreakerState};
use trader_models::{Analysis, Strategy, StrategyConfig, StrategyStatus};
use trader_store::{StoreError, StrategyKey};

use crate::error::TraderError;
use crate::AppState;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 500;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/strategies", get(list_strategies).post(create_strategy))
        .route(
            "/api/strategies/{key}",
            get(get_strategy).delete(delete_strategy),
        )
        .route("/api/strategies/{key}/status", patch(update_status))
        .route("/api/analysis/{key}", post(run_analysis).get(list_analyses))
        .route("/api/analysis/{key}/latest", get(latest_analysis))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// JSON error body: `{"error": ..., "details": [...]}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Vec<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    details: &'a [String],
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "Request failed");
        }
        let body = ErrorBody {
            error: &self.message,
            details: &self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let message = e.to_string();
        match e {
            StoreError::Invalid(errors) => Self {
                status: StatusCode::BAD_REQUEST,
                message,
                details: errors.messages().to_vec(),
            },
            StoreError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, message),
            StoreError::Conflict(_) => Self::new(StatusCode::CONFLICT, message),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, message),
        }
    }
}

impl From<TraderError> for ApiError {
    fn from(e: TraderError) -> Self {
        match e {
            TraderError::Store(e) => e.into(),
            TraderError::Inactive { .. } => Self::new(StatusCode::CONFLICT, e.to_string()),
            TraderError::Agent(e) => {
                let status = match &e {
                    AgentError::UnknownSymbol { .. } => StatusCode::BAD_REQUEST,
                    AgentError::NoSuccessfulAnalysts { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                Self::new(status, e.to_string())
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct AnalystHealth {
    name: String,
    breaker: BreakerState,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    cache_available: bool,
    analysts: Vec<AnalystHealth>,
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Json<Health> {
    let analysts: Vec<AnalystHealth> = state
        .pipeline
        .breaker_states()
        .into_iter()
        .map(|(name, breaker)| AnalystHealth { name, breaker })
        .collect();
    let cache_available = state.pipeline.cache().is_available();
    let degraded = !cache_available || analysts.iter().any(|a| a.breaker == BreakerState::Open);

    Json(Health {
        status: if degraded { "degraded" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        cache_available,
        analysts,
    })
}

/// GET /api/strategies
async fn list_strategies(State(state): State<AppState>) -> ApiResult<Json<Vec<Strategy>>> {
    Ok(Json(state.registry.list()?))
}

/// POST /api/strategies
async fn create_strategy(
    State(state): State<AppState>,
    Json(config): Json<StrategyConfig>,
) -> ApiResult<(StatusCode, Json<Strategy>)> {
    let strategy = state.registry.create(config)?;
    Ok((StatusCode::CREATED, Json(strategy)))
}

/// GET /api/strategies/{key}
async fn get_strategy(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<Strategy>> {
    Ok(Json(state.registry.get(&StrategyKey::parse(&key))?))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: StrategyStatus,
}

/// PATCH /api/strategies/{key}/status
async fn update_status(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<Strategy>> {
    let strategy = state
        .registry
        .set_status(&StrategyKey::parse(&key), update.status)?;
    Ok(Json(strategy))
}

/// DELETE /api/strategies/{key}
async fn delete_strategy(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    state.registry.delete(&StrategyKey::parse(&key))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    pub symbol: Option<String>,
}

/// POST /api/analysis/{key}
///
/// The body is optional; an empty body analyses the strategy's first symbol.
async fn run_analysis(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Analysis>)> {
    let request: AnalyzeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AnalyzeRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, format!("Invalid request body: {e}"))
        })?
    };

    let analysis = state
        .analyze(&StrategyKey::parse(&key), request.symbol.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(analysis)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

/// GET /api/analysis/{key}?limit=N
async fn list_analyses(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<Analysis>>> {
    let analyses = state
        .registry
        .analyses(&StrategyKey::parse(&key), clamp_limit(query.limit))?;
    Ok(Json(analyses))
}

/// GET /api/analysis/{key}/latest
async fn latest_analysis(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<Analysis>> {
    let key = StrategyKey::parse(&key);
    match state.registry.latest_analysis(&key)? {
        Some(analysis) => Ok(Json(analysis)),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("No analyses recorded for {key}"),
        )),
    }
}
