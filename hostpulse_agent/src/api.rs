//! HTTP surface: the WebSocket push channel plus read-only sample queries.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::error::{ProviderError, StoreError};
use crate::metrics::{collect_snapshot, host_info};
use crate::state::AppState;
use crate::ws::ws_handler;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health))
        .route("/api/metrics", get(current))
        .route("/api/metrics/history", get(history))
        .route("/api/metrics/latest", get(latest))
        .route("/api/metrics/stats", get(stats))
        .route("/api/system", get(system))
        // dashboards may be served from another origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Provider(_) => {
                tracing::error!(error = %self, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

fn bounded(name: &str, v: Option<u32>, default: u32, max: u32) -> Result<u32, ApiError> {
    let v = v.unwrap_or(default);
    if (1..=max).contains(&v) {
        Ok(v)
    } else {
        Err(ApiError::BadRequest(format!("{name} must be between 1 and {max}")))
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "hostpulse-agent",
        "connections": state.registry.count().await,
    }))
}

async fn current(State(state): State<AppState>) -> Result<Response, ApiError> {
    let snap = collect_snapshot(&state.provider, &state.config.thresholds).await?;
    Ok(Json(snap).into_response())
}

async fn system() -> Result<Response, ApiError> {
    let info = tokio::task::spawn_blocking(host_info)
        .await
        .map_err(ProviderError::from)?;
    Ok(Json(info).into_response())
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    hours: Option<u32>,
    limit: Option<u32>,
}

async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryParams>,
) -> Result<Response, ApiError> {
    let hours = bounded("hours", q.hours, 24, 168)?;
    let limit = bounded("limit", q.limit, 500, 5000)?;
    let since = state.store.now() - chrono::Duration::hours(hours.into());
    let rows = state.store.history(since, limit).await?;
    Ok(Json(rows).into_response())
}

async fn latest(State(state): State<AppState>) -> Result<Response, ApiError> {
    match state.store.latest().await? {
        Some(sample) => Ok(Json(sample).into_response()),
        None => Err(ApiError::NotFound("No metrics found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    hours: Option<u32>,
}

async fn stats(
    State(state): State<AppState>,
    Query(q): Query<StatsParams>,
) -> Result<Response, ApiError> {
    let hours = bounded("hours", q.hours, 1, 24)?;
    let since = state.store.now() - chrono::Duration::hours(hours.into());
    Ok(Json(state.store.stats(since, hours).await?).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_defaults_and_limits() {
        assert_eq!(bounded("hours", None, 24, 168).unwrap(), 24);
        assert_eq!(bounded("hours", Some(168), 24, 168).unwrap(), 168);
        assert!(matches!(
            bounded("hours", Some(0), 24, 168),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            bounded("limit", Some(5001), 500, 5000),
            Err(ApiError::BadRequest(_))
        ));
    }
}
