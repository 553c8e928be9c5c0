//! Minimal HTTP surface over the store and the job controller. Read-mostly:
//! consumers list accounts, positions, and orders, and start/stop workers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::analysis::scoring::ScoringService;
use crate::jobs::JobController;
use crate::storage::Store;

#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub controller: Arc<JobController>,
    pub enricher: Arc<ScoringService>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/accounts", get(list_accounts))
        .route("/api/accounts/:id/positions", get(list_positions))
        .route("/api/accounts/:id/orders", get(list_orders))
        .route("/api/watchlist", get(list_watchlist))
        .route("/api/watchlist/:symbol", post(add_watchlist))
        .route("/api/logs", get(list_logs))
        .route("/api/jobs", get(job_status))
        .route("/api/jobs/:name/start", post(start_job))
        .route("/api/jobs/:name/stop", post(stop_job))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "api request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_accounts(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let accounts = state.store.accounts().get_all().await?;
    Ok(Json(accounts))
}

async fn list_positions(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let positions = state.store.positions().open_for_account(&id).await?;
    Ok(Json(positions))
}

async fn list_orders(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state.store.orders().get_by_account(&id, 50).await?;
    Ok(Json(orders))
}

async fn list_watchlist(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let instruments = state.store.instruments().watchlist().await?;
    Ok(Json(instruments))
}

async fn add_watchlist(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let instrument = state
        .store
        .instruments()
        .add_to_watchlist(&symbol, Some(state.enricher.as_ref()))
        .await?;
    Ok(Json(instrument))
}

async fn list_logs(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let entries = state.store.system_log().recent(100).await?;
    Ok(Json(entries))
}

async fn job_status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.controller.status())
}

async fn start_job(State(state): State<ApiState>, Path(name): Path<String>) -> impl IntoResponse {
    state.controller.start(Some(&name));
    Json(state.controller.status())
}

async fn stop_job(State(state): State<ApiState>, Path(name): Path<String>) -> impl IntoResponse {
    state.controller.stop(Some(&name)).await;
    Json(state.controller.status())
}
