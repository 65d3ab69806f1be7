//! HTTP surface.
//!
//! Three routes: the intake endpoint that feeds the orchestrator, a
//! liveness check, and a passthrough stub for the evaluation server.

use crate::pipeline::{IntakeReply, Orchestrator};
use crate::request::BuildRequest;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Assemble the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api-endpoint", post(intake))
        .route("/evaluate", post(evaluate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness check.
async fn health() -> impl IntoResponse {
    Json(json!({"message": "API running!"}))
}

/// Intake endpoint. Replies immediately; accepted builds continue in the
/// background.
async fn intake(State(state): State<AppState>, Json(request): Json<BuildRequest>) -> Response {
    match state.orchestrator.clone().handle(request).await {
        Ok(IntakeReply::InvalidSecret) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid secret"})),
        )
            .into_response(),
        Ok(IntakeReply::InvalidRound(round)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": format!("Invalid round {} (expected 1 or 2)", round)})),
        )
            .into_response(),
        Ok(IntakeReply::Duplicate) => Json(json!({
            "status": "ok",
            "note": "duplicate handled & re-notified",
        }))
        .into_response(),
        Ok(IntakeReply::Accepted(round)) => Json(json!({
            "status": "accepted",
            "note": format!("processing round {} started", round),
        }))
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Intake failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            )
                .into_response()
        }
    }
}

/// Evaluation passthrough stub: echo whatever arrives.
async fn evaluate(Json(data): Json<Value>) -> impl IntoResponse {
    Json(json!({"status": "Evaluation received successfully", "data": data}))
}

/// Bind and serve until shutdown.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Starting pagesmith server");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
