//! API route handlers
//!
//! Thin adapters from HTTP to [`Assistant`]. Lifecycle command failures map
//! to status codes; answers are always 200 with `is_error` set when the
//! answer text is a labeled error.

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::assistant::{Assistant, EMPTY_QUESTION};
use crate::error::LifecycleError;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<Assistant>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(assistant: Arc<Assistant>) -> Self {
        Self {
            assistant,
            started_at: Instant::now(),
        }
    }
}

fn lifecycle_error(err: &LifecycleError) -> Response {
    match err {
        LifecycleError::Busy(_) => ApiErrorResponse::service_unavailable(err.to_string()),
        LifecycleError::Failed(_) => ApiErrorResponse::conflict(err.to_string()),
        LifecycleError::Build(_) | LifecycleError::Index(_) => ApiErrorResponse::internal(err.to_string()),
    }
}

// ============================================================================
// Questions
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// POST /api/v1/ask
pub async fn ask(State(state): State<ApiState>, Json(req): Json<AskRequest>) -> Response {
    if req.question.trim().is_empty() {
        return ApiErrorResponse::bad_request(EMPTY_QUESTION);
    }
    ApiResponse::ok(state.assistant.ask(&req.question).await)
}

// ============================================================================
// Knowledge base commands
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: &'static str,
}

/// POST /api/v1/reinitialize
pub async fn reinitialize(State(state): State<ApiState>) -> Response {
    match state.assistant.reinitialize().await {
        Ok(()) => ApiResponse::ok(StateResponse {
            state: state.assistant.knowledge_base().state().name(),
        }),
        Err(e) => lifecycle_error(&e),
    }
}

/// POST /api/v1/knowledge-base/update
pub async fn update_knowledge_base(State(state): State<ApiState>) -> Response {
    match state.assistant.update_knowledge_base().await {
        Ok(summary) => ApiResponse::ok(summary.as_ref().clone()),
        Err(e) => lifecycle_error(&e),
    }
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.assistant.status().await)
}

// ============================================================================
// Conversation
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation_id: u64,
}

/// POST /api/v1/conversation/new
pub async fn new_conversation(State(state): State<ApiState>) -> Response {
    let conversation_id = state.assistant.new_conversation().await;
    ApiResponse::ok(ConversationResponse { conversation_id })
}

/// DELETE /api/v1/conversation
pub async fn clear_conversation(State(state): State<ApiState>) -> Response {
    state.assistant.clear_conversation().await;
    let conversation_id = state.assistant.status().await.conversation_id;
    ApiResponse::ok(ConversationResponse { conversation_id })
}

/// GET /api/v1/conversation/export
pub async fn export_conversation(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.assistant.export_conversation().await)
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub knowledge_base: &'static str,
}

/// GET /health
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        knowledge_base: state.assistant.knowledge_base().state().name(),
    })
}

/// Fallback for unknown paths
pub async fn not_found() -> Response {
    ApiErrorResponse::not_found("no such endpoint")
}
