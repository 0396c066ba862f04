//! API route definitions
//!
//! - POST   /api/v1/ask                    - answer a question
//! - POST   /api/v1/reinitialize           - drop the knowledge base, rebuild lazily
//! - POST   /api/v1/knowledge-base/update  - drop and rebuild now
//! - GET    /api/v1/status                 - lifecycle state and counts
//! - POST   /api/v1/conversation/new       - start a new conversation
//! - DELETE /api/v1/conversation           - clear the current conversation
//! - GET    /api/v1/conversation/export    - plain-text transcript
//! - GET    /health                        - liveness

use axum::routing::{delete, get, post};
use axum::Router;

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/ask", post(handlers::ask))
        .route("/reinitialize", post(handlers::reinitialize))
        .route("/knowledge-base/update", post(handlers::update_knowledge_base))
        .route("/status", get(handlers::get_status))
        .route("/conversation/new", post(handlers::new_conversation))
        .route("/conversation", delete(handlers::clear_conversation))
        .route("/conversation/export", get(handlers::export_conversation))
        .with_state(state)
}

pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
