use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::engine::GamificationEngine;
use crate::event::EventBus;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GamificationEngine>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(engine: Arc<GamificationEngine>, event_bus: EventBus) -> Self {
        Self { engine, event_bus }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use crate::config::GamificationConfig;
    use crate::engine::{GamificationEngine, InMemoryHandles};

    /// Builds an AppState backed entirely by in-memory repositories,
    /// with the default catalogs already seeded.
    pub async fn test_app_state() -> (AppState, InMemoryHandles) {
        let event_bus = EventBus::with_default_capacity();
        let (engine, handles) =
            GamificationEngine::in_memory(GamificationConfig::default(), event_bus.clone());
        engine
            .initialize_catalogs()
            .await
            .expect("catalog seeding should succeed");
        (AppState::new(engine, event_bus), handles)
    }
}
