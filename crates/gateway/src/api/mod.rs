pub mod chat;
pub mod confirmations;
pub mod schedules;
pub mod transcript;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;

use px_domain::error::Error;

use crate::state::AppState;

/// Build the full API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health))
        // Conversation
        .route("/v1/chat/stream", post(chat::chat_stream))
        .route("/v1/resume", post(chat::resume))
        .route("/v1/stop", post(chat::stop))
        // Confirmations
        .route("/v1/confirmations", get(confirmations::list_pending))
        .route("/v1/confirmations/:call_id", post(confirmations::resolve))
        // Transcript
        .route("/v1/transcript", get(transcript::get_transcript))
        .route("/v1/transcript", delete(transcript::clear_transcript))
        // Schedules
        .route("/v1/schedules", get(schedules::list_schedules))
        .route("/v1/schedules", post(schedules::create_schedule))
        .route("/v1/schedules/:id", delete(schedules::delete_schedule))
}

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.agent.backend_id(),
        "busy": state.agent.is_busy(),
        "policy": {
            "max_steps": state.config.agent.max_steps,
            "stop_after_tool_result": state.config.agent.stop_after_tool_result,
            "gate_enabled": state.config.agent.gate_enabled,
            "require_confirmation": state.config.tools.require_confirmation,
        },
    }))
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Map a pipeline error to an HTTP response.
pub(crate) fn error_response(e: &Error) -> Response {
    let status = match e {
        Error::Busy | Error::ConfirmationConflict { .. } => StatusCode::CONFLICT,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::UnknownTurn(_) => StatusCode::NOT_FOUND,
        _ => {
            tracing::error!(error = %e, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, e.to_string())
}
