use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

use super::error_response;

pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    match state.agent.transcript() {
        Ok(turns) => {
            let count = turns.len();
            Json(serde_json::json!({ "turns": turns, "count": count })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn clear_transcript(State(state): State<AppState>) -> impl IntoResponse {
    match state.agent.clear_transcript() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}
