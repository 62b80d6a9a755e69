//! Confirmation endpoints: list waiting calls, submit decisions.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use px_domain::turn::Decision;

use crate::state::AppState;

use super::error_response;

pub async fn list_pending(State(state): State<AppState>) -> impl IntoResponse {
    let pending = state.agent.pending_confirmations();
    let count = pending.len();
    Json(serde_json::json!({
        "pending": pending,
        "count": count,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
}

/// Record a decision. The call runs on the next `POST /v1/resume`.
pub async fn resolve(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(body): Json<DecisionRequest>,
) -> impl IntoResponse {
    match state
        .agent
        .resolve_pending_confirmation(&call_id, body.decision)
    {
        Ok(()) => Json(serde_json::json!({
            "call_id": call_id,
            "decision": body.decision,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}
