//! Conversation endpoints.
//!
//! - `POST /v1/chat/stream` — submit a user message, stream the cycle as SSE
//! - `POST /v1/resume`      — continue after confirmation decisions
//! - `POST /v1/stop`        — cancel the active cycle

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures_util::stream::Stream;
use serde::Deserialize;

use crate::runtime::OutputStream;
use crate::state::AppState;

use super::error_response;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// User message text.
    pub message: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat/stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_stream(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    match state.agent.submit_user_turn(&body.message) {
        Ok(events) => Sse::new(make_sse_stream(events))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/resume
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn resume(State(state): State<AppState>) -> impl IntoResponse {
    match state.agent.resume() {
        Ok(events) => Sse::new(make_sse_stream(events))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/stop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    let cancelled = state.agent.cancel_active_stream();
    Json(serde_json::json!({ "cancelled": cancelled }))
}

/// One SSE event per output event, named by its type.
fn make_sse_stream(
    mut events: OutputStream,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        while let Some(event) = events.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(event.kind()).data(data));
        }
    }
}
