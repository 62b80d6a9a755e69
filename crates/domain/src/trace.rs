use serde::Serialize;

/// Structured trace events emitted across all pixagent crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TranscriptAppend {
        turn_id: String,
        role: String,
        parts: usize,
    },
    TranscriptReplace {
        turn_id: String,
    },
    TranscriptCleared {
        turns: usize,
    },
    ToolGate {
        exposed: bool,
        matched: Option<String>,
    },
    TranscriptSanitized {
        normalized_calls: usize,
    },
    ConfirmationRegistered {
        call_id: String,
        tool_name: String,
    },
    ConfirmationResolved {
        call_id: String,
        decision: String,
    },
    ToolExecuted {
        call_id: String,
        tool_name: String,
        is_error: bool,
        duration_ms: u64,
    },
    BackendStep {
        backend: String,
        step: u32,
        duration_ms: u64,
        tool_calls: usize,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    ScheduledTurnInjected {
        turn_id: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "px_event");
    }
}
