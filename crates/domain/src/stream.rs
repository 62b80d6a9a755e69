use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for backend streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend-native events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted by a generative backend during one generation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// A tool call has started; arguments follow as deltas.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted { call_id: String, tool_name: String },

    /// Incremental tool call argument data.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { call_id: String, delta: String },

    /// A tool call is complete with full arguments.
    #[serde(rename = "tool_call_finished")]
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// The step is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// The backend failed mid-stream.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for a generation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client-facing output events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One increment of the client-facing response stream.
///
/// Every stream ends with exactly one [`OutputEvent::StreamEnd`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    TextDelta {
        text: String,
    },
    ToolCallStarted {
        call_id: String,
        tool_name: String,
    },
    /// The call needs a human decision before it can run.
    ConfirmationRequired {
        call_id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    ToolCallResult {
        call_id: String,
        tool_name: String,
        output: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    Step {
        index: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    Error {
        message: String,
    },
    StreamEnd {
        reason: EndReason,
    },
}

impl OutputEvent {
    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            OutputEvent::TextDelta { .. } => "text_delta",
            OutputEvent::ToolCallStarted { .. } => "tool_call_started",
            OutputEvent::ConfirmationRequired { .. } => "confirmation_required",
            OutputEvent::ToolCallResult { .. } => "tool_call_result",
            OutputEvent::Step { .. } => "step",
            OutputEvent::Error { .. } => "error",
            OutputEvent::StreamEnd { .. } => "stream_end",
        }
    }
}

/// Why an output stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The backend finished without requesting more tools.
    Completed,
    /// The step cap was reached.
    StepLimit,
    /// The early-stop rule fired.
    StopPolicy,
    /// A call is waiting for a human decision.
    AwaitingConfirmation,
    Cancelled,
    Failed,
}
