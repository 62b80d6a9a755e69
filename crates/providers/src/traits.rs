use px_domain::error::Result;
use px_domain::stream::{BoxStream, StreamEvent};
use px_domain::tool::ToolDefinition;
use px_domain::turn::Turn;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One generation step, backend-agnostic.
///
/// `turns` is the model view of the transcript: every tool call in it is
/// resolved, and opaque data parts have been stripped.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub system_prompt: String,
    pub turns: Vec<Turn>,
    /// Tool catalog for this step. Empty means conversation-only.
    pub tools: Vec<ToolDefinition>,
    /// Zero-based index of the step within the current cycle.
    pub step: u32,
    /// Sampling temperature. `None` lets the backend choose.
    pub temperature: Option<f32>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core backend trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A generative-text backend.
///
/// One call to [`generate`](GenerativeBackend::generate) is one step. The
/// returned stream yields text tokens and tool-call events and finishes
/// with `Done`. Dropping the stream cancels the step.
#[async_trait::async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, req: GenerateRequest)
        -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A stable identifier for logs and errors.
    fn backend_id(&self) -> &str;
}
