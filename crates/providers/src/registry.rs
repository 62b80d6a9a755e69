//! Backend construction from configuration.

use std::sync::Arc;

use crate::openai_compat::OpenAiCompatBackend;
use crate::scripted::ScriptedBackend;
use crate::traits::GenerativeBackend;
use px_domain::config::{BackendKind, LlmConfig};
use px_domain::error::Result;

/// Instantiate the configured generative backend.
pub fn build_backend(config: &LlmConfig) -> Result<Arc<dyn GenerativeBackend>> {
    let backend: Arc<dyn GenerativeBackend> = match config.kind {
        BackendKind::OpenaiCompat => Arc::new(OpenAiCompatBackend::from_config(config)?),
        BackendKind::Scripted => Arc::new(ScriptedBackend::demo()),
    };

    tracing::info!(
        backend_id = %backend.backend_id(),
        kind = ?config.kind,
        "registered generative backend"
    );
    Ok(backend)
}
