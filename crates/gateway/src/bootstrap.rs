//! AppState construction shared by `serve` and `chat`.

use std::sync::Arc;

use anyhow::Context;

use px_domain::config::{Config, ConfigSeverity};
use px_tools::{unsplash, ToolRegistry, UnsplashSearch};
use px_transcript::{JsonlTranscript, MemoryTranscript, TranscriptStore};

use crate::runtime::{Agent, Scheduler};
use crate::state::AppState;

/// Build the agent and scheduler from configuration.
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Error => tracing::error!("{issue}"),
            ConfigSeverity::Warning => tracing::warn!("{issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!("configuration has errors; run `pixagent config validate`");
    }

    let store = build_store(&config)?;
    let backend = px_providers::build_backend(&config.llm).context("building backend")?;
    let registry = Arc::new(build_registry(&config)?);

    let agent = Agent::new(
        store,
        backend,
        registry,
        &config.agent,
        config.llm.temperature,
    );
    let scheduler = Arc::new(Scheduler::new(agent.clone()));

    tracing::info!(
        backend = %agent.backend_id(),
        gate_enabled = config.agent.gate_enabled,
        max_steps = config.agent.max_steps,
        "agent ready"
    );

    Ok(AppState {
        config,
        agent,
        scheduler,
    })
}

fn build_store(config: &Config) -> anyhow::Result<Arc<dyn TranscriptStore>> {
    match &config.transcript.path {
        Some(path) => {
            let store = JsonlTranscript::open(path)
                .with_context(|| format!("opening transcript {}", path.display()))?;
            tracing::info!(path = %path.display(), "transcript store: jsonl");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("transcript store: in-memory");
            Ok(Arc::new(MemoryTranscript::new()))
        }
    }
}

fn build_registry(config: &Config) -> anyhow::Result<ToolRegistry> {
    let search = UnsplashSearch::from_config(&config.tools.unsplash)
        .map_err(|e| anyhow::anyhow!("unsplash tool: {e}"))?;
    let registry = ToolRegistry::new().register(
        Arc::new(search),
        config.tools.requires_confirmation(unsplash::TOOL_NAME),
    );

    for name in &config.tools.require_confirmation {
        if registry.get(name).is_none() {
            tracing::warn!(tool = %name, "require_confirmation names an unknown tool");
        }
    }
    Ok(registry)
}
