//! The agent facade: the boundary operations presentation code calls.
//!
//! HTTP handlers, the REPL, and the scheduler all go through [`Agent`].
//! It owns the single active-cycle slot, so at most one orchestration
//! cycle runs at a time.

use std::sync::Arc;

use px_domain::config::AgentConfig;
use px_domain::error::{Error, Result};
use px_domain::trace::TraceEvent;
use px_domain::turn::{Decision, Turn};
use px_providers::GenerativeBackend;
use px_tools::ToolRegistry;
use px_transcript::TranscriptStore;

use super::cancel::ActiveCycle;
use super::confirm::{ConfirmationBook, PendingConfirmation};
use super::gate::ToolGate;
use super::orchestrator::{run_cycle, CycleInput, OutputStream, Pipeline};
use super::policy::StopPolicy;

#[derive(Clone)]
pub struct Agent {
    pipeline: Arc<Pipeline>,
    active: Arc<ActiveCycle>,
}

impl Agent {
    pub fn new(
        store: Arc<dyn TranscriptStore>,
        backend: Arc<dyn GenerativeBackend>,
        registry: Arc<ToolRegistry>,
        cfg: &AgentConfig,
        temperature: Option<f32>,
    ) -> Self {
        Self::with_policy(
            store,
            backend,
            registry,
            ToolGate::from_config(cfg),
            StopPolicy::from_config(cfg),
            cfg.system_prompt.clone(),
            temperature,
        )
    }

    /// Build with an explicit gate and stop policy.
    pub fn with_policy(
        store: Arc<dyn TranscriptStore>,
        backend: Arc<dyn GenerativeBackend>,
        registry: Arc<ToolRegistry>,
        gate: ToolGate,
        policy: StopPolicy,
        system_prompt: String,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                store,
                backend,
                registry,
                book: Arc::new(ConfirmationBook::new()),
                gate,
                policy,
                system_prompt,
                temperature,
            }),
            active: Arc::new(ActiveCycle::new()),
        }
    }

    /// Start a cycle for a new user message. Fails with [`Error::Busy`]
    /// while another cycle runs; nothing is stored in that case.
    pub fn submit_user_turn(&self, text: &str) -> Result<OutputStream> {
        if text.trim().is_empty() {
            return Err(Error::Validation("message must not be empty".into()));
        }
        let lease = self.active.begin()?;
        Ok(run_cycle(
            Arc::clone(&self.pipeline),
            lease,
            CycleInput::Submit(text.to_owned()),
        ))
    }

    /// Start a cycle with no new input, acting on recorded decisions.
    pub fn resume(&self) -> Result<OutputStream> {
        let lease = self.active.begin()?;
        Ok(run_cycle(Arc::clone(&self.pipeline), lease, CycleInput::Resume))
    }

    /// Record a decision for a waiting call. The call itself is settled
    /// by the next cycle ([`resume`](Self::resume) or a new submission).
    pub fn resolve_pending_confirmation(&self, call_id: &str, decision: Decision) -> Result<()> {
        self.pipeline.book.resolve(call_id, decision)
    }

    pub fn pending_confirmations(&self) -> Vec<PendingConfirmation> {
        self.pipeline.book.list()
    }

    /// Signal the active cycle to stop. Returns false when idle.
    pub fn cancel_active_stream(&self) -> bool {
        let cancelled = self.active.cancel();
        if cancelled {
            tracing::info!("cancel requested for active cycle");
        }
        cancelled
    }

    /// Empty the transcript and forget every waiting confirmation.
    pub fn clear_transcript(&self) -> Result<()> {
        let _lease = self.active.begin()?;
        self.pipeline.store.clear()?;
        self.pipeline.book.clear();
        Ok(())
    }

    /// Append a system turn. Allowed while a cycle runs: the in-progress
    /// assistant turn is only stored when its cycle ends.
    pub fn inject_scheduled_turn(&self, text: &str) -> Result<Turn> {
        let turn = Turn::system(text);
        self.pipeline.store.append(turn.clone())?;
        TraceEvent::ScheduledTurnInjected {
            turn_id: turn.id.clone(),
        }
        .emit();
        Ok(turn)
    }

    pub fn transcript(&self) -> Result<Vec<Turn>> {
        self.pipeline.store.turns()
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_running()
    }

    pub fn backend_id(&self) -> &str {
        self.pipeline.backend.backend_id()
    }
}
