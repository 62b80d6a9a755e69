//! Streaming orchestrator — one orchestration cycle per user turn.
//!
//! Entry point: [`run_cycle`] spawns the cycle and returns an
//! [`OutputStream`]. A cycle repairs the transcript, settles tool calls
//! left over from earlier cycles, then runs generation steps until the
//! backend stops asking for tools or the stop policy fires. The stream
//! always ends with exactly one `StreamEnd`.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::Instrument;

use px_domain::error::Result;
use px_domain::stream::{EndReason, OutputEvent, StreamEvent, Usage};
use px_domain::tool::parse_tool_arguments;
use px_domain::trace::TraceEvent;
use px_domain::turn::{locate_call, Part, Role, ToolCallPart, ToolCallState, Turn};
use px_providers::{GenerateRequest, GenerativeBackend};
use px_tools::{ToolCatalog, ToolRegistry};
use px_transcript::TranscriptStore;

use super::cancel::{CancelToken, CycleLease};
use super::confirm::{ConfirmationBook, Interceptor};
use super::gate::ToolGate;
use super::policy::{StepOutcome, StopPolicy};
use super::sanitize::sanitize;
use super::view::model_view;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline — everything a cycle needs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Pipeline {
    pub store: Arc<dyn TranscriptStore>,
    pub backend: Arc<dyn GenerativeBackend>,
    pub registry: Arc<ToolRegistry>,
    pub book: Arc<ConfirmationBook>,
    pub gate: ToolGate,
    pub policy: StopPolicy,
    pub system_prompt: String,
    pub temperature: Option<f32>,
}

impl Pipeline {
    fn interceptor(&self) -> Interceptor {
        Interceptor::new(Arc::clone(&self.registry), Arc::clone(&self.book))
    }
}

/// What starts a cycle.
#[derive(Debug, Clone)]
pub enum CycleInput {
    /// A new user message.
    Submit(String),
    /// No new input: act on recorded confirmation decisions.
    Resume,
}

impl CycleInput {
    fn label(&self) -> &'static str {
        match self {
            CycleInput::Submit(_) => "submit",
            CycleInput::Resume => "resume",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OutputStream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client-facing events of one cycle, in emission order.
pub struct OutputStream {
    rx: mpsc::Receiver<OutputEvent>,
}

impl OutputStream {
    pub async fn recv(&mut self) -> Option<OutputEvent> {
        self.rx.recv().await
    }

    /// Drain the stream to its end.
    pub async fn collect_all(mut self) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        while let Some(ev) = self.rx.recv().await {
            events.push(ev);
        }
        events
    }
}

impl futures_core::Stream for OutputStream {
    type Item = OutputEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<OutputEvent>> {
        self.rx.poll_recv(cx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_cycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Spawn one orchestration cycle. `lease` is held until the cycle has
/// persisted its turn and is released just before `StreamEnd` is sent.
pub fn run_cycle(pipeline: Arc<Pipeline>, lease: CycleLease, input: CycleInput) -> OutputStream {
    let (tx, rx) = mpsc::channel::<OutputEvent>(64);

    let turn_span = tracing::info_span!("turn", cycle = input.label());
    tokio::spawn(
        async move {
            tracing::debug!("cycle started");
            let mut cycle = Cycle {
                pipeline,
                tx: tx.clone(),
                cancel: lease.token().clone(),
                usage: Usage::default(),
            };
            let reason = match cycle.run(input).await {
                Ok(reason) => reason,
                Err(e) => {
                    tracing::error!(error = %e, fatal = e.is_fatal(), "cycle failed");
                    let _ = tx
                        .send(OutputEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    EndReason::Failed
                }
            };
            drop(lease);
            tracing::debug!(?reason, usage = ?cycle.usage, "cycle finished");
            let _ = tx.send(OutputEvent::StreamEnd { reason }).await;
        }
        .instrument(turn_span),
    );

    OutputStream { rx }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a single generation step ended.
enum StepEnd {
    Finished,
    Cancelled,
    Failed(String),
}

struct Cycle {
    pipeline: Arc<Pipeline>,
    tx: mpsc::Sender<OutputEvent>,
    cancel: CancelToken,
    usage: Usage,
}

impl Cycle {
    async fn emit(&self, event: OutputEvent) {
        let _ = self.tx.send(event).await;
    }

    async fn run(&mut self, input: CycleInput) -> Result<EndReason> {
        let p = Arc::clone(&self.pipeline);
        let resuming = matches!(input, CycleInput::Resume);

        if let CycleInput::Submit(text) = input {
            p.store.append(Turn::user(text))?;
        }

        // ── Repair what an interrupted cycle left behind ─────────────
        let stored = p.store.turns()?;
        let repaired = sanitize(&stored, |id| p.book.is_live(id));
        for turn in repaired
            .turns
            .iter()
            .filter(|t| repaired.changed.contains(&t.id))
        {
            p.store.replace(turn.clone())?;
        }
        let mut history = repaired.turns;

        let latest_user_text = history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(Turn::text)
            .unwrap_or_default();
        let catalog = p.gate.select(&latest_user_text, &p.registry);

        // ── Settle calls recorded by earlier cycles ──────────────────
        let interceptor = p.interceptor();
        let mut settled = 0;
        for turn in history.iter_mut().filter(|t| t.role == Role::Assistant) {
            let actionable = turn.tool_calls().any(|tc| {
                matches!(
                    tc.state,
                    ToolCallState::InputReady | ToolCallState::AwaitingConfirmation
                )
            });
            if !actionable {
                continue;
            }
            let dispatch = interceptor.dispatch(turn).await;
            if dispatch.resolutions.is_empty() {
                continue;
            }
            p.store.replace(turn.clone())?;
            settled += dispatch.resolved();
            for resolution in dispatch.resolutions {
                self.emit(resolution.into()).await;
            }
        }

        let mut tool_results = 0;
        if resuming {
            if p.book.undecided() > 0 {
                return Ok(EndReason::AwaitingConfirmation);
            }
            if settled == 0 {
                return Ok(EndReason::Completed);
            }
            tool_results = settled;
            let outcome = StepOutcome {
                steps: 0,
                tool_results,
            };
            if let Some(reason) = p.policy.evaluate(&outcome) {
                return Ok(reason);
            }
        }

        // ── Generation steps ─────────────────────────────────────────
        let mut turn = Turn::assistant(Vec::new());
        let mut steps = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return self.finish(turn, EndReason::Cancelled);
            }

            match self.step(steps, &history, &mut turn, &catalog).await {
                StepEnd::Finished => {}
                StepEnd::Cancelled => return self.finish(turn, EndReason::Cancelled),
                StepEnd::Failed(message) => return self.fail(turn, message).await,
            }
            steps += 1;

            if self.cancel.is_cancelled() {
                return self.finish(turn, EndReason::Cancelled);
            }

            let dispatch = interceptor.dispatch(&mut turn).await;
            let resolved = dispatch.resolved();
            for resolution in dispatch.resolutions {
                self.emit(resolution.into()).await;
            }
            if dispatch.waiting > 0 {
                return self.finish(turn, EndReason::AwaitingConfirmation);
            }
            if resolved == 0 {
                return self.finish(turn, EndReason::Completed);
            }

            tool_results += resolved;
            let outcome = StepOutcome {
                steps,
                tool_results,
            };
            if let Some(reason) = p.policy.evaluate(&outcome) {
                return self.finish(turn, reason);
            }
            tracing::debug!(steps, tool_results, "continuing after tool results");
        }
    }

    /// One backend call. Streams into `turn` and leaves every call it
    /// started in `input-ready`.
    async fn step(
        &mut self,
        index: u32,
        history: &[Turn],
        turn: &mut Turn,
        catalog: &ToolCatalog,
    ) -> StepEnd {
        let p = Arc::clone(&self.pipeline);

        let mut turns = model_view(history);
        turns.extend(model_view(std::slice::from_ref(turn)));
        let req = GenerateRequest {
            system_prompt: p.system_prompt.clone(),
            turns,
            tools: catalog.definitions(),
            step: index,
            temperature: p.temperature,
        };

        let step_span = tracing::info_span!(
            "backend.step",
            backend = p.backend.backend_id(),
            step = index,
            tools = req.tools.len(),
        );
        let started = Instant::now();

        let mut stream = match p.backend.generate(req).instrument(step_span.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(parent: &step_span, error = %e, "backend request failed");
                return StepEnd::Failed(e.to_string());
            }
        };

        // Backend call id -> id recorded on the part.
        let mut ids: HashMap<String, String> = HashMap::new();
        let mut arg_bufs: HashMap<String, String> = HashMap::new();
        let mut step_usage: Option<Usage> = None;
        let mut calls = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(parent: &step_span, "step cancelled");
                    return StepEnd::Cancelled;
                }
                next = stream.next() => next,
            };
            let Some(item) = next else {
                break;
            };
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(parent: &step_span, error = %e, "backend stream failed");
                    return StepEnd::Failed(e.to_string());
                }
            };

            match event {
                StreamEvent::Token { text } => {
                    if text.is_empty() {
                        continue;
                    }
                    push_text(turn, &text);
                    self.emit(OutputEvent::TextDelta { text }).await;
                }
                StreamEvent::ToolCallStarted { call_id: raw, tool_name } => {
                    let call_id = claim_call_id(&raw, history, turn, &p.book);
                    ids.insert(raw, call_id.clone());
                    calls += 1;
                    arg_bufs.insert(call_id.clone(), String::new());
                    turn.parts
                        .push(Part::ToolCall(ToolCallPart::pending(&call_id, &tool_name)));
                    self.emit(OutputEvent::ToolCallStarted { call_id, tool_name })
                        .await;
                }
                StreamEvent::ToolCallDelta { call_id, delta } => {
                    let call_id = ids.get(&call_id).cloned().unwrap_or(call_id);
                    arg_bufs.entry(call_id).or_default().push_str(&delta);
                }
                StreamEvent::ToolCallFinished {
                    call_id: raw,
                    tool_name,
                    arguments,
                } => {
                    let call_id = match ids.get(&raw) {
                        Some(id) => id.clone(),
                        None => {
                            let id = claim_call_id(&raw, history, turn, &p.book);
                            ids.insert(raw, id.clone());
                            id
                        }
                    };
                    arg_bufs.remove(&call_id);
                    if complete_call(turn, &call_id, &tool_name, arguments) {
                        calls += 1;
                        self.emit(OutputEvent::ToolCallStarted { call_id, tool_name })
                            .await;
                    }
                }
                StreamEvent::Done { usage, .. } => {
                    if let Some(u) = usage {
                        step_usage.get_or_insert_with(Usage::default).add(&u);
                    }
                }
                StreamEvent::Error { message } => {
                    tracing::warn!(parent: &step_span, %message, "backend reported an error");
                    return StepEnd::Failed(message);
                }
            }
        }

        // Calls that never saw a finished event: use the buffered deltas.
        for tc in turn.parts.iter_mut().filter_map(Part::as_tool_call_mut) {
            if tc.state != ToolCallState::PendingInput {
                continue;
            }
            let raw = arg_bufs.remove(&tc.call_id).unwrap_or_default();
            if let Err(e) = tc.set_input(parse_tool_arguments(&raw)) {
                tracing::warn!(call_id = %tc.call_id, error = %e, "cannot complete tool input");
            }
        }

        if let Some(u) = &step_usage {
            self.usage.add(u);
        }
        TraceEvent::BackendStep {
            backend: p.backend.backend_id().to_owned(),
            step: index,
            duration_ms: started.elapsed().as_millis() as u64,
            tool_calls: calls,
            prompt_tokens: step_usage.map(|u| u.prompt_tokens),
            completion_tokens: step_usage.map(|u| u.completion_tokens),
        }
        .emit();
        self.emit(OutputEvent::Step {
            index,
            usage: step_usage,
        })
        .await;

        StepEnd::Finished
    }

    /// Record the failure on the turn, tell the client, and persist.
    async fn fail(&self, mut turn: Turn, message: String) -> Result<EndReason> {
        turn.parts
            .push(Part::data("error", serde_json::json!({ "message": message })));
        self.emit(OutputEvent::Error { message }).await;
        self.finish(turn, EndReason::Failed)
    }

    /// Persist the in-progress assistant turn. On cancel or failure, calls
    /// that never resolved are dropped so the stored turn holds exactly the
    /// work that finished.
    fn finish(&self, mut turn: Turn, reason: EndReason) -> Result<EndReason> {
        if matches!(reason, EndReason::Cancelled | EndReason::Failed) {
            turn.parts.retain(|part| {
                part.as_tool_call().map_or(true, |tc| {
                    !matches!(
                        tc.state,
                        ToolCallState::PendingInput | ToolCallState::InputReady
                    )
                })
            });
        }
        if !turn.parts.is_empty() {
            self.pipeline.store.append(turn)?;
        }
        Ok(reason)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Append a token, merging into a trailing text part.
fn push_text(turn: &mut Turn, text: &str) {
    if let Some(Part::Text { text: last }) = turn.parts.last_mut() {
        last.push_str(text);
        return;
    }
    turn.parts.push(Part::text(text));
}

/// Id to record for a call the backend announced as `raw`. An id already
/// present in the transcript or the waiting set is replaced with a fresh
/// one, so a decision always reaches the call it was made for.
fn claim_call_id(raw: &str, history: &[Turn], turn: &Turn, book: &ConfirmationBook) -> String {
    let taken = raw.is_empty()
        || locate_call(history, raw).is_some()
        || locate_call(std::slice::from_ref(turn), raw).is_some()
        || book.is_live(raw);
    if !taken {
        return raw.to_owned();
    }
    let fresh = format!("call_{}", uuid::Uuid::new_v4());
    tracing::warn!(backend_call_id = raw, call_id = %fresh, "tool call id already in use, renamed");
    fresh
}

/// Move a call to `input-ready`. Returns true when no started event had
/// been seen for it and a new part was created.
fn complete_call(turn: &mut Turn, call_id: &str, tool_name: &str, arguments: Value) -> bool {
    let input = match arguments {
        Value::Object(_) => arguments,
        Value::String(raw) => parse_tool_arguments(&raw),
        _ => Value::Object(Default::default()),
    };

    let existing = turn
        .parts
        .iter_mut()
        .filter_map(Part::as_tool_call_mut)
        .find(|tc| tc.call_id == call_id);
    match existing {
        Some(tc) => {
            if let Err(e) = tc.set_input(input) {
                tracing::warn!(call_id, error = %e, "duplicate tool call completion ignored");
            }
            false
        }
        None => {
            turn.parts
                .push(Part::ToolCall(ToolCallPart::ready(call_id, tool_name, input)));
            true
        }
    }
}
