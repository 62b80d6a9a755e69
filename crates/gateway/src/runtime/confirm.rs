//! Confirmation interceptor — human approval for sensitive tool calls.
//!
//! Tool-call state lives on the transcript part. The [`ConfirmationBook`]
//! only tracks which waiting calls exist and what was decided for them;
//! an entry is consumed under the write lock, so a decision is acted on
//! at most once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use px_domain::error::{Error, Result};
use px_domain::stream::OutputEvent;
use px_domain::trace::TraceEvent;
use px_domain::turn::{Decision, ToolCallPart, ToolCallState, Turn};
use px_tools::{ToolError, ToolExecutor, ToolRegistry};

/// Output recorded on a call the user rejected.
pub const REJECTED_BY_USER: &str = "rejected by user";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Waiting set
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A call waiting for (or holding) a human decision.
#[derive(Debug, Clone, Serialize)]
pub struct PendingConfirmation {
    pub call_id: String,
    pub turn_id: String,
    pub tool_name: String,
    pub input: Value,
    pub registered_at: DateTime<Utc>,
    /// Recorded but not yet consumed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
}

#[derive(Default)]
pub struct ConfirmationBook {
    entries: RwLock<HashMap<String, PendingConfirmation>>,
}

impl ConfirmationBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tc` to the waiting set. Re-registering the same call is a no-op;
    /// an id already held by a call in another turn is a conflict and the
    /// existing entry is kept.
    pub fn register(&self, turn_id: &str, tc: &ToolCallPart) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&tc.call_id) {
            if existing.turn_id == turn_id {
                return Ok(());
            }
            return Err(Error::ConfirmationConflict {
                call_id: tc.call_id.clone(),
                reason: format!("id already awaiting confirmation in turn {}", existing.turn_id),
            });
        }
        entries.insert(
            tc.call_id.clone(),
            PendingConfirmation {
                call_id: tc.call_id.clone(),
                turn_id: turn_id.to_owned(),
                tool_name: tc.tool_name.clone(),
                input: tc.input.clone(),
                registered_at: Utc::now(),
                decision: None,
            },
        );
        TraceEvent::ConfirmationRegistered {
            call_id: tc.call_id.clone(),
            tool_name: tc.tool_name.clone(),
        }
        .emit();
        Ok(())
    }

    /// Record a decision. Unknown ids and second decisions are conflicts;
    /// the recorded decision is never overwritten.
    pub fn resolve(&self, call_id: &str, decision: Decision) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(call_id)
            .ok_or_else(|| Error::ConfirmationConflict {
                call_id: call_id.to_owned(),
                reason: "no pending confirmation with this id".into(),
            })?;
        if let Some(existing) = entry.decision {
            return Err(Error::ConfirmationConflict {
                call_id: call_id.to_owned(),
                reason: format!("already {}", decision_str(existing)),
            });
        }
        entry.decision = Some(decision);
        TraceEvent::ConfirmationResolved {
            call_id: call_id.to_owned(),
            decision: decision_str(decision).into(),
        }
        .emit();
        Ok(())
    }

    /// Remove and return the decision recorded for the call `call_id` of
    /// turn `turn_id`. Entries owned by another turn are left alone.
    pub fn take_decision(&self, turn_id: &str, call_id: &str) -> Option<Decision> {
        let mut entries = self.entries.write();
        let entry = entries.get(call_id)?;
        if entry.turn_id != turn_id {
            return None;
        }
        let decision = entry.decision?;
        entries.remove(call_id);
        Some(decision)
    }

    pub fn is_live(&self, call_id: &str) -> bool {
        self.entries.read().contains_key(call_id)
    }

    /// Calls still waiting for a decision.
    pub fn undecided(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|e| e.decision.is_none())
            .count()
    }

    /// Snapshot of the waiting set, oldest first.
    pub fn list(&self) -> Vec<PendingConfirmation> {
        let mut all: Vec<_> = self.entries.read().values().cloned().collect();
        all.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.call_id.cmp(&b.call_id))
        });
        all
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

fn decision_str(d: Decision) -> &'static str {
    match d {
        Decision::Approved => "approved",
        Decision::Rejected => "rejected",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Interceptor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What happened to one call during a dispatch pass.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResolution {
    Resolved {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// Newly parked until a decision arrives.
    Awaiting {
        call_id: String,
        tool_name: String,
        input: Value,
    },
}

impl From<CallResolution> for OutputEvent {
    fn from(r: CallResolution) -> Self {
        match r {
            CallResolution::Resolved {
                call_id,
                tool_name,
                output,
                is_error,
            } => OutputEvent::ToolCallResult {
                call_id,
                tool_name,
                output,
                is_error,
            },
            CallResolution::Awaiting {
                call_id,
                tool_name,
                input,
            } => OutputEvent::ConfirmationRequired {
                call_id,
                tool_name,
                input,
            },
        }
    }
}

/// Outcome of [`Interceptor::dispatch`] on one turn.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// In part order.
    pub resolutions: Vec<CallResolution>,
    /// Calls in this turn still awaiting confirmation afterwards.
    pub waiting: usize,
}

impl Dispatch {
    pub fn resolved(&self) -> usize {
        self.resolutions
            .iter()
            .filter(|r| matches!(r, CallResolution::Resolved { .. }))
            .count()
    }
}

enum Plan {
    Settled,
    Waiting { newly: bool },
    Run {
        executor: Arc<dyn ToolExecutor>,
        input: Value,
    },
}

pub struct Interceptor {
    registry: Arc<ToolRegistry>,
    book: Arc<ConfirmationBook>,
}

impl Interceptor {
    pub fn new(registry: Arc<ToolRegistry>, book: Arc<ConfirmationBook>) -> Self {
        Self { registry, book }
    }

    pub fn book(&self) -> &Arc<ConfirmationBook> {
        &self.book
    }

    /// Advance every `input-ready` and `awaiting-confirmation` call in
    /// `turn`. Executors for independent calls run concurrently; parts are
    /// updated and resolutions reported in part order.
    pub async fn dispatch(&self, turn: &mut Turn) -> Dispatch {
        let mut plans: Vec<(usize, Plan)> = Vec::new();
        for (idx, part) in turn.parts.iter_mut().enumerate() {
            let Some(tc) = part.as_tool_call_mut() else {
                continue;
            };
            if matches!(
                tc.state,
                ToolCallState::InputReady | ToolCallState::AwaitingConfirmation
            ) {
                plans.push((idx, self.plan(&turn.id, tc)));
            }
        }

        let runs = plans.iter().filter_map(|(idx, plan)| match plan {
            Plan::Run { executor, input } => {
                let tc = turn.parts[*idx].as_tool_call()?;
                Some(run_executor(
                    Arc::clone(executor),
                    tc.call_id.clone(),
                    tc.tool_name.clone(),
                    input.clone(),
                ))
            }
            _ => None,
        });
        let mut outcomes = futures_util::future::join_all(runs).await.into_iter();

        let mut dispatch = Dispatch::default();
        for (idx, plan) in plans {
            let Some(tc) = turn.parts[idx].as_tool_call_mut() else {
                continue;
            };
            match plan {
                Plan::Run { .. } => {
                    if let Some(outcome) = outcomes.next() {
                        settle(tc, outcome);
                    }
                }
                Plan::Waiting { newly } => {
                    dispatch.waiting += 1;
                    if newly {
                        dispatch.resolutions.push(CallResolution::Awaiting {
                            call_id: tc.call_id.clone(),
                            tool_name: tc.tool_name.clone(),
                            input: tc.input.clone(),
                        });
                    }
                    continue;
                }
                Plan::Settled => {}
            }
            if tc.is_resolved() {
                dispatch.resolutions.push(CallResolution::Resolved {
                    call_id: tc.call_id.clone(),
                    tool_name: tc.tool_name.clone(),
                    output: tc.output.clone().unwrap_or_default(),
                    is_error: tc.is_error(),
                });
            }
        }
        dispatch
    }

    fn plan(&self, turn_id: &str, tc: &mut ToolCallPart) -> Plan {
        let Some(contract) = self.registry.get(&tc.tool_name) else {
            settle(tc, Err(ToolError::Failed(format!("unknown tool: {}", tc.tool_name))));
            return Plan::Settled;
        };

        match tc.state {
            ToolCallState::InputReady if !contract.requires_confirmation => Plan::Run {
                executor: Arc::clone(&contract.executor),
                input: tc.input.clone(),
            },
            ToolCallState::InputReady => {
                if let Err(e) = tc.await_confirmation() {
                    tracing::warn!(call_id = %tc.call_id, error = %e, "cannot park tool call");
                    return Plan::Settled;
                }
                if let Err(e) = self.book.register(turn_id, tc) {
                    tracing::warn!(call_id = %tc.call_id, error = %e, "tool call id already waiting");
                    settle(tc, Err(ToolError::Failed(e.to_string())));
                    return Plan::Settled;
                }
                Plan::Waiting { newly: true }
            }
            ToolCallState::AwaitingConfirmation => match self.book.take_decision(turn_id, &tc.call_id) {
                Some(Decision::Approved) => Plan::Run {
                    executor: Arc::clone(&contract.executor),
                    input: tc.input.clone(),
                },
                Some(Decision::Rejected) => {
                    settle(tc, Err(ToolError::Failed(REJECTED_BY_USER.into())));
                    Plan::Settled
                }
                None => match self.book.register(turn_id, tc) {
                    Ok(()) => Plan::Waiting { newly: false },
                    Err(e) => {
                        tracing::warn!(call_id = %tc.call_id, error = %e, "tool call id already waiting");
                        settle(tc, Err(ToolError::Failed(e.to_string())));
                        Plan::Settled
                    }
                },
            },
            _ => Plan::Settled,
        }
    }
}

/// Record an executor outcome on the part.
fn settle(tc: &mut ToolCallPart, outcome: std::result::Result<String, ToolError>) {
    let applied = match outcome {
        Ok(output) => tc.succeed(output),
        Err(e) => tc.fail(e.to_string()),
    };
    if let Err(e) = applied {
        tracing::warn!(call_id = %tc.call_id, error = %e, "tool call already settled");
    }
}

async fn run_executor(
    executor: Arc<dyn ToolExecutor>,
    call_id: String,
    tool_name: String,
    input: Value,
) -> std::result::Result<String, ToolError> {
    let span = tracing::info_span!("tool.call", tool_name = %tool_name, call_id = %call_id);
    async move {
        let started = Instant::now();
        let outcome = executor.execute(&input).await;
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "tool execution failed");
        }
        TraceEvent::ToolExecuted {
            call_id,
            tool_name,
            is_error: outcome.is_err(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
        outcome
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use px_domain::tool::ToolDefinition;
    use px_domain::turn::Part;
    use serde_json::json;

    struct Counting {
        name: &'static str,
        calls: AtomicUsize,
        delay_ms: u64,
        fail: bool,
    }

    impl Counting {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                delay_ms: 0,
                fail: false,
            })
        }
    }

    #[async_trait::async_trait]
    impl ToolExecutor for Counting {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.name.into(),
                description: String::new(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn execute(&self, input: &Value) -> std::result::Result<String, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            if self.fail {
                return Err(ToolError::Failed("boom".into()));
            }
            Ok(format!("{} ran with {input}", self.name))
        }
    }

    fn interceptor(tools: Vec<(Arc<Counting>, bool)>) -> Interceptor {
        let registry = tools
            .into_iter()
            .fold(ToolRegistry::new(), |r, (t, confirm)| r.register(t, confirm));
        Interceptor::new(Arc::new(registry), Arc::new(ConfirmationBook::new()))
    }

    fn turn_with(calls: &[(&str, &str)]) -> Turn {
        Turn::assistant(
            calls
                .iter()
                .map(|(id, tool)| Part::ToolCall(ToolCallPart::ready(*id, *tool, json!({"q": id}))))
                .collect(),
        )
    }

    #[tokio::test]
    async fn unconfirmed_tool_runs_immediately() {
        let search = Counting::new("search");
        let icpt = interceptor(vec![(search.clone(), false)]);
        let mut turn = turn_with(&[("c1", "search")]);

        let d = icpt.dispatch(&mut turn).await;
        assert_eq!(d.resolved(), 1);
        assert_eq!(d.waiting, 0);
        let tc = turn.tool_calls().next().unwrap();
        assert_eq!(tc.state, ToolCallState::Executed);
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn executor_failure_is_recorded_not_raised() {
        let broken = Arc::new(Counting {
            name: "search",
            calls: AtomicUsize::new(0),
            delay_ms: 0,
            fail: true,
        });
        let icpt = interceptor(vec![(broken, false)]);
        let mut turn = turn_with(&[("c1", "search")]);

        let d = icpt.dispatch(&mut turn).await;
        assert_eq!(
            d.resolutions,
            vec![CallResolution::Resolved {
                call_id: "c1".into(),
                tool_name: "search".into(),
                output: "boom".into(),
                is_error: true,
            }]
        );
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error() {
        let icpt = interceptor(vec![]);
        let mut turn = turn_with(&[("c1", "nope")]);
        icpt.dispatch(&mut turn).await;
        let tc = turn.tool_calls().next().unwrap();
        assert!(tc.is_error());
        assert_eq!(tc.output.as_deref(), Some("unknown tool: nope"));
    }

    #[tokio::test]
    async fn confirmation_parks_then_approval_executes_once() {
        let search = Counting::new("search");
        let icpt = interceptor(vec![(search.clone(), true)]);
        let mut turn = turn_with(&[("c1", "search")]);

        let d = icpt.dispatch(&mut turn).await;
        assert_eq!(d.waiting, 1);
        assert!(matches!(d.resolutions[0], CallResolution::Awaiting { .. }));
        assert_eq!(
            turn.tool_calls().next().unwrap().state,
            ToolCallState::AwaitingConfirmation
        );
        assert!(icpt.book().is_live("c1"));

        // Still waiting: no new event, nothing runs.
        let d = icpt.dispatch(&mut turn).await;
        assert!(d.resolutions.is_empty());
        assert_eq!(d.waiting, 1);

        icpt.book().resolve("c1", Decision::Approved).unwrap();
        assert!(icpt.book().resolve("c1", Decision::Approved).is_err());

        let d = icpt.dispatch(&mut turn).await;
        assert_eq!(d.resolved(), 1);
        assert!(!icpt.book().is_live("c1"));
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);

        // Late decision after consumption is a conflict, not a re-run.
        assert!(matches!(
            icpt.book().resolve("c1", Decision::Approved),
            Err(Error::ConfirmationConflict { .. })
        ));
        icpt.dispatch(&mut turn).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejection_never_invokes_executor() {
        let search = Counting::new("search");
        let icpt = interceptor(vec![(search.clone(), true)]);
        let mut turn = turn_with(&[("c1", "search")]);

        icpt.dispatch(&mut turn).await;
        icpt.book().resolve("c1", Decision::Rejected).unwrap();
        icpt.dispatch(&mut turn).await;

        let tc = turn.tool_calls().next().unwrap();
        assert_eq!(tc.state, ToolCallState::Error);
        assert_eq!(tc.output.as_deref(), Some(REJECTED_BY_USER));
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_results_keep_call_order() {
        let slow = Arc::new(Counting {
            name: "slow",
            calls: AtomicUsize::new(0),
            delay_ms: 50,
            fail: false,
        });
        let fast = Counting::new("fast");
        let icpt = interceptor(vec![(slow, false), (fast, false)]);
        let mut turn = turn_with(&[("a", "slow"), ("b", "fast")]);

        let d = icpt.dispatch(&mut turn).await;
        let ids: Vec<_> = d
            .resolutions
            .iter()
            .map(|r| match r {
                CallResolution::Resolved { call_id, .. } => call_id.as_str(),
                CallResolution::Awaiting { call_id, .. } => call_id.as_str(),
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn unknown_id_is_a_conflict() {
        let book = ConfirmationBook::new();
        let err = book.resolve("ghost", Decision::Approved).unwrap_err();
        assert!(matches!(err, Error::ConfirmationConflict { .. }));
    }

    #[test]
    fn list_reports_waiting_calls() {
        let book = ConfirmationBook::new();
        let mut tc = ToolCallPart::ready("c1", "search", json!({"query": "cats"}));
        tc.await_confirmation().unwrap();
        book.register("t1", &tc).unwrap();
        book.register("t1", &tc).unwrap();

        let list = book.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].turn_id, "t1");
        assert_eq!(book.undecided(), 1);
        book.resolve("c1", Decision::Rejected).unwrap();
        assert_eq!(book.undecided(), 0);
    }

    #[test]
    fn same_id_from_another_turn_is_refused() {
        let book = ConfirmationBook::new();
        let mut cats = ToolCallPart::ready("call_0", "search", json!({"query": "cats"}));
        cats.await_confirmation().unwrap();
        let mut dogs = ToolCallPart::ready("call_0", "search", json!({"query": "dogs"}));
        dogs.await_confirmation().unwrap();

        book.register("t1", &cats).unwrap();
        assert!(matches!(
            book.register("t2", &dogs),
            Err(Error::ConfirmationConflict { .. })
        ));
        assert_eq!(book.list()[0].input, json!({"query": "cats"}));

        book.resolve("call_0", Decision::Approved).unwrap();
        assert_eq!(book.take_decision("t2", "call_0"), None);
        assert!(book.is_live("call_0"));
        assert_eq!(book.take_decision("t1", "call_0"), Some(Decision::Approved));
    }

    #[tokio::test]
    async fn colliding_id_fails_instead_of_borrowing_a_decision() {
        let search = Counting::new("search");
        let icpt = interceptor(vec![(search.clone(), true)]);
        let mut first = turn_with(&[("c1", "search")]);
        let mut second = turn_with(&[("c1", "search")]);

        icpt.dispatch(&mut first).await;
        let d = icpt.dispatch(&mut second).await;
        assert_eq!(d.waiting, 0);
        assert!(second.tool_calls().next().unwrap().is_error());

        icpt.book().resolve("c1", Decision::Approved).unwrap();
        icpt.dispatch(&mut second).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
        icpt.dispatch(&mut first).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            first.tool_calls().next().unwrap().state,
            ToolCallState::Executed
        );
    }
}
