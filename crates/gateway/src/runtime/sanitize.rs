//! Transcript repair before a backend call.
//!
//! A tool call left in `pending-input`, or in `awaiting-confirmation` with
//! no live waiting entry, belongs to a cycle that was interrupted. Such
//! calls are normalised to `error` so every call sent to the backend has
//! a paired result. Everything else passes through unchanged.

use px_domain::trace::TraceEvent;
use px_domain::turn::{Role, ToolCallState, Turn};

pub const INTERRUPTED_INPUT: &str = "interrupted before the tool input was complete";
pub const INTERRUPTED_CONFIRMATION: &str = "interrupted while awaiting confirmation";

/// Result of a sanitize pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub turns: Vec<Turn>,
    /// Ids of turns that were modified, in transcript order.
    pub changed: Vec<String>,
    pub normalized_calls: usize,
}

/// Repair `turns`. `is_live` reports whether a call id still has an entry
/// in the confirmation waiting set.
///
/// Deterministic and idempotent for a fixed `is_live`.
pub fn sanitize(turns: &[Turn], is_live: impl Fn(&str) -> bool) -> Sanitized {
    let mut out = turns.to_vec();
    let mut changed = Vec::new();
    let mut normalized_calls = 0;

    for turn in out.iter_mut().filter(|t| t.role == Role::Assistant) {
        let mut touched = false;
        for tc in turn.parts.iter_mut().filter_map(|p| p.as_tool_call_mut()) {
            let reason = match tc.state {
                ToolCallState::PendingInput => INTERRUPTED_INPUT,
                ToolCallState::AwaitingConfirmation if !is_live(&tc.call_id) => {
                    INTERRUPTED_CONFIRMATION
                }
                _ => continue,
            };
            if tc.fail(reason).is_ok() {
                normalized_calls += 1;
                touched = true;
            }
        }
        if touched {
            changed.push(turn.id.clone());
        }
    }

    if normalized_calls > 0 {
        TraceEvent::TranscriptSanitized { normalized_calls }.emit();
    }

    Sanitized {
        turns: out,
        changed,
        normalized_calls,
    }
}
