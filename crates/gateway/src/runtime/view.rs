//! What the generative backend is allowed to see.
//!
//! Only resolved tool calls reach the backend; calls still waiting for
//! input or a decision are dropped from the submitted copy, never from
//! the store. Data parts are for clients only.

use px_domain::turn::{Part, Turn};

/// Backend-facing copy of `turns`. Turns left without parts are omitted.
pub fn model_view(turns: &[Turn]) -> Vec<Turn> {
    turns
        .iter()
        .filter_map(|turn| {
            let parts: Vec<Part> = turn
                .parts
                .iter()
                .filter(|p| match p {
                    Part::Text { text } => !text.is_empty(),
                    Part::ToolCall(tc) => tc.is_resolved(),
                    Part::Data { .. } => false,
                })
                .cloned()
                .collect();
            if parts.is_empty() {
                return None;
            }
            Some(Turn {
                parts,
                ..turn.clone()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_domain::turn::{ToolCallPart, ToolCallState};
    use serde_json::json;

    #[test]
    fn unresolved_calls_are_hidden() {
        let mut waiting = ToolCallPart::ready("w", "search", json!({}));
        waiting.await_confirmation().unwrap();
        let mut done = ToolCallPart::ready("d", "search", json!({}));
        done.succeed("ok").unwrap();

        let turns = vec![
            Turn::user("cats"),
            Turn::assistant(vec![
                Part::ToolCall(waiting),
                Part::ToolCall(done),
                Part::ToolCall(ToolCallPart::ready("r", "search", json!({}))),
            ]),
        ];
        let view = model_view(&turns);
        let calls: Vec<_> = view[1].tool_calls().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_id, "d");
        assert_eq!(calls[0].state, ToolCallState::Executed);
        assert_eq!(view[1].id, turns[1].id);
    }

    #[test]
    fn empty_turns_are_dropped() {
        let turns = vec![
            Turn::user("hi"),
            Turn::assistant(vec![Part::data("error", json!({"message": "boom"}))]),
            Turn::assistant(vec![Part::ToolCall(ToolCallPart::pending("p", "search"))]),
        ];
        let view = model_view(&turns);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].text(), "hi");
    }
}
