//! Transcript entries: turns and the parts they are made of.
//!
//! A [`Turn`] is owned by the transcript store. Pipeline stages clone the
//! stored sequence, transform their copy, and write changed turns back
//! through the store by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One role-tagged entry in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// A fresh turn with a random id, stamped now.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            parts,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::text(text)])
    }

    pub fn assistant(parts: Vec<Part>) -> Self {
        Self::new(Role::Assistant, parts)
    }

    /// All text parts joined in order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallPart> {
        self.parts.iter().filter_map(Part::as_tool_call)
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Part
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One content unit within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text { text: String },
    ToolCall(ToolCallPart),
    /// Structured payload the pipeline does not interpret.
    Data { kind: String, payload: Value },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn data(kind: impl Into<String>, payload: Value) -> Self {
        Part::Data {
            kind: kind.into(),
            payload,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallPart> {
        match self {
            Part::ToolCall(tc) => Some(tc),
            _ => None,
        }
    }

    pub fn as_tool_call_mut(&mut self) -> Option<&mut ToolCallPart> {
        match self {
            Part::ToolCall(tc) => Some(tc),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool-call parts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifecycle of a tool invocation.
///
/// ```text
/// pending-input → input-ready → awaiting-confirmation → executed | error
///                            ↘ executed | error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    PendingInput,
    InputReady,
    AwaitingConfirmation,
    Executed,
    Error,
}

impl ToolCallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ToolCallState::Executed | ToolCallState::Error)
    }

    pub fn can_advance_to(self, next: ToolCallState) -> bool {
        use ToolCallState::*;
        matches!(
            (self, next),
            (PendingInput, InputReady)
                | (PendingInput, Error)
                | (InputReady, AwaitingConfirmation)
                | (InputReady, Executed)
                | (InputReady, Error)
                | (AwaitingConfirmation, Executed)
                | (AwaitingConfirmation, Error)
        )
    }
}

/// A tool invocation recorded on an assistant turn.
///
/// `output` holds the executor result when `executed`, or the failure
/// reason when `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPart {
    pub call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub input: Value,
    pub state: ToolCallState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ToolCallPart {
    /// A call whose arguments are still streaming in.
    pub fn pending(call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            input: Value::Null,
            state: ToolCallState::PendingInput,
            output: None,
        }
    }

    /// A call with complete arguments, ready for dispatch.
    pub fn ready(call_id: impl Into<String>, tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            input,
            state: ToolCallState::InputReady,
            output: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_error(&self) -> bool {
        self.state == ToolCallState::Error
    }

    fn advance(&mut self, next: ToolCallState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::Validation(format!(
                "tool call {} cannot move from {:?} to {:?}",
                self.call_id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    pub fn set_input(&mut self, input: Value) -> Result<()> {
        self.advance(ToolCallState::InputReady)?;
        self.input = input;
        Ok(())
    }

    pub fn await_confirmation(&mut self) -> Result<()> {
        self.advance(ToolCallState::AwaitingConfirmation)
    }

    pub fn succeed(&mut self, output: impl Into<String>) -> Result<()> {
        self.advance(ToolCallState::Executed)?;
        self.output = Some(output.into());
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.advance(ToolCallState::Error)?;
        self.output = Some(reason.into());
        Ok(())
    }
}

/// A human decision on a call awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

/// Find a tool call by id. Returns `(turn index, part index)`.
pub fn locate_call(turns: &[Turn], call_id: &str) -> Option<(usize, usize)> {
    turns.iter().enumerate().find_map(|(ti, turn)| {
        turn.parts
            .iter()
            .position(|p| p.as_tool_call().is_some_and(|tc| tc.call_id == call_id))
            .map(|pi| (ti, pi))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_happy_path() {
        let mut tc = ToolCallPart::pending("c1", "search");
        tc.set_input(serde_json::json!({"query": "cats"})).unwrap();
        assert_eq!(tc.state, ToolCallState::InputReady);
        tc.succeed("3 photos").unwrap();
        assert_eq!(tc.state, ToolCallState::Executed);
        assert_eq!(tc.output.as_deref(), Some("3 photos"));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut tc = ToolCallPart::ready("c1", "search", Value::Null);
        tc.fail("boom").unwrap();
        assert!(tc.succeed("late").is_err());
        assert_eq!(tc.output.as_deref(), Some("boom"));
    }

    #[test]
    fn pending_input_cannot_skip_to_confirmation() {
        let mut tc = ToolCallPart::pending("c1", "search");
        assert!(tc.await_confirmation().is_err());
        assert_eq!(tc.state, ToolCallState::PendingInput);
    }

    #[test]
    fn part_serializes_with_kebab_tags() {
        let part = Part::ToolCall(ToolCallPart::pending("c1", "search"));
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "tool-call");
        assert_eq!(json["state"], "pending-input");

        let back: Part = serde_json::from_value(json).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn turn_text_joins_text_parts_only() {
        let turn = Turn::assistant(vec![
            Part::text("Here "),
            Part::ToolCall(ToolCallPart::pending("c1", "search")),
            Part::text("you go"),
        ]);
        assert_eq!(turn.text(), "Here you go");
        assert!(turn.has_tool_calls());
    }

    #[test]
    fn locate_call_finds_position() {
        let turns = vec![
            Turn::user("hi"),
            Turn::assistant(vec![
                Part::text("ok"),
                Part::ToolCall(ToolCallPart::pending("c9", "search")),
            ]),
        ];
        assert_eq!(locate_call(&turns, "c9"), Some((1, 1)));
        assert_eq!(locate_call(&turns, "missing"), None);
    }
}
