//! Deterministic backend that replays canned steps.
//!
//! No transport logic. Used by integration tests and by `llm.kind =
//! "scripted"` for offline demos.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::traits::{GenerateRequest, GenerativeBackend};
use px_domain::error::{Error, Result};
use px_domain::stream::{BoxStream, StreamEvent};
use px_domain::turn::Role;

pub const SCRIPTED_BACKEND_ID: &str = "scripted";

/// What one `generate` call does.
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    /// Yield these events, then end. A trailing `Done` is added if missing.
    Events(Vec<StreamEvent>),
    /// Yield these events, then never finish. Only cancellation ends it.
    Stall(Vec<StreamEvent>),
    /// Fail the `generate` call itself.
    Fail(String),
}

impl ScriptedStep {
    /// A plain text reply split on whitespace into tokens.
    pub fn text(reply: &str) -> Self {
        let tokens = reply
            .split_inclusive(' ')
            .map(|t| StreamEvent::Token { text: t.into() })
            .collect();
        ScriptedStep::Events(tokens)
    }

    /// A single complete tool call.
    pub fn tool_call(call_id: &str, tool_name: &str, arguments: serde_json::Value) -> Self {
        ScriptedStep::Events(vec![
            StreamEvent::ToolCallStarted {
                call_id: call_id.into(),
                tool_name: tool_name.into(),
            },
            StreamEvent::ToolCallFinished {
                call_id: call_id.into(),
                tool_name: tool_name.into(),
                arguments,
            },
            StreamEvent::Done {
                usage: None,
                finish_reason: Some("tool_calls".into()),
            },
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    /// Reply with a fixed sentence once the script runs out.
    Canned,
    /// Call the first offered tool with the latest user text as `query`,
    /// otherwise reply with a fixed sentence.
    Demo,
}

pub struct ScriptedBackend {
    steps: Mutex<VecDeque<ScriptedStep>>,
    requests: Mutex<Vec<GenerateRequest>>,
    fallback: Fallback,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            fallback: Fallback::Canned,
        }
    }

    /// Offline stand-in for a real model: uses the tool catalog when one is
    /// offered on the first step, otherwise answers conversationally.
    pub fn demo() -> Self {
        Self {
            fallback: Fallback::Demo,
            ..Self::new(Vec::new())
        }
    }

    /// Queue more steps after construction.
    pub fn push(&self, step: ScriptedStep) {
        self.steps.lock().push_back(step);
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().len()
    }

    fn fallback_step(&self, req: &GenerateRequest) -> ScriptedStep {
        const REPLY: &str = "I'm a scripted assistant. Ask me to show you some photos!";
        if self.fallback == Fallback::Canned || req.step > 0 {
            return ScriptedStep::text(REPLY);
        }
        let Some(tool) = req.tools.first() else {
            return ScriptedStep::text(REPLY);
        };
        let query = req
            .turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text())
            .unwrap_or_default();
        ScriptedStep::tool_call(
            &format!("call_{}", uuid::Uuid::new_v4()),
            &tool.name,
            serde_json::json!({ "query": query }),
        )
    }
}

#[async_trait::async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate(
        &self,
        req: GenerateRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let next = self.steps.lock().pop_front();
        let step = match next {
            Some(step) => step,
            None => self.fallback_step(&req),
        };
        self.requests.lock().push(req);

        match step {
            ScriptedStep::Fail(message) => Err(Error::Backend {
                backend: SCRIPTED_BACKEND_ID.into(),
                message,
            }),
            ScriptedStep::Events(mut events) => {
                if !events.iter().any(|e| matches!(e, StreamEvent::Done { .. })) {
                    events.push(StreamEvent::Done {
                        usage: None,
                        finish_reason: Some("stop".into()),
                    });
                }
                let stream = async_stream::stream! {
                    for event in events {
                        tokio::task::yield_now().await;
                        yield Ok::<_, Error>(event);
                    }
                };
                Ok(Box::pin(stream))
            }
            ScriptedStep::Stall(events) => {
                let stream = async_stream::stream! {
                    for event in events {
                        yield Ok::<_, Error>(event);
                    }
                    std::future::pending::<()>().await;
                };
                Ok(Box::pin(stream))
            }
        }
    }

    fn backend_id(&self) -> &str {
        SCRIPTED_BACKEND_ID
    }
}
