//! OpenAI-compatible streaming adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio and any other endpoint that
//! follows the chat-completions streaming contract.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use crate::traits::{GenerateRequest, GenerativeBackend};
use crate::util::{api_key_from_env, from_reqwest};
use px_domain::config::LlmConfig;
use px_domain::error::{Error, Result};
use px_domain::stream::{BoxStream, StreamEvent, Usage};
use px_domain::tool::{parse_tool_arguments, ToolDefinition};
use px_domain::turn::{Part, Role, ToolCallPart, Turn};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatBackend {
    id: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    default_temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: format!("openai_compat:{}", cfg.model),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key: api_key_from_env(&cfg.api_key_env),
            default_temperature: cfg.temperature,
            client,
        })
    }

    fn build_body(&self, req: &GenerateRequest) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": turns_to_messages(&req.system_prompt, &req.turns),
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature.or(self.default_temperature) {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn turns_to_messages(system_prompt: &str, turns: &[Turn]) -> Vec<Value> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(serde_json::json!({"role": "system", "content": system_prompt}));
    }
    for turn in turns {
        match turn.role {
            Role::User => {
                messages.push(serde_json::json!({"role": "user", "content": turn.text()}));
            }
            Role::System => {
                messages.push(serde_json::json!({"role": "system", "content": turn.text()}));
            }
            Role::Assistant => push_assistant(&mut messages, turn),
        }
    }
    messages
}

/// An assistant turn becomes one or more assistant messages: text that
/// follows a tool result starts a new message so step order survives.
fn push_assistant(messages: &mut Vec<Value>, turn: &Turn) {
    let mut text = String::new();
    let mut calls: Vec<&ToolCallPart> = Vec::new();

    for part in &turn.parts {
        match part {
            Part::Text { text: t } => {
                if !calls.is_empty() {
                    flush_segment(messages, &mut text, &mut calls);
                }
                text.push_str(t);
            }
            Part::ToolCall(tc) if tc.is_resolved() => calls.push(tc),
            _ => {}
        }
    }
    flush_segment(messages, &mut text, &mut calls);
}

fn flush_segment(messages: &mut Vec<Value>, text: &mut String, calls: &mut Vec<&ToolCallPart>) {
    if text.is_empty() && calls.is_empty() {
        return;
    }

    let mut obj = serde_json::json!({"role": "assistant"});
    obj["content"] = if text.is_empty() {
        Value::Null
    } else {
        Value::String(std::mem::take(text))
    };
    if !calls.is_empty() {
        obj["tool_calls"] = calls
            .iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.call_id,
                    "type": "function",
                    "function": {
                        "name": tc.tool_name,
                        "arguments": tc.input.to_string(),
                    }
                })
            })
            .collect();
    }
    messages.push(obj);

    for tc in calls.drain(..) {
        messages.push(serde_json::json!({
            "role": "tool",
            "tool_call_id": tc.call_id,
            "content": tc.output.clone().unwrap_or_default(),
        }));
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE stream parser
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default)]
struct StreamingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Per-response parser state.
///
/// Argument deltas reference a call by its position `index`, and only the
/// first chunk of a call carries its `id`, so the index→id mapping has to
/// live across payloads.
#[derive(Debug, Default)]
struct StreamState {
    calls: BTreeMap<u64, StreamingCall>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    finished: bool,
}

impl StreamState {
    fn parse(&mut self, data: &str) -> Vec<Result<StreamEvent>> {
        if data.trim() == "[DONE]" {
            return self.finish();
        }

        let v: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => return vec![Err(Error::Json(e))],
        };

        if let Some(err) = v.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from)
                .unwrap_or_else(|| err.to_string());
            return vec![Ok(StreamEvent::Error { message })];
        }

        if let Some(usage) = v.get("usage").and_then(parse_openai_usage) {
            self.usage = Some(usage);
        }

        let Some(choice) = v
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
        else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let delta = choice.get("delta").unwrap_or(&Value::Null);

        if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                events.push(Ok(StreamEvent::Token {
                    text: text.to_string(),
                }));
            }
        }

        if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
            for tc in tc_arr {
                self.tool_call_chunk(tc, &mut events);
            }
        }

        if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
            self.finish_reason = Some(fr.to_string());
            self.flush_calls(&mut events);
        }

        events
    }

    fn tool_call_chunk(&mut self, tc: &Value, events: &mut Vec<Result<StreamEvent>>) {
        let index = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
        let func = tc.get("function");

        if !self.calls.contains_key(&index) {
            let id = tc
                .get("id")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4()));
            let name = func
                .and_then(|f| f.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            events.push(Ok(StreamEvent::ToolCallStarted {
                call_id: id.clone(),
                tool_name: name.clone(),
            }));
            self.calls.insert(
                index,
                StreamingCall {
                    id,
                    name,
                    arguments: String::new(),
                },
            );
        }

        let Some(call) = self.calls.get_mut(&index) else {
            return;
        };
        if let Some(args) = func
            .and_then(|f| f.get("arguments"))
            .and_then(|v| v.as_str())
        {
            if !args.is_empty() {
                call.arguments.push_str(args);
                events.push(Ok(StreamEvent::ToolCallDelta {
                    call_id: call.id.clone(),
                    delta: args.to_string(),
                }));
            }
        }
    }

    fn flush_calls(&mut self, events: &mut Vec<Result<StreamEvent>>) {
        for (_, call) in std::mem::take(&mut self.calls) {
            events.push(Ok(StreamEvent::ToolCallFinished {
                arguments: parse_tool_arguments(&call.arguments),
                call_id: call.id,
                tool_name: call.name,
            }));
        }
    }

    fn finish(&mut self) -> Vec<Result<StreamEvent>> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let mut events = Vec::new();
        self.flush_calls(&mut events);
        events.push(Ok(StreamEvent::Done {
            usage: self.usage,
            finish_reason: self.finish_reason.take(),
        }));
        events
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl GenerativeBackend for OpenAiCompatBackend {
    async fn generate(
        &self,
        req: GenerateRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&req);

        tracing::debug!(
            backend = %self.id,
            url = %url,
            step = req.step,
            turns = req.turns.len(),
            tools = req.tools.len(),
            "openai_compat stream request"
        );

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await.map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Backend {
                backend: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }

        let mut state = StreamState::default();
        Ok(crate::sse::sse_response_stream(resp, move |data| {
            state.parse(data)
        }))
    }

    fn backend_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collect(state: &mut StreamState, lines: &[&str]) -> Vec<StreamEvent> {
        lines
            .iter()
            .flat_map(|l| state.parse(l))
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn text_tokens_then_done() {
        let mut state = StreamState::default();
        let events = collect(
            &mut state,
            &[
                r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
                r#"{"choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
                r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#,
                "[DONE]",
            ],
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Token { text: "Hel".into() },
                StreamEvent::Token { text: "lo".into() },
                StreamEvent::Done {
                    usage: Some(Usage {
                        prompt_tokens: 5,
                        completion_tokens: 2,
                        total_tokens: 7
                    }),
                    finish_reason: Some("stop".into()),
                },
            ]
        );
    }

    #[test]
    fn argument_deltas_carry_the_started_call_id() {
        let mut state = StreamState::default();
        let events = collect(
            &mut state,
            &[
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"search_unsplash_photos","arguments":""}}]}}]}"#,
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"query\":\"cats\","}}]}}]}"#,
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"limit\":3}"}}]}}]}"#,
                r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
                "[DONE]",
            ],
        );

        assert_eq!(
            events[0],
            StreamEvent::ToolCallStarted {
                call_id: "call_abc".into(),
                tool_name: "search_unsplash_photos".into()
            }
        );
        for ev in &events[1..3] {
            match ev {
                StreamEvent::ToolCallDelta { call_id, .. } => assert_eq!(call_id, "call_abc"),
                other => panic!("expected delta, got {other:?}"),
            }
        }
        assert_eq!(
            events[3],
            StreamEvent::ToolCallFinished {
                call_id: "call_abc".into(),
                tool_name: "search_unsplash_photos".into(),
                arguments: json!({"query": "cats", "limit": 3}),
            }
        );
        assert!(matches!(
            &events[4],
            StreamEvent::Done { finish_reason: Some(fr), .. } if fr == "tool_calls"
        ));
    }

    #[test]
    fn missing_call_ids_are_unique_across_responses() {
        let chunk = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"search_unsplash_photos","arguments":"{}"}}]}}]}"#;
        let started_id = |events: Vec<StreamEvent>| match &events[0] {
            StreamEvent::ToolCallStarted { call_id, .. } => call_id.clone(),
            other => panic!("expected start, got {other:?}"),
        };

        let first = started_id(collect(&mut StreamState::default(), &[chunk]));
        let second = started_id(collect(&mut StreamState::default(), &[chunk]));
        assert!(first.starts_with("call_"));
        assert_ne!(first, second);
    }

    #[test]
    fn parallel_calls_finish_in_index_order() {
        let mut state = StreamState::default();
        let events = collect(
            &mut state,
            &[
                r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"b","function":{"name":"t","arguments":"{}"}},{"index":0,"id":"a","function":{"name":"t","arguments":"{}"}}]}}]}"#,
                r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            ],
        );
        let finished: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolCallFinished { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec!["a", "b"]);
    }

    #[test]
    fn error_payload_becomes_error_event() {
        let mut state = StreamState::default();
        let events = collect(&mut state, &[r#"{"error":{"message":"overloaded"}}"#]);
        assert_eq!(
            events,
            vec![StreamEvent::Error {
                message: "overloaded".into()
            }]
        );
    }

    #[test]
    fn done_is_emitted_once() {
        let mut state = StreamState::default();
        assert_eq!(state.parse("[DONE]").len(), 1);
        assert!(state.parse("[DONE]").is_empty());
    }

    #[test]
    fn assistant_turn_expands_to_tool_messages() {
        let mut tc = ToolCallPart::ready("c1", "search", json!({"query": "cats"}));
        tc.succeed("3 photos").unwrap();
        let turns = vec![
            Turn::user("show me cats"),
            Turn::assistant(vec![Part::ToolCall(tc)]),
        ];

        let msgs = turns_to_messages("be brief", &turns);
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[1]["content"], "show me cats");
        assert_eq!(msgs[2]["role"], "assistant");
        assert!(msgs[2]["content"].is_null());
        assert_eq!(msgs[2]["tool_calls"][0]["id"], "c1");
        assert_eq!(msgs[3]["role"], "tool");
        assert_eq!(msgs[3]["tool_call_id"], "c1");
        assert_eq!(msgs[3]["content"], "3 photos");
    }

    #[test]
    fn unresolved_calls_are_not_sent() {
        let turns = vec![Turn::assistant(vec![
            Part::text("working"),
            Part::ToolCall(ToolCallPart::ready("c1", "search", json!({}))),
        ])];
        let msgs = turns_to_messages("", &turns);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].get("tool_calls").is_none());
    }

    #[test]
    fn text_after_a_result_becomes_its_own_message() {
        let mut tc = ToolCallPart::ready("c1", "search", json!({"query": "owls"}));
        tc.succeed("Found 2 photos").unwrap();
        let turns = vec![Turn::assistant(vec![
            Part::text("Looking. "),
            Part::ToolCall(tc),
            Part::text("Here they are."),
        ])];

        let msgs = turns_to_messages("", &turns);
        let roles: Vec<_> = msgs.iter().map(|m| m["role"].as_str().unwrap()).collect();
        assert_eq!(roles, vec!["assistant", "tool", "assistant"]);
        assert_eq!(msgs[0]["content"], "Looking. ");
        assert_eq!(msgs[0]["tool_calls"][0]["id"], "c1");
        assert_eq!(msgs[2]["content"], "Here they are.");
    }

    #[test]
    fn body_includes_tools_only_when_offered() {
        let backend = OpenAiCompatBackend::from_config(&LlmConfig {
            api_key_env: String::new(),
            temperature: Some(0.2),
            ..Default::default()
        })
        .unwrap();

        let mut req = GenerateRequest {
            turns: vec![Turn::user("hi")],
            ..Default::default()
        };
        let body = backend.build_body(&req);
        assert!(body.get("tools").is_none());
        assert_eq!(body["stream"], true);
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);

        req.tools.push(ToolDefinition {
            name: "search".into(),
            description: "d".into(),
            parameters: json!({"type": "object"}),
        });
        let body = backend.build_body(&req);
        assert_eq!(body["tools"][0]["function"]["name"], "search");
    }
}
