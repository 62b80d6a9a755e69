use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generative backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Any endpoint that speaks the OpenAI chat-completions streaming contract.
    OpenaiCompat,
    /// Canned replies; no network. Useful for demos and smoke tests.
    Scripted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_kind")]
    pub kind: BackendKind,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Environment variable holding the API key. Unset = no auth header.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_60000")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            kind: d_kind(),
            base_url: d_base_url(),
            model: d_model(),
            api_key_env: d_api_key_env(),
            timeout_ms: 60_000,
            temperature: None,
        }
    }
}

fn d_kind() -> BackendKind {
    BackendKind::OpenaiCompat
}
fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_model() -> String {
    "gpt-4o-mini".into()
}
fn d_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn d_60000() -> u64 {
    60_000
}
