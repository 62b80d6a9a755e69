use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Tool names that must be approved by a human before they run.
    #[serde(default)]
    pub require_confirmation: Vec<String>,
    #[serde(default)]
    pub unsplash: UnsplashConfig,
}

impl ToolsConfig {
    pub fn requires_confirmation(&self, tool_name: &str) -> bool {
        self.require_confirmation.iter().any(|n| n == tool_name)
    }
}

/// Unsplash photo search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsplashConfig {
    #[serde(default = "d_unsplash_url")]
    pub base_url: String,
    /// Environment variable holding the access key; falls back to `demo`.
    #[serde(default = "d_access_key_env")]
    pub access_key_env: String,
    #[serde(default = "d_10")]
    pub default_limit: u32,
    #[serde(default = "d_30")]
    pub max_limit: u32,
    #[serde(default = "d_15000")]
    pub timeout_ms: u64,
}

impl Default for UnsplashConfig {
    fn default() -> Self {
        Self {
            base_url: d_unsplash_url(),
            access_key_env: d_access_key_env(),
            default_limit: 10,
            max_limit: 30,
            timeout_ms: 15_000,
        }
    }
}

fn d_unsplash_url() -> String {
    "https://api.unsplash.com".into()
}
fn d_access_key_env() -> String {
    "UNSPLASH_ACCESS_KEY".into()
}
fn d_10() -> u32 {
    10
}
fn d_30() -> u32 {
    30
}
fn d_15000() -> u64 {
    15_000
}
