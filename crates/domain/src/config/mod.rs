mod agent;
mod llm;
mod server;
mod tools;
mod transcript;

pub use agent::*;
pub use llm::*;
pub use server::*;
pub use tools::*;
pub use transcript::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.agent.max_steps == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "agent.max_steps".into(),
                message: "max_steps must be at least 1".into(),
            });
        }

        if self.agent.gate_enabled && self.agent.gate_keywords.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "agent.gate_keywords".into(),
                message: "gate is enabled with no keywords; tools will never be offered".into(),
            });
        }

        if let Some(kw) = self
            .agent
            .gate_keywords
            .iter()
            .find(|k| k.chars().any(char::is_uppercase))
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "agent.gate_keywords".into(),
                message: format!("keyword '{kw}' contains uppercase and will never match"),
            });
        }

        if self.llm.kind == BackendKind::OpenaiCompat && self.llm.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        }

        let unsplash = &self.tools.unsplash;
        if unsplash.default_limit == 0 || unsplash.default_limit > unsplash.max_limit {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "tools.unsplash.default_limit".into(),
                message: format!(
                    "default_limit must be between 1 and max_limit ({})",
                    unsplash.max_limit
                ),
            });
        }

        errors
    }
}
