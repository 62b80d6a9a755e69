//! Keyword gate deciding whether tools are offered for a turn.
//!
//! A cost/latency control, not a security boundary. Misses degrade to
//! conversation-only; false hits cost one tool-capable call.

use px_domain::config::AgentConfig;
use px_domain::trace::TraceEvent;
use px_tools::{ToolCatalog, ToolRegistry};

#[derive(Debug, Clone)]
pub struct ToolGate {
    enabled: bool,
    keywords: Vec<String>,
}

impl ToolGate {
    pub fn new(enabled: bool, keywords: Vec<String>) -> Self {
        Self {
            enabled,
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self::new(cfg.gate_enabled, cfg.gate_keywords.clone())
    }

    /// A gate that always exposes the full catalog.
    pub fn open() -> Self {
        Self::new(false, Vec::new())
    }

    /// First keyword contained in `text`, compared case-insensitively.
    pub fn matched_keyword(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| !k.is_empty() && lowered.contains(k.as_str()))
            .map(String::as_str)
    }

    /// Catalog to offer for a turn whose latest user text is `text`.
    pub fn select(&self, text: &str, registry: &ToolRegistry) -> ToolCatalog {
        let (exposed, matched) = if self.enabled {
            let matched = self.matched_keyword(text);
            (matched.is_some(), matched.map(String::from))
        } else {
            (true, None)
        };

        TraceEvent::ToolGate { exposed, matched }.emit();

        if exposed {
            registry.full_catalog()
        } else {
            ToolCatalog::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use px_domain::tool::ToolDefinition;
    use px_tools::{ToolError, ToolExecutor};

    struct Search;

    #[async_trait::async_trait]
    impl ToolExecutor for Search {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "search_unsplash_photos".into(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object"}),
            }
        }
        async fn execute(&self, _input: &serde_json::Value) -> Result<String, ToolError> {
            Ok(String::new())
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new().register(Arc::new(Search), false)
    }

    #[test]
    fn greeting_gets_no_tools() {
        let gate = ToolGate::from_config(&AgentConfig::default());
        assert!(gate.select("Hello", &registry()).is_empty());
    }

    #[test]
    fn photo_request_gets_catalog() {
        let gate = ToolGate::from_config(&AgentConfig::default());
        let catalog = gate.select("show me 3 pictures of cats", &registry());
        assert!(catalog.contains("search_unsplash_photos"));
    }

    #[test]
    fn matching_ignores_case() {
        let gate = ToolGate::new(true, vec!["Looking For".into()]);
        assert_eq!(
            gate.matched_keyword("I'm LOOKING FOR mountains"),
            Some("looking for")
        );
    }

    #[test]
    fn disabled_gate_always_exposes() {
        let gate = ToolGate::open();
        assert_eq!(gate.select("hi", &registry()).len(), 1);
    }

    #[test]
    fn empty_keywords_never_match() {
        let gate = ToolGate::new(true, vec![String::new()]);
        assert_eq!(gate.matched_keyword("anything"), None);
    }
}
