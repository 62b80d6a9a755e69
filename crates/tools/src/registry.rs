//! Tool registry and per-turn catalog.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use px_domain::tool::ToolDefinition;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Failure raised by a tool executor. Recorded on the tool-call part,
/// never propagated as a pipeline error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Failed(String),
}

#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, input: &Value) -> Result<String, ToolError>;
}

/// A tool plus the policy attached to it.
#[derive(Clone)]
pub struct ToolContract {
    pub definition: ToolDefinition,
    pub requires_confirmation: bool,
    pub executor: Arc<dyn ToolExecutor>,
}

impl std::fmt::Debug for ToolContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContract")
            .field("name", &self.definition.name)
            .field("requires_confirmation", &self.requires_confirmation)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolRegistry — every tool the process knows about
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Registry of tools, keyed by name.
///
/// Calls already recorded in the transcript are dispatched through the
/// registry even on turns where the catalog offered to the backend is empty.
#[derive(Default, Debug)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolContract>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Returns self for chaining.
    pub fn register(mut self, executor: Arc<dyn ToolExecutor>, requires_confirmation: bool) -> Self {
        let definition = executor.definition();
        self.tools.insert(
            definition.name.clone(),
            ToolContract {
                definition,
                requires_confirmation,
                executor,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolContract> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Catalog exposing every registered tool.
    pub fn full_catalog(&self) -> ToolCatalog {
        ToolCatalog {
            tools: self.tools.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolCatalog — what the backend is offered this turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tools offered to the backend for one turn. Built fresh per turn.
#[derive(Clone, Default, Debug)]
pub struct ToolCatalog {
    tools: BTreeMap<String, ToolContract>,
}

impl ToolCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|c| c.definition.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait::async_trait]
    impl ToolExecutor for Echo {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".into(),
                description: "Echo the input".into(),
                parameters: serde_json::json!({"type": "object"}),
            }
        }

        async fn execute(&self, input: &Value) -> Result<String, ToolError> {
            Ok(input.to_string())
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = ToolRegistry::new().register(Arc::new(Echo), true);
        let contract = registry.get("echo").unwrap();
        assert!(contract.requires_confirmation);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn full_catalog_lists_definitions() {
        let registry = ToolRegistry::new().register(Arc::new(Echo), false);
        let catalog = registry.full_catalog();
        assert!(catalog.contains("echo"));
        assert_eq!(catalog.definitions()[0].name, "echo");
        assert!(ToolCatalog::empty().definitions().is_empty());
    }

    #[tokio::test]
    async fn executor_runs_through_contract() {
        let registry = ToolRegistry::new().register(Arc::new(Echo), false);
        let out = registry
            .get("echo")
            .unwrap()
            .executor
            .execute(&serde_json::json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(out, r#"{"a":1}"#);
    }
}
