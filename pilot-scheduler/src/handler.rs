//! Action handler interface and registry.
//!
//! Handlers perform the actual side effect for an action kind. The registry
//! maps each kind to exactly one handler; a kind without a registered
//! handler is surfaced by the executor as an immediate, non-retried failure.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::action::ActionKind;

/// The pluggable function performing the side effect for an action kind.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Execute the action with the task's parameter map.
    ///
    /// The returned value is stored as the task result. Errors count
    /// against the task's retry budget.
    async fn execute(&self, params: &Map<String, Value>) -> anyhow::Result<Value>;
}

/// Typed registry of action handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a kind, replacing any existing one.
    pub fn register(&mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Builder-style registration.
    pub fn with(mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    /// Look up the handler for a kind.
    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&kind).cloned()
    }

    /// Kinds with a registered handler.
    pub fn registered_kinds(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<ActionKind> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|k| k.name());
        kinds
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl ActionHandler for EchoHandler {
        async fn execute(&self, params: &Map<String, Value>) -> anyhow::Result<Value> {
            Ok(json!({ "echo": Value::Object(params.clone()) }))
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let registry = HandlerRegistry::new().with(ActionKind::SendAlert, Arc::new(EchoHandler));

        let handler = registry.get(ActionKind::SendAlert).unwrap();
        let mut params = Map::new();
        params.insert("message".into(), json!("hi"));

        let result = handler.execute(&params).await.unwrap();
        assert_eq!(result["echo"]["message"], json!("hi"));
    }

    #[test]
    fn test_unregistered_kind_is_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.get(ActionKind::CreateContent).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registered_kinds_sorted() {
        let registry = HandlerRegistry::new()
            .with(ActionKind::SendAlert, Arc::new(EchoHandler))
            .with(ActionKind::CreateContent, Arc::new(EchoHandler));
        assert_eq!(
            registry.registered_kinds(),
            vec![ActionKind::CreateContent, ActionKind::SendAlert]
        );
        assert_eq!(registry.len(), 2);
    }
}
