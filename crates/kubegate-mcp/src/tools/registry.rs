//! Tool registration and dispatch.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::types::{ToolCallResult, ToolDefinition};

use super::{CallContext, ToolError};

/// The behaviour behind a tool name.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &CallContext, args: Value) -> Result<Value, ToolError>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(CallContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    async fn call(&self, ctx: &CallContext, args: Value) -> Result<Value, ToolError> {
        (self.0)(ctx.clone(), args).await
    }
}

/// A registered tool: its public description plus its handler.
#[derive(Clone)]
pub struct Tool {
    pub definition: ToolDefinition,
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(definition: ToolDefinition, handler: impl ToolHandler + 'static) -> Self {
        Self {
            definition,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

/// Tools keyed by name, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Tool>,
}

impl ToolRegistry {
    /// Insert or replace. A replaced tool keeps its original position.
    pub fn register(&mut self, tool: Tool) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!("Replaced tool {name}");
        }
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Tool> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// A registry shared between the dispatcher and the post-handshake hook.
///
/// The lock is only held to look up or insert entries, never across a
/// handler's await points.
#[derive(Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<RwLock<ToolRegistry>>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Tool) {
        self.inner.write().register(tool);
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        self.inner.read().list()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Invoke a tool by name and normalize the outcome into a call result.
    /// Unknown names and handler failures become `isError` results.
    pub async fn call(&self, ctx: &CallContext, name: &str, args: Value) -> ToolCallResult {
        let tool = self.inner.read().get(name);
        let Some(tool) = tool else {
            tracing::warn!("Call to unknown tool {name}");
            return ToolCallResult::error(format!("tool {name} not found"));
        };

        tracing::debug!("Calling tool {name}");
        match tool.handler.call(ctx, args).await {
            Ok(value) => ToolCallResult::from_value(value),
            Err(e) => {
                tracing::debug!("Tool {name} failed: {e}");
                ToolCallResult::error(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolContent;
    use serde_json::json;

    fn definition(name: &str, description: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: None,
        }
    }

    fn constant(name: &str, description: &str, value: Value) -> Tool {
        Tool::new(
            definition(name, description),
            FnHandler(move |_ctx: CallContext, _args: Value| {
                let value = value.clone();
                async move { Ok(value) }
            }),
        )
    }

    #[tokio::test]
    async fn last_registration_wins_in_place() {
        let registry = SharedRegistry::new();
        registry.register(constant("a", "first", json!("one")));
        registry.register(constant("b", "b", json!("b")));
        registry.register(constant("a", "second", json!("two")));

        let names: Vec<_> = registry.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.list()[0].description.as_deref(), Some("second"));

        let result = registry.call(&CallContext::background(), "a", json!({})).await;
        assert_eq!(result.first_text(), Some("two"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_domain_error() {
        let registry = SharedRegistry::new();
        let result = registry
            .call(&CallContext::background(), "nonexistent-tool", json!({}))
            .await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("nonexistent-tool"));
    }

    #[tokio::test]
    async fn handler_errors_become_text_blocks() {
        let registry = SharedRegistry::new();
        registry.register(Tool::new(
            definition("boom", "fails"),
            FnHandler(|_ctx: CallContext, _args: Value| async { Err(ToolError::Failed("kaboom".into())) }),
        ));
        let result = registry.call(&CallContext::background(), "boom", json!({})).await;
        assert!(result.is_error);
        assert_eq!(result.content, vec![ToolContent::Text { text: "kaboom".into() }]);
    }

    #[tokio::test]
    async fn structured_values_become_json_blocks() {
        let registry = SharedRegistry::new();
        registry.register(constant("obj", "object", json!({"k": [1, 2]})));
        let result = registry.call(&CallContext::background(), "obj", json!({})).await;
        assert!(!result.is_error);
        assert_eq!(
            result.content,
            vec![ToolContent::Json { data: json!({"k": [1, 2]}) }]
        );
    }

    #[test]
    fn list_is_a_snapshot() {
        let registry = SharedRegistry::new();
        registry.register(constant("a", "a", json!(1)));
        let snapshot = registry.list();
        registry.register(constant("b", "b", json!(2)));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }
}
