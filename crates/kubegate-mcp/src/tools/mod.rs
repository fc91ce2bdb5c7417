//! MCP tool implementations.
//!
//! Every domain tool is first registered as a placeholder and later
//! replaced by its working version once a backend is available.

pub mod cluster;
pub mod context;
pub mod echo;
pub mod error;
pub mod registry;
pub mod resources;
pub mod secrets;
pub mod workloads;

pub use context::CallContext;
pub use error::ToolError;
pub use registry::{FnHandler, SharedRegistry, Tool, ToolHandler, ToolRegistry};

use std::sync::Arc;

use async_trait::async_trait;
use kubegate::ResourceBackend;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::guard::{Guard, GuardedHandler, RateLimit};
use crate::types::ToolDefinition;

/// What the working tools need to run.
#[derive(Clone)]
pub struct ToolDeps {
    pub backend: Arc<dyn ResourceBackend>,
    pub guard: Arc<Guard>,
}

/// Every domain tool, in registration order. `echo` is not included; the
/// protocol handler installs it.
pub fn definitions() -> Vec<ToolDefinition> {
    let mut defs = cluster::definitions();
    defs.extend(workloads::definitions());
    defs.extend(resources::definitions());
    defs.extend(secrets::definitions());
    defs
}

/// Rate limit applied to a tool name.
pub fn rate_limit_for(name: &str) -> RateLimit {
    match name {
        workloads::EXEC | cluster::SET_CONTEXT => RateLimit::SENSITIVE,
        _ => RateLimit::DEFAULT,
    }
}

/// Fails every call until the backend is ready.
struct NotReady;

#[async_trait]
impl ToolHandler for NotReady {
    async fn call(&self, _ctx: &CallContext, _args: Value) -> Result<Value, ToolError> {
        Err(ToolError::NotReady)
    }
}

/// Register every domain tool as a "not initialized yet" placeholder.
pub fn register_placeholders(registry: &SharedRegistry) {
    for definition in definitions() {
        registry.register(Tool::new(definition, NotReady));
    }
}

/// Replace the placeholders with working, rate-limited tools.
pub fn register_backend_tools(
    registry: &SharedRegistry,
    backend: Arc<dyn ResourceBackend>,
    guard: Arc<Guard>,
) {
    let deps = ToolDeps {
        backend,
        guard: guard.clone(),
    };
    let count = definitions().len();

    for definition in definitions() {
        let name = definition.name.clone();
        let inner: Arc<dyn ToolHandler> = Arc::new(BackendTool {
            name: name.clone(),
            deps: deps.clone(),
        });
        let handler = GuardedHandler::new(name.clone(), rate_limit_for(&name), guard.clone(), inner);
        registry.register(Tool::new(definition, handler));
    }

    tracing::info!("Registered {count} backend tools");
}

/// A domain tool bound to its dependencies, dispatched by name.
struct BackendTool {
    name: String,
    deps: ToolDeps,
}

#[async_trait]
impl ToolHandler for BackendTool {
    async fn call(&self, ctx: &CallContext, args: Value) -> Result<Value, ToolError> {
        let deps = &self.deps;
        match self.name.as_str() {
            cluster::HEALTH => cluster::health(deps, ctx).await,
            cluster::LIST_CONTEXTS => cluster::list_contexts(deps, ctx).await,
            cluster::SET_CONTEXT => cluster::set_context(args, deps, ctx).await,
            cluster::LIST_NAMESPACES => cluster::list_namespaces(args, deps, ctx).await,
            workloads::LIST_PODS => workloads::list_pods(args, deps, ctx).await,
            workloads::GET_POD => workloads::get_pod(args, deps, ctx).await,
            workloads::LOGS => workloads::logs(args, deps, ctx).await,
            workloads::EXEC => workloads::exec(args, deps, ctx).await,
            resources::GET => resources::get(args, deps, ctx).await,
            resources::APPLY => resources::apply(args, deps, ctx).await,
            resources::DELETE => resources::delete(args, deps, ctx).await,
            secrets::GET => secrets::get(args, deps, ctx).await,
            secrets::SET => secrets::set(args, deps, ctx).await,
            other => Err(ToolError::Failed(format!("tool {other} has no handler"))),
        }
    }
}

/// Deserialize tool arguments into a typed parameter struct.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = match args {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(args).map_err(ToolError::from)
}

pub(crate) fn definition(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: Some(input_schema),
    }
}

/// String at a JSON pointer, if present.
pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Keep the first `limit` items. Zero means no limit.
fn truncate<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit.filter(|l| *l > 0) {
        items.truncate(limit);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_names_are_unique() {
        let mut names: Vec<_> = definitions().into_iter().map(|d| d.name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 13);
    }

    #[test]
    fn sensitive_tools_get_tighter_limits() {
        assert_eq!(rate_limit_for("pods.exec"), RateLimit::SENSITIVE);
        assert_eq!(rate_limit_for("cluster_set_context"), RateLimit::SENSITIVE);
        assert_eq!(rate_limit_for("pods.get"), RateLimit::DEFAULT);
    }

    #[test]
    fn null_arguments_parse_as_empty_object() {
        #[derive(serde::Deserialize)]
        struct P {
            #[serde(default)]
            limit: Option<usize>,
        }
        let p: P = parse_args(Value::Null).unwrap();
        assert!(p.limit.is_none());
    }
}
