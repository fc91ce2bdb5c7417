//! Tools: cluster_health, cluster_list_contexts, cluster_set_context,
//! ns_list_namespaces.

use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::ToolDefinition;

use super::{definition, parse_args, truncate, CallContext, ToolDeps, ToolError};

pub const HEALTH: &str = "cluster_health";
pub const LIST_CONTEXTS: &str = "cluster_list_contexts";
pub const SET_CONTEXT: &str = "cluster_set_context";
pub const LIST_NAMESPACES: &str = "ns_list_namespaces";

#[derive(Debug, Deserialize)]
struct SetContextParams {
    context: String,
}

#[derive(Debug, Default, Deserialize)]
struct ListNamespacesParams {
    #[serde(default)]
    limit: Option<usize>,
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        definition(
            HEALTH,
            "Get basic cluster health and version",
            json!({ "type": "object", "properties": {} }),
        ),
        definition(
            LIST_CONTEXTS,
            "List kubeconfig contexts and current selection",
            json!({ "type": "object", "properties": {} }),
        ),
        definition(
            SET_CONTEXT,
            "Set current kube context",
            json!({
                "type": "object",
                "properties": {
                    "context": { "type": "string", "description": "Context name to switch to" }
                },
                "required": ["context"]
            }),
        ),
        definition(
            LIST_NAMESPACES,
            "List namespaces",
            json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "minimum": 1 }
                }
            }),
        ),
    ]
}

pub async fn health(deps: &ToolDeps, ctx: &CallContext) -> Result<Value, ToolError> {
    let version = ctx.run(deps.backend.server_version()).await?;
    Ok(json!({
        "status": "ok",
        "clusterVersion": version,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

pub async fn list_contexts(deps: &ToolDeps, ctx: &CallContext) -> Result<Value, ToolError> {
    let list = ctx.run(deps.backend.list_contexts()).await?;
    Ok(json!({ "current": list.current, "contexts": list.contexts }))
}

pub async fn set_context(args: Value, deps: &ToolDeps, ctx: &CallContext) -> Result<Value, ToolError> {
    let params: SetContextParams = parse_args(args)?;
    if params.context.trim().is_empty() {
        return Err(ToolError::InvalidArguments("context must not be empty".to_string()));
    }

    ctx.run(deps.backend.switch_context(&params.context)).await?;
    tracing::info!("Switched context to {}", params.context);
    Ok(json!({ "current": params.context }))
}

pub async fn list_namespaces(
    args: Value,
    deps: &ToolDeps,
    ctx: &CallContext,
) -> Result<Value, ToolError> {
    let params: ListNamespacesParams = parse_args(args)?;
    let namespaces = ctx.run(deps.backend.list_namespaces()).await?;
    Ok(json!({ "namespaces": truncate(namespaces, params.limit) }))
}
