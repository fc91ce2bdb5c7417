//! Tools: resources-get, resources-apply, resources-delete.

use kubegate::{
    decode_manifest, split_documents, DeleteOptions, GroupVersionKind, ListSelector,
    PropagationPolicy,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::ToolDefinition;

use super::{definition, parse_args, str_at, truncate, CallContext, ToolDeps, ToolError};

pub const GET: &str = "resources-get";
pub const APPLY: &str = "resources-apply";
pub const DELETE: &str = "resources-delete";

const DEFAULT_FIELD_MANAGER: &str = "kubegate";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetParams {
    #[serde(default)]
    group: Option<String>,
    version: String,
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    label_selector: Option<String>,
    #[serde(default)]
    field_selector: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyParams {
    #[serde(rename = "manifestYAML")]
    manifest_yaml: String,
    #[serde(default)]
    field_manager: Option<String>,
    #[serde(default = "default_true")]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteParams {
    #[serde(default)]
    group: Option<String>,
    version: String,
    kind: String,
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    propagation_policy: Option<PropagationPolicy>,
    #[serde(default)]
    grace_period_seconds: Option<i64>,
    #[serde(default = "default_true")]
    dry_run: bool,
}

fn default_true() -> bool {
    true
}

fn gvk(group: Option<&str>, version: &str, kind: &str) -> GroupVersionKind {
    GroupVersionKind::new(group.unwrap_or_default(), version, kind)
}

/// Namespace a namespaced call targets: the one given, or the context default.
async fn target_namespace(
    deps: &ToolDeps,
    gvk: &GroupVersionKind,
    namespace: Option<String>,
) -> Option<String> {
    if gvk.is_cluster_scoped() {
        return None;
    }
    match namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => Some(ns),
        None => Some(deps.backend.default_namespace().await),
    }
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        definition(
            GET,
            "Get or list arbitrary resources by GVK",
            json!({
                "type": "object",
                "properties": {
                    "group": { "type": "string", "description": "API group, empty for core" },
                    "version": { "type": "string" },
                    "kind": { "type": "string" },
                    "name": { "type": "string", "description": "Omit to list" },
                    "namespace": { "type": "string", "description": "Defaults to the context namespace; empty lists all namespaces" },
                    "labelSelector": { "type": "string" },
                    "fieldSelector": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1 }
                },
                "required": ["version", "kind"]
            }),
        ),
        definition(
            APPLY,
            "Apply manifest YAML (server-side apply, dry-run by default)",
            json!({
                "type": "object",
                "properties": {
                    "manifestYAML": { "type": "string", "minLength": 1 },
                    "fieldManager": { "type": "string", "default": DEFAULT_FIELD_MANAGER },
                    "dryRun": { "type": "boolean", "default": true }
                },
                "required": ["manifestYAML"]
            }),
        ),
        definition(
            DELETE,
            "Delete a resource by GVK/name",
            json!({
                "type": "object",
                "properties": {
                    "group": { "type": "string" },
                    "version": { "type": "string" },
                    "kind": { "type": "string" },
                    "name": { "type": "string" },
                    "namespace": { "type": "string" },
                    "propagationPolicy": { "type": "string", "enum": ["Foreground", "Background", "Orphan"] },
                    "gracePeriodSeconds": { "type": "integer", "minimum": 0 },
                    "dryRun": { "type": "boolean", "default": true }
                },
                "required": ["version", "kind", "name"]
            }),
        ),
    ]
}

fn summarize(object: &Value) -> Value {
    json!({
        "apiVersion": object.get("apiVersion"),
        "kind": object.get("kind"),
        "name": object.pointer("/metadata/name"),
        "namespace": object.pointer("/metadata/namespace"),
        "uid": object.pointer("/metadata/uid"),
        "creationTimestamp": object.pointer("/metadata/creationTimestamp"),
    })
}

pub async fn get(args: Value, deps: &ToolDeps, ctx: &CallContext) -> Result<Value, ToolError> {
    let params: GetParams = parse_args(args)?;
    let gvk = gvk(params.group.as_deref(), &params.version, &params.kind);

    if let Some(name) = params.name.filter(|n| !n.is_empty()) {
        let namespace = target_namespace(deps, &gvk, params.namespace).await;
        let item = ctx
            .run(deps.backend.get_object(&gvk, namespace.as_deref(), &name))
            .await?;
        return Ok(json!({ "item": item }));
    }

    // An explicit empty namespace lists across all namespaces.
    let namespace = match params.namespace {
        Some(ns) if ns.is_empty() => None,
        other => target_namespace(deps, &gvk, other).await,
    };
    let selector = ListSelector {
        label_selector: params.label_selector,
        field_selector: params.field_selector,
    };
    let items = ctx
        .run(deps.backend.list_objects(&gvk, namespace.as_deref(), &selector, params.limit))
        .await?;
    let rows: Vec<Value> = items.iter().map(summarize).collect();
    Ok(json!({ "items": truncate(rows, params.limit) }))
}

/// Apply every document in the manifest. Each document gets its own result
/// row; a failing document does not stop the rest.
pub async fn apply(args: Value, deps: &ToolDeps, ctx: &CallContext) -> Result<Value, ToolError> {
    let params: ApplyParams = parse_args(args)?;
    if params.manifest_yaml.trim().is_empty() {
        return Err(ToolError::InvalidArguments(
            "manifestYAML must not be empty".to_string(),
        ));
    }
    let field_manager = params
        .field_manager
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_FIELD_MANAGER.to_string());

    let mut results = Vec::new();
    for document in split_documents(&params.manifest_yaml) {
        if ctx.is_cancelled() {
            return Err(ctx.done().await);
        }

        let (target, manifest) = match decode_manifest(&document) {
            Ok(decoded) => decoded,
            Err(e) => {
                results.push(json!({ "error": e.to_string() }));
                continue;
            }
        };

        let namespace = target_namespace(deps, &target.gvk, target.namespace.clone()).await;
        if let Err(e) = deps
            .guard
            .enforce_mutating(APPLY, namespace.as_deref(), Some(target.gvk.kind.as_str()))
        {
            results.push(json!({
                "kind": target.gvk.kind,
                "name": target.name,
                "error": e.to_string(),
            }));
            continue;
        }

        match ctx
            .run(deps.backend.apply_object(&manifest, &field_manager, params.dry_run))
            .await
        {
            Ok(applied) => results.push(json!({
                "kind": str_at(&applied, "/kind"),
                "name": str_at(&applied, "/metadata/name"),
                "namespace": str_at(&applied, "/metadata/namespace"),
                "dryRun": params.dry_run,
            })),
            Err(ToolError::Backend(e)) => results.push(json!({
                "kind": target.gvk.kind,
                "name": target.name,
                "error": e.to_string(),
            })),
            Err(e) => return Err(e),
        }
    }

    Ok(json!({ "results": results }))
}

pub async fn delete(args: Value, deps: &ToolDeps, ctx: &CallContext) -> Result<Value, ToolError> {
    let params: DeleteParams = parse_args(args)?;
    let gvk = gvk(params.group.as_deref(), &params.version, &params.kind);
    let namespace = target_namespace(deps, &gvk, params.namespace).await;
    deps.guard
        .enforce_mutating(DELETE, namespace.as_deref(), Some(gvk.kind.as_str()))?;

    if params.grace_period_seconds.is_some_and(|s| s < 0) {
        return Err(ToolError::InvalidArguments(
            "gracePeriodSeconds must not be negative".to_string(),
        ));
    }
    let options = DeleteOptions {
        propagation_policy: params.propagation_policy,
        grace_period_seconds: params.grace_period_seconds,
        dry_run: params.dry_run,
    };

    ctx.run(deps.backend.delete_object(&gvk, namespace.as_deref(), &params.name, &options))
        .await?;
    Ok(json!({ "status": "Success", "dryRun": params.dry_run }))
}
