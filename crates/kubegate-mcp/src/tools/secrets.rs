//! Tools: secrets_get, secrets_set.
//!
//! Secret values are never logged.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use kubegate::GroupVersionKind;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::types::ToolDefinition;

use super::{definition, parse_args, str_at, CallContext, ToolDeps, ToolError};

pub const GET: &str = "secrets_get";
pub const SET: &str = "secrets_set";

pub const REDACTED: &str = "REDACTED";
const FIELD_MANAGER: &str = "kubegate";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetParams {
    namespace: String,
    name: String,
    #[serde(default)]
    keys: Option<Vec<String>>,
    #[serde(default)]
    show_values: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetParams {
    namespace: String,
    name: String,
    data: BTreeMap<String, String>,
    #[serde(default, rename = "type")]
    secret_type: Option<String>,
    #[serde(default)]
    base64_encoded: bool,
    #[serde(default = "default_true")]
    create_if_missing: bool,
    #[serde(default = "default_true")]
    dry_run: bool,
}

fn default_true() -> bool {
    true
}

fn secret_gvk() -> GroupVersionKind {
    GroupVersionKind::core("Secret")
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        definition(
            GET,
            "Get a secret (redacted by default)",
            json!({
                "type": "object",
                "properties": {
                    "namespace": { "type": "string" },
                    "name": { "type": "string" },
                    "keys": { "type": "array", "items": { "type": "string" } },
                    "showValues": { "type": "boolean", "description": "Return base64 values; ignored in read-only mode" }
                },
                "required": ["namespace", "name"]
            }),
        ),
        definition(
            SET,
            "Create/update a secret with provided keys (values never logged)",
            json!({
                "type": "object",
                "properties": {
                    "namespace": { "type": "string" },
                    "name": { "type": "string" },
                    "data": { "type": "object", "additionalProperties": { "type": "string" }, "minProperties": 1 },
                    "type": { "type": "string", "default": "Opaque" },
                    "base64Encoded": { "type": "boolean", "default": false },
                    "createIfMissing": { "type": "boolean", "default": true },
                    "dryRun": { "type": "boolean", "default": true }
                },
                "required": ["namespace", "name", "data"]
            }),
        ),
    ]
}

pub async fn get(args: Value, deps: &ToolDeps, ctx: &CallContext) -> Result<Value, ToolError> {
    let params: GetParams = parse_args(args)?;
    let secret = ctx
        .run(deps.backend.get_object(&secret_gvk(), Some(params.namespace.as_str()), &params.name))
        .await?;

    let stored = secret
        .get("data")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let keys: Vec<String> = match params.keys.filter(|k| !k.is_empty()) {
        Some(keys) => keys,
        None => stored.keys().cloned().collect(),
    };
    let show_values = params.show_values && !deps.guard.is_read_only();

    let mut data = Map::new();
    for key in keys {
        let value = match stored.get(&key) {
            None => Value::Null,
            Some(v) if show_values => v.clone(),
            Some(_) => Value::String(REDACTED.to_string()),
        };
        data.insert(key, value);
    }

    Ok(json!({
        "type": str_at(&secret, "/type").unwrap_or("Opaque"),
        "data": data,
    }))
}

pub async fn set(args: Value, deps: &ToolDeps, ctx: &CallContext) -> Result<Value, ToolError> {
    let params: SetParams = parse_args(args)?;
    deps.guard
        .enforce_mutating(SET, Some(params.namespace.as_str()), Some("Secret"))?;
    if params.data.is_empty() {
        return Err(ToolError::InvalidArguments(
            "data must have at least one key".to_string(),
        ));
    }

    let mut data = Map::new();
    for (key, value) in &params.data {
        let encoded = if params.base64_encoded {
            STANDARD.decode(value).map_err(|e| {
                ToolError::InvalidArguments(format!("value for key {key} is not valid base64: {e}"))
            })?;
            value.clone()
        } else {
            STANDARD.encode(value.as_bytes())
        };
        data.insert(key.clone(), Value::String(encoded));
    }

    let existing = match ctx
        .run(deps.backend.get_object(&secret_gvk(), Some(params.namespace.as_str()), &params.name))
        .await
    {
        Ok(secret) => Some(secret),
        Err(ToolError::Backend(e)) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };

    if existing.is_none() && !params.create_if_missing {
        return Err(ToolError::Failed(
            "Secret does not exist and createIfMissing=false".to_string(),
        ));
    }

    // Keys not in the new data are removed so the result matches a replace.
    let mut patch_data = data.clone();
    if let Some(old) = existing.as_ref().and_then(|s| s.get("data")).and_then(Value::as_object) {
        for key in old.keys() {
            patch_data.entry(key.clone()).or_insert(Value::Null);
        }
    }

    let manifest = json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": params.name, "namespace": params.namespace },
        "type": params.secret_type.as_deref().unwrap_or("Opaque"),
        "data": patch_data,
    });

    let applied = ctx
        .run(deps.backend.apply_object(&manifest, FIELD_MANAGER, params.dry_run))
        .await?;
    let action = if existing.is_some() { "updated" } else { "created" };
    tracing::info!(
        "Secret {}/{} {action} ({} keys, dry run: {})",
        params.namespace,
        params.name,
        data.len(),
        params.dry_run
    );

    let mut result = json!({
        "name": str_at(&applied, "/metadata/name"),
        "keys": data.keys().collect::<Vec<_>>(),
        "dryRun": params.dry_run,
    });
    result[action] = Value::Bool(true);
    Ok(result)
}
