//! Tools: pods.listPods, pods.get, pods.logs, pods.exec.

use kubegate::{GroupVersionKind, ListSelector, LogOptions};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::ToolDefinition;

use super::{definition, parse_args, str_at, truncate, CallContext, ToolDeps, ToolError};

pub const LIST_PODS: &str = "pods.listPods";
pub const GET_POD: &str = "pods.get";
pub const LOGS: &str = "pods.logs";
pub const EXEC: &str = "pods.exec";

const DEFAULT_TAIL_LINES: i64 = 200;
const MAX_TAIL_LINES: i64 = 5000;
/// Ten years; older windows are rejected rather than clamped.
const MAX_SINCE_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;
/// Log output is cut to this many trailing lines.
const MAX_LOG_LINES: usize = 1000;
const MAX_EVENTS: usize = 10;
const MAX_CONDITIONS: usize = 5;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPodsParams {
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
struct GetPodParams {
    namespace: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogsParams {
    namespace: String,
    name: String,
    #[serde(default)]
    container: Option<String>,
    #[serde(default)]
    tail_lines: Option<i64>,
    #[serde(default)]
    since_seconds: Option<i64>,
    #[serde(default)]
    timestamps: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecParams {
    namespace: String,
    name: String,
    #[serde(default)]
    container: Option<String>,
    command: Vec<String>,
    #[serde(default = "default_true")]
    dry_run: bool,
}

fn default_true() -> bool {
    true
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        definition(
            LIST_PODS,
            "List pods with optional selectors",
            json!({
                "type": "object",
                "properties": {
                    "namespace": { "type": "string" },
                    "labelSelector": { "type": "string" },
                    "fieldSelector": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1 }
                }
            }),
        ),
        definition(
            GET_POD,
            "Get a pod summary including containers and events",
            json!({
                "type": "object",
                "properties": {
                    "namespace": { "type": "string" },
                    "name": { "type": "string" }
                },
                "required": ["namespace", "name"]
            }),
        ),
        definition(
            LOGS,
            "Get pod logs (tail by default)",
            json!({
                "type": "object",
                "properties": {
                    "namespace": { "type": "string" },
                    "name": { "type": "string" },
                    "container": { "type": "string" },
                    "tailLines": { "type": "integer", "minimum": 1, "maximum": MAX_TAIL_LINES, "default": DEFAULT_TAIL_LINES },
                    "sinceSeconds": { "type": "integer", "minimum": 1, "maximum": MAX_SINCE_SECONDS },
                    "timestamps": { "type": "boolean" }
                },
                "required": ["namespace", "name"]
            }),
        ),
        definition(
            EXEC,
            "Execute a command in a pod",
            json!({
                "type": "object",
                "properties": {
                    "namespace": { "type": "string" },
                    "name": { "type": "string" },
                    "container": { "type": "string" },
                    "command": { "type": "array", "items": { "type": "string" }, "minItems": 1 },
                    "dryRun": { "type": "boolean", "default": true }
                },
                "required": ["namespace", "name", "command"]
            }),
        ),
    ]
}

fn summarize_pod(pod: &Value) -> Value {
    let restarts: i64 = pod
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .map(|statuses| {
            statuses
                .iter()
                .filter_map(|s| s.get("restartCount").and_then(Value::as_i64))
                .sum()
        })
        .unwrap_or(0);

    json!({
        "name": str_at(pod, "/metadata/name").unwrap_or_default(),
        "namespace": str_at(pod, "/metadata/namespace").unwrap_or_default(),
        "phase": str_at(pod, "/status/phase").unwrap_or("Unknown"),
        "node": str_at(pod, "/spec/nodeName").unwrap_or_default(),
        "restarts": restarts,
        "age": pod.pointer("/metadata/creationTimestamp"),
    })
}

fn container_images(pod: &Value, pointer: &str) -> Vec<Value> {
    pod.pointer(pointer)
        .and_then(Value::as_array)
        .map(|containers| {
            containers
                .iter()
                .map(|c| json!({ "name": c.get("name"), "image": c.get("image") }))
                .collect()
        })
        .unwrap_or_default()
}

fn last_n(value: Option<&Value>, n: usize) -> Vec<Value> {
    let items = value.and_then(Value::as_array).cloned().unwrap_or_default();
    let skip = items.len().saturating_sub(n);
    items.into_iter().skip(skip).collect()
}

pub async fn list_pods(args: Value, deps: &ToolDeps, ctx: &CallContext) -> Result<Value, ToolError> {
    let params: ListPodsParams = parse_args(args)?;
    let namespace = match params.namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => ns,
        None => deps.backend.default_namespace().await,
    };
    let selector = ListSelector {
        label_selector: params.label_selector,
        field_selector: params.field_selector,
    };

    let pods = ctx
        .run(deps.backend.list_objects(
            &GroupVersionKind::core("Pod"),
            Some(namespace.as_str()),
            &selector,
            params.limit,
        ))
        .await?;
    let rows: Vec<Value> = pods.iter().map(summarize_pod).collect();

    Ok(json!({ "pods": truncate(rows, params.limit) }))
}

pub async fn get_pod(args: Value, deps: &ToolDeps, ctx: &CallContext) -> Result<Value, ToolError> {
    let params: GetPodParams = parse_args(args)?;
    let pod = ctx
        .run(deps.backend.get_object(
            &GroupVersionKind::core("Pod"),
            Some(params.namespace.as_str()),
            &params.name,
        ))
        .await?;

    // Events are best effort; a failed lookup leaves the list empty.
    let events = match ctx
        .run(deps.backend.list_objects(
            &GroupVersionKind::core("Event"),
            Some(params.namespace.as_str()),
            &ListSelector::fields(&format!("involvedObject.name={}", params.name)),
            None,
        ))
        .await
    {
        Ok(events) => events,
        Err(ToolError::Backend(e)) => {
            tracing::debug!("Event lookup for {} failed: {e}", params.name);
            Vec::new()
        }
        Err(e) => return Err(e),
    };
    let skip = events.len().saturating_sub(MAX_EVENTS);
    let events: Vec<Value> = events
        .iter()
        .skip(skip)
        .map(|e| {
            json!({
                "type": e.get("type"),
                "reason": e.get("reason"),
                "message": e.get("message"),
                "age": e.get("eventTime")
                    .or_else(|| e.get("lastTimestamp"))
                    .or_else(|| e.get("firstTimestamp")),
            })
        })
        .collect();

    Ok(json!({
        "metadata": {
            "name": pod.pointer("/metadata/name"),
            "namespace": pod.pointer("/metadata/namespace"),
            "uid": pod.pointer("/metadata/uid"),
            "creationTimestamp": pod.pointer("/metadata/creationTimestamp"),
            "labels": pod.pointer("/metadata/labels"),
        },
        "status": {
            "phase": pod.pointer("/status/phase"),
            "podIP": pod.pointer("/status/podIP"),
            "hostIP": pod.pointer("/status/hostIP"),
            "conditions": last_n(pod.pointer("/status/conditions"), MAX_CONDITIONS),
        },
        "containers": container_images(&pod, "/spec/containers"),
        "initContainers": container_images(&pod, "/spec/initContainers"),
        "events": events,
    }))
}

pub async fn logs(args: Value, deps: &ToolDeps, ctx: &CallContext) -> Result<Value, ToolError> {
    let params: LogsParams = parse_args(args)?;
    let tail_lines = params.tail_lines.unwrap_or(DEFAULT_TAIL_LINES);
    if !(1..=MAX_TAIL_LINES).contains(&tail_lines) {
        return Err(ToolError::InvalidArguments(format!(
            "tailLines must be between 1 and {MAX_TAIL_LINES}"
        )));
    }
    if params
        .since_seconds
        .is_some_and(|s| !(1..=MAX_SINCE_SECONDS).contains(&s))
    {
        return Err(ToolError::InvalidArguments(format!(
            "sinceSeconds must be between 1 and {MAX_SINCE_SECONDS}"
        )));
    }

    let options = LogOptions {
        tail_lines: Some(tail_lines),
        since_seconds: params.since_seconds,
        timestamps: params.timestamps,
    };
    let text = ctx
        .run(deps.backend.get_logs(
            &params.namespace,
            &params.name,
            params.container.as_deref(),
            &options,
        ))
        .await?;

    Ok(Value::String(last_lines(&text, MAX_LOG_LINES)))
}

fn last_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(max);
    lines[skip..].join("\n")
}

pub async fn exec(args: Value, deps: &ToolDeps, ctx: &CallContext) -> Result<Value, ToolError> {
    let params: ExecParams = parse_args(args)?;
    deps.guard
        .enforce_mutating(EXEC, Some(params.namespace.as_str()), Some("Pod"))?;
    if params.command.is_empty() {
        return Err(ToolError::InvalidArguments(
            "command must have at least one element".to_string(),
        ));
    }

    if params.dry_run {
        return Ok(json!({
            "dryRun": true,
            "namespace": params.namespace,
            "name": params.name,
            "command": params.command,
        }));
    }

    let exit_code = ctx
        .run(deps.backend.exec(
            &params.namespace,
            &params.name,
            params.container.as_deref(),
            &params.command,
        ))
        .await?;
    tracing::info!(
        "Exec in {}/{} exited with {exit_code}",
        params.namespace,
        params.name
    );

    Ok(json!({ "exitCode": exit_code }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_summary_sums_restarts() {
        let pod = json!({
            "metadata": { "name": "web-0", "namespace": "shop", "creationTimestamp": "2024-01-01T00:00:00Z" },
            "spec": { "nodeName": "node-a" },
            "status": {
                "phase": "Running",
                "containerStatuses": [ { "restartCount": 2 }, { "restartCount": 3 } ]
            }
        });
        let row = summarize_pod(&pod);
        assert_eq!(row["restarts"], 5);
        assert_eq!(row["node"], "node-a");
        assert_eq!(row["phase"], "Running");
    }

    #[test]
    fn pod_summary_defaults() {
        let row = summarize_pod(&json!({ "metadata": { "name": "x" } }));
        assert_eq!(row["phase"], "Unknown");
        assert_eq!(row["restarts"], 0);
        assert_eq!(row["namespace"], "");
    }

    #[test]
    fn log_output_keeps_trailing_lines() {
        let text: String = (0..1500).map(|i| format!("line {i}\n")).collect();
        let out = last_lines(&text, MAX_LOG_LINES);
        assert_eq!(out.lines().count(), MAX_LOG_LINES);
        assert!(out.starts_with("line 500"));
        assert!(out.ends_with("line 1499"));
    }
}
