//! In-memory cluster implementing [`ResourceBackend`].
//!
//! Each kubeconfig-style context owns an independent object store. All state
//! lives behind a single async `RwLock`: reads share it, mutations and
//! context switches take it exclusively, so an in-flight call always sees
//! one consistent context from start to finish.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::backend::ResourceBackend;
use crate::error::{BackendError, BackendResult};
use crate::manifest::{merge_patch, object_ref};
use crate::selector::{FieldSelector, LabelSelector};
use crate::types::{
    ContextInfo, ContextList, DeleteOptions, GroupVersionKind, ListSelector, LogOptions,
    NamespaceSummary, PropagationPolicy,
};

pub const DEFAULT_SERVER_VERSION: &str = "v1.29.0";
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    group: String,
    kind: String,
    namespace: String,
    name: String,
}

impl ObjectKey {
    fn new(gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Self {
        let namespace = if gvk.is_cluster_scoped() {
            String::new()
        } else {
            namespace.unwrap_or_default().to_string()
        };
        Self {
            group: gvk.group.clone(),
            kind: gvk.kind.clone(),
            namespace,
            name: name.to_string(),
        }
    }

    fn namespace_object(name: &str) -> Self {
        Self::new(&GroupVersionKind::core("Namespace"), None, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LogKey {
    namespace: String,
    pod: String,
    container: String,
}

#[derive(Debug, Clone)]
struct LogLine {
    at: DateTime<Utc>,
    text: String,
}

#[derive(Debug, Clone)]
struct ExecScript {
    namespace: String,
    pod: String,
    command: Vec<String>,
    exit_code: i32,
}

/// The object store and metadata for one context.
#[derive(Debug, Clone)]
pub struct ClusterContext {
    info: ContextInfo,
    server_version: String,
    objects: BTreeMap<ObjectKey, Value>,
    logs: HashMap<LogKey, Vec<LogLine>>,
    exec_scripts: Vec<ExecScript>,
    resource_version: u64,
}

impl ClusterContext {
    /// Create a context seeded with the `default` and `kube-system` namespaces.
    pub fn new(info: ContextInfo, server_version: &str) -> Self {
        let mut ctx = Self {
            info,
            server_version: server_version.to_string(),
            objects: BTreeMap::new(),
            logs: HashMap::new(),
            exec_scripts: Vec::new(),
            resource_version: 0,
        };
        ctx.ensure_namespace(DEFAULT_NAMESPACE);
        ctx.ensure_namespace("kube-system");
        ctx
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn default_namespace(&self) -> &str {
        self.info.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    /// Store an object as-is, creating its namespace when missing.
    pub fn insert_object(&mut self, manifest: Value) -> BackendResult<()> {
        let target = object_ref(&manifest)?;
        let namespace = if target.gvk.is_cluster_scoped() {
            None
        } else {
            let ns = target
                .namespace
                .clone()
                .unwrap_or_else(|| self.default_namespace().to_string());
            self.ensure_namespace(&ns);
            Some(ns)
        };
        let key = ObjectKey::new(&target.gvk, namespace.as_deref(), &target.name);
        let object = self.stamp(&key, None, manifest, "fixture");
        self.objects.insert(key, object);
        Ok(())
    }

    /// Append log lines for a container, spaced one second apart and ending now.
    pub fn push_logs(&mut self, namespace: &str, pod: &str, container: &str, lines: &[String]) {
        let now = Utc::now();
        let count = lines.len() as i64;
        let entry = self
            .logs
            .entry(LogKey {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
                container: container.to_string(),
            })
            .or_default();
        for (i, text) in lines.iter().enumerate() {
            entry.push(LogLine {
                at: now - Duration::seconds(count - 1 - i as i64),
                text: text.clone(),
            });
        }
    }

    /// Make `command` in the given pod exit with `exit_code`.
    pub fn script_exec(&mut self, namespace: &str, pod: &str, command: Vec<String>, exit_code: i32) {
        self.exec_scripts.push(ExecScript {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            command,
            exit_code,
        });
    }

    fn ensure_namespace(&mut self, name: &str) {
        let key = ObjectKey::namespace_object(name);
        if !self.objects.contains_key(&key) {
            let manifest = json!({
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": { "name": name }
            });
            let object = self.stamp(&key, None, manifest, "kubegate");
            self.objects.insert(key, object);
        }
    }

    fn namespace_exists(&self, name: &str) -> bool {
        self.objects.contains_key(&ObjectKey::namespace_object(name))
    }

    /// Merge `manifest` over `existing` and fill server-managed metadata.
    fn stamp(
        &mut self,
        key: &ObjectKey,
        existing: Option<&Value>,
        manifest: Value,
        field_manager: &str,
    ) -> Value {
        let mut object = existing.cloned().unwrap_or_else(|| json!({}));
        merge_patch(&mut object, &manifest);

        self.resource_version += 1;
        let uid = existing
            .and_then(|e| e.pointer("/metadata/uid"))
            .cloned()
            .unwrap_or_else(|| Value::String(uuid::Uuid::new_v4().to_string()));
        let created = existing
            .and_then(|e| e.pointer("/metadata/creationTimestamp"))
            .cloned()
            .unwrap_or_else(|| {
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
            });
        let api_version = object
            .get("apiVersion")
            .cloned()
            .unwrap_or(Value::Null);

        if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
            if !key.namespace.is_empty() {
                metadata.insert("namespace".into(), Value::String(key.namespace.clone()));
            }
            metadata.insert("uid".into(), uid);
            metadata.insert("creationTimestamp".into(), created);
            metadata.insert(
                "resourceVersion".into(),
                Value::String(self.resource_version.to_string()),
            );
            metadata.insert(
                "managedFields".into(),
                json!([{
                    "manager": field_manager,
                    "operation": "Apply",
                    "apiVersion": api_version,
                }]),
            );
        }

        if key.kind == "Namespace" && object.pointer("/status/phase").is_none() {
            object["status"] = json!({ "phase": "Active" });
        }
        object
    }

    fn get(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> BackendResult<&Value> {
        let namespace = self.resolve_namespace(gvk, namespace);
        self.objects
            .get(&ObjectKey::new(gvk, namespace.as_deref(), name))
            .ok_or_else(|| BackendError::not_found(&gvk.kind, namespace.as_deref(), name))
    }

    fn resolve_namespace(&self, gvk: &GroupVersionKind, namespace: Option<&str>) -> Option<String> {
        if gvk.is_cluster_scoped() {
            None
        } else {
            Some(
                namespace
                    .filter(|ns| !ns.is_empty())
                    .unwrap_or(self.default_namespace())
                    .to_string(),
            )
        }
    }

    /// Pick the target container of a pod, defaulting to its only container.
    fn resolve_container(&self, pod: &Value, container: Option<&str>) -> BackendResult<String> {
        let pod_name = pod
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let names: Vec<&str> = ["/spec/containers", "/spec/initContainers"]
            .iter()
            .filter_map(|p| pod.pointer(p).and_then(Value::as_array))
            .flatten()
            .filter_map(|c| c.get("name").and_then(Value::as_str))
            .collect();

        match container {
            Some(c) if names.contains(&c) => Ok(c.to_string()),
            Some(c) => Err(BackendError::InvalidArgument(format!(
                "container {c} is not valid for pod {pod_name}"
            ))),
            None => {
                let main: Vec<&str> = pod
                    .pointer("/spec/containers")
                    .and_then(Value::as_array)
                    .map(|cs| {
                        cs.iter()
                            .filter_map(|c| c.get("name").and_then(Value::as_str))
                            .collect()
                    })
                    .unwrap_or_default();
                match main.as_slice() {
                    [only] => Ok(only.to_string()),
                    [] => Err(BackendError::InvalidArgument(format!(
                        "pod {pod_name} has no containers"
                    ))),
                    many => Err(BackendError::InvalidArgument(format!(
                        "a container name must be specified for pod {pod_name}, choose one of: [{}]",
                        many.join(" ")
                    ))),
                }
            }
        }
    }
}

struct ClusterState {
    current: String,
    in_cluster: bool,
    contexts: BTreeMap<String, ClusterContext>,
}

impl ClusterState {
    fn active(&self) -> BackendResult<&ClusterContext> {
        self.contexts
            .get(&self.current)
            .ok_or_else(|| BackendError::UnknownContext(self.current.clone()))
    }

    fn active_mut(&mut self) -> BackendResult<&mut ClusterContext> {
        let current = self.current.clone();
        self.contexts
            .get_mut(&current)
            .ok_or(BackendError::UnknownContext(current))
    }
}

/// A complete cluster simulated in memory.
pub struct MemoryCluster {
    state: RwLock<ClusterState>,
}

impl MemoryCluster {
    /// A cluster with a single `memory` context.
    pub fn new() -> Self {
        let info = ContextInfo {
            name: "memory".to_string(),
            cluster: "memory".to_string(),
            user: "memory".to_string(),
            namespace: None,
        };
        Self {
            state: RwLock::new(ClusterState {
                current: info.name.clone(),
                in_cluster: false,
                contexts: BTreeMap::from([(info.name.clone(), ClusterContext::new(info, DEFAULT_SERVER_VERSION))]),
            }),
        }
    }

    /// Build a cluster from prepared contexts.
    ///
    /// With `in_cluster` set, context listing and switching are unavailable,
    /// mirroring a server running inside a pod without a kubeconfig.
    pub fn from_contexts(
        contexts: Vec<ClusterContext>,
        current: Option<&str>,
        in_cluster: bool,
    ) -> BackendResult<Self> {
        let first = contexts
            .first()
            .map(|c| c.name().to_string())
            .ok_or_else(|| BackendError::InvalidArgument("at least one context is required".to_string()))?;
        let current = current.map(|c| c.to_string()).unwrap_or(first);
        let contexts: BTreeMap<String, ClusterContext> = contexts
            .into_iter()
            .map(|c| (c.name().to_string(), c))
            .collect();
        if !contexts.contains_key(&current) {
            return Err(BackendError::UnknownContext(current));
        }
        Ok(Self {
            state: RwLock::new(ClusterState {
                current,
                in_cluster,
                contexts,
            }),
        })
    }

    /// Number of objects stored in the active context.
    pub async fn object_count(&self) -> usize {
        let state = self.state.read().await;
        state.active().map(|c| c.object_count()).unwrap_or(0)
    }

    /// Names of all contexts, in sorted order.
    pub async fn context_names(&self) -> Vec<String> {
        self.state.read().await.contexts.keys().cloned().collect()
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceBackend for MemoryCluster {
    async fn server_version(&self) -> BackendResult<String> {
        let state = self.state.read().await;
        Ok(state.active()?.server_version.clone())
    }

    async fn default_namespace(&self) -> String {
        let state = self.state.read().await;
        state
            .active()
            .map(|c| c.default_namespace().to_string())
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string())
    }

    async fn list_namespaces(&self) -> BackendResult<Vec<NamespaceSummary>> {
        let state = self.state.read().await;
        let ctx = state.active()?;
        let rows = ctx
            .objects
            .iter()
            .filter(|(key, _)| key.group.is_empty() && key.kind == "Namespace")
            .map(|(key, object)| NamespaceSummary {
                name: key.name.clone(),
                status: object
                    .pointer("/status/phase")
                    .and_then(Value::as_str)
                    .unwrap_or("Active")
                    .to_string(),
                created: object
                    .pointer("/metadata/creationTimestamp")
                    .and_then(Value::as_str)
                    .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                    .map(|ts| ts.with_timezone(&Utc)),
            })
            .collect();
        Ok(rows)
    }

    async fn get_object(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> BackendResult<Value> {
        let state = self.state.read().await;
        state.active()?.get(gvk, namespace, name).cloned()
    }

    async fn list_objects(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        selector: &ListSelector,
        limit: Option<usize>,
    ) -> BackendResult<Vec<Value>> {
        let labels = match selector.label_selector.as_deref() {
            Some(s) => LabelSelector::parse(s)?,
            None => LabelSelector::default(),
        };
        let fields = match selector.field_selector.as_deref() {
            Some(s) => FieldSelector::parse(s)?,
            None => FieldSelector::default(),
        };
        let namespace = namespace.filter(|ns| !ns.is_empty() && !gvk.is_cluster_scoped());

        let state = self.state.read().await;
        let ctx = state.active()?;
        let items = ctx
            .objects
            .iter()
            .filter(|(key, _)| key.group == gvk.group && key.kind == gvk.kind)
            .filter(|(key, _)| namespace.map_or(true, |ns| key.namespace == ns))
            .filter(|(_, object)| labels.matches(object) && fields.matches(object))
            .map(|(_, object)| object.clone())
            .take(limit.filter(|l| *l > 0).unwrap_or(usize::MAX))
            .collect();
        Ok(items)
    }

    async fn apply_object(
        &self,
        manifest: &Value,
        field_manager: &str,
        dry_run: bool,
    ) -> BackendResult<Value> {
        let target = object_ref(manifest)?;
        let mut state = self.state.write().await;
        let ctx = state.active_mut()?;

        let namespace = ctx.resolve_namespace(&target.gvk, target.namespace.as_deref());
        if let Some(ns) = namespace.as_deref() {
            if !ctx.namespace_exists(ns) {
                return Err(BackendError::not_found("Namespace", None, ns));
            }
        }

        let key = ObjectKey::new(&target.gvk, namespace.as_deref(), &target.name);
        let existing = ctx.objects.get(&key).cloned();
        let object = ctx.stamp(&key, existing.as_ref(), manifest.clone(), field_manager);

        if dry_run {
            ctx.resource_version -= 1;
            tracing::debug!("Dry-run apply of {} {}", target.gvk, target.name);
        } else {
            tracing::info!(
                "Applied {} {}{} (manager {field_manager})",
                target.gvk,
                namespace.as_deref().map(|ns| format!("{ns}/")).unwrap_or_default(),
                target.name
            );
            ctx.objects.insert(key, object.clone());
        }
        Ok(object)
    }

    async fn delete_object(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> BackendResult<()> {
        let mut state = self.state.write().await;
        let ctx = state.active_mut()?;
        let namespace = ctx.resolve_namespace(gvk, namespace);
        let key = ObjectKey::new(gvk, namespace.as_deref(), name);
        if !ctx.objects.contains_key(&key) {
            return Err(BackendError::not_found(&gvk.kind, namespace.as_deref(), name));
        }
        if options.dry_run {
            tracing::debug!("Dry-run delete of {gvk} {name}");
            return Ok(());
        }

        ctx.objects.remove(&key);
        let cascade = options.propagation_policy != Some(PropagationPolicy::Orphan);
        if key.kind == "Namespace" && key.group.is_empty() && cascade {
            ctx.objects.retain(|k, _| k.namespace != name);
            ctx.logs.retain(|k, _| k.namespace != name);
        }
        tracing::info!("Deleted {gvk} {name}");
        Ok(())
    }

    async fn get_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        options: &LogOptions,
    ) -> BackendResult<String> {
        let state = self.state.read().await;
        let ctx = state.active()?;
        let pod_object = ctx.get(&GroupVersionKind::core("Pod"), Some(namespace), pod)?;
        let container = ctx.resolve_container(pod_object, container)?;

        let key = LogKey {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            container,
        };
        let since = match options.since_seconds.filter(|s| *s > 0) {
            Some(seconds) => Some(
                Duration::try_seconds(seconds)
                    .and_then(|window| Utc::now().checked_sub_signed(window))
                    .ok_or_else(|| {
                        BackendError::InvalidArgument(format!(
                            "sinceSeconds {seconds} is out of range"
                        ))
                    })?,
            ),
            None => None,
        };
        let lines: Vec<&LogLine> = ctx
            .logs
            .get(&key)
            .map(|lines| {
                lines
                    .iter()
                    .filter(|l| since.map_or(true, |cutoff| l.at >= cutoff))
                    .collect()
            })
            .unwrap_or_default();

        let skip = match options.tail_lines {
            Some(tail) if tail >= 0 => lines.len().saturating_sub(tail as usize),
            _ => 0,
        };

        let mut out = String::new();
        for line in &lines[skip..] {
            if options.timestamps {
                out.push_str(&line.at.to_rfc3339_opts(SecondsFormat::Nanos, true));
                out.push(' ');
            }
            out.push_str(&line.text);
            out.push('\n');
        }
        Ok(out)
    }

    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        command: &[String],
    ) -> BackendResult<i32> {
        if command.is_empty() {
            return Err(BackendError::InvalidArgument(
                "command must not be empty".to_string(),
            ));
        }
        let state = self.state.read().await;
        let ctx = state.active()?;
        let pod_object = ctx.get(&GroupVersionKind::core("Pod"), Some(namespace), pod)?;
        let phase = pod_object
            .pointer("/status/phase")
            .and_then(Value::as_str)
            .unwrap_or("Unknown");
        if phase != "Running" {
            return Err(BackendError::PodNotRunning {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
                phase: phase.to_string(),
            });
        }
        let container = ctx.resolve_container(pod_object, container)?;

        let exit_code = ctx
            .exec_scripts
            .iter()
            .find(|s| s.namespace == namespace && s.pod == pod && s.command == command)
            .map(|s| s.exit_code)
            .unwrap_or(0);
        tracing::info!(
            "Exec in {namespace}/{pod} [{container}]: {} -> {exit_code}",
            command.join(" ")
        );
        Ok(exit_code)
    }

    async fn switch_context(&self, name: &str) -> BackendResult<()> {
        let mut state = self.state.write().await;
        if state.in_cluster {
            return Err(BackendError::ContextsUnavailable("running in-cluster".to_string()));
        }
        if !state.contexts.contains_key(name) {
            return Err(BackendError::UnknownContext(name.to_string()));
        }
        tracing::info!("Switching context {} -> {name}", state.current);
        state.current = name.to_string();
        Ok(())
    }

    async fn list_contexts(&self) -> BackendResult<ContextList> {
        let state = self.state.read().await;
        if state.in_cluster {
            return Err(BackendError::ContextsUnavailable("running in-cluster".to_string()));
        }
        Ok(ContextList {
            current: state.current.clone(),
            contexts: state.contexts.values().map(|c| c.info.clone()).collect(),
        })
    }
}
