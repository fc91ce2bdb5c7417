//! Loading a [`MemoryCluster`] from a YAML fixture file.
//!
//! ```yaml
//! currentContext: dev
//! contexts:
//!   - name: dev
//!     cluster: dev-cluster
//!     user: dev-admin
//!     namespace: shop
//!     serverVersion: v1.30.1
//!     objects:
//!       - apiVersion: v1
//!         kind: Pod
//!         metadata: { name: web-0, namespace: shop }
//!     logs:
//!       - { namespace: shop, pod: web-0, container: web, lines: ["started"] }
//!     exec:
//!       - { namespace: shop, pod: web-0, command: ["false"], exitCode: 1 }
//! ```

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::BackendResult;
use crate::memory::{ClusterContext, MemoryCluster, DEFAULT_SERVER_VERSION};
use crate::types::ContextInfo;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    #[serde(default)]
    pub current_context: Option<String>,
    #[serde(default)]
    pub in_cluster: bool,
    #[serde(default)]
    pub contexts: Vec<FixtureContext>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureContext {
    pub name: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub server_version: Option<String>,
    #[serde(default)]
    pub objects: Vec<Value>,
    #[serde(default)]
    pub logs: Vec<FixtureLogs>,
    #[serde(default)]
    pub exec: Vec<FixtureExec>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureLogs {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    #[serde(default)]
    pub lines: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureExec {
    pub namespace: String,
    pub pod: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub exit_code: i32,
}

impl Fixture {
    pub fn into_cluster(self) -> BackendResult<MemoryCluster> {
        if self.contexts.is_empty() {
            return Ok(MemoryCluster::new());
        }

        let mut contexts = Vec::with_capacity(self.contexts.len());
        for fc in self.contexts {
            let info = ContextInfo {
                name: fc.name,
                cluster: fc.cluster,
                user: fc.user,
                namespace: fc.namespace,
            };
            let version = fc
                .server_version
                .unwrap_or_else(|| DEFAULT_SERVER_VERSION.to_string());
            let mut ctx = ClusterContext::new(info, &version);
            for object in fc.objects {
                ctx.insert_object(object)?;
            }
            for logs in fc.logs {
                ctx.push_logs(&logs.namespace, &logs.pod, &logs.container, &logs.lines);
            }
            for script in fc.exec {
                ctx.script_exec(&script.namespace, &script.pod, script.command, script.exit_code);
            }
            tracing::debug!(
                "Loaded context {} with {} objects",
                ctx.name(),
                ctx.object_count()
            );
            contexts.push(ctx);
        }

        MemoryCluster::from_contexts(contexts, self.current_context.as_deref(), self.in_cluster)
    }
}

impl MemoryCluster {
    /// Build a cluster from fixture YAML text.
    pub fn from_fixture_str(text: &str) -> BackendResult<Self> {
        let fixture: Fixture = serde_yaml::from_str(text)?;
        fixture.into_cluster()
    }

    /// Read and build a cluster from a fixture file.
    pub fn from_fixture_file(path: &Path) -> BackendResult<Self> {
        tracing::info!("Loading cluster fixture: {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_fixture_str(&text)
    }
}
