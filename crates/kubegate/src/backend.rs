//! The resource backend abstraction that tool handlers delegate to.
//!
//! Implementations perform the actual cluster operations. Every call may
//! fail; callers surface failures to the client as tool errors rather than
//! retrying here.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BackendResult;
use crate::types::{
    ContextList, DeleteOptions, GroupVersionKind, ListSelector, LogOptions, NamespaceSummary,
};

/// A cluster that tools can read from and mutate.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    /// Version string reported by the API server.
    async fn server_version(&self) -> BackendResult<String>;

    /// Namespace used when a caller does not name one.
    async fn default_namespace(&self) -> String;

    async fn list_namespaces(&self) -> BackendResult<Vec<NamespaceSummary>>;

    /// Fetch a single object. `namespace` is ignored for cluster-scoped kinds.
    async fn get_object(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> BackendResult<Value>;

    /// List objects of a kind. `None` namespace lists across all namespaces.
    async fn list_objects(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        selector: &ListSelector,
        limit: Option<usize>,
    ) -> BackendResult<Vec<Value>>;

    /// Server-side apply of a single decoded manifest. Returns the object as
    /// it is (or, for a dry run, would be) stored.
    async fn apply_object(
        &self,
        manifest: &Value,
        field_manager: &str,
        dry_run: bool,
    ) -> BackendResult<Value>;

    async fn delete_object(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> BackendResult<()>;

    async fn get_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        options: &LogOptions,
    ) -> BackendResult<String>;

    /// Run a command in a pod container and return its exit code.
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        command: &[String],
    ) -> BackendResult<i32>;

    async fn switch_context(&self, name: &str) -> BackendResult<()>;

    async fn list_contexts(&self) -> BackendResult<ContextList>;
}
