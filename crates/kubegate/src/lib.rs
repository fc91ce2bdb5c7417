//! kubegate: core library for guarded cluster access by LLM agents.
//!
//! Provides the [`ResourceBackend`] abstraction tool handlers delegate to,
//! selector and manifest helpers, and [`MemoryCluster`], an in-memory
//! backend that can be seeded from a YAML fixture.

pub mod backend;
pub mod error;
pub mod fixture;
pub mod manifest;
pub mod memory;
pub mod selector;
pub mod types;

pub use backend::ResourceBackend;
pub use error::{BackendError, BackendResult};
pub use fixture::Fixture;
pub use manifest::{decode_manifest, merge_patch, object_ref, split_documents, ObjectRef};
pub use memory::{ClusterContext, MemoryCluster};
pub use selector::{FieldSelector, LabelSelector};
pub use types::*;
