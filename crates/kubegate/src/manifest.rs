//! YAML manifest splitting, decoding and merging.

use serde_json::{Map, Value};

use crate::error::{BackendError, BackendResult};
use crate::types::GroupVersionKind;

/// Identity of a decoded manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub gvk: GroupVersionKind,
    pub namespace: Option<String>,
    pub name: String,
}

/// Split a multi-document YAML stream on `---` separator lines.
///
/// Documents that contain only whitespace or comments are dropped.
pub fn split_documents(text: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if is_separator(line) {
            push_document(&mut documents, &mut current);
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    push_document(&mut documents, &mut current);

    documents
}

fn is_separator(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed == "---" || trimmed.starts_with("--- ") || trimmed.starts_with("---#")
}

fn push_document(documents: &mut Vec<String>, current: &mut String) {
    let has_content = current
        .lines()
        .any(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'));
    if has_content {
        documents.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

/// Decode one YAML document into a JSON object and validate its identity.
pub fn decode_manifest(document: &str) -> BackendResult<(ObjectRef, Value)> {
    let value: Value = serde_yaml::from_str(document)?;
    let object_ref = object_ref(&value)?;
    Ok((object_ref, value))
}

/// Extract apiVersion/kind/namespace/name from an object.
pub fn object_ref(value: &Value) -> BackendResult<ObjectRef> {
    if !value.is_object() {
        return Err(BackendError::InvalidManifest(
            "document is not a mapping".to_string(),
        ));
    }
    let api_version = required_str(value, "/apiVersion", "apiVersion")?;
    let kind = required_str(value, "/kind", "kind")?;
    let name = required_str(value, "/metadata/name", "metadata.name")?;
    let namespace = value
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .filter(|ns| !ns.is_empty())
        .map(|ns| ns.to_string());

    Ok(ObjectRef {
        gvk: GroupVersionKind::from_api_version(api_version, kind),
        namespace,
        name: name.to_string(),
    })
}

fn required_str<'a>(value: &'a Value, pointer: &str, field: &str) -> BackendResult<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BackendError::InvalidManifest(format!("missing {field}")))
}

/// Apply an RFC 7386 JSON merge patch to `target`.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
