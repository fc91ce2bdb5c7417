//! Label and field selector parsing and evaluation against JSON objects.

use serde_json::Value;

use crate::error::{BackendError, BackendResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    NotExists(String),
}

/// A parsed label selector: a conjunction of requirements on `metadata.labels`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Parse `k=v`, `k==v`, `k!=v`, `k` and `!k` terms separated by commas.
    pub fn parse(selector: &str) -> BackendResult<Self> {
        let mut requirements = Vec::new();
        for term in split_terms(selector) {
            let requirement = if let Some((key, value)) = term.split_once("!=") {
                Requirement::NotEquals(check_key(selector, key)?, value.trim().to_string())
            } else if let Some((key, value)) = term.split_once("==") {
                Requirement::Equals(check_key(selector, key)?, value.trim().to_string())
            } else if let Some((key, value)) = term.split_once('=') {
                Requirement::Equals(check_key(selector, key)?, value.trim().to_string())
            } else if let Some(key) = term.strip_prefix('!') {
                Requirement::NotExists(check_key(selector, key)?)
            } else {
                Requirement::Exists(check_key(selector, term)?)
            };
            requirements.push(requirement);
        }
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, object: &Value) -> bool {
        let labels = object.pointer("/metadata/labels");
        let label = |key: &str| labels.and_then(|l| l.get(key)).and_then(Value::as_str);
        self.requirements.iter().all(|req| match req {
            Requirement::Equals(k, v) => label(k) == Some(v.as_str()),
            Requirement::NotEquals(k, v) => label(k) != Some(v.as_str()),
            Requirement::Exists(k) => label(k).is_some(),
            Requirement::NotExists(k) => label(k).is_none(),
        })
    }
}

/// A parsed field selector: equality tests on dotted object paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<Requirement>,
}

impl FieldSelector {
    /// Parse `path=v`, `path==v` and `path!=v` terms separated by commas.
    pub fn parse(selector: &str) -> BackendResult<Self> {
        let mut requirements = Vec::new();
        for term in split_terms(selector) {
            let requirement = if let Some((path, value)) = term.split_once("!=") {
                Requirement::NotEquals(check_key(selector, path)?, value.trim().to_string())
            } else if let Some((path, value)) = term.split_once("==") {
                Requirement::Equals(check_key(selector, path)?, value.trim().to_string())
            } else if let Some((path, value)) = term.split_once('=') {
                Requirement::Equals(check_key(selector, path)?, value.trim().to_string())
            } else {
                return Err(BackendError::InvalidSelector {
                    selector: selector.to_string(),
                    reason: format!("field term \"{term}\" needs an operator"),
                });
            };
            requirements.push(requirement);
        }
        Ok(Self { requirements })
    }

    pub fn matches(&self, object: &Value) -> bool {
        self.requirements.iter().all(|req| match req {
            Requirement::Equals(path, v) => field_value(object, path).as_deref() == Some(v.as_str()),
            Requirement::NotEquals(path, v) => {
                field_value(object, path).as_deref() != Some(v.as_str())
            }
            Requirement::Exists(_) | Requirement::NotExists(_) => true,
        })
    }
}

fn split_terms(selector: &str) -> impl Iterator<Item = &str> {
    selector.split(',').map(str::trim).filter(|t| !t.is_empty())
}

fn check_key(selector: &str, key: &str) -> BackendResult<String> {
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(BackendError::InvalidSelector {
            selector: selector.to_string(),
            reason: format!("invalid key \"{key}\""),
        });
    }
    Ok(key.to_string())
}

/// Resolve a dotted path (`status.phase`) to a scalar rendered as a string.
fn field_value(object: &Value, path: &str) -> Option<String> {
    let pointer = format!("/{}", path.replace('.', "/"));
    match object.pointer(&pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod() -> Value {
        json!({
            "metadata": {
                "name": "web-0",
                "namespace": "shop",
                "labels": { "app": "web", "tier": "frontend" }
            },
            "spec": { "nodeName": "node-a" },
            "status": { "phase": "Running" }
        })
    }

    #[test]
    fn test_label_equality() {
        assert!(LabelSelector::parse("app=web").unwrap().matches(&pod()));
        assert!(LabelSelector::parse("app==web,tier=frontend").unwrap().matches(&pod()));
        assert!(!LabelSelector::parse("app=db").unwrap().matches(&pod()));
    }

    #[test]
    fn test_label_inequality_and_existence() {
        assert!(LabelSelector::parse("app!=db").unwrap().matches(&pod()));
        assert!(LabelSelector::parse("tier").unwrap().matches(&pod()));
        assert!(!LabelSelector::parse("!tier").unwrap().matches(&pod()));
        assert!(LabelSelector::parse("!canary").unwrap().matches(&pod()));
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = LabelSelector::parse("  ").unwrap();
        assert!(selector.is_empty());
        assert!(selector.matches(&json!({})));
    }

    #[test]
    fn test_invalid_label_key() {
        assert!(LabelSelector::parse("=web").is_err());
        assert!(LabelSelector::parse("bad key=web").is_err());
    }

    #[test]
    fn test_field_paths() {
        assert!(FieldSelector::parse("metadata.name=web-0").unwrap().matches(&pod()));
        assert!(FieldSelector::parse("status.phase=Running,spec.nodeName=node-a")
            .unwrap()
            .matches(&pod()));
        assert!(!FieldSelector::parse("status.phase!=Running").unwrap().matches(&pod()));
        assert!(!FieldSelector::parse("metadata.uid=abc").unwrap().matches(&pod()));
    }

    #[test]
    fn test_field_term_without_operator() {
        let err = FieldSelector::parse("metadata.name").unwrap_err();
        assert!(err.to_string().contains("needs an operator"));
    }
}
