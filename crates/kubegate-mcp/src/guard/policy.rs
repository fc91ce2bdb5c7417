//! Static policy gates for mutating tools.

use super::GuardError;
use crate::config::Settings;

/// Check a mutating call against the current settings.
///
/// Gates run in a fixed order: read-only, then namespace, then kind. The
/// first failing gate wins. An empty namespace or kind is never rejected by
/// its allow-list.
pub fn check_mutating(
    settings: &Settings,
    tool: &str,
    namespace: Option<&str>,
    kind: Option<&str>,
) -> Result<(), GuardError> {
    if settings.read_only {
        return Err(GuardError::ReadOnly {
            tool: tool.to_string(),
        });
    }

    if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
        if !is_allowed(&settings.namespace_allowlist, ns) {
            return Err(GuardError::NamespaceNotAllowed(ns.to_string()));
        }
    }

    if let Some(kind) = kind.filter(|k| !k.is_empty()) {
        if !is_allowed(&settings.kind_allowlist, kind) {
            return Err(GuardError::KindNotAllowed(kind.to_string()));
        }
    }

    Ok(())
}

fn is_allowed(allowlist: &[String], value: &str) -> bool {
    allowlist.is_empty() || allowlist.iter().any(|entry| entry == value)
}
