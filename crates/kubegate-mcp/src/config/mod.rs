//! Configuration loading and resolution.
//!
//! Guard settings come from the environment and are re-read on every tool
//! call, so an operator can flip read-only mode without restarting.

use std::path::PathBuf;
use std::time::Duration;

pub const ENV_READ_ONLY: &str = "KUBEGATE_READ_ONLY";
pub const ENV_NAMESPACE_ALLOWLIST: &str = "KUBEGATE_NAMESPACE_ALLOWLIST";
pub const ENV_KIND_ALLOWLIST: &str = "KUBEGATE_KIND_ALLOWLIST";
pub const ENV_TIMEOUT_MS: &str = "KUBEGATE_TIMEOUT_MS";
pub const ENV_FIXTURE: &str = "KUBEGATE_FIXTURE";

/// Snapshot of the guard and dispatch settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub read_only: bool,
    /// Empty means every namespace is allowed.
    pub namespace_allowlist: Vec<String>,
    /// Empty means every kind is allowed.
    pub kind_allowlist: Vec<String>,
    /// Per-call deadline. `None` means calls only end on shutdown.
    pub call_timeout: Option<Duration>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            read_only: std::env::var(ENV_READ_ONLY)
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            namespace_allowlist: std::env::var(ENV_NAMESPACE_ALLOWLIST)
                .map(|v| parse_csv(&v))
                .unwrap_or_default(),
            kind_allowlist: std::env::var(ENV_KIND_ALLOWLIST)
                .map(|v| parse_csv(&v))
                .unwrap_or_default(),
            call_timeout: std::env::var(ENV_TIMEOUT_MS)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .and_then(timeout_from_millis),
        }
    }
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub read_only: Option<bool>,
    pub timeout_ms: Option<u64>,
}

/// Where the server reads its settings from.
#[derive(Debug, Clone)]
pub enum SettingsSource {
    /// Re-read the environment on every call, then apply overrides.
    Environment(Overrides),
    /// Fixed settings, used by tests and embedders.
    Fixed(Settings),
}

impl Default for SettingsSource {
    fn default() -> Self {
        SettingsSource::Environment(Overrides::default())
    }
}

impl SettingsSource {
    pub fn current(&self) -> Settings {
        match self {
            SettingsSource::Fixed(settings) => settings.clone(),
            SettingsSource::Environment(overrides) => {
                let mut settings = Settings::from_env();
                if let Some(read_only) = overrides.read_only {
                    settings.read_only = read_only;
                }
                if let Some(ms) = overrides.timeout_ms {
                    settings.call_timeout = timeout_from_millis(ms);
                }
                settings
            }
        }
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

fn timeout_from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Resolve the cluster fixture path: explicit flag, then environment, then
/// `./.kubegate/cluster.yaml` if it exists.
pub fn resolve_fixture_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var(ENV_FIXTURE) {
        if !env_path.trim().is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let cwd_fixture = PathBuf::from(".kubegate/cluster.yaml");
    cwd_fixture.exists().then_some(cwd_fixture)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_drops_blanks_and_whitespace() {
        assert_eq!(parse_csv(" dev, ,prod ,"), vec!["dev", "prod"]);
        assert!(parse_csv("").is_empty());
    }

    #[test]
    fn bool_parsing() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" TRUE "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("yes"));
        assert!(!parse_bool("false"));
    }

    #[test]
    fn zero_timeout_means_none() {
        assert_eq!(timeout_from_millis(0), None);
        assert_eq!(timeout_from_millis(250), Some(Duration::from_millis(250)));
    }

    #[test]
    fn fixed_source_returns_its_settings() {
        let settings = Settings {
            read_only: true,
            namespace_allowlist: vec!["dev".into()],
            ..Settings::default()
        };
        let source = SettingsSource::Fixed(settings.clone());
        assert_eq!(source.current(), settings);
    }

    #[test]
    fn explicit_fixture_path_wins() {
        let path = resolve_fixture_path(Some("/tmp/custom.yaml"));
        assert_eq!(path, Some(PathBuf::from("/tmp/custom.yaml")));
    }
}
