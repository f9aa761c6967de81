//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LoomSettings::default()`]
//! 2. If `~/.loom/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `LOOM_*` environment variable overrides (highest priority)
//! 4. [`LoomSettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{BudgetMetric, LoomSettings};

/// Resolve the path to the settings file (`~/.loom/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".loom").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LoomSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LoomSettings> {
    load_settings_with(path, |key| std::env::var(key).ok())
}

/// Load settings from `path`, reading overrides through `lookup`.
pub fn load_settings_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<LoomSettings> {
    let defaults = serde_json::to_value(LoomSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: LoomSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate();
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `LOOM_*` overrides read from the process environment.
pub fn apply_env_overrides(settings: &mut LoomSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary key lookup.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Invalid values are
/// logged and ignored.
pub fn apply_overrides(settings: &mut LoomSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = Env { lookup };

    // ── Compaction ──────────────────────────────────────────────────
    if let Some(v) = env.bool("LOOM_COMPACTION_ENABLED") {
        settings.compaction.enabled = v;
    }
    if let Some(v) = env.metric("LOOM_COMPACTION_METRIC") {
        settings.compaction.metric = v;
    }
    if let Some(v) = env.u64("LOOM_COMPACTION_BUDGET", 1, 10_000_000) {
        settings.compaction.budget = v;
    }
    if let Some(v) = env.usize("LOOM_COMPACTION_TAIL", 0, 100_000) {
        settings.compaction.verbatim_tail = v;
    }
    if let Some(v) = env.u64("LOOM_PROVIDER_TIMEOUT_MS", 100, 3_600_000) {
        settings.compaction.provider_timeout_ms = v;
    }

    // ── Bus ─────────────────────────────────────────────────────────
    if let Some(v) = env.usize("LOOM_SUBSCRIBER_BACKLOG", 1, 1_000_000) {
        settings.bus.subscriber_backlog = v;
    }
    if let Some(v) = env.usize("LOOM_OBSERVER_BACKLOG", 1, 1_000_000) {
        settings.bus.observer_backlog = v;
    }

    // ── Session / models / logging ──────────────────────────────────
    if let Some(v) = env.usize("LOOM_TITLE_MAX_CHARS", 1, 1_000) {
        settings.session.title_max_chars = v;
    }
    if let Some(v) = env.string("LOOM_DEFAULT_MODEL") {
        settings.models.default_model = v;
    }
    if let Some(v) = env.string("LOOM_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Lookup readers ──────────────────────────────────────────────────────────

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }

    fn metric(&self, name: &str) -> Option<BudgetMetric> {
        let val = (self.lookup)(name)?;
        match val.parse() {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(key = name, value = %val, error = %e, "invalid metric env var, ignoring");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"compaction": {"budget": 20, "verbatimTail": 10}});
        let source = serde_json::json!({"compaction": {"budget": 40}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["compaction"]["budget"], 40);
        assert_eq!(merged["compaction"]["verbatimTail"], 10);
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3]}),
            serde_json::json!({"items": [4]}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(
            serde_json::json!({"a": {"nested": true}}),
            serde_json::json!({"a": 42}),
        );
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_with ──────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let s = load_settings_with(Path::new("/nonexistent/settings.json"), no_env).unwrap();
        assert_eq!(s, LoomSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"compaction": {"budget": 40}, "logging": {"level": "debug"}}"#,
        )
        .unwrap();

        let s = load_settings_with(&path, no_env).unwrap();
        assert_eq!(s.compaction.budget, 40);
        assert_eq!(s.compaction.verbatim_tail, 10);
        assert_eq!(s.logging.level, "debug");
        assert_eq!(s.bus.subscriber_backlog, 256);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert_matches!(
            load_settings_with(&path, no_env),
            Err(SettingsError::Parse { path: p, .. }) if p == path
        );
    }

    #[test]
    fn wrong_type_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"compaction": {"budget": "lots"}}"#).unwrap();
        assert_matches!(load_settings_with(&path, no_env), Err(SettingsError::Shape(_)));
    }

    #[test]
    fn file_values_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"compaction": {"budget": 4, "verbatimTail": 8}}"#).unwrap();
        let s = load_settings_with(&path, no_env).unwrap();
        assert_eq!(s.compaction.verbatim_tail, 3);
    }

    #[test]
    fn env_overrides_beat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"compaction": {"budget": 40}}"#).unwrap();

        let env = lookup_from(&[
            ("LOOM_COMPACTION_BUDGET", "60"),
            ("LOOM_COMPACTION_METRIC", "tokens"),
            ("LOOM_COMPACTION_ENABLED", "off"),
            ("LOOM_SUBSCRIBER_BACKLOG", "32"),
            ("LOOM_LOG_LEVEL", "loom_runtime=debug"),
        ]);
        let s = load_settings_with(&path, env).unwrap();
        assert_eq!(s.compaction.budget, 60);
        assert_eq!(s.compaction.metric, BudgetMetric::Tokens);
        assert!(!s.compaction.enabled);
        assert_eq!(s.bus.subscriber_backlog, 32);
        assert_eq!(s.logging.level, "loom_runtime=debug");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut s = LoomSettings::default();
        apply_overrides(
            &mut s,
            lookup_from(&[
                ("LOOM_COMPACTION_BUDGET", "0"),
                ("LOOM_COMPACTION_ENABLED", "maybe"),
                ("LOOM_COMPACTION_METRIC", "bytes"),
                ("LOOM_DEFAULT_MODEL", ""),
            ]),
        );
        assert_eq!(s, LoomSettings::default());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "ON"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u64_range("100", 100, 1000), Some(100));
        assert_eq!(parse_u64_range("99", 100, 1000), None);
        assert_eq!(parse_u64_range("abc", 100, 1000), None);
        assert_eq!(parse_usize_range("0", 0, 10), Some(0));
        assert_eq!(parse_usize_range("11", 0, 10), None);
    }
}
