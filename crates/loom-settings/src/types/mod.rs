//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a partial JSON file only needs the fields it changes.

mod compaction;

pub use compaction::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "compaction": { "budget": 40, "verbatimTail": 12 },
///   "bus": { "subscriberBacklog": 512 },
///   "logging": { "level": "info" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoomSettings {
    /// Rolling memory compaction.
    pub compaction: CompactionSettings,
    /// Event bus sizing.
    pub bus: BusSettings,
    /// Session behavior.
    pub session: SessionSettings,
    /// Default model selection.
    pub models: ModelSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl LoomSettings {
    /// Correct out-of-range values in place.
    ///
    /// Called during loading. Invalid values are clamped with a warning
    /// rather than rejected.
    pub fn validate(&mut self) {
        fn at_least<T: PartialOrd + Copy + std::fmt::Display>(val: &mut T, min: T, name: &str) {
            if *val < min {
                tracing::warn!("{name} below minimum ({val}), clamped to {min}");
                *val = min;
            }
        }

        let c = &mut self.compaction;
        at_least(&mut c.budget, 1, "compaction.budget");
        at_least(&mut c.provider_timeout_ms, 100, "compaction.provider_timeout_ms");
        if c.metric == BudgetMetric::Messages {
            let max_tail = usize::try_from(c.budget - 1).unwrap_or(usize::MAX);
            if c.verbatim_tail > max_tail {
                tracing::warn!(
                    "compaction.verbatim_tail ({}) >= budget ({}), clamped to {max_tail}",
                    c.verbatim_tail,
                    c.budget
                );
                c.verbatim_tail = max_tail;
            }
        }

        at_least(&mut self.bus.subscriber_backlog, 1, "bus.subscriber_backlog");
        at_least(&mut self.bus.observer_backlog, 1, "bus.observer_backlog");
        at_least(&mut self.session.title_max_chars, 1, "session.title_max_chars");
    }
}

/// Event bus sizing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusSettings {
    /// Per-subscriber backlog before oldest events are dropped.
    pub subscriber_backlog: usize,
    /// Capacity of an observer-side `EventBacklog` ring.
    pub observer_backlog: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            subscriber_backlog: 256,
            observer_backlog: 100,
        }
    }
}

/// Session behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Maximum characters in a title derived from the first message.
    pub title_max_chars: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            title_max_chars: 50,
        }
    }
}

/// Default model selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Model selected at startup.
    #[serde(rename = "default")]
    pub default_model: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            default_model: "default".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let s = LoomSettings::default();
        assert_eq!(s.compaction.budget, 20);
        assert_eq!(s.compaction.verbatim_tail, 10);
        assert_eq!(s.bus.subscriber_backlog, 256);
        assert_eq!(s.bus.observer_backlog, 100);
        assert_eq!(s.session.title_max_chars, 50);
        assert_eq!(s.models.default_model, "default");
        assert_eq!(s.logging.level, "warn");
    }

    #[test]
    fn json_is_camel_case() {
        let v = serde_json::to_value(LoomSettings::default()).unwrap();
        assert_eq!(v["compaction"]["verbatimTail"], 10);
        assert_eq!(v["compaction"]["providerTimeoutMs"], 60_000);
        assert_eq!(v["bus"]["subscriberBacklog"], 256);
        assert_eq!(v["session"]["titleMaxChars"], 50);
        assert_eq!(v["models"]["default"], "default");
    }

    #[test]
    fn validate_keeps_valid_defaults() {
        let mut s = LoomSettings::default();
        s.validate();
        assert_eq!(s, LoomSettings::default());
    }

    #[test]
    fn validate_clamps_zero_budget_and_backlog() {
        let mut s = LoomSettings::default();
        s.compaction.budget = 0;
        s.bus.subscriber_backlog = 0;
        s.session.title_max_chars = 0;
        s.validate();
        assert_eq!(s.compaction.budget, 1);
        assert_eq!(s.compaction.verbatim_tail, 0);
        assert_eq!(s.bus.subscriber_backlog, 1);
        assert_eq!(s.session.title_max_chars, 1);
    }

    #[test]
    fn validate_clamps_tail_to_below_message_budget() {
        let mut s = LoomSettings::default();
        s.compaction.budget = 5;
        s.compaction.verbatim_tail = 9;
        s.validate();
        assert_eq!(s.compaction.verbatim_tail, 4);
    }

    #[test]
    fn validate_leaves_tail_alone_for_token_budget() {
        let mut s = LoomSettings::default();
        s.compaction.metric = BudgetMetric::Tokens;
        s.compaction.budget = 5;
        s.compaction.verbatim_tail = 9;
        s.validate();
        assert_eq!(s.compaction.verbatim_tail, 9);
    }

    #[test]
    fn validate_raises_tiny_provider_timeout() {
        let mut s = LoomSettings::default();
        s.compaction.provider_timeout_ms = 5;
        s.validate();
        assert_eq!(s.compaction.provider_timeout_ms, 100);
    }
}
