//! Memory compaction settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// How the raw window is measured against the budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMetric {
    /// Count of messages.
    #[default]
    Messages,
    /// Estimated tokens (chars / 4 plus a fixed cost per attachment).
    Tokens,
}

impl fmt::Display for BudgetMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Messages => f.write_str("messages"),
            Self::Tokens => f.write_str("tokens"),
        }
    }
}

impl FromStr for BudgetMetric {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "messages" => Ok(Self::Messages),
            "tokens" => Ok(Self::Tokens),
            other => Err(SettingsError::UnknownValue {
                key: "budget metric",
                value: other.to_owned(),
            }),
        }
    }
}

/// Rolling memory compaction configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompactionSettings {
    /// Whether compaction runs at all.
    pub enabled: bool,
    /// Unit of `budget`.
    pub metric: BudgetMetric,
    /// Window size above which compaction triggers.
    pub budget: u64,
    /// Most recent messages never folded.
    pub verbatim_tail: usize,
    /// Upper bound on one summarization call.
    pub provider_timeout_ms: u64,
    /// Estimated token cost of one attachment (`tokens` metric only).
    pub attachment_tokens: u64,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            metric: BudgetMetric::Messages,
            budget: 20,
            verbatim_tail: 10,
            provider_timeout_ms: 60_000,
            attachment_tokens: 500,
        }
    }
}
