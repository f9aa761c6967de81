//! Window measurement and fold selection.
//!
//! Pure functions over a slice of messages. The compactor feeds them the
//! raw window of the projected memory; nothing here touches storage.

use loom_core::message::Message;
use loom_settings::{BudgetMetric, CompactionSettings};

/// Approximate characters per token.
const CHARS_PER_TOKEN: usize = 4;

/// Budget applied to a session's raw window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    /// Unit of `limit`.
    pub metric: BudgetMetric,
    /// Window measure above which compaction triggers.
    pub limit: u64,
    /// Most recent messages never folded. Always counted in messages.
    pub verbatim_tail: usize,
    /// Fixed token cost per attachment.
    pub attachment_tokens: u64,
}

impl Budget {
    /// Build from validated settings.
    #[must_use]
    pub fn from_settings(settings: &CompactionSettings) -> Self {
        Self {
            metric: settings.metric,
            limit: settings.budget,
            verbatim_tail: settings.verbatim_tail,
            attachment_tokens: settings.attachment_tokens,
        }
    }

    /// Cost of one message in the budget's unit.
    #[must_use]
    pub fn cost(&self, message: &Message) -> u64 {
        match self.metric {
            BudgetMetric::Messages => 1,
            BudgetMetric::Tokens => {
                let text = message.content.chars().count().div_ceil(CHARS_PER_TOKEN) as u64;
                text + message.attachments.len() as u64 * self.attachment_tokens
            }
        }
    }

    /// Total cost of `messages`.
    #[must_use]
    pub fn measure(&self, messages: &[Message]) -> u64 {
        messages.iter().map(|m| self.cost(m)).sum()
    }

    /// Whether `window` is over budget.
    #[must_use]
    pub fn exceeds(&self, window: &[Message]) -> bool {
        self.measure(window) > self.limit
    }

    /// How many leading messages of `window` to fold, if any.
    ///
    /// Folds oldest first until the folded measure reaches
    /// `limit - measure(tail)`, taking at least one message and never
    /// touching the last `verbatim_tail` messages. `None` when the window
    /// is within budget or everything in it is protected.
    #[must_use]
    pub fn fold_count(&self, window: &[Message]) -> Option<usize> {
        let eligible = window.len().saturating_sub(self.verbatim_tail);
        if eligible == 0 || !self.exceeds(window) {
            return None;
        }

        let tail = self.measure(&window[eligible..]);
        let target = self.limit.saturating_sub(tail);

        let mut folded = 0u64;
        let mut count = 0usize;
        while count < eligible && (count == 0 || folded < target) {
            folded += self.cost(&window[count]);
            count += 1;
        }
        Some(count)
    }
}
