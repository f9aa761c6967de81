//! Summary provider seam and transcript rendering.
//!
//! The compactor hands a [`SummaryProvider`] the prior summary plus the run
//! of messages being folded and expects a replacement summary back. The
//! call is a single request/response; timeouts and retries are the
//! compactor's business.

use async_trait::async_trait;
use loom_core::errors::ProviderError;
use loom_core::ids::SessionId;
use loom_core::message::Message;
use loom_core::text::{truncate_chars, truncate_str};
use serde::{Deserialize, Serialize};

/// Transcript size above which the middle is elided.
pub const MAX_TRANSCRIPT_CHARS: usize = 100_000;

/// Per-request cap used by [`ExtractiveSummarizer`].
const EXTRACT_REQUEST_CHARS: usize = 200;

/// Input to one summarization call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    /// Session being compacted.
    pub session_id: SessionId,
    /// Summary produced by the previous compaction, if any.
    pub prior_summary: Option<String>,
    /// Oldest-first run of messages to fold in.
    pub messages: Vec<Message>,
}

impl SummaryRequest {
    /// Line transcript of `messages`.
    #[must_use]
    pub fn transcript(&self) -> String {
        render_transcript(&self.messages)
    }
}

/// Produces rolling summaries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    /// Fold `request.messages` into `request.prior_summary`.
    async fn summarize(&self, request: SummaryRequest) -> Result<String, ProviderError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Transcript
// ─────────────────────────────────────────────────────────────────────────────

/// Render messages as a line transcript for a summarization model.
///
/// ```text
/// [USER] text...
/// [ASSISTANT] text...
/// [USER] text... (attachments: a.png, notes.md)
/// ```
///
/// Transcripts over [`MAX_TRANSCRIPT_CHARS`] keep the first and last
/// quarter with an omission marker between them.
#[must_use]
pub fn render_transcript(messages: &[Message]) -> String {
    let lines: Vec<String> = messages
        .iter()
        .filter(|m| !m.content.trim().is_empty() || !m.attachments.is_empty())
        .map(|m| {
            let mut line = format!("[{}] {}", m.role.label(), m.content.trim());
            if !m.attachments.is_empty() {
                let names: Vec<&str> = m.attachments.iter().map(|a| a.name.as_str()).collect();
                line.push_str(&format!(" (attachments: {})", names.join(", ")));
            }
            line
        })
        .collect();
    cap_transcript(&lines.join("\n"), MAX_TRANSCRIPT_CHARS)
}

fn cap_transcript(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_owned();
    }

    let quarter = max_chars / 4;
    let head = truncate_str(text, quarter);
    let mut tail_start = text.len().saturating_sub(quarter);
    while tail_start < text.len() && !text.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    let tail = &text[tail_start..];
    let omitted = text.len().saturating_sub(head.len() + tail.len());

    format!("{head}\n[... {omitted} characters omitted ...]\n{tail}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Extractive fallback
// ─────────────────────────────────────────────────────────────────────────────

/// Model-free provider that stitches user requests into a summary.
///
/// Useful offline and as a stand-in when no model is configured. The
/// output is deterministic.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    /// Create a new extractive summarizer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SummaryProvider for ExtractiveSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> Result<String, ProviderError> {
        let requests: Vec<String> = request
            .messages
            .iter()
            .filter(|m| m.role == loom_core::message::Role::User)
            .map(|m| m.content.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())
            .map(|t| truncate_chars(&t, EXTRACT_REQUEST_CHARS, "..."))
            .collect();

        let mut parts = Vec::new();
        if let Some(prior) = request.prior_summary.as_deref().map(str::trim) {
            if !prior.is_empty() {
                parts.push(prior.to_owned());
            }
        }
        if requests.is_empty() {
            parts.push(format!("({} messages summarized)", request.messages.len()));
        } else {
            parts.push(format!("The user made {} requests.", requests.len()));
            parts.push(format!("Key requests: {}", requests.join("; ")));
        }
        Ok(parts.join(" "))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
