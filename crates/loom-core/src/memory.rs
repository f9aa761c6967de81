//! Rolling conversation memory.
//!
//! Only the [`MemoryRecord`] is persisted. [`SessionMemory`] is projected
//! from the record and the session's current active path every time it is
//! read, so the raw window always reflects the live history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, SessionId};
use crate::message::Message;

/// Persisted compaction state for one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Session this record belongs to.
    pub session_id: SessionId,
    /// Rolling summary produced by the provider.
    pub summary: String,
    /// Last message folded into `summary`.
    pub last_compacted_message_id: MessageId,
    /// Number of successful compactions.
    pub compaction_count: u32,
    /// Time of the last successful compaction.
    pub updated_at: DateTime<Utc>,
}

/// Memory view of a session: summary plus the messages kept verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMemory {
    /// Session this memory belongs to.
    pub session_id: SessionId,
    /// Rolling summary, if any compaction still applies.
    pub summary: Option<String>,
    /// Active-path messages after `last_compacted_message_id`, in order.
    pub raw_window: Vec<Message>,
    /// Last folded message, if any compaction still applies.
    pub last_compacted_message_id: Option<MessageId>,
    /// Successful compactions so far, including stale ones.
    pub compaction_count: u32,
    /// Time of the last successful compaction.
    pub updated_at: Option<DateTime<Utc>>,
    /// The stored summary covers messages no longer on the active path.
    #[serde(default)]
    pub stale: bool,
}

impl SessionMemory {
    /// Project memory from a stored record and the current active path.
    ///
    /// When the record's `last_compacted_message_id` is not on the path the
    /// summary no longer describes this branch: it is dropped and the whole
    /// path becomes the window.
    #[must_use]
    pub fn project(
        session_id: &SessionId,
        record: Option<&MemoryRecord>,
        active_path: &[Message],
    ) -> Self {
        let Some(record) = record else {
            return Self::empty(session_id, active_path);
        };

        let cut = active_path
            .iter()
            .position(|m| m.id == record.last_compacted_message_id);

        match cut {
            Some(idx) => Self {
                session_id: session_id.clone(),
                summary: Some(record.summary.clone()),
                raw_window: active_path[idx + 1..].to_vec(),
                last_compacted_message_id: Some(record.last_compacted_message_id.clone()),
                compaction_count: record.compaction_count,
                updated_at: Some(record.updated_at),
                stale: false,
            },
            None => Self {
                compaction_count: record.compaction_count,
                updated_at: Some(record.updated_at),
                stale: true,
                ..Self::empty(session_id, active_path)
            },
        }
    }

    fn empty(session_id: &SessionId, active_path: &[Message]) -> Self {
        Self {
            session_id: session_id.clone(),
            summary: None,
            raw_window: active_path.to_vec(),
            last_compacted_message_id: None,
            compaction_count: 0,
            updated_at: None,
            stale: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
