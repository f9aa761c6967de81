//! Chat message types.
//!
//! A [`Message`] is one node of a session's message tree. Parent links are
//! stored as ids, never as references, so a session's history is an arena
//! keyed by [`MessageId`] and the tree is rebuilt on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, SessionId};

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Written by the person using the client.
    User,
    /// Produced by the model.
    Assistant,
}

impl Role {
    /// Uppercase label used in transcripts (`USER` / `ASSISTANT`).
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
        }
    }
}

/// A file reference attached to a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Display name.
    pub name: String,
    /// Location of the file (path or URI).
    pub path: String,
    /// MIME type, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Attachment {
    /// Create an attachment without a MIME type.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            mime_type: None,
        }
    }
}

/// A single chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID.
    pub id: MessageId,
    /// Session this message belongs to.
    pub session_id: SessionId,
    /// Parent message (`None` only for a root message).
    pub parent_id: Option<MessageId>,
    /// Author.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Ordered file references.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Creation time. Later siblings win the active branch.
    pub created_at: DateTime<Utc>,
    /// Set when the message is the product of an edit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    /// Whether sending or generating this message failed.
    #[serde(default)]
    pub failed: bool,
}

impl Message {
    /// Create a message with a fresh id and the current time.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        parent_id: Option<MessageId>,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            parent_id,
            role,
            content: content.into(),
            attachments: Vec::new(),
            created_at: Utc::now(),
            edited_at: None,
            failed: false,
        }
    }

    /// Replace the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Replace the attachments.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Replace the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }

    /// Whether this message starts a tree (has no parent).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Sort key used to pick the active child: creation time, then id.
    #[must_use]
    pub fn recency_key(&self) -> (DateTime<Utc>, &MessageId) {
        (self.created_at, &self.id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn new_message_defaults() {
        let m = Message::new(SessionId::from("s1"), None, Role::User, "hello");
        assert!(m.is_root());
        assert!(!m.failed);
        assert!(m.edited_at.is_none());
        assert!(m.attachments.is_empty());
        assert_eq!(m.content, "hello");
    }

    #[test]
    fn json_field_names_are_camel_case() {
        let m = Message::new(
            SessionId::from("s1"),
            Some(MessageId::from("p1")),
            Role::Assistant,
            "hi",
        )
        .with_id("m1")
        .with_attachments(vec![Attachment::new("a.txt", "/tmp/a.txt")]);
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["id"], "m1");
        assert_eq!(v["sessionId"], "s1");
        assert_eq!(v["parentId"], "p1");
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["attachments"][0]["name"], "a.txt");
        assert!(v.get("editedAt").is_none());
        assert!(v["attachments"][0].get("mimeType").is_none());
    }

    #[test]
    fn failed_defaults_to_false_when_missing() {
        let v = json!({
            "id": "m1",
            "sessionId": "s1",
            "parentId": null,
            "role": "user",
            "content": "x",
            "createdAt": "2026-01-15T12:00:00Z"
        });
        let m: Message = serde_json::from_value(v).unwrap();
        assert!(!m.failed);
        assert!(m.attachments.is_empty());
    }

    #[test]
    fn recency_key_breaks_ties_by_id() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let a = Message::new(SessionId::from("s"), None, Role::User, "a")
            .with_id("a")
            .with_created_at(t);
        let b = Message::new(SessionId::from("s"), None, Role::User, "b")
            .with_id("b")
            .with_created_at(t);
        assert!(a.recency_key() < b.recency_key());
    }

    #[test]
    fn role_labels() {
        assert_eq!(Role::User.label(), "USER");
        assert_eq!(Role::Assistant.label(), "ASSISTANT");
    }
}
