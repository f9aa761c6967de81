//! Request types for [`SessionController`](super::SessionController).

use loom_core::ids::{MessageId, SessionId};
use loom_core::message::{Attachment, Role};
use serde::{Deserialize, Serialize};

/// A message to append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    /// Target session. `None` starts a new session titled from the content.
    pub session_id: Option<SessionId>,
    /// Parent message. `None` continues from the active leaf.
    pub parent_id: Option<MessageId>,
    /// Author.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Attached files.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl NewMessage {
    /// A user message that starts a new session.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// An assistant message that starts a new session.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            session_id: None,
            parent_id: None,
            role,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    /// Append to an existing session.
    #[must_use]
    pub fn in_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach under a specific parent instead of the active leaf.
    #[must_use]
    pub fn with_parent(mut self, parent_id: MessageId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Attach files.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// How [`delete_session`](super::SessionController::delete_session) removes
/// a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Mark the session `Deleted`; rows stay.
    #[default]
    Soft,
    /// Remove the session, its messages and its memory record.
    Hard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_compose() {
        let m = NewMessage::assistant("hi")
            .in_session(SessionId::from("s"))
            .with_parent(MessageId::from("p"));
        assert_eq!(m.role, Role::Assistant);
        assert_eq!(m.session_id.as_deref(), Some("s"));
        assert_eq!(m.parent_id.as_deref(), Some("p"));
        assert!(m.attachments.is_empty());
    }

    #[test]
    fn deserializes_without_attachments() {
        let m: NewMessage =
            serde_json::from_str(r#"{"sessionId":null,"parentId":null,"role":"user","content":"x"}"#)
                .unwrap();
        assert_eq!(m, NewMessage::user("x"));
    }

    #[test]
    fn delete_mode_defaults_to_soft() {
        assert_eq!(DeleteMode::default(), DeleteMode::Soft);
    }
}
