//! Message store adapter.
//!
//! Thin wrapper over the repository that owns one rule: every non-root
//! message points at an existing parent in the same session. Everything
//! else (which branch is active, timestamps, lifecycle) is decided above.

use std::sync::Arc;

use loom_core::errors::{Result, ValidationError};
use loom_core::ids::{MessageId, SessionId};
use loom_core::message::Message;
use tracing::debug;

use crate::repository::ConversationRepository;

/// Append-only message log per session, addressable by id.
#[derive(Clone)]
pub struct MessageStore {
    repo: Arc<dyn ConversationRepository>,
}

impl MessageStore {
    /// Wrap a repository.
    pub fn new(repo: Arc<dyn ConversationRepository>) -> Self {
        Self { repo }
    }

    /// Underlying repository.
    pub fn repository(&self) -> &Arc<dyn ConversationRepository> {
        &self.repo
    }

    /// Append a message after checking its parent link.
    pub async fn append(&self, message: Message) -> Result<Message> {
        if let Some(parent_id) = &message.parent_id {
            let parent = self
                .repo
                .get_message(parent_id)
                .await?
                .ok_or_else(|| ValidationError::ParentNotFound(parent_id.clone()))?;
            if parent.session_id != message.session_id {
                return Err(ValidationError::ParentSessionMismatch {
                    parent_id: parent_id.clone(),
                    expected: message.session_id.clone(),
                    actual: parent.session_id,
                }
                .into());
            }
        }

        self.repo.create_message(&message).await?;
        debug!(
            session_id = %message.session_id,
            message_id = %message.id,
            parent_id = ?message.parent_id.as_deref(),
            "message appended"
        );
        Ok(message)
    }

    /// Fetch a message, if it exists.
    pub async fn get(&self, id: &MessageId) -> Result<Option<Message>> {
        Ok(self.repo.get_message(id).await?)
    }

    /// Fetch a message or fail with [`ValidationError::MessageNotFound`].
    pub async fn require(&self, id: &MessageId) -> Result<Message> {
        self.get(id)
            .await?
            .ok_or_else(|| ValidationError::MessageNotFound(id.clone()).into())
    }

    /// Every message of a session, in insertion order.
    pub async fn messages(&self, session_id: &SessionId) -> Result<Vec<Message>> {
        Ok(self.repo.get_messages_for_session(session_id).await?)
    }

    /// Direct children of `parent_id`, in insertion order.
    pub async fn children(&self, parent_id: &MessageId) -> Result<Vec<Message>> {
        let parent = self.require(parent_id).await?;
        Ok(self
            .messages(&parent.session_id)
            .await?
            .into_iter()
            .filter(|m| m.parent_id.as_ref() == Some(parent_id))
            .collect())
    }

    /// Overwrite an existing message. Id, session and parent cannot change.
    pub async fn update(&self, message: &Message) -> Result<()> {
        let current = self.require(&message.id).await?;
        debug_assert_eq!(current.session_id, message.session_id);
        debug_assert_eq!(current.parent_id, message.parent_id);
        self.repo.update_message(message).await?;
        Ok(())
    }

    /// Remove all of a session's messages. Returns the count.
    pub async fn delete_session_messages(&self, session_id: &SessionId) -> Result<usize> {
        Ok(self.repo.delete_messages_for_session(session_id).await?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRepository;
    use assert_matches::assert_matches;
    use loom_core::LoomError;
    use loom_core::message::Role;

    fn store() -> (Arc<InMemoryRepository>, MessageStore) {
        let repo = Arc::new(InMemoryRepository::new());
        let store = MessageStore::new(Arc::clone(&repo) as Arc<dyn ConversationRepository>);
        (repo, store)
    }

    fn msg(session: &str, id: &str, parent: Option<&str>) -> Message {
        Message::new(
            SessionId::from(session),
            parent.map(MessageId::from),
            Role::User,
            format!("content {id}"),
        )
        .with_id(id)
    }

    #[tokio::test]
    async fn append_root_and_child() {
        let (_, store) = store();
        let _ = store.append(msg("s", "a", None)).await.unwrap();
        let _ = store.append(msg("s", "b", Some("a"))).await.unwrap();
        assert_eq!(store.messages(&SessionId::from("s")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_parent_is_rejected_before_write() {
        let (repo, store) = store();
        let err = store.append(msg("s", "b", Some("ghost"))).await.unwrap_err();
        assert_matches!(
            err,
            LoomError::Validation(ValidationError::ParentNotFound(id)) if id.as_str() == "ghost"
        );
        assert_eq!(repo.write_count(), 0);
    }

    #[tokio::test]
    async fn cross_session_parent_is_rejected() {
        let (_, store) = store();
        let _ = store.append(msg("s1", "a", None)).await.unwrap();
        let err = store.append(msg("s2", "b", Some("a"))).await.unwrap_err();
        assert_matches!(
            err,
            LoomError::Validation(ValidationError::ParentSessionMismatch { .. })
        );
    }

    #[tokio::test]
    async fn require_unknown_message() {
        let (_, store) = store();
        let err = store.require(&MessageId::from("nope")).await.unwrap_err();
        assert_matches!(err, LoomError::Validation(ValidationError::MessageNotFound(_)));
    }

    #[tokio::test]
    async fn children_lists_forks() {
        let (_, store) = store();
        let _ = store.append(msg("s", "a", None)).await.unwrap();
        let _ = store.append(msg("s", "b", Some("a"))).await.unwrap();
        let _ = store.append(msg("s", "b2", Some("a"))).await.unwrap();
        let _ = store.append(msg("s", "c", Some("b"))).await.unwrap();

        let kids: Vec<String> = store
            .children(&MessageId::from("a"))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id.into_inner())
            .collect();
        assert_eq!(kids, ["b", "b2"]);
    }

    #[tokio::test]
    async fn update_marks_failed() {
        let (_, store) = store();
        let mut m = store.append(msg("s", "a", None)).await.unwrap();
        m.failed = true;
        store.update(&m).await.unwrap();
        assert!(store.require(&m.id).await.unwrap().failed);
    }

    #[tokio::test]
    async fn persistence_failure_surfaces() {
        let (repo, store) = store();
        repo.set_fail_writes(true);
        let err = store.append(msg("s", "a", None)).await.unwrap_err();
        assert_matches!(err, LoomError::Persistence(_));
    }
}
