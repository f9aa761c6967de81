//! Persistence collaborator seam.
//!
//! The repository is plain CRUD by id. It enforces nothing beyond "the row
//! exists" for updates; referential rules live in
//! [`MessageStore`](crate::MessageStore) and the runtime controller.

use async_trait::async_trait;
use loom_core::errors::PersistenceError;
use loom_core::ids::{MessageId, ProjectId, SessionId};
use loom_core::memory::MemoryRecord;
use loom_core::message::Message;
use loom_core::session::{Project, Session};

/// Result alias for repository calls.
pub type StoreResult<T> = std::result::Result<T, PersistenceError>;

/// Durable storage for sessions, messages, projects and memory records.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    // ── Sessions ────────────────────────────────────────────────────

    /// Insert a new session row.
    async fn create_session(&self, session: &Session) -> StoreResult<()>;

    /// Fetch a session by id.
    async fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>>;

    /// Overwrite an existing session row.
    async fn update_session(&self, session: &Session) -> StoreResult<()>;

    /// Remove a session row. Returns whether it existed.
    async fn delete_session(&self, id: &SessionId) -> StoreResult<bool>;

    /// All sessions, most recently updated first.
    async fn list_sessions(&self) -> StoreResult<Vec<Session>>;

    /// Set or clear a session's project.
    async fn update_session_project(
        &self,
        id: &SessionId,
        project_id: Option<&ProjectId>,
    ) -> StoreResult<()>;

    // ── Messages ────────────────────────────────────────────────────

    /// Insert a message row.
    async fn create_message(&self, message: &Message) -> StoreResult<()>;

    /// Fetch a message by id.
    async fn get_message(&self, id: &MessageId) -> StoreResult<Option<Message>>;

    /// All messages of a session in insertion order.
    async fn get_messages_for_session(&self, id: &SessionId) -> StoreResult<Vec<Message>>;

    /// Overwrite an existing message row.
    async fn update_message(&self, message: &Message) -> StoreResult<()>;

    /// Remove every message of a session. Returns how many were removed.
    async fn delete_messages_for_session(&self, id: &SessionId) -> StoreResult<usize>;

    // ── Projects ────────────────────────────────────────────────────

    /// Insert a project row.
    async fn create_project(&self, project: &Project) -> StoreResult<()>;

    /// Fetch a project by id.
    async fn get_project(&self, id: &ProjectId) -> StoreResult<Option<Project>>;

    /// All projects, oldest first.
    async fn get_all_projects(&self) -> StoreResult<Vec<Project>>;

    /// Overwrite an existing project row.
    async fn update_project(&self, project: &Project) -> StoreResult<()>;

    /// Remove a project row. Returns whether it existed.
    async fn delete_project(&self, id: &ProjectId) -> StoreResult<bool>;

    /// Clear `project_id` on every session in a project. Returns the count.
    async fn clear_project(&self, id: &ProjectId) -> StoreResult<usize>;

    // ── Memory ──────────────────────────────────────────────────────

    /// Fetch a session's memory record.
    async fn get_session_memory(&self, id: &SessionId) -> StoreResult<Option<MemoryRecord>>;

    /// Insert or replace a session's memory record.
    async fn save_session_memory(&self, record: &MemoryRecord) -> StoreResult<()>;

    /// Remove a session's memory record.
    async fn delete_session_memory(&self, id: &SessionId) -> StoreResult<()>;
}
