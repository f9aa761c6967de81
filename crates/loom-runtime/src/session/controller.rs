//! Session controller: every mutation and read the UI performs.
//!
//! A mutation follows the same steps everywhere:
//!
//! 1. validate (errors leave the store untouched)
//! 2. take the session's write lock and write to the store
//! 3. update branch selection in memory, only once the write succeeded
//! 4. schedule background compaction for message changes
//! 5. publish exactly one refresh event
//!
//! The repository has no transactions. Where a mutation touches two rows
//! the session row is written first and restored if the message write
//! fails.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use loom_core::errors::{LoomError, Result, ValidationError};
use loom_core::ids::{MessageId, ProjectId, SessionId};
use loom_core::memory::{MemoryRecord, SessionMemory};
use loom_core::message::Message;
use loom_core::session::{Project, Session, SessionStatus};
use loom_core::text::derive_title;
use loom_events::{EventBus, EventKind, EventSource};
use loom_settings::LoomSettings;
use loom_store::{ConversationRepository, MessageStore};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use super::locks::SessionLocks;
use super::types::{DeleteMode, NewMessage};
use crate::branch::{BranchSelections, Segment, active_path, resolve_with};
use crate::compaction::{MemoryCompactor, SummaryProvider};

/// Title used when nothing usable can be derived.
const UNTITLED: &str = "New conversation";

/// Owns session lifecycle, branching and the mutation → event pipeline.
pub struct SessionController {
    repo: Arc<dyn ConversationRepository>,
    store: MessageStore,
    bus: Arc<EventBus>,
    locks: Arc<SessionLocks>,
    selections: Arc<BranchSelections>,
    compactor: Arc<MemoryCompactor>,
    title_max_chars: usize,
    model: RwLock<String>,
}

impl SessionController {
    /// Wire a controller over a repository, summary provider and bus.
    pub fn new(
        repo: Arc<dyn ConversationRepository>,
        provider: Arc<dyn SummaryProvider>,
        bus: Arc<EventBus>,
        settings: &LoomSettings,
    ) -> Self {
        let locks = Arc::new(SessionLocks::new());
        let selections = Arc::new(BranchSelections::new());
        let compactor = Arc::new(MemoryCompactor::new(
            Arc::clone(&repo),
            provider,
            Arc::clone(&bus),
            Arc::clone(&locks),
            Arc::clone(&selections),
            &settings.compaction,
        ));
        Self {
            store: MessageStore::new(Arc::clone(&repo)),
            repo,
            bus,
            locks,
            selections,
            compactor,
            title_max_chars: settings.session.title_max_chars,
            model: RwLock::new(settings.models.default_model.clone()),
        }
    }

    /// Bus this controller publishes on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Background compactor.
    pub fn compactor(&self) -> &Arc<MemoryCompactor> {
        &self.compactor
    }

    // ── Messages ────────────────────────────────────────────────────

    /// Append a message, creating the session if `session_id` is `None`.
    ///
    /// Without an explicit parent the message continues the active leaf.
    /// With one, the new message also becomes the active branch.
    #[instrument(skip_all, fields(session_id = ?new.session_id, role = ?new.role))]
    pub async fn append_message(&self, new: NewMessage) -> Result<Message> {
        if new.content.trim().is_empty() && new.attachments.is_empty() {
            return Err(ValidationError::EmptyContent("message content").into());
        }

        let session_id = new.session_id.clone().unwrap_or_default();
        let _guard = self.locks.lock(&session_id).await;

        let (previous, session, mut messages) = match &new.session_id {
            None => {
                let session = self.session_for_first_message(&session_id, &new).await?;
                (None, session, Vec::new())
            }
            Some(_) => {
                let session = self.open_session(&session_id).await?;
                let messages = self.store.messages(&session_id).await?;
                (Some(session.clone()), session, messages)
            }
        };

        let explicit_parent = new.parent_id.is_some();
        let parent_id = match new.parent_id {
            Some(parent_id) => {
                self.check_parent(&session_id, &parent_id).await?;
                Some(parent_id)
            }
            None => active_path(&messages, &self.selections.get(&session_id))
                .last()
                .map(|leaf| leaf.id.clone()),
        };

        let message = Message::new(session_id.clone(), parent_id, new.role, new.content)
            .with_attachments(new.attachments)
            .with_created_at(next_timestamp(&messages));

        let mut updated = session;
        updated.touch();
        if updated.status == SessionStatus::Created {
            updated.status = SessionStatus::Active;
        }
        let message = self.write_message(previous.as_ref(), &updated, message).await?;

        messages.push(message.clone());
        if explicit_parent {
            let _ = self.activate(&session_id, &messages, &message.id);
        }
        self.after_message_change(&session_id);
        debug!(message_id = %message.id, "message appended");
        Ok(message)
    }

    /// Fork `message_id` into a sibling carrying `content`.
    ///
    /// The original and its subtree stay in the store and become an
    /// outdated branch.
    #[instrument(skip(self, content), fields(message_id = %message_id))]
    pub async fn edit_message(&self, message_id: &MessageId, content: impl Into<String>) -> Result<Message> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent("message content").into());
        }
        let original = self.store.require(message_id).await?;
        let mut fork = Message::new(
            original.session_id.clone(),
            original.parent_id.clone(),
            original.role,
            content,
        )
        .with_attachments(original.attachments.clone());
        fork.edited_at = Some(Utc::now());
        self.fork(fork).await
    }

    /// Resend a failed message as a fresh sibling with the same content.
    #[instrument(skip(self), fields(message_id = %message_id))]
    pub async fn retry_failed_message(&self, message_id: &MessageId) -> Result<Message> {
        let original = self.store.require(message_id).await?;
        if !original.failed {
            return Err(ValidationError::NotFailed(message_id.clone()).into());
        }
        let fork = Message::new(
            original.session_id.clone(),
            original.parent_id.clone(),
            original.role,
            original.content.clone(),
        )
        .with_attachments(original.attachments.clone());
        self.fork(fork).await
    }

    /// Flag a message whose delivery failed. Its content is kept for retry.
    #[instrument(skip(self), fields(message_id = %message_id))]
    pub async fn mark_message_failed(&self, message_id: &MessageId) -> Result<Message> {
        let original = self.store.require(message_id).await?;
        let session_id = original.session_id.clone();
        let _guard = self.locks.lock(&session_id).await;
        let _ = self.open_session(&session_id).await?;

        let mut message = self.store.require(message_id).await?;
        if message.failed {
            return Ok(message);
        }
        message.failed = true;
        self.store.update(&message).await?;

        self.publish_session_updated(&session_id);
        Ok(message)
    }

    /// Make the branch through `message_id` the active one.
    #[instrument(skip(self), fields(message_id = %message_id))]
    pub async fn activate_branch(&self, message_id: &MessageId) -> Result<()> {
        let target = self.store.require(message_id).await?;
        let session_id = target.session_id;
        let _guard = self.locks.lock(&session_id).await;
        let _ = self.open_session(&session_id).await?;

        let messages = self.store.messages(&session_id).await?;
        if !self.activate(&session_id, &messages, message_id) {
            return Err(ValidationError::Unreachable(message_id.clone()).into());
        }
        self.after_message_change(&session_id);
        Ok(())
    }

    // ── Sessions ────────────────────────────────────────────────────

    /// Create an empty session.
    #[instrument(skip_all)]
    pub async fn create_session(&self, title: impl Into<String>) -> Result<Session> {
        let title = title.into();
        let title = match title.trim() {
            "" => UNTITLED.to_owned(),
            t => t.to_owned(),
        };
        let session = Session::new(title);
        self.repo.create_session(&session).await?;
        info!(session_id = %session.id, "session created");
        self.publish_sessions_refresh();
        Ok(session)
    }

    /// Star or unstar a session.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn star_session(&self, session_id: &SessionId, starred: bool) -> Result<Session> {
        self.update_open_session(session_id, |s| s.starred = starred)
            .await
    }

    /// Rename a session.
    #[instrument(skip(self, title), fields(session_id = %session_id))]
    pub async fn rename_session(&self, session_id: &SessionId, title: impl Into<String>) -> Result<Session> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(ValidationError::EmptyContent("session title").into());
        }
        self.update_open_session(session_id, |s| s.title = title)
            .await
    }

    /// Move a session into a project, or out of any with `None`.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn move_to_project(
        &self,
        session_id: &SessionId,
        project_id: Option<ProjectId>,
    ) -> Result<Session> {
        if let Some(project_id) = &project_id {
            let _ = self.require_project(project_id).await?;
        }
        let _guard = self.locks.lock(session_id).await;
        let session = self.open_session(session_id).await?;

        let previous_project_id = session.project_id.clone();
        self.repo
            .update_session_project(session_id, project_id.as_ref())
            .await?;

        let _ = self.bus.emit(
            EventSource::User,
            EventKind::ProjectUpdated {
                session_id: session_id.clone(),
                project_id: project_id.clone(),
                previous_project_id,
            },
        );
        Ok(Session {
            project_id,
            ..session
        })
    }

    /// Delete a session.
    ///
    /// `Soft` marks it `Deleted` and keeps every row. `Hard` removes its
    /// messages, memory record and session row. Deleting an already
    /// soft-deleted session is allowed.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn delete_session(&self, session_id: &SessionId, mode: DeleteMode) -> Result<()> {
        let guard = self.locks.lock(session_id).await;
        let session = self.require_session(session_id).await?;

        match mode {
            DeleteMode::Soft if session.status == SessionStatus::Deleted => {
                debug!("session already deleted");
            }
            DeleteMode::Soft => {
                let mut deleted = session;
                deleted.status = SessionStatus::Deleted;
                deleted.touch();
                self.repo.update_session(&deleted).await?;
            }
            DeleteMode::Hard => {
                let removed = self.purge_session(session_id).await?;
                debug!(messages = removed, "session rows removed");
            }
        }

        self.selections.remove(session_id);
        drop(guard);
        if mode == DeleteMode::Hard {
            self.locks.remove(session_id);
        }
        info!(?mode, "session deleted");
        self.publish_sessions_refresh();
        Ok(())
    }

    /// Hide a session from the main list. Archived sessions are read-only.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn archive_session(&self, session_id: &SessionId) -> Result<Session> {
        self.update_open_session(session_id, |s| s.status = SessionStatus::Archived)
            .await
    }

    /// Bring an archived session back. A session that is not archived is
    /// returned unchanged.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn unarchive_session(&self, session_id: &SessionId) -> Result<Session> {
        let _guard = self.locks.lock(session_id).await;
        let session = self.require_session(session_id).await?;
        match session.status {
            SessionStatus::Archived => {}
            SessionStatus::Deleted => return Err(closed(&session)),
            SessionStatus::Created | SessionStatus::Active => return Ok(session),
        }

        let mut updated = session;
        updated.status = SessionStatus::Active;
        updated.touch();
        self.repo.update_session(&updated).await?;
        self.publish_sessions_refresh();
        Ok(updated)
    }

    // ── Projects ────────────────────────────────────────────────────

    /// Create a project.
    #[instrument(skip_all)]
    pub async fn create_project(&self, name: impl Into<String>) -> Result<Project> {
        let name = non_empty(name.into(), "project name")?;
        let project = Project::new(name);
        self.repo.create_project(&project).await?;
        self.publish_projects_refresh();
        Ok(project)
    }

    /// Rename a project.
    #[instrument(skip(self, name), fields(project_id = %project_id))]
    pub async fn rename_project(&self, project_id: &ProjectId, name: impl Into<String>) -> Result<Project> {
        let name = non_empty(name.into(), "project name")?;
        let mut project = self.require_project(project_id).await?;
        project.name = name;
        self.repo.update_project(&project).await?;
        self.publish_projects_refresh();
        Ok(project)
    }

    /// Delete a project. Its sessions stay, without a project.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn delete_project(&self, project_id: &ProjectId) -> Result<()> {
        let _ = self.require_project(project_id).await?;
        let detached = self.repo.clear_project(project_id).await?;
        let _ = self.repo.delete_project(project_id).await?;
        info!(detached, "project deleted");
        self.publish_projects_refresh();
        Ok(())
    }

    // ── Model ───────────────────────────────────────────────────────

    /// Switch the active model.
    #[instrument(skip(self))]
    pub fn set_model(&self, model: &str) -> Result<()> {
        let model = non_empty(model.to_owned(), "model")?;
        *self.model.write() = model.clone();
        let _ = self
            .bus
            .emit(EventSource::User, EventKind::ModelChanged { model });
        Ok(())
    }

    /// Active model.
    pub fn current_model(&self) -> String {
        self.model.read().clone()
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// Active messages and outdated branches of a session.
    pub async fn current_segments(&self, session_id: &SessionId) -> Result<Vec<Segment>> {
        let _ = self.require_session(session_id).await?;
        let messages = self.store.messages(session_id).await?;
        Ok(resolve_with(&messages, &self.selections.get(session_id)))
    }

    /// Summary plus raw window of a session.
    pub async fn session_memory(&self, session_id: &SessionId) -> Result<SessionMemory> {
        let _ = self.require_session(session_id).await?;
        self.compactor.memory(session_id).await
    }

    /// One session, in any state.
    pub async fn session(&self, session_id: &SessionId) -> Result<Session> {
        self.require_session(session_id).await
    }

    /// Every session not deleted, most recently updated first.
    pub async fn sessions(&self) -> Result<Vec<Session>> {
        Ok(self
            .repo
            .list_sessions()
            .await?
            .into_iter()
            .filter(|s| s.status != SessionStatus::Deleted)
            .collect())
    }

    /// Every project, oldest first.
    pub async fn projects(&self) -> Result<Vec<Project>> {
        Ok(self.repo.get_all_projects().await?)
    }

    /// Stop background compaction and wait for it.
    pub async fn shutdown(&self) {
        self.compactor.shutdown().await;
    }

    // ── Helpers ─────────────────────────────────────────────────────

    async fn require_session(&self, session_id: &SessionId) -> Result<Session> {
        self.repo
            .get_session(session_id)
            .await?
            .ok_or_else(|| ValidationError::SessionNotFound(session_id.clone()).into())
    }

    async fn open_session(&self, session_id: &SessionId) -> Result<Session> {
        let session = self.require_session(session_id).await?;
        if session.status.is_closed() {
            return Err(closed(&session));
        }
        Ok(session)
    }

    async fn require_project(&self, project_id: &ProjectId) -> Result<Project> {
        self.repo
            .get_project(project_id)
            .await?
            .ok_or_else(|| ValidationError::ProjectNotFound(project_id.clone()).into())
    }

    async fn check_parent(&self, session_id: &SessionId, parent_id: &MessageId) -> Result<()> {
        let parent = self
            .store
            .get(parent_id)
            .await?
            .ok_or_else(|| ValidationError::ParentNotFound(parent_id.clone()))?;
        if &parent.session_id != session_id {
            return Err(ValidationError::ParentSessionMismatch {
                parent_id: parent_id.clone(),
                expected: session_id.clone(),
                actual: parent.session_id,
            }
            .into());
        }
        Ok(())
    }

    /// Build the session a first message will create. Nothing is written.
    async fn session_for_first_message(&self, session_id: &SessionId, new: &NewMessage) -> Result<Session> {
        let mut session = Session::new(UNTITLED).with_id(session_id.clone());
        if let Some(parent_id) = &new.parent_id {
            self.check_parent(&session.id, parent_id).await?;
        }
        let title = derive_title(&new.content, self.title_max_chars);
        if !title.is_empty() {
            session.title = title;
        }
        Ok(session)
    }

    /// Write the session row, then the message. Undo the session row if
    /// the message write fails.
    async fn write_message(
        &self,
        previous: Option<&Session>,
        updated: &Session,
        message: Message,
    ) -> Result<Message> {
        match previous {
            None => self.repo.create_session(updated).await?,
            Some(_) => self.repo.update_session(updated).await?,
        }

        match self.store.append(message).await {
            Ok(message) => Ok(message),
            Err(error) => {
                let undo = match previous {
                    None => self.repo.delete_session(&updated.id).await.map(|_| ()),
                    Some(previous) => self.repo.update_session(previous).await,
                };
                if let Err(undo_error) = undo {
                    warn!(session_id = %updated.id, %undo_error, "failed to restore session row");
                }
                Err(error)
            }
        }
    }

    /// Remove the memory record, messages and row of a session.
    ///
    /// Rows already removed are written back if a later step fails, so the
    /// session is either fully gone or untouched.
    async fn purge_session(&self, session_id: &SessionId) -> Result<usize> {
        let messages = self.store.messages(session_id).await?;
        let memory = self.repo.get_session_memory(session_id).await?;

        self.repo.delete_session_memory(session_id).await?;
        let removed = match self.store.delete_session_messages(session_id).await {
            Ok(removed) => removed,
            Err(error) => {
                self.restore_rows(session_id, memory.as_ref(), &[]).await;
                return Err(error);
            }
        };
        if let Err(error) = self.repo.delete_session(session_id).await {
            self.restore_rows(session_id, memory.as_ref(), &messages).await;
            return Err(error.into());
        }
        Ok(removed)
    }

    async fn restore_rows(&self, session_id: &SessionId, memory: Option<&MemoryRecord>, messages: &[Message]) {
        for message in messages {
            if let Err(undo_error) = self.repo.create_message(message).await {
                warn!(session_id = %session_id, message_id = %message.id, %undo_error, "failed to restore message");
            }
        }
        if let Some(record) = memory {
            if let Err(undo_error) = self.repo.save_session_memory(record).await {
                warn!(session_id = %session_id, %undo_error, "failed to restore memory record");
            }
        }
    }

    /// Append `fork` as a new active sibling.
    async fn fork(&self, fork: Message) -> Result<Message> {
        let session_id = fork.session_id.clone();
        let _guard = self.locks.lock(&session_id).await;
        let session = self.open_session(&session_id).await?;

        let mut messages = self.store.messages(&session_id).await?;
        let fork = fork.with_created_at(next_timestamp(&messages));

        let mut updated = session.clone();
        updated.touch();
        let message = self.write_message(Some(&session), &updated, fork).await?;

        messages.push(message.clone());
        let _ = self.activate(&session_id, &messages, &message.id);
        self.after_message_change(&session_id);
        debug!(message_id = %message.id, parent_id = ?message.parent_id.as_deref(), "message forked");
        Ok(message)
    }

    async fn update_open_session(
        &self,
        session_id: &SessionId,
        apply: impl FnOnce(&mut Session),
    ) -> Result<Session> {
        let _guard = self.locks.lock(session_id).await;
        let mut session = self.open_session(session_id).await?;
        apply(&mut session);
        session.touch();
        self.repo.update_session(&session).await?;
        self.publish_sessions_refresh();
        Ok(session)
    }

    fn activate(&self, session_id: &SessionId, messages: &[Message], target: &MessageId) -> bool {
        let activated = self
            .selections
            .update(session_id, |s| s.activate(messages, target));
        if !activated {
            warn!(session_id = %session_id, message_id = %target, "message is not reachable from a root");
        }
        activated
    }

    fn after_message_change(&self, session_id: &SessionId) {
        let _ = self.compactor.schedule(session_id);
        self.publish_session_updated(session_id);
    }

    fn publish_session_updated(&self, session_id: &SessionId) {
        let _ = self.bus.emit(
            EventSource::User,
            EventKind::SessionUpdated {
                session_id: session_id.clone(),
            },
        );
    }

    fn publish_sessions_refresh(&self) {
        let _ = self.bus.emit(EventSource::User, EventKind::SessionsRefresh {});
    }

    fn publish_projects_refresh(&self) {
        let _ = self.bus.emit(EventSource::User, EventKind::ProjectsRefresh {});
    }
}

/// Strictly after every existing message, and never in the past.
fn next_timestamp(messages: &[Message]) -> DateTime<Utc> {
    let now = Utc::now();
    messages
        .iter()
        .map(|m| m.created_at + Duration::microseconds(1))
        .max()
        .map_or(now, |floor| floor.max(now))
}

fn closed(session: &Session) -> LoomError {
    ValidationError::SessionClosed {
        session_id: session.id.clone(),
        status: session.status.to_string(),
    }
    .into()
}

fn non_empty(value: String, what: &'static str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyContent(what).into());
    }
    Ok(trimmed.to_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
