//! In-process repository.
//!
//! Reference [`ConversationRepository`] used by tests and by embedders that
//! keep history in memory. Reads and writes can be switched to fail so the
//! error paths of callers are testable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use loom_core::errors::{PersistenceError, PersistenceOperation};
use loom_core::ids::{MessageId, ProjectId, SessionId};
use loom_core::memory::MemoryRecord;
use loom_core::message::Message;
use loom_core::session::{Project, Session};
use parking_lot::{Mutex, RwLock};

use crate::repository::{ConversationRepository, StoreResult};

#[derive(Default)]
struct Tables {
    sessions: HashMap<SessionId, Session>,
    messages: HashMap<MessageId, Message>,
    /// Message ids per session in insertion order.
    session_messages: HashMap<SessionId, Vec<MessageId>>,
    projects: HashMap<ProjectId, Project>,
    memory: HashMap<SessionId, MemoryRecord>,
}

/// Repository backed by in-memory hash maps.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    /// Tables whose writes fail regardless of `fail_writes`.
    failing_tables: Mutex<HashSet<&'static str>>,
    writes: AtomicU64,
}

impl InMemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make writes to one table (`sessions`, `messages`, `projects`,
    /// `session_memory`) fail, or succeed again.
    pub fn set_fail_writes_to(&self, table: &'static str, fail: bool) {
        let mut failing = self.failing_tables.lock();
        if fail {
            let _ = failing.insert(table);
        } else {
            let _ = failing.remove(table);
        }
    }

    /// Make every subsequent read fail (or succeed again).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_read(&self, table: &str) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PersistenceError::new(
                table,
                PersistenceOperation::Read,
                "store unavailable",
            ));
        }
        Ok(())
    }

    fn check_write(&self, table: &str, operation: PersistenceOperation) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) || self.failing_tables.lock().contains(table) {
            return Err(PersistenceError::new(table, operation, "store unavailable"));
        }
        Ok(())
    }

    fn wrote(&self) {
        let _ = self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn missing(table: &str, id: &str) -> PersistenceError {
    PersistenceError::new(table, PersistenceOperation::Write, format!("no row with id {id}"))
}

fn duplicate(table: &str, id: &str) -> PersistenceError {
    PersistenceError::new(table, PersistenceOperation::Write, format!("duplicate id {id}"))
}

#[async_trait]
impl ConversationRepository for InMemoryRepository {
    // ── Sessions ────────────────────────────────────────────────────

    async fn create_session(&self, session: &Session) -> StoreResult<()> {
        self.check_write("sessions", PersistenceOperation::Write)?;
        let mut t = self.tables.write();
        if t.sessions.contains_key(&session.id) {
            return Err(duplicate("sessions", &session.id));
        }
        let _ = t.sessions.insert(session.id.clone(), session.clone());
        drop(t);
        self.wrote();
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        self.check_read("sessions")?;
        Ok(self.tables.read().sessions.get(id).cloned())
    }

    async fn update_session(&self, session: &Session) -> StoreResult<()> {
        self.check_write("sessions", PersistenceOperation::Write)?;
        let mut t = self.tables.write();
        let row = t
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| missing("sessions", &session.id))?;
        *row = session.clone();
        drop(t);
        self.wrote();
        Ok(())
    }

    async fn delete_session(&self, id: &SessionId) -> StoreResult<bool> {
        self.check_write("sessions", PersistenceOperation::Delete)?;
        let existed = self.tables.write().sessions.remove(id).is_some();
        self.wrote();
        Ok(existed)
    }

    async fn list_sessions(&self) -> StoreResult<Vec<Session>> {
        self.check_read("sessions")?;
        let mut out: Vec<Session> = self.tables.read().sessions.values().cloned().collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn update_session_project(
        &self,
        id: &SessionId,
        project_id: Option<&ProjectId>,
    ) -> StoreResult<()> {
        self.check_write("sessions", PersistenceOperation::Write)?;
        let mut t = self.tables.write();
        let row = t.sessions.get_mut(id).ok_or_else(|| missing("sessions", id))?;
        row.project_id = project_id.cloned();
        drop(t);
        self.wrote();
        Ok(())
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn create_message(&self, message: &Message) -> StoreResult<()> {
        self.check_write("messages", PersistenceOperation::Write)?;
        let mut t = self.tables.write();
        if t.messages.contains_key(&message.id) {
            return Err(duplicate("messages", &message.id));
        }
        let _ = t.messages.insert(message.id.clone(), message.clone());
        t.session_messages
            .entry(message.session_id.clone())
            .or_default()
            .push(message.id.clone());
        drop(t);
        self.wrote();
        Ok(())
    }

    async fn get_message(&self, id: &MessageId) -> StoreResult<Option<Message>> {
        self.check_read("messages")?;
        Ok(self.tables.read().messages.get(id).cloned())
    }

    async fn get_messages_for_session(&self, id: &SessionId) -> StoreResult<Vec<Message>> {
        self.check_read("messages")?;
        let t = self.tables.read();
        let Some(ids) = t.session_messages.get(id) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|m| t.messages.get(m).cloned()).collect())
    }

    async fn update_message(&self, message: &Message) -> StoreResult<()> {
        self.check_write("messages", PersistenceOperation::Write)?;
        let mut t = self.tables.write();
        let row = t
            .messages
            .get_mut(&message.id)
            .ok_or_else(|| missing("messages", &message.id))?;
        *row = message.clone();
        drop(t);
        self.wrote();
        Ok(())
    }

    async fn delete_messages_for_session(&self, id: &SessionId) -> StoreResult<usize> {
        self.check_write("messages", PersistenceOperation::Delete)?;
        let mut t = self.tables.write();
        let ids = t.session_messages.remove(id).unwrap_or_default();
        for m in &ids {
            let _ = t.messages.remove(m);
        }
        drop(t);
        self.wrote();
        Ok(ids.len())
    }

    // ── Projects ────────────────────────────────────────────────────

    async fn create_project(&self, project: &Project) -> StoreResult<()> {
        self.check_write("projects", PersistenceOperation::Write)?;
        let mut t = self.tables.write();
        if t.projects.contains_key(&project.id) {
            return Err(duplicate("projects", &project.id));
        }
        let _ = t.projects.insert(project.id.clone(), project.clone());
        drop(t);
        self.wrote();
        Ok(())
    }

    async fn get_project(&self, id: &ProjectId) -> StoreResult<Option<Project>> {
        self.check_read("projects")?;
        Ok(self.tables.read().projects.get(id).cloned())
    }

    async fn get_all_projects(&self) -> StoreResult<Vec<Project>> {
        self.check_read("projects")?;
        let mut out: Vec<Project> = self.tables.read().projects.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn update_project(&self, project: &Project) -> StoreResult<()> {
        self.check_write("projects", PersistenceOperation::Write)?;
        let mut t = self.tables.write();
        let row = t
            .projects
            .get_mut(&project.id)
            .ok_or_else(|| missing("projects", &project.id))?;
        *row = project.clone();
        drop(t);
        self.wrote();
        Ok(())
    }

    async fn delete_project(&self, id: &ProjectId) -> StoreResult<bool> {
        self.check_write("projects", PersistenceOperation::Delete)?;
        let existed = self.tables.write().projects.remove(id).is_some();
        self.wrote();
        Ok(existed)
    }

    async fn clear_project(&self, id: &ProjectId) -> StoreResult<usize> {
        self.check_write("sessions", PersistenceOperation::Write)?;
        let mut t = self.tables.write();
        let mut cleared = 0;
        for session in t.sessions.values_mut() {
            if session.project_id.as_ref() == Some(id) {
                session.project_id = None;
                cleared += 1;
            }
        }
        drop(t);
        self.wrote();
        Ok(cleared)
    }

    // ── Memory ──────────────────────────────────────────────────────

    async fn get_session_memory(&self, id: &SessionId) -> StoreResult<Option<MemoryRecord>> {
        self.check_read("session_memory")?;
        Ok(self.tables.read().memory.get(id).cloned())
    }

    async fn save_session_memory(&self, record: &MemoryRecord) -> StoreResult<()> {
        self.check_write("session_memory", PersistenceOperation::Write)?;
        let _ = self
            .tables
            .write()
            .memory
            .insert(record.session_id.clone(), record.clone());
        self.wrote();
        Ok(())
    }

    async fn delete_session_memory(&self, id: &SessionId) -> StoreResult<()> {
        self.check_write("session_memory", PersistenceOperation::Delete)?;
        let _ = self.tables.write().memory.remove(id);
        self.wrote();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
