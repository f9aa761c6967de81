//! Rolling memory compactor.
//!
//! A compaction is planned without any lock, summarized without any lock,
//! and committed under the session's write lock after re-reading the
//! state it was planned against. Anything that moved in between (a newer
//! record, an edit that changed the window, a deletion) discards the
//! result.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use loom_core::errors::{LoomError, ProviderError, Result};
use loom_core::ids::{MessageId, SessionId};
use loom_core::memory::{MemoryRecord, SessionMemory};
use loom_core::message::Message;
use loom_core::session::SessionStatus;
use loom_events::{EventBus, EventKind, EventSource};
use loom_settings::CompactionSettings;
use loom_store::{ConversationRepository, MessageStore};
use metrics::counter;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::budget::Budget;
use super::summarizer::{SummaryProvider, SummaryRequest};
use crate::branch::{BranchSelections, active_path};
use crate::session::locks::SessionLocks;

/// State read for one session at one point in time.
struct Snapshot {
    record: Option<MemoryRecord>,
    path: Vec<Message>,
    memory: SessionMemory,
}

/// What a planned compaction will fold.
struct Plan {
    record: Option<MemoryRecord>,
    run: Vec<Message>,
    prior_summary: Option<String>,
}

/// Result of one attempt that did not error.
enum Attempt {
    Committed {
        memory: SessionMemory,
        last: MessageId,
        folded: usize,
    },
    Skipped,
    Discarded(&'static str),
}

/// Folds old messages of a session's active path into a rolling summary.
pub struct MemoryCompactor {
    repo: Arc<dyn ConversationRepository>,
    store: MessageStore,
    provider: Arc<dyn SummaryProvider>,
    bus: Arc<EventBus>,
    locks: Arc<SessionLocks>,
    selections: Arc<BranchSelections>,
    budget: Budget,
    enabled: bool,
    provider_timeout_ms: u64,
    /// Sessions with a run in progress; the flag asks for one more pass.
    in_flight: DashMap<SessionId, bool>,
    idle: Notify,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl MemoryCompactor {
    /// Create a compactor sharing the controller's locks and selections.
    pub fn new(
        repo: Arc<dyn ConversationRepository>,
        provider: Arc<dyn SummaryProvider>,
        bus: Arc<EventBus>,
        locks: Arc<SessionLocks>,
        selections: Arc<BranchSelections>,
        settings: &CompactionSettings,
    ) -> Self {
        Self {
            store: MessageStore::new(Arc::clone(&repo)),
            repo,
            provider,
            bus,
            locks,
            selections,
            budget: Budget::from_settings(settings),
            enabled: settings.enabled,
            provider_timeout_ms: settings.provider_timeout_ms,
            in_flight: DashMap::new(),
            idle: Notify::new(),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Budget in effect.
    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Current memory view of a session.
    pub async fn memory(&self, session_id: &SessionId) -> Result<SessionMemory> {
        Ok(self.snapshot(session_id).await?.memory)
    }

    /// Start a background compaction check for a session.
    ///
    /// Returns `false` if compaction is off, the compactor is shut down, or
    /// a run for this session is already in flight. In the last case that
    /// run makes one more pass before it exits.
    pub fn schedule(self: &Arc<Self>, session_id: &SessionId) -> bool {
        if !self.enabled || self.cancel.is_cancelled() {
            return false;
        }
        if !self.claim(session_id) {
            return false;
        }

        let this = Arc::clone(self);
        let session_id = session_id.clone();
        let cancel = self.cancel.clone();
        let _ = self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = this.in_flight.remove(&session_id);
                    this.idle.notify_waiters();
                }
                result = this.drive(&session_id) => {
                    if let Err(error) = result {
                        debug!(session_id = %session_id, %error, "background compaction ended with error");
                    }
                }
            }
        });
        true
    }

    /// Check a session and compact it now if it is over budget.
    ///
    /// Returns the new memory if a compaction was committed. If another run
    /// for the session is in flight this returns `Ok(None)` and that run
    /// picks the request up.
    pub async fn maybe_compact(&self, session_id: &SessionId) -> Result<Option<SessionMemory>> {
        if !self.enabled || !self.claim(session_id) {
            return Ok(None);
        }
        self.drive(session_id).await
    }

    /// Whether a run for `session_id` is in flight.
    pub fn is_running(&self, session_id: &SessionId) -> bool {
        self.in_flight.contains_key(session_id)
    }

    /// Wait until no run is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            let _ = notified.as_mut().enable();
            if self.in_flight.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Cancel background runs and wait for their tasks to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let _ = self.tracker.close();
        self.tracker.wait().await;
    }

    // ── Run loop ────────────────────────────────────────────────────

    /// Mark a session in flight, or request a rerun if it already is.
    fn claim(&self, session_id: &SessionId) -> bool {
        match self.in_flight.entry(session_id.clone()) {
            Entry::Occupied(mut entry) => {
                let _ = entry.insert(true);
                false
            }
            Entry::Vacant(entry) => {
                let _ = entry.insert(false);
                true
            }
        }
    }

    /// Run attempts until no rerun was requested, then release the claim.
    async fn drive(&self, session_id: &SessionId) -> Result<Option<SessionMemory>> {
        let mut committed = None;
        loop {
            let result = self.attempt(session_id).await;
            let done = result.is_err()
                || self
                    .in_flight
                    .remove_if(session_id, |_, rerun| !*rerun)
                    .is_some();
            if done {
                let _ = self.in_flight.remove(session_id);
                self.idle.notify_waiters();
                return result.map(|latest| latest.or(committed));
            }
            if let Ok(Some(memory)) = result {
                committed = Some(memory);
            }
            if let Some(mut rerun) = self.in_flight.get_mut(session_id) {
                *rerun = false;
            }
        }
    }

    /// One attempt, with its outcome reported on the bus.
    async fn attempt(&self, session_id: &SessionId) -> Result<Option<SessionMemory>> {
        match self.compact_once(session_id).await {
            Ok(Attempt::Committed {
                memory,
                last,
                folded,
            }) => {
                counter!("loom_compactions_total", "outcome" => "completed").increment(1);
                info!(
                    session_id = %session_id,
                    folded,
                    compaction_count = memory.compaction_count,
                    "compaction committed"
                );
                let _ = self.bus.emit(
                    EventSource::System,
                    EventKind::CompactionCompleted {
                        session_id: session_id.clone(),
                        folded_count: folded,
                        last_compacted_message_id: last,
                        compaction_count: memory.compaction_count,
                    },
                );
                Ok(Some(memory))
            }
            Ok(Attempt::Skipped) => Ok(None),
            Ok(Attempt::Discarded(reason)) => {
                counter!("loom_compactions_total", "outcome" => "discarded").increment(1);
                debug!(session_id = %session_id, reason, "compaction discarded");
                self.report_failure(session_id, reason.to_owned());
                Ok(None)
            }
            Err(error) => {
                counter!("loom_compactions_total", "outcome" => "failed").increment(1);
                warn!(session_id = %session_id, error_kind = error.error_kind(), %error, "compaction failed");
                self.report_failure(session_id, error.to_string());
                Err(error)
            }
        }
    }

    fn report_failure(&self, session_id: &SessionId, error: String) {
        let _ = self.bus.emit(
            EventSource::Internal,
            EventKind::CompactionFailed {
                session_id: session_id.clone(),
                error,
            },
        );
    }

    // ── Plan / summarize / commit ───────────────────────────────────

    async fn compact_once(&self, session_id: &SessionId) -> Result<Attempt> {
        let Some(plan) = self.plan(session_id).await? else {
            return Ok(Attempt::Skipped);
        };
        let summary = self.summarize(session_id, &plan).await?;
        self.commit(session_id, plan, summary).await
    }

    async fn snapshot(&self, session_id: &SessionId) -> Result<Snapshot> {
        let messages = self.store.messages(session_id).await?;
        let path = active_path(&messages, &self.selections.get(session_id));
        let record = self.repo.get_session_memory(session_id).await?;
        let memory = SessionMemory::project(session_id, record.as_ref(), &path);
        Ok(Snapshot {
            record,
            path,
            memory,
        })
    }

    async fn session_is_live(&self, session_id: &SessionId) -> Result<bool> {
        Ok(self
            .repo
            .get_session(session_id)
            .await?
            .is_some_and(|s| s.status != SessionStatus::Deleted))
    }

    async fn plan(&self, session_id: &SessionId) -> Result<Option<Plan>> {
        if !self.session_is_live(session_id).await? {
            return Ok(None);
        }
        let Snapshot { record, memory, .. } = self.snapshot(session_id).await?;
        let Some(count) = self.budget.fold_count(&memory.raw_window) else {
            return Ok(None);
        };
        debug!(
            session_id = %session_id,
            window = memory.raw_window.len(),
            fold = count,
            stale = memory.stale,
            "compaction planned"
        );
        Ok(Some(Plan {
            record,
            run: memory.raw_window[..count].to_vec(),
            prior_summary: memory.summary,
        }))
    }

    async fn summarize(&self, session_id: &SessionId, plan: &Plan) -> Result<String> {
        let request = SummaryRequest {
            session_id: session_id.clone(),
            prior_summary: plan.prior_summary.clone(),
            messages: plan.run.clone(),
        };
        let timeout = Duration::from_millis(self.provider_timeout_ms);
        let summary = match tokio::time::timeout(timeout, self.provider.summarize(request)).await {
            Err(_) => Err(ProviderError::Timeout {
                timeout_ms: self.provider_timeout_ms,
            }),
            Ok(result) => result,
        }?;

        let summary = summary.trim();
        if summary.is_empty() {
            return Err(LoomError::Provider(ProviderError::EmptySummary));
        }
        Ok(summary.to_owned())
    }

    async fn commit(&self, session_id: &SessionId, plan: Plan, summary: String) -> Result<Attempt> {
        let _guard = self.locks.lock(session_id).await;

        if !self.session_is_live(session_id).await? {
            return Ok(Attempt::Discarded("session deleted during compaction"));
        }
        let current = self.snapshot(session_id).await?;
        if current.record != plan.record {
            return Ok(Attempt::Discarded("memory changed during compaction"));
        }
        let still_head = current.memory.raw_window.len() >= plan.run.len()
            && current
                .memory
                .raw_window
                .iter()
                .zip(&plan.run)
                .all(|(now, planned)| now.id == planned.id);
        if !still_head {
            return Ok(Attempt::Discarded("window changed during compaction"));
        }

        let Some(last) = plan.run.last() else {
            return Ok(Attempt::Skipped);
        };
        let record = MemoryRecord {
            session_id: session_id.clone(),
            summary,
            last_compacted_message_id: last.id.clone(),
            compaction_count: plan.record.as_ref().map_or(0, |r| r.compaction_count) + 1,
            updated_at: Utc::now(),
        };
        self.repo.save_session_memory(&record).await?;

        Ok(Attempt::Committed {
            memory: SessionMemory::project(session_id, Some(&record), &current.path),
            last: record.last_compacted_message_id,
            folded: plan.run.len(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
