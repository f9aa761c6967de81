#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use loom_core::{Message, ProviderError, SessionId};
use loom_events::{Event, EventBus, Stream, Subscription};
use loom_runtime::{NewMessage, SessionController, SummaryProvider, SummaryRequest};
use loom_settings::LoomSettings;
use loom_store::{ConversationRepository, InMemoryRepository};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Returns "summary #n" and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    pub requests: Mutex<Vec<SummaryRequest>>,
}

#[async_trait]
impl SummaryProvider for ScriptedProvider {
    async fn summarize(&self, request: SummaryRequest) -> Result<String, ProviderError> {
        let mut requests = self.requests.lock();
        requests.push(request);
        Ok(format!("summary #{}", requests.len()))
    }
}

/// Always fails.
pub struct FailingProvider;

#[async_trait]
impl SummaryProvider for FailingProvider {
    async fn summarize(&self, _: SummaryRequest) -> Result<String, ProviderError> {
        Err(ProviderError::call_failed("upstream unavailable"))
    }
}

/// Blocks every call until `release` is notified.
#[derive(Default)]
pub struct GatedProvider {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl SummaryProvider for GatedProvider {
    async fn summarize(&self, _: SummaryRequest) -> Result<String, ProviderError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok("gated summary".into())
    }
}

pub struct Harness {
    pub repo: Arc<InMemoryRepository>,
    pub bus: Arc<EventBus>,
    pub controller: SessionController,
}

pub fn settings(budget: u64, tail: usize) -> LoomSettings {
    let mut settings = LoomSettings::default();
    settings.compaction.budget = budget;
    settings.compaction.verbatim_tail = tail;
    settings
}

pub fn harness(provider: Arc<dyn SummaryProvider>, settings: &LoomSettings) -> Harness {
    let repo = Arc::new(InMemoryRepository::new());
    let bus = Arc::new(EventBus::from_settings(&settings.bus));
    let controller = SessionController::new(
        Arc::clone(&repo) as Arc<dyn ConversationRepository>,
        provider,
        Arc::clone(&bus),
        settings,
    );
    Harness {
        repo,
        bus,
        controller,
    }
}

impl Harness {
    pub fn subscribe(&self, stream: Stream) -> Subscription {
        self.bus.subscribe(stream)
    }

    /// Start a session with one user message.
    pub async fn start(&self, content: &str) -> Message {
        self.controller
            .append_message(NewMessage::user(content))
            .await
            .unwrap()
    }

    /// Continue the active leaf of `session_id`.
    pub async fn say(&self, session_id: &SessionId, content: &str) -> Message {
        self.controller
            .append_message(NewMessage::user(content).in_session(session_id.clone()))
            .await
            .unwrap()
    }
}

/// Everything already delivered to `sub`.
pub fn drain(sub: &mut Subscription) -> Vec<Event> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}

pub fn contents(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.content.clone()).collect()
}

/// Yield until `condition` holds. Panics after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
