//! Two-stream broadcast bus.
//!
//! Each [`Stream`] is a `tokio::sync::broadcast` channel. Publishing never
//! awaits: the event is cloned into every live receiver's slot and the call
//! returns. A receiver that falls more than `capacity` events behind loses
//! its oldest undelivered events; other receivers are unaffected.

use std::sync::atomic::{AtomicU64, Ordering};

use loom_settings::BusSettings;
use metrics::counter;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::event::{Event, EventKind, EventSource, Stream};

/// Default per-subscriber backlog.
const DEFAULT_CAPACITY: usize = 256;

/// Typed publish/subscribe hub.
///
/// One bus is built per application context and shared by `Arc`.
pub struct EventBus {
    internal: broadcast::Sender<Event>,
    user: broadcast::Sender<Event>,
    shutdown: CancellationToken,
    published: AtomicU64,
}

impl EventBus {
    /// Create a bus with the default per-subscriber backlog.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus whose subscribers each buffer up to `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (internal, _) = broadcast::channel(capacity);
        let (user, _) = broadcast::channel(capacity);
        Self {
            internal,
            user,
            shutdown: CancellationToken::new(),
            published: AtomicU64::new(0),
        }
    }

    /// Create a bus sized by `bus.subscriberBacklog`.
    pub fn from_settings(settings: &BusSettings) -> Self {
        Self::with_capacity(settings.subscriber_backlog)
    }

    fn sender(&self, stream: Stream) -> &broadcast::Sender<Event> {
        match stream {
            Stream::Internal => &self.internal,
            Stream::User => &self.user,
        }
    }

    /// Publish an event on the stream its kind declares. Non-blocking.
    ///
    /// Returns the number of subscribers that will see it; 0 means the
    /// event was dropped because nobody was listening.
    pub fn publish(&self, event: Event) -> usize {
        if self.shutdown.is_cancelled() {
            return 0;
        }
        let stream = event.stream();
        let event_type = event.event_type();
        let _ = self.published.fetch_add(1, Ordering::Relaxed);
        counter!("loom_bus_published_total", "stream" => stream.as_str()).increment(1);

        let delivered = self.sender(stream).send(event).unwrap_or(0);
        trace!(%stream, event_type, delivered, "published event");
        delivered
    }

    /// Build and publish an event in one call.
    pub fn emit(&self, source: EventSource, kind: EventKind) -> usize {
        self.publish(Event::new(source, kind))
    }

    /// Subscribe to one stream. Delivery starts with the next publish.
    pub fn subscribe(&self, stream: Stream) -> Subscription {
        Subscription {
            stream,
            rx: self.sender(stream).subscribe(),
            cancel: self.shutdown.child_token(),
            dropped: 0,
        }
    }

    /// Live subscribers on a stream.
    pub fn subscriber_count(&self, stream: Stream) -> usize {
        self.sender(stream).receiver_count()
    }

    /// Events accepted by [`publish`](Self::publish) since creation.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// End every subscription and refuse further publishes.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's cursor into a stream.
pub struct Subscription {
    stream: Stream,
    rx: broadcast::Receiver<Event>,
    cancel: CancellationToken,
    dropped: u64,
}

impl Subscription {
    /// Next event, or `None` once the bus shuts down.
    ///
    /// Falling behind is not an error: skipped events are counted and
    /// logged, and the next retained event is returned.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                r = self.rx.recv() => r,
            };
            match result {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        if self.cancel.is_cancelled() {
            return None;
        }
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    fn record_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        counter!("loom_bus_lagged_total", "stream" => self.stream.as_str()).increment(skipped);
        warn!(
            stream = %self.stream,
            skipped,
            total_dropped = self.dropped,
            "subscriber fell behind, oldest events dropped"
        );
    }

    /// Stream this subscription reads.
    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// Events lost to lag so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Adapt into a `futures::Stream` that ends on shutdown.
    pub fn into_stream(self) -> impl futures::Stream<Item = Event> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use loom_core::SessionId;

    fn refresh() -> Event {
        Event::system(EventKind::SessionsRefresh {})
    }

    fn notice(msg: &str) -> Event {
        Event::system(EventKind::Notice {
            message: msg.to_string(),
        })
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(refresh()), 0);
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn no_replay_for_late_subscribers() {
        let bus = EventBus::new();
        let _ = bus.publish(notice("early"));

        let mut sub = bus.subscribe(Stream::User);
        assert!(sub.try_recv().is_none());

        let _ = bus.publish(notice("late"));
        assert_eq!(sub.recv().await.unwrap().details(), "late");
    }

    #[tokio::test]
    async fn routes_by_kind() {
        let bus = EventBus::new();
        let mut internal = bus.subscribe(Stream::Internal);
        let mut user = bus.subscribe(Stream::User);

        assert_eq!(bus.publish(refresh()), 1);
        assert_eq!(bus.publish(notice("hi")), 1);

        assert_eq!(
            internal.recv().await.unwrap().event_type(),
            "sessions_refresh"
        );
        assert!(internal.try_recv().is_none());
        assert_eq!(user.recv().await.unwrap().event_type(), "notice");
        assert!(user.try_recv().is_none());
    }

    #[tokio::test]
    async fn each_subscriber_sees_publish_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe(Stream::Internal);
        let mut b = bus.subscribe(Stream::Internal);

        for i in 0..5 {
            let _ = bus.emit(
                EventSource::User,
                EventKind::SessionUpdated {
                    session_id: SessionId::from(format!("s{i}")),
                },
            );
        }

        for sub in [&mut a, &mut b] {
            for i in 0..5 {
                let e = sub.recv().await.unwrap();
                assert_eq!(e.kind.session_id().unwrap().as_str(), format!("s{i}"));
            }
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_loses_oldest_only() {
        let bus = EventBus::with_capacity(2);
        let mut slow = bus.subscribe(Stream::User);

        for i in 0..5 {
            let _ = bus.publish(notice(&format!("n{i}")));
        }
        let mut fast = bus.subscribe(Stream::User);
        let _ = bus.publish(notice("n5"));

        // capacity 2: slow keeps the last two of n0..n5
        assert_eq!(slow.recv().await.unwrap().details(), "n4");
        assert_eq!(slow.recv().await.unwrap().details(), "n5");
        assert_eq!(slow.dropped(), 4);

        assert_eq!(fast.recv().await.unwrap().details(), "n5");
        assert_eq!(fast.dropped(), 0);
    }

    #[tokio::test]
    async fn shutdown_ends_subscriptions() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(Stream::Internal);
        bus.shutdown();
        assert!(bus.is_shut_down());
        assert!(sub.recv().await.is_none());
        assert_eq!(bus.publish(refresh()), 0);
    }

    #[tokio::test]
    async fn into_stream_yields_until_shutdown() {
        let bus = EventBus::new();
        let mut stream = Box::pin(bus.subscribe(Stream::User).into_stream());

        let _ = bus.publish(notice("a"));
        let _ = bus.publish(notice("b"));

        assert_eq!(stream.next().await.unwrap().details(), "a");
        assert_eq!(stream.next().await.unwrap().details(), "b");
        bus.shutdown();
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn subscriber_count_tracks_drops() {
        let bus = EventBus::new();
        let a = bus.subscribe(Stream::Internal);
        let b = bus.subscribe(Stream::Internal);
        assert_eq!(bus.subscriber_count(Stream::Internal), 2);
        assert_eq!(bus.subscriber_count(Stream::User), 0);
        drop(a);
        assert_eq!(bus.subscriber_count(Stream::Internal), 1);
        drop(b);
        assert_eq!(bus.subscriber_count(Stream::Internal), 0);
    }

    #[test]
    fn zero_capacity_is_raised() {
        let bus = EventBus::from_settings(&BusSettings {
            subscriber_backlog: 0,
            observer_backlog: 1,
        });
        let mut sub = bus.subscribe(Stream::User);
        assert_eq!(bus.publish(notice("x")), 1);
        assert!(sub.try_recv().is_some());
    }
}
