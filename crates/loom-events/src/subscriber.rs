//! Subscriber tasks with per-event panic isolation.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::backlog::EventBacklog;
use crate::bus::Subscription;
use crate::event::Event;

/// Run `handler` for every event of `subscription` on its own task.
///
/// A panic inside one handler call is caught and logged; that event is
/// skipped and the subscriber keeps going. The task ends when the bus
/// shuts down and resolves to the number of events handled successfully.
pub fn spawn_subscriber<F>(
    mut subscription: Subscription,
    name: impl Into<String>,
    mut handler: F,
) -> JoinHandle<u64>
where
    F: FnMut(Event) + Send + 'static,
{
    let name = name.into();
    tokio::spawn(async move {
        let mut handled = 0u64;
        while let Some(event) = subscription.recv().await {
            let event_type = event.event_type();
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => handled += 1,
                Err(payload) => {
                    counter!("loom_subscriber_panics_total", "subscriber" => name.clone())
                        .increment(1);
                    error!(
                        subscriber = %name,
                        event_type,
                        panic = panic_message(payload.as_ref()),
                        "subscriber panicked, event skipped"
                    );
                }
            }
        }
        debug!(
            subscriber = %name,
            handled,
            dropped = subscription.dropped(),
            "subscriber stopped"
        );
        handled
    })
}

/// Keep the most recent events of `subscription` in a shared backlog.
pub fn spawn_backlog_observer(
    subscription: Subscription,
    name: impl Into<String>,
    backlog: Arc<Mutex<EventBacklog>>,
) -> JoinHandle<u64> {
    spawn_subscriber(subscription, name, move |event| {
        let _ = backlog.lock().push(event);
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
