//! # loom-events
//!
//! Typed publish/subscribe bus with two independently drained streams.
//!
//! - [`Event`] / [`EventKind`]: value objects; each kind declares its [`Stream`]
//! - [`EventBus`]: non-blocking `publish`, per-call [`Subscription`] cursors,
//!   no replay, oldest-first drops for lagging subscribers
//! - [`spawn_subscriber`]: runs a handler on its own task with panic isolation
//! - [`EventBacklog`]: observer-owned ring of recent events
//!
//! ## Crate Position
//!
//! Depends on loom-core and loom-settings. Depended on by loom-runtime.

#![deny(unsafe_code)]

pub mod backlog;
pub mod bus;
pub mod event;
pub mod subscriber;

pub use backlog::EventBacklog;
pub use bus::{EventBus, Subscription};
pub use event::{Event, EventKind, EventSource, Stream};
pub use subscriber::{spawn_backlog_observer, spawn_subscriber};
