//! Observer-side bounded event history.
//!
//! The bus keeps nothing. An observer that wants recent history (a footer
//! showing the last notices, a diagnostics panel) owns an [`EventBacklog`]
//! and pushes into it as events arrive.

use std::collections::VecDeque;

use loom_settings::BusSettings;

use crate::event::Event;

/// Default number of retained events.
pub const DEFAULT_BACKLOG: usize = 100;

/// Fixed-capacity ring of recent events; the oldest is evicted first.
#[derive(Clone, Debug)]
pub struct EventBacklog {
    capacity: usize,
    events: VecDeque<Event>,
    evicted: u64,
}

impl EventBacklog {
    /// Create a backlog holding at most `capacity` events (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
            evicted: 0,
        }
    }

    /// Create a backlog sized by `bus.observerBacklog`.
    #[must_use]
    pub fn from_settings(settings: &BusSettings) -> Self {
        Self::new(settings.observer_backlog)
    }

    /// Append an event, returning the evicted one when full.
    pub fn push(&mut self, event: Event) -> Option<Event> {
        let evicted = if self.events.len() == self.capacity {
            self.evicted += 1;
            self.events.pop_front()
        } else {
            None
        };
        self.events.push_back(event);
        evicted
    }

    /// Events oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Event> {
        self.events.iter()
    }

    /// Most recent event.
    #[must_use]
    pub fn latest(&self) -> Option<&Event> {
        self.events.back()
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum retained events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events evicted since creation.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Drop all retained events.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Copy of the retained events, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }
}

impl Default for EventBacklog {
    fn default() -> Self {
        Self::new(DEFAULT_BACKLOG)
    }
}
