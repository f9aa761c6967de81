//! # loom-runtime
//!
//! Conversation state engine: branch resolution, rolling memory compaction
//! and the session controller that ties them to the store and the bus.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`branch`] | Active/outdated partition of a message tree, explicit branch choices |
//! | [`compaction`] | Budget checks, summary provider seam, background compactor |
//! | [`session`] | Per-session locks, request types, [`SessionController`] |
//!
//! ## Crate Position
//!
//! Top of the stack. Depends on loom-core, loom-settings, loom-events and
//! loom-store.

#![deny(unsafe_code)]

pub mod branch;
pub mod compaction;
pub mod session;

pub use branch::{BranchSelection, Segment, active_path, resolve, resolve_with};
pub use compaction::{ExtractiveSummarizer, MemoryCompactor, SummaryProvider, SummaryRequest};
pub use session::{DeleteMode, NewMessage, SessionController};
