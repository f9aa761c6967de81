//! # loom-core
//!
//! Foundation types, errors, branded IDs, and utilities for the Loom
//! conversation state engine.
//!
//! This crate provides the shared vocabulary that all other Loom crates depend on:
//!
//! - **Branded IDs**: [`ids::MessageId`], [`ids::SessionId`], [`ids::ProjectId`] as newtypes
//! - **Messages**: [`message::Message`] with parent links, [`message::Role`], [`message::Attachment`]
//! - **Sessions**: [`session::Session`], [`session::SessionStatus`], [`session::Project`]
//! - **Memory**: [`memory::SessionMemory`] projection and its persisted [`memory::MemoryRecord`]
//! - **Errors**: [`errors::LoomError`] taxonomy via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other loom crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod memory;
pub mod message;
pub mod session;
pub mod text;

pub use errors::{LoomError, PersistenceError, ProviderError, Result, ValidationError};
pub use ids::{MessageId, ProjectId, SessionId};
pub use memory::{MemoryRecord, SessionMemory};
pub use message::{Attachment, Message, Role};
pub use session::{Project, Session, SessionStatus};
