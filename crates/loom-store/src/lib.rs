//! # loom-store
//!
//! Persistence seam for the Loom conversation engine.
//!
//! - [`ConversationRepository`]: async CRUD-by-id trait implemented by the
//!   embedding application's storage layer
//! - [`InMemoryRepository`]: reference implementation with failure injection
//! - [`MessageStore`]: message log adapter enforcing parent links
//!
//! ## Crate Position
//!
//! Depends on loom-core. Depended on by loom-runtime.

#![deny(unsafe_code)]

pub mod memory;
pub mod message_store;
pub mod repository;

pub use memory::InMemoryRepository;
pub use message_store::MessageStore;
pub use repository::{ConversationRepository, StoreResult};
