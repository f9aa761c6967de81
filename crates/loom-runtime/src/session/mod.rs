//! Session lifecycle and the mutation pipeline.

pub mod controller;
pub mod locks;
pub mod types;

pub use controller::SessionController;
pub use locks::SessionLocks;
pub use types::{DeleteMode, NewMessage};
