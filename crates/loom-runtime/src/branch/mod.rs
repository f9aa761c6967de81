//! Branch resolution.
//!
//! - [`resolver`]: partitions a message set into active messages and
//!   outdated branches
//! - [`selection`]: explicit per-session branch choices

pub mod resolver;
pub mod selection;

pub use resolver::{Segment, active_path, resolve, resolve_with};
pub use selection::{BranchSelection, BranchSelections};
