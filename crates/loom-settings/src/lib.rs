//! # loom-settings
//!
//! Layered configuration for the Loom conversation engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LoomSettings::default()`]
//! 2. **User file**: `~/.loom/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `LOOM_*` overrides (highest priority)
//!
//! There is no global instance. The embedding application loads settings
//! once and hands the relevant sections to the components it builds.
//!
//! ```no_run
//! use loom_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("compaction budget: {}", settings.compaction.budget);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, load_settings_with,
    settings_path,
};
pub use types::*;
