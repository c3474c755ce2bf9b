//! # shuttle-settings
//!
//! Layered configuration for the shuttle tracker.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TrackerSettings::default()`]
//! 2. **User file**: `~/.shuttle-tracker/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `SHUTTLE_*` overrides
//!
//! Command-line flags are applied by the binary on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, deep_merge, load_settings_from_path, load_with, settings_path,
};
pub use types::*;
