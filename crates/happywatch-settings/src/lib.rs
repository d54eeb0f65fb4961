//! # happywatch-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HappywatchSettings::default()`]
//! 2. **User file**: `~/.happywatch/settings.json` or an explicit path,
//!    deep-merged over the defaults
//! 3. **Environment variables**: `HAPPYWATCH_*` overrides (highest priority)
//!
//! Unlike a process-wide singleton, the loaded value is handed to each
//! component explicitly by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
