//! Settings error types.

use happywatch_core::ValidationError;
use thiserror::Error;

/// Errors that can occur when loading or converting settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is representable but out of range.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
    /// Values parsed but violate a parameter constraint.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
