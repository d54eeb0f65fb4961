//! Caller-input validation errors.

use thiserror::Error;

/// A caller-supplied parameter violates a stated constraint.
///
/// Never coerced into a default: the operation that detects it returns it
/// immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required identity (source, actor, session) was empty.
    #[error("{field} must not be empty")]
    EmptyIdentity {
        /// Which identity was empty.
        field: &'static str,
    },

    /// A window, threshold or bucket width was zero or negative.
    #[error("{field} must be a positive duration")]
    NonPositiveDuration {
        /// Which parameter was out of range.
        field: &'static str,
    },

    /// A rate-limit quota of zero would reject every request.
    #[error("quota must be at least 1")]
    ZeroQuota,
}
