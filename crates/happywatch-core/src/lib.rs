//! # happywatch-core
//!
//! Types shared by every happywatch crate: the injectable [`Clock`], the
//! activity record written for each handled request, the quota and window
//! parameters, and [`ValidationError`].

#![deny(unsafe_code)]

pub mod activity;
pub mod clock;
pub mod errors;
pub mod params;
pub mod timestamp;

pub use activity::{ActivityEvent, EventFilter, NewActivity, is_error_status};
pub use clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use errors::ValidationError;
pub use params::{RateLimitConfig, WindowConfig};
