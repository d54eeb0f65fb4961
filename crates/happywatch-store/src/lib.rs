//! # happywatch-store
//!
//! Persistence for happywatch. Two tables live in one SQLite database:
//! the append-only `activity_log` and the per-source `request_stats`
//! counters. Callers share a [`ConnectionPool`]; nothing is cached in
//! process, so any number of threads or processes can use the same file.
//!
//! - [`EventStore`]: append and range-query activity events.
//! - [`RateLimiter`]: atomic increment-and-compare per (source, bucket).
//! - [`Gatekeeper`]: rate check, run the work, record the outcome.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod event_store;
pub mod gatekeeper;
pub mod migrations;
pub mod rate_limiter;
pub mod repositories;
pub mod row_helpers;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, open_file, open_in_memory,
};
pub use errors::{Result, StoreError};
pub use event_store::EventStore;
pub use gatekeeper::{Admission, Gatekeeper, Handled, RequestContext};
pub use rate_limiter::{RateDecision, RateLimiter};
