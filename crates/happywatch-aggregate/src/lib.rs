//! # happywatch-aggregate
//!
//! Read-only views over the activity log. [`WindowAggregator`] computes
//! live activity, the traffic summary, actor progress and inactivity as pure
//! functions of the stored events at call time. [`Monitor`] re-runs the
//! live view on a fixed interval.

#![deny(unsafe_code)]

pub mod aggregator;
pub mod monitor;
pub mod views;

pub use aggregator::WindowAggregator;
pub use monitor::{Monitor, MonitorTick};
pub use views::{ActorProgress, EndpointCount, InactiveActor, LiveActor, Snapshot, TrafficSummary};
