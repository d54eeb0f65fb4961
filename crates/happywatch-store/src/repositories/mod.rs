//! Stateless repositories over the activity database.
//!
//! Each repository is a unit struct whose methods take `&Connection`, so
//! callers decide the transaction scope.

pub mod activity;
pub mod rate_bucket;

pub use activity::ActivityRepo;
pub use rate_bucket::RateBucketRepo;
