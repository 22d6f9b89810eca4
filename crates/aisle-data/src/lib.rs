//! External-call policy for the fulfillment pipeline.
//!
//! This crate provides:
//! - `Dependency` - Semantic categories of the collaborators a checkout calls
//! - `TimeoutConfig` / `with_timeout` - Bounded calls with a typed expiry
//! - `RetryPolicy` - Bounded retry for recoverable conflicts

mod dependency;
mod retry;
mod timeout;

pub use dependency::*;
pub use retry::*;
pub use timeout::*;
