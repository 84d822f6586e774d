//! Admission contracts for client-side request pacing.
//!
//! [`PassiveRateLimiter`] covers the non-blocking surface (try, inspect, stop) and
//! [`RateLimiter`] adds the blocking admissions. [`TokenBucket`] is the production
//! implementation; [`AlwaysAdmit`] and [`NeverAdmit`] let callers test their own code paths
//! without timing.

pub mod fake;
pub mod token_bucket;

pub use fake::*;
pub use token_bucket::*;

// self
use crate::{_prelude::*, cancel::CancelToken};

/// Non-blocking admission control.
pub trait PassiveRateLimiter
where
	Self: Send + Sync,
{
	/// Consumes one token and returns `true` if one is available right now; never blocks.
	fn try_accept(&self) -> bool;

	/// Releases background resources, if any.
	fn stop(&self);

	/// Returns the configured steady-state admission rate.
	fn qps(&self) -> f64;
}

/// Admission control that can also park the caller until a token is available.
pub trait RateLimiter
where
	Self: PassiveRateLimiter,
{
	/// Blocks until a token has been granted. Always eventually returns.
	fn accept(&self);

	/// Blocks until a token has been granted or `cancel` fires.
	///
	/// A cancelled wait returns [`Error::Cancelled`] and does not consume a token.
	fn wait(&self, cancel: &CancelToken) -> Result<()>;
}
