//! Client-side request pacing: token-bucket admission coupled with per-host exponential backoff
//! with jitter, driven by injectable clocks and cancellable waits.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod backoff;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
#[cfg(feature = "reqwest")] pub mod http;
pub mod limiter;
pub mod obs;
pub mod pacer;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fake-clock fixtures for integration tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{backoff::BackoffTracker, clock::FakeClock, limiter::TokenBucket};

	/// Builds a token bucket on a fresh [`FakeClock`], returning both.
	pub fn fake_bucket(qps: f64, burst: u32) -> (TokenBucket, FakeClock) {
		let clock = FakeClock::new();
		let bucket = TokenBucket::with_clock(qps, burst, clock.clone())
			.expect("Token bucket fixture should be valid.");

		(bucket, clock)
	}

	/// Builds a jitter-free tracker on a fresh [`FakeClock`], returning both.
	pub fn fake_tracker(default: Duration, max: Duration) -> (BackoffTracker, FakeClock) {
		let clock = FakeClock::new();

		(BackoffTracker::with_clock(default, max, clock.clone()), clock)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		mem,
		sync::Arc,
		thread,
		time::{Duration, Instant},
	};

	pub use parking_lot::{Condvar, Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tokio as _};
