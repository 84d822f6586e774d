// std
use std::time::{SystemTime, UNIX_EPOCH};
// crates.io
use rand::{SeedableRng, rngs::StdRng};
// self
use crate::{
	_prelude::*,
	backoff::BackoffTracker,
	clock::{PassiveClock, RealClock},
	error::{ConfigError, validate_jitter_factor},
};

/// Builder for [`BackoffTracker`] values.
pub struct BackoffTrackerBuilder {
	/// Window applied on a key's first failure.
	pub default_duration: Duration,
	/// Cap applied to every window.
	pub max_duration: Duration,
	/// Upper bound of the random component, as a multiple of the previous window.
	pub max_jitter_factor: f64,
	clock: Arc<dyn PassiveClock>,
	rng: Option<StdRng>,
}
impl BackoffTrackerBuilder {
	/// Creates a builder with a one second default window, a one minute cap, no jitter, and the
	/// wall clock.
	pub fn new() -> Self {
		Self {
			default_duration: Duration::from_secs(1),
			max_duration: Duration::from_secs(60),
			max_jitter_factor: 0.,
			clock: Arc::new(RealClock),
			rng: None,
		}
	}

	/// Sets the window applied on a key's first failure.
	pub fn default_duration(mut self, duration: Duration) -> Self {
		self.default_duration = duration;

		self
	}

	/// Sets the cap applied to every window.
	pub fn max_duration(mut self, duration: Duration) -> Self {
		self.max_duration = duration;

		self
	}

	/// Enables jitter bounded by `factor` times the previous window. Zero disables it.
	pub fn max_jitter_factor(mut self, factor: f64) -> Self {
		self.max_jitter_factor = factor;

		self
	}

	/// Drives the tracker with `clock`.
	pub fn clock(self, clock: impl 'static + PassiveClock) -> Self {
		self.shared_clock(Arc::new(clock))
	}

	/// Drives the tracker with a clock shared with other components.
	pub fn shared_clock(mut self, clock: Arc<dyn PassiveClock>) -> Self {
		self.clock = clock;

		self
	}

	/// Injects the random source used for jitter.
	pub fn rng(mut self, rng: StdRng) -> Self {
		self.rng = Some(rng);

		self
	}

	/// Seeds the jitter source deterministically.
	pub fn seed(self, seed: u64) -> Self {
		self.rng(StdRng::seed_from_u64(seed))
	}

	/// Validates the configuration and builds the tracker.
	///
	/// When jitter is enabled without an injected random source, one is seeded from the system
	/// clock.
	pub fn build(self) -> Result<BackoffTracker, ConfigError> {
		validate_jitter_factor(self.max_jitter_factor)?;

		let rng = if self.max_jitter_factor > 0. {
			Some(self.rng.unwrap_or_else(|| StdRng::seed_from_u64(clock_seed())))
		} else {
			None
		};

		Ok(BackoffTracker::from_parts(
			self.clock,
			self.default_duration,
			self.max_duration,
			self.max_jitter_factor,
			rng,
		))
	}
}
impl Default for BackoffTrackerBuilder {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for BackoffTrackerBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BackoffTrackerBuilder")
			.field("default_duration", &self.default_duration)
			.field("max_duration", &self.max_duration)
			.field("max_jitter_factor", &self.max_jitter_factor)
			.field("rng_set", &self.rng.is_some())
			.finish()
	}
}

fn clock_seed() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or_default()
}
