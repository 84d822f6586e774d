//! Serializable construction parameters for limiters, backoff trackers, and pacers.
//!
//! Every config derives `serde` traits and rejects unknown fields, so a pacer can be described
//! in a JSON document and built against an injected clock:
//!
//! ```
//! use request_pacer::{clock::RealClock, config::PacerConfig, limiter::PassiveRateLimiter};
//! use std::sync::Arc;
//!
//! let config = PacerConfig::from_json_str(
//! 	r#"{ "limiter": { "qps": 5.0, "burst": 10 }, "backoff": { "max_duration_ms": 30000 } }"#,
//! )
//! .unwrap();
//! let pacer = config.build(Arc::new(RealClock)).unwrap();
//!
//! assert_eq!(pacer.limiter.qps(), 5.0);
//! ```

// self
use crate::{
	_prelude::*,
	backoff::{BackoffManager, BackoffTracker, NoBackoff, UrlBackoff},
	clock::{Clock, PassiveClock, PassiveView},
	error::ConfigError,
	limiter::{PassiveTokenBucket, TokenBucket},
	pacer::RequestPacer,
};

/// Token-bucket parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenBucketConfig {
	/// Steady-state admission rate in events per second.
	pub qps: f64,
	/// Largest number of events admitted at an instant from an idle bucket.
	pub burst: u32,
}
impl TokenBucketConfig {
	/// Builds a blocking bucket on `clock`.
	pub fn build(&self, clock: Arc<dyn Clock>) -> Result<TokenBucket, ConfigError> {
		TokenBucket::with_shared_clock(self.qps, self.burst, clock)
	}

	/// Builds a non-blocking bucket on `clock`.
	pub fn build_passive(
		&self,
		clock: Arc<dyn PassiveClock>,
	) -> Result<PassiveTokenBucket, ConfigError> {
		PassiveTokenBucket::with_shared_clock(self.qps, self.burst, clock)
	}
}

/// Backoff tracker parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
	/// Window applied on a key's first failure, in milliseconds.
	#[serde(default = "default_duration_ms")]
	pub default_duration_ms: u64,
	/// Cap applied to every window, in milliseconds.
	#[serde(default = "max_duration_ms")]
	pub max_duration_ms: u64,
	/// Upper bound of the random component; zero disables jitter.
	#[serde(default)]
	pub max_jitter_factor: f64,
	/// Fixed seed for the jitter source; seeded from the system clock when absent.
	#[serde(default)]
	pub seed: Option<u64>,
}
impl BackoffConfig {
	/// Builds a tracker on `clock`.
	pub fn build(&self, clock: Arc<dyn PassiveClock>) -> Result<BackoffTracker, ConfigError> {
		let builder = BackoffTracker::builder()
			.default_duration(Duration::from_millis(self.default_duration_ms))
			.max_duration(Duration::from_millis(self.max_duration_ms))
			.max_jitter_factor(self.max_jitter_factor)
			.shared_clock(clock);
		let builder = match self.seed {
			Some(seed) => builder.seed(seed),
			None => builder,
		};

		builder.build()
	}
}
impl Default for BackoffConfig {
	fn default() -> Self {
		Self {
			default_duration_ms: default_duration_ms(),
			max_duration_ms: max_duration_ms(),
			max_jitter_factor: 0.,
			seed: None,
		}
	}
}

/// Complete pacer description: a limiter plus optional per-server backoff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PacerConfig {
	/// Admission control applied to every request.
	pub limiter: TokenBucketConfig,
	/// Per-server backoff; requests are never delayed by backoff when absent.
	#[serde(default)]
	pub backoff: Option<BackoffConfig>,
}
impl PacerConfig {
	/// Parses a JSON document, reporting the offending field path on failure.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(json);

		Ok(serde_path_to_error::deserialize(de)?)
	}

	/// Parses a JSON document from raw bytes.
	pub fn from_json_slice(json: &[u8]) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_slice(json);

		Ok(serde_path_to_error::deserialize(de)?)
	}

	/// Builds a pacer whose limiter and backoff share `clock`.
	pub fn build(&self, clock: Arc<dyn Clock>) -> Result<RequestPacer, ConfigError> {
		let limiter = Arc::new(self.limiter.build(clock.clone())?);
		let backoff: Arc<dyn BackoffManager> = match &self.backoff {
			Some(config) => {
				let tracker = config.build(Arc::new(PassiveView(clock.clone())))?;

				Arc::new(UrlBackoff::with_shared_clock(tracker, clock))
			},
			None => Arc::new(NoBackoff),
		};

		Ok(RequestPacer::new(backoff, limiter))
	}
}

fn default_duration_ms() -> u64 {
	1_000
}

fn max_duration_ms() -> u64 {
	60_000
}
