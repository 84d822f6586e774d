//! Pacer-level error types shared by limiters, backoff trackers, and configuration loaders.

// self
use crate::_prelude::*;

/// Pacer-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical pacer error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Invalid construction arguments; raised only while building a limiter or tracker.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// The caller's cancellation signal fired before the wait completed.
	#[error("Wait was cancelled before a token became available.")]
	Cancelled,
}
impl Error {
	/// Returns `true` when the error originates from a fired [`CancelToken`](crate::cancel::CancelToken).
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}
}

/// Configuration and validation failures raised at construction time.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Admission rate must be positive and no faster than one event per nanosecond.
	#[error("The qps value must lie in (0, 1e9], got {qps}.")]
	InvalidQps {
		/// Rejected rate.
		qps: f64,
	},
	/// Burst capacity must admit at least one event.
	#[error("The burst value must be at least 1.")]
	ZeroBurst,
	/// Jitter factor must be a non-negative finite number.
	#[error("The max jitter factor must be non-negative and finite, got {factor}.")]
	InvalidJitterFactor {
		/// Rejected factor.
		factor: f64,
	},
	/// JSON configuration could not be deserialized.
	#[error("Pacer configuration is malformed at `{}`.", .source.path())]
	Parse {
		/// Structured parsing failure carrying the offending field path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl From<serde_path_to_error::Error<serde_json::Error>> for ConfigError {
	fn from(source: serde_path_to_error::Error<serde_json::Error>) -> Self {
		Self::Parse { source }
	}
}

/// Highest admission rate a token bucket can represent: one event per nanosecond.
pub const MAX_QPS: f64 = 1e9;

pub(crate) fn validate_qps(qps: f64) -> Result<(), ConfigError> {
	if qps > 0. && qps <= MAX_QPS { Ok(()) } else { Err(ConfigError::InvalidQps { qps }) }
}

pub(crate) fn validate_jitter_factor(factor: f64) -> Result<(), ConfigError> {
	if factor.is_finite() && factor >= 0. {
		Ok(())
	} else {
		Err(ConfigError::InvalidJitterFactor { factor })
	}
}
