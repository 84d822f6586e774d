//! Optional observability helpers for pacing decisions.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `request_pacer.pace` with a `stage` field around
//!   blocking admissions, plus `debug` events for every [`PaceEvent`].
//! - Enable `metrics` to increment the `request_pacer_event_total` counter for every
//!   [`PaceEvent`], labeled by `event`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Pacing events observed by limiters and backoff trackers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PaceEvent {
	/// A token was handed out without waiting.
	Admitted,
	/// A non-blocking admission found the bucket empty.
	Rejected,
	/// A reservation had to wait for a future token slot.
	Delayed,
	/// A wait was abandoned because its cancellation signal fired.
	Cancelled,
	/// A key's backoff window was created or grown.
	BackoffAdvanced,
	/// A key's backoff window was cleared after a success.
	BackoffReset,
	/// A non-success outcome was observed without growing the window.
	BackoffSkipped,
}
impl PaceEvent {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			PaceEvent::Admitted => "admitted",
			PaceEvent::Rejected => "rejected",
			PaceEvent::Delayed => "delayed",
			PaceEvent::Cancelled => "cancelled",
			PaceEvent::BackoffAdvanced => "backoff_advanced",
			PaceEvent::BackoffReset => "backoff_reset",
			PaceEvent::BackoffSkipped => "backoff_skipped",
		}
	}
}
impl Display for PaceEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records `event` through every enabled backend.
pub(crate) fn observe(event: PaceEvent, key: &str, window: Duration) {
	record_event(event);
	trace_event(event, key, window);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn labels_are_stable() {
		assert_eq!(PaceEvent::BackoffAdvanced.as_str(), "backoff_advanced");
		assert_eq!(PaceEvent::Cancelled.to_string(), "cancelled");
	}
}
