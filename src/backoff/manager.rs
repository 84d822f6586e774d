//! Response-driven backoff keyed by the target server of a request URL.
//!
//! [`UrlBackoff`] translates `(url, error, status)` outcomes into [`BackoffTracker`]
//! transitions: overload statuses (`429` and anything above `499`) grow the server's window,
//! other non-success outcomes are logged and left alone, and successes clear it. Every request
//! to the same server shares one window because the key is the URL's authority only.

// self
use crate::{
	_prelude::*,
	backoff::BackoffTracker,
	cancel::CancelToken,
	clock::{Clock, PassiveView, RealClock},
	obs::{self, PaceEvent},
};

/// Status-driven backoff policy consulted before and after every outbound request.
pub trait BackoffManager
where
	Self: Send + Sync,
{
	/// Records the outcome of a request to `url`.
	///
	/// `status` is the HTTP status code, or `0` when no response was received.
	fn update_backoff(&self, url: &Url, error: Option<&(dyn StdError + 'static)>, status: u16);

	/// Returns how long the caller should wait before the next request to `url`.
	fn calculate_backoff(&self, url: &Url) -> Duration;

	/// Returns the part of `url`'s window that has not elapsed yet.
	///
	/// Defaults to the full [`calculate_backoff`](Self::calculate_backoff) window for managers
	/// that do not track when the window opened.
	fn remaining_backoff(&self, url: &Url) -> Duration {
		self.calculate_backoff(url)
	}

	/// Suspends the caller for `duration`.
	fn sleep(&self, duration: Duration);

	/// Suspends the caller for `duration` unless `cancel` fires first.
	fn sleep_cancellable(&self, duration: Duration, cancel: &CancelToken) -> Result<()>;
}

/// [`BackoffManager`] backed by a per-server [`BackoffTracker`].
pub struct UrlBackoff {
	backoff: Arc<BackoffTracker>,
	clock: Arc<dyn Clock>,
}
impl UrlBackoff {
	/// Wraps `backoff`, sleeping and timestamping outcomes on the wall clock.
	pub fn new(backoff: impl Into<Arc<BackoffTracker>>) -> Self {
		Self::with_clock(backoff, RealClock)
	}

	/// Wraps `backoff`, sleeping and timestamping outcomes on `clock`.
	pub fn with_clock(
		backoff: impl Into<Arc<BackoffTracker>>,
		clock: impl 'static + Clock,
	) -> Self {
		Self::with_shared_clock(backoff, Arc::new(clock))
	}

	/// Wraps `backoff` with a clock shared with other components.
	pub fn with_shared_clock(
		backoff: impl Into<Arc<BackoffTracker>>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self { backoff: backoff.into(), clock }
	}

	/// Replaces the tracker with one whose windows are always zero.
	pub fn disable(&mut self) {
		self.backoff = Arc::new(BackoffTracker::with_clock(
			Duration::ZERO,
			Duration::ZERO,
			PassiveView(self.clock.clone()),
		));
	}

	/// Returns the underlying tracker.
	pub fn tracker(&self) -> &Arc<BackoffTracker> {
		&self.backoff
	}

	/// Derives the backoff key for `url`: its host plus explicit port.
	///
	/// URLs without a host (for example `data:` URLs) are keyed by their full text.
	pub fn key(url: &Url) -> String {
		match (url.host_str(), url.port()) {
			(Some(host), Some(port)) => format!("{host}:{port}"),
			(Some(host), None) => host.to_owned(),
			(None, _) => url.as_str().to_owned(),
		}
	}
}
impl Debug for UrlBackoff {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UrlBackoff").field("backoff", &self.backoff).finish()
	}
}
impl BackoffManager for UrlBackoff {
	fn update_backoff(&self, url: &Url, error: Option<&(dyn StdError + 'static)>, status: u16) {
		let key = Self::key(url);

		if status > 499 || status == 429 {
			self.backoff.next(&key, self.clock.now());
		} else if status >= 300 || error.is_some() {
			obs::record_event(PaceEvent::BackoffSkipped);
			obs::trace_skipped_status(&key, (status != 0).then_some(status), error);
		} else {
			self.backoff.reset(&key);
		}
	}

	fn calculate_backoff(&self, url: &Url) -> Duration {
		self.backoff.get(&Self::key(url))
	}

	fn remaining_backoff(&self, url: &Url) -> Duration {
		self.backoff.remaining(&Self::key(url))
	}

	fn sleep(&self, duration: Duration) {
		self.clock.sleep(duration);
	}

	fn sleep_cancellable(&self, duration: Duration, cancel: &CancelToken) -> Result<()> {
		self.clock.sleep_cancellable(duration, cancel)
	}
}

/// [`BackoffManager`] that never delays.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBackoff;
impl BackoffManager for NoBackoff {
	fn update_backoff(&self, _: &Url, _: Option<&(dyn StdError + 'static)>, _: u16) {}

	fn calculate_backoff(&self, _: &Url) -> Duration {
		Duration::ZERO
	}

	fn sleep(&self, duration: Duration) {
		RealClock.sleep(duration);
	}

	fn sleep_cancellable(&self, duration: Duration, cancel: &CancelToken) -> Result<()> {
		RealClock.sleep_cancellable(duration, cancel)
	}
}
