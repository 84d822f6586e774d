//! Request pacing that composes per-server backoff with rate admission.
//!
//! A caller consults the backoff manager for the request's server, waits out any pending
//! window, then asks the limiter for a token. Once the response arrives the outcome is fed
//! back through [`RequestPacer::record`], which grows or clears the server's window.

// self
use crate::{
	_prelude::*,
	backoff::BackoffManager,
	cancel::CancelToken,
	limiter::RateLimiter,
	obs::PaceSpan,
};

/// Couples a [`BackoffManager`] with a [`RateLimiter`] for one client.
#[derive(Clone)]
pub struct RequestPacer {
	/// Per-server backoff consulted before each request.
	pub backoff: Arc<dyn BackoffManager>,
	/// Admission control applied after any backoff has elapsed.
	pub limiter: Arc<dyn RateLimiter>,
}
impl RequestPacer {
	/// Creates a pacer over the provided backoff manager and limiter.
	pub fn new(backoff: Arc<dyn BackoffManager>, limiter: Arc<dyn RateLimiter>) -> Self {
		Self { backoff, limiter }
	}

	/// Decides without blocking whether a request to `url` may go out now.
	///
	/// An [`PaceDecision::Allow`] has already consumed a limiter token.
	pub fn plan(&self, url: &Url) -> PaceDecision {
		let backoff = self.backoff.remaining_backoff(url);

		if !backoff.is_zero() {
			return PaceDecision::Delay(RetryDirective::new(backoff, DelayReason::Backoff));
		}
		if self.limiter.try_accept() {
			return PaceDecision::Allow;
		}

		let interval =
			Duration::try_from_secs_f64(self.limiter.qps().recip()).unwrap_or(Duration::MAX);

		PaceDecision::Delay(RetryDirective::new(interval, DelayReason::RateLimit))
	}

	/// Blocks until a request to `url` may go out, or `cancel` fires.
	///
	/// Returns the part of the backoff window that was waited out before admission.
	pub fn pace(&self, url: &Url, cancel: &CancelToken) -> Result<Duration> {
		let _span = PaceSpan::new("pace").entered();
		let backoff = self.backoff.remaining_backoff(url);

		if !backoff.is_zero() {
			self.backoff.sleep_cancellable(backoff, cancel)?;
		}

		self.limiter.wait(cancel)?;

		Ok(backoff)
	}

	/// Feeds the outcome of a request to `url` back into the backoff manager.
	pub fn record(&self, url: &Url, error: Option<&(dyn StdError + 'static)>, status: u16) {
		self.backoff.update_backoff(url, error, status);
	}
}
impl Debug for RequestPacer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestPacer").field("qps", &self.limiter.qps()).finish()
	}
}

/// Result emitted by [`RequestPacer::plan`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaceDecision {
	/// The request may proceed immediately.
	Allow,
	/// The request should be delayed.
	Delay(RetryDirective),
}

/// Advises callers when to retry after a [`PaceDecision::Delay`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Suggested wait before the next attempt.
	pub recommended_backoff: Duration,
	/// Which component asked for the delay.
	pub reason: DelayReason,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(recommended_backoff: Duration, reason: DelayReason) -> Self {
		Self { recommended_backoff, reason }
	}
}

/// Source of a [`RetryDirective`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DelayReason {
	/// The target server is inside a backoff window.
	Backoff,
	/// The limiter has no token available.
	RateLimit,
}
