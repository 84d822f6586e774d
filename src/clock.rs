//! Injectable time sources.
//!
//! Two capability sets are exposed: [`PassiveClock`] only reads the time and is what
//! non-blocking consumers (backoff trackers, passive limiters) depend on, while [`Clock`]
//! adds the ability to suspend the caller and is wired into blocking admission paths.
//! [`RealClock`] is the production implementation; [`FakeClock`] is advanced by hand in tests.

pub mod fake;

pub use fake::FakeClock;

// self
use crate::{_prelude::*, cancel::CancelToken};

/// Monotonic time source.
pub trait PassiveClock
where
	Self: Send + Sync,
{
	/// Returns the current monotonic timestamp.
	fn now(&self) -> Instant;

	/// Returns the time elapsed since `earlier`, or zero if `earlier` lies in the future.
	fn since(&self, earlier: Instant) -> Duration {
		self.now().saturating_duration_since(earlier)
	}
}

/// Time source that can also suspend the calling thread.
pub trait Clock
where
	Self: PassiveClock,
{
	/// Suspends the caller for at least `duration`.
	fn sleep(&self, duration: Duration);

	/// Suspends the caller for `duration` unless `cancel` fires first.
	///
	/// Returns [`Error::Cancelled`] as soon as the signal is observable; the caller is not
	/// suspended at all when the signal has already fired.
	fn sleep_cancellable(&self, duration: Duration, cancel: &CancelToken) -> Result<()>;
}

/// Wall-clock implementation backed by [`Instant`] and thread parking.
#[derive(Clone, Copy, Debug, Default)]
pub struct RealClock;
impl PassiveClock for RealClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}
impl Clock for RealClock {
	fn sleep(&self, duration: Duration) {
		if !duration.is_zero() {
			thread::sleep(duration);
		}
	}

	fn sleep_cancellable(&self, duration: Duration, cancel: &CancelToken) -> Result<()> {
		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}
		if duration.is_zero() {
			return Ok(());
		}

		if cancel.wait_timeout(duration) { Err(Error::Cancelled) } else { Ok(()) }
	}
}

/// Read-only view of an active clock, for components that only need [`PassiveClock`].
pub(crate) struct PassiveView(pub(crate) Arc<dyn Clock>);
impl PassiveClock for PassiveView {
	fn now(&self) -> Instant {
		self.0.now()
	}
}
