//! Deterministic limiters for exercising caller code paths.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	cancel::CancelToken,
	limiter::{PassiveRateLimiter, RateLimiter},
};

/// Limiter that admits every event immediately and counts admissions.
#[derive(Debug, Default)]
pub struct AlwaysAdmit {
	admitted: AtomicU64,
}
impl AlwaysAdmit {
	/// Returns the number of events admitted so far.
	pub fn admitted(&self) -> u64 {
		self.admitted.load(Ordering::Relaxed)
	}

	fn record(&self) {
		self.admitted.fetch_add(1, Ordering::Relaxed);
	}
}
impl PassiveRateLimiter for AlwaysAdmit {
	fn try_accept(&self) -> bool {
		self.record();

		true
	}

	fn stop(&self) {}

	fn qps(&self) -> f64 {
		1.
	}
}
impl RateLimiter for AlwaysAdmit {
	fn accept(&self) {
		self.record();
	}

	fn wait(&self, cancel: &CancelToken) -> Result<()> {
		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		self.record();

		Ok(())
	}
}

/// Limiter that never admits anything.
///
/// [`accept`](RateLimiter::accept) parks until [`stop`](PassiveRateLimiter::stop) is called and
/// [`wait`](RateLimiter::wait) parks until its signal fires, then fails with
/// [`Error::Cancelled`].
#[derive(Debug, Default)]
pub struct NeverAdmit {
	stopped: CancelToken,
}
impl PassiveRateLimiter for NeverAdmit {
	fn try_accept(&self) -> bool {
		false
	}

	fn stop(&self) {
		self.stopped.cancel();
	}

	fn qps(&self) -> f64 {
		0.
	}
}
impl RateLimiter for NeverAdmit {
	fn accept(&self) {
		self.stopped.wait();
	}

	fn wait(&self, cancel: &CancelToken) -> Result<()> {
		cancel.wait();

		Err(Error::Cancelled)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn always_admit_counts_every_admission() {
		let limiter = AlwaysAdmit::default();

		assert!(limiter.try_accept());

		limiter.accept();
		limiter.wait(&CancelToken::new()).expect("AlwaysAdmit should admit live waits.");

		let cancel = CancelToken::new();

		cancel.cancel();

		assert!(limiter.wait(&cancel).is_err());
		assert_eq!(limiter.admitted(), 3);
	}

	#[test]
	fn never_admit_releases_accept_on_stop() {
		let limiter = Arc::new(NeverAdmit::default());
		let blocked = {
			let limiter = limiter.clone();

			thread::spawn(move || limiter.accept())
		};

		assert!(!limiter.try_accept());

		limiter.stop();
		blocked.join().expect("Blocked accept should return after stop.");
	}

	#[test]
	fn never_admit_wait_blocks_until_cancelled() {
		let limiter = Arc::new(NeverAdmit::default());
		let cancel = CancelToken::new();
		let waiter = {
			let limiter = limiter.clone();
			let cancel = cancel.clone();

			thread::spawn(move || limiter.wait(&cancel))
		};

		thread::sleep(Duration::from_millis(20));

		assert!(!waiter.is_finished());

		limiter.stop();
		thread::sleep(Duration::from_millis(20));

		assert!(!waiter.is_finished());

		cancel.cancel();

		let result = waiter.join().expect("Waiting thread should not panic.");

		assert!(matches!(result, Err(Error::Cancelled)));
	}
}
