//! Cooperative cancellation signal shared between a blocked waiter and the thread that aborts it.
//!
//! A [`CancelToken`] is cheap to clone; every clone observes the same signal. Once fired it
//! stays fired. Blocking primitives either park on the token directly
//! ([`CancelToken::wait_timeout`]) or register a wake hook so that a clock with its own
//! condition variable (such as [`FakeClock`](crate::clock::FakeClock)) is woken when the
//! signal fires.

// self
use crate::_prelude::*;

type WakeHook = Box<dyn Fn() + Send + Sync>;

/// Thread-safe, one-shot cancellation signal.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<Signal>);
impl CancelToken {
	/// Creates a signal that has not fired yet.
	pub fn new() -> Self {
		Self::default()
	}

	/// Fires the signal, waking every waiter. Subsequent calls are no-ops.
	pub fn cancel(&self) {
		let hooks = {
			let mut state = self.0.state.lock();

			if state.cancelled {
				return;
			}

			state.cancelled = true;

			mem::take(&mut state.hooks)
		};

		self.0.fired.notify_all();

		for (_, hook) in hooks {
			hook();
		}
	}

	/// Returns `true` once [`cancel`](Self::cancel) has been called on any clone.
	pub fn is_cancelled(&self) -> bool {
		self.0.state.lock().cancelled
	}

	/// Parks the caller for up to `timeout` of wall time, returning early if the signal fires.
	///
	/// Returns `true` when the signal fired before the timeout elapsed.
	pub fn wait_timeout(&self, timeout: Duration) -> bool {
		let deadline = Instant::now().checked_add(timeout);
		let mut state = self.0.state.lock();

		while !state.cancelled {
			match deadline {
				Some(deadline) =>
					if self.0.fired.wait_until(&mut state, deadline).timed_out() {
						break;
					},
				None => self.0.fired.wait(&mut state),
			}
		}

		state.cancelled
	}

	/// Parks the caller until the signal fires.
	pub fn wait(&self) {
		let mut state = self.0.state.lock();

		while !state.cancelled {
			self.0.fired.wait(&mut state);
		}
	}

	/// Registers `hook` to run on the cancelling thread when the signal fires.
	///
	/// Returns `None` (and never runs the hook) if the signal has already fired. The hook is
	/// unregistered when the returned guard drops.
	pub(crate) fn on_cancel(&self, hook: impl Fn() + Send + Sync + 'static) -> Option<WakeGuard> {
		let mut state = self.0.state.lock();

		if state.cancelled {
			return None;
		}

		let id = state.next_hook;

		state.next_hook += 1;
		state.hooks.push((id, Box::new(hook)));

		Some(WakeGuard { signal: self.0.clone(), id })
	}
}
impl Debug for CancelToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CancelToken").field("cancelled", &self.is_cancelled()).finish()
	}
}

#[derive(Default)]
struct Signal {
	state: Mutex<SignalState>,
	fired: Condvar,
}

#[derive(Default)]
struct SignalState {
	cancelled: bool,
	next_hook: u64,
	hooks: Vec<(u64, WakeHook)>,
}

/// Keeps a wake hook registered; dropping it unregisters the hook.
pub(crate) struct WakeGuard {
	signal: Arc<Signal>,
	id: u64,
}
impl Drop for WakeGuard {
	fn drop(&mut self) {
		self.signal.state.lock().hooks.retain(|(id, _)| *id != self.id);
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{
		sync::atomic::{AtomicUsize, Ordering},
		thread,
	};
	// self
	use super::*;

	#[test]
	fn clones_share_the_signal() {
		let token = CancelToken::new();
		let clone = token.clone();

		assert!(!clone.is_cancelled());

		token.cancel();
		token.cancel();

		assert!(clone.is_cancelled());
		assert!(clone.wait_timeout(Duration::from_secs(5)));
	}

	#[test]
	fn wait_timeout_expires_without_signal() {
		let token = CancelToken::new();

		assert!(!token.wait_timeout(Duration::from_millis(5)));
	}

	#[test]
	fn cancel_wakes_parked_thread() {
		let token = CancelToken::new();
		let waiter = {
			let token = token.clone();

			thread::spawn(move || token.wait_timeout(Duration::from_secs(30)))
		};

		thread::sleep(Duration::from_millis(10));
		token.cancel();

		assert!(waiter.join().expect("Waiter thread should not panic."));
	}

	#[test]
	fn hooks_run_once_and_unregister_on_drop() {
		let token = CancelToken::new();
		let hits = Arc::new(AtomicUsize::new(0));
		let kept = {
			let hits = hits.clone();

			token.on_cancel(move || {
				hits.fetch_add(1, Ordering::SeqCst);
			})
		};
		let dropped = {
			let hits = hits.clone();

			token.on_cancel(move || {
				hits.fetch_add(10, Ordering::SeqCst);
			})
		};

		drop(dropped);
		token.cancel();
		token.cancel();

		assert_eq!(hits.load(Ordering::SeqCst), 1);
		assert!(kept.is_some());
		assert!(token.on_cancel(|| {}).is_none());
	}
}
