//! Manually advanced clock for deterministic timing tests.

// self
use crate::{
	_prelude::*,
	cancel::CancelToken,
	clock::{Clock, PassiveClock},
};

/// Clock whose time only moves when the test says so.
///
/// [`Clock::sleep`] advances the fake time by the requested duration and returns immediately,
/// so a sequence of blocking admissions can be replayed without real waiting.
/// [`Clock::sleep_cancellable`] instead parks the caller until another thread advances the
/// clock past the deadline (via [`step`](Self::step) or [`set`](Self::set)) or the signal fires.
/// Clones share the same timeline.
#[derive(Clone)]
pub struct FakeClock(Arc<Timeline>);
impl FakeClock {
	/// Creates a clock whose fake time starts at zero elapsed.
	pub fn new() -> Self {
		Self(Arc::new(Timeline {
			origin: Instant::now(),
			state: Mutex::new(TimelineState { elapsed: Duration::ZERO, waiters: 0 }),
			changed: Condvar::new(),
		}))
	}

	/// Advances the fake time by `delta`, waking any sleeper whose deadline has passed.
	pub fn step(&self, delta: Duration) {
		let mut state = self.0.state.lock();

		state.elapsed = state.elapsed.saturating_add(delta);

		self.0.changed.notify_all();
	}

	/// Moves the fake time to `elapsed` since the clock's origin. Moving backwards is allowed.
	pub fn set(&self, elapsed: Duration) {
		let mut state = self.0.state.lock();

		state.elapsed = elapsed;

		self.0.changed.notify_all();
	}

	/// Returns the fake time elapsed since the clock's origin.
	pub fn elapsed(&self) -> Duration {
		self.0.state.lock().elapsed
	}

	/// Returns the timestamp corresponding to `elapsed` since the clock's origin.
	pub fn at(&self, elapsed: Duration) -> Instant {
		self.0.origin + elapsed
	}

	/// Returns `true` while at least one thread is parked in [`Clock::sleep_cancellable`].
	pub fn has_waiters(&self) -> bool {
		self.0.state.lock().waiters > 0
	}

	/// Blocks (in real time, up to `timeout`) until `count` threads are parked on this clock.
	pub fn wait_for_waiters(&self, count: usize, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		let mut state = self.0.state.lock();

		while state.waiters < count {
			if self.0.changed.wait_until(&mut state, deadline).timed_out() {
				return state.waiters >= count;
			}
		}

		true
	}
}
impl Default for FakeClock {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for FakeClock {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.0.state.lock();

		f.debug_struct("FakeClock")
			.field("elapsed", &state.elapsed)
			.field("waiters", &state.waiters)
			.finish()
	}
}
impl PassiveClock for FakeClock {
	fn now(&self) -> Instant {
		self.at(self.elapsed())
	}
}
impl Clock for FakeClock {
	fn sleep(&self, duration: Duration) {
		self.step(duration);
	}

	fn sleep_cancellable(&self, duration: Duration, cancel: &CancelToken) -> Result<()> {
		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}
		if duration.is_zero() {
			return Ok(());
		}

		let timeline = Arc::downgrade(&self.0);
		let Some(_hook) = cancel.on_cancel(move || {
			if let Some(timeline) = timeline.upgrade() {
				let _state = timeline.state.lock();

				timeline.changed.notify_all();
			}
		}) else {
			return Err(Error::Cancelled);
		};
		let mut state = self.0.state.lock();
		let deadline = state.elapsed.saturating_add(duration);

		state.waiters += 1;

		self.0.changed.notify_all();

		let result = loop {
			if cancel.is_cancelled() {
				break Err(Error::Cancelled);
			}
			if state.elapsed >= deadline {
				break Ok(());
			}

			self.0.changed.wait(&mut state);
		};

		state.waiters -= 1;

		self.0.changed.notify_all();

		result
	}
}

struct Timeline {
	origin: Instant,
	state: Mutex<TimelineState>,
	changed: Condvar,
}

struct TimelineState {
	elapsed: Duration,
	waiters: usize,
}
