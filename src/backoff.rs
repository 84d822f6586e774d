//! Per-key exponential backoff with optional jitter.
//!
//! Each key (typically a host) owns a window that starts at the default duration on its first
//! failure and doubles on every subsequent failure, plus a random component bounded by
//! `max_jitter_factor` times the previous window, capped at `max_duration`. An entry whose last
//! update is older than twice `max_duration` is stale: every operation treats it as absent and
//! [`BackoffTracker::gc`] eventually drops it.

/// Builder API for assembling backoff trackers.
pub mod builder;
pub mod manager;

pub use builder::BackoffTrackerBuilder;
pub use manager::*;

// crates.io
use rand::{Rng, rngs::StdRng};
// self
use crate::{
	_prelude::*,
	clock::{PassiveClock, RealClock},
	obs::{self, PaceEvent},
};

const STALE_WINDOWS: u32 = 2;

/// Thread-safe map from key to exponential backoff window.
pub struct BackoffTracker {
	clock: Arc<dyn PassiveClock>,
	default_duration: Duration,
	max_duration: Duration,
	max_jitter_factor: f64,
	state: RwLock<TrackerState>,
}
impl BackoffTracker {
	/// Creates a jitter-free tracker on the wall clock.
	pub fn new(default_duration: Duration, max_duration: Duration) -> Self {
		Self::with_clock(default_duration, max_duration, RealClock)
	}

	/// Creates a jitter-free tracker driven by `clock`.
	pub fn with_clock(
		default_duration: Duration,
		max_duration: Duration,
		clock: impl 'static + PassiveClock,
	) -> Self {
		Self::from_parts(Arc::new(clock), default_duration, max_duration, 0., None)
	}

	/// Starts a builder for trackers that need jitter or a shared clock.
	pub fn builder() -> BackoffTrackerBuilder {
		BackoffTrackerBuilder::new()
	}

	pub(crate) fn from_parts(
		clock: Arc<dyn PassiveClock>,
		default_duration: Duration,
		max_duration: Duration,
		max_jitter_factor: f64,
		rng: Option<StdRng>,
	) -> Self {
		Self {
			clock,
			default_duration,
			max_duration,
			max_jitter_factor,
			state: RwLock::new(TrackerState { entries: HashMap::new(), rng }),
		}
	}

	/// Returns the window applied on a key's first failure.
	pub fn default_duration(&self) -> Duration {
		self.default_duration
	}

	/// Returns the cap applied to every window.
	pub fn max_duration(&self) -> Duration {
		self.max_duration
	}

	/// Returns the configured jitter factor (zero when jitter is disabled).
	pub fn max_jitter_factor(&self) -> f64 {
		self.max_jitter_factor
	}

	/// Returns the current window for `key`, or zero when the key is unknown or stale.
	pub fn get(&self, key: &str) -> Duration {
		self.snapshot(key).map(|entry| entry.duration).unwrap_or_default()
	}

	/// Returns a copy of the live entry for `key`, if any.
	pub fn snapshot(&self, key: &str) -> Option<BackoffSnapshot> {
		let now = self.clock.now();

		self.state.read().entries.get(key).filter(|entry| !self.is_stale(now, entry)).copied()
	}

	/// Returns how much of `key`'s window is still ahead of the current time.
	///
	/// Zero once `last_update + duration` has passed, even while the entry itself is live.
	pub fn remaining(&self, key: &str) -> Duration {
		let now = self.clock.now();

		self.snapshot(key)
			.and_then(|entry| entry.last_update.checked_add(entry.duration))
			.map(|until| until.saturating_duration_since(now))
			.unwrap_or_default()
	}

	/// Grows the window for `key` after a failure observed at `event_time`.
	///
	/// A missing or stale entry restarts at the default window.
	pub fn next(&self, key: &str, event_time: Instant) {
		let mut state = self.state.write();
		let state = &mut *state;
		let current = state.entries.get(key).filter(|entry| !self.is_stale(event_time, entry));
		let duration = match current {
			Some(entry) => {
				let jitter = self.jitter(&mut state.rng, entry.duration);

				entry.duration.saturating_mul(2).saturating_add(jitter)
			},
			None => {
				let jitter = self.jitter(&mut state.rng, self.default_duration);

				self.default_duration.saturating_add(jitter)
			},
		}
		.min(self.max_duration);

		state
			.entries
			.insert(key.to_owned(), BackoffSnapshot { duration, last_update: event_time });

		obs::observe(PaceEvent::BackoffAdvanced, key, duration);
	}

	/// Clears the window for `key` after a success. Resetting an unknown key is a no-op.
	pub fn reset(&self, key: &str) {
		if let Some(entry) = self.state.write().entries.remove(key) {
			obs::observe(PaceEvent::BackoffReset, key, entry.duration);
		}
	}

	/// Removes the entry for `key` on operator request.
	pub fn delete_entry(&self, key: &str) {
		self.state.write().entries.remove(key);
	}

	/// Returns `true` if the time elapsed since `event_time` is still inside `key`'s window.
	pub fn is_in_backoff_since(&self, key: &str, event_time: Instant) -> bool {
		let now = self.clock.now();
		let state = self.state.read();

		match state.entries.get(key) {
			Some(entry) if !self.is_stale(now, entry) =>
				now.saturating_duration_since(event_time) < entry.duration,
			_ => false,
		}
	}

	/// Returns `true` if `event_time` falls inside the window opened by `key`'s last update.
	pub fn is_in_backoff_since_update(&self, key: &str, event_time: Instant) -> bool {
		let state = self.state.read();

		match state.entries.get(key) {
			Some(entry) if !self.is_stale(event_time, entry) =>
				event_time.saturating_duration_since(entry.last_update) < entry.duration,
			_ => false,
		}
	}

	/// Drops every stale entry.
	pub fn gc(&self) {
		let now = self.clock.now();

		self.state.write().entries.retain(|_, entry| !self.is_stale(now, entry));
	}

	/// Returns the number of stored entries, including stale ones not yet collected.
	pub fn len(&self) -> usize {
		self.state.read().entries.len()
	}

	/// Returns `true` when no entry is stored.
	pub fn is_empty(&self) -> bool {
		self.state.read().entries.is_empty()
	}

	fn is_stale(&self, now: Instant, entry: &BackoffSnapshot) -> bool {
		now.saturating_duration_since(entry.last_update)
			> self.max_duration.saturating_mul(STALE_WINDOWS)
	}

	fn jitter(&self, rng: &mut Option<StdRng>, window: Duration) -> Duration {
		match rng {
			Some(rng) if self.max_jitter_factor > 0. => {
				let scale = rng.random::<f64>() * self.max_jitter_factor;

				Duration::try_from_secs_f64(window.as_secs_f64() * scale)
					.unwrap_or(Duration::MAX)
			},
			_ => Duration::ZERO,
		}
	}
}
impl Debug for BackoffTracker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BackoffTracker")
			.field("default_duration", &self.default_duration)
			.field("max_duration", &self.max_duration)
			.field("max_jitter_factor", &self.max_jitter_factor)
			.field("entries", &self.len())
			.finish()
	}
}

/// Copy of a key's backoff state at the time it was read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffSnapshot {
	/// Current window.
	pub duration: Duration,
	/// Event time of the most recent failure.
	pub last_update: Instant,
}

struct TrackerState {
	entries: HashMap<String, BackoffSnapshot>,
	rng: Option<StdRng>,
}

#[cfg(test)]
mod tests {
	// crates.io
	use rand::SeedableRng;
	// self
	use super::*;
	use crate::clock::FakeClock;

	fn secs(value: u64) -> Duration {
		Duration::from_secs(value)
	}

	fn tracker() -> (BackoffTracker, FakeClock) {
		let clock = FakeClock::new();

		(BackoffTracker::with_clock(secs(1), secs(16), clock.clone()), clock)
	}

	#[test]
	fn unknown_key_has_no_window() {
		let (tracker, clock) = tracker();

		assert_eq!(tracker.get("nobody"), Duration::ZERO);
		assert!(tracker.snapshot("nobody").is_none());
		assert!(!tracker.is_in_backoff_since("nobody", clock.now()));
		assert!(!tracker.is_in_backoff_since_update("nobody", clock.now()));
		assert!(tracker.is_empty());
	}

	#[test]
	fn windows_double_until_capped() {
		let (tracker, clock) = tracker();
		let mut observed = Vec::new();

		for _ in 0..7 {
			tracker.next("h", clock.now());
			observed.push(tracker.get("h"));
			clock.step(secs(1));
		}

		assert_eq!(observed, [secs(1), secs(2), secs(4), secs(8), secs(16), secs(16), secs(16)]);
	}

	#[test]
	fn initial_window_respects_cap() {
		let clock = FakeClock::new();
		let tracker = BackoffTracker::with_clock(secs(30), secs(10), clock.clone());

		tracker.next("h", clock.now());

		assert_eq!(tracker.get("h"), secs(10));
	}

	#[test]
	fn keys_are_independent() {
		let (tracker, clock) = tracker();

		tracker.next("a", clock.now());
		tracker.next("a", clock.now());
		tracker.next("b", clock.now());

		assert_eq!(tracker.get("a"), secs(2));
		assert_eq!(tracker.get("b"), secs(1));
		assert_eq!(tracker.len(), 2);
	}

	#[test]
	fn reset_and_delete_remove_entry() {
		let (tracker, clock) = tracker();

		tracker.next("h", clock.now());
		tracker.reset("h");

		assert_eq!(tracker.get("h"), Duration::ZERO);

		tracker.reset("h");
		tracker.next("h", clock.now());

		assert_eq!(tracker.get("h"), secs(1));

		tracker.delete_entry("h");

		assert!(tracker.is_empty());
	}

	#[test]
	fn remaining_window_shrinks_to_zero_before_staleness() {
		let (tracker, clock) = tracker();

		tracker.next("h", clock.now());
		tracker.next("h", clock.now());
		clock.step(Duration::from_millis(500));

		assert_eq!(tracker.remaining("h"), Duration::from_millis(1500));

		clock.step(secs(5));

		assert_eq!(tracker.remaining("h"), Duration::ZERO);
		assert_eq!(tracker.get("h"), secs(2));
		assert_eq!(tracker.remaining("nobody"), Duration::ZERO);
	}

	#[test]
	fn in_backoff_since_uses_current_time() {
		let (tracker, clock) = tracker();
		let failed_at = clock.now();

		tracker.next("h", failed_at);
		tracker.next("h", failed_at);
		clock.step(Duration::from_millis(1999));

		assert!(tracker.is_in_backoff_since("h", failed_at));

		clock.step(Duration::from_millis(1));

		assert!(!tracker.is_in_backoff_since("h", failed_at));
	}

	#[test]
	fn in_backoff_since_update_uses_event_time() {
		let (tracker, clock) = tracker();
		let failed_at = clock.now();

		tracker.next("h", failed_at);

		assert!(tracker.is_in_backoff_since_update("h", clock.at(Duration::from_millis(999))));
		assert!(!tracker.is_in_backoff_since_update("h", clock.at(secs(1))));
		assert!(!tracker.is_in_backoff_since_update("h", clock.at(secs(33))));
	}

	#[test]
	fn stale_entries_are_invisible_then_collected() {
		let (tracker, clock) = tracker();

		tracker.next("old", clock.now());
		clock.step(secs(20));
		tracker.next("fresh", clock.now());
		clock.step(secs(13));

		assert_eq!(tracker.get("old"), Duration::ZERO);
		assert!(!tracker.is_in_backoff_since("old", clock.at(Duration::ZERO)));
		assert_eq!(tracker.get("fresh"), secs(1));
		assert_eq!(tracker.len(), 2);

		tracker.gc();

		assert_eq!(tracker.len(), 1);
		assert_eq!(tracker.get("fresh"), secs(1));
	}

	#[test]
	fn jitter_stays_within_factor() {
		let clock = FakeClock::new();
		let tracker = BackoffTracker::from_parts(
			Arc::new(clock.clone()),
			secs(1),
			secs(3600),
			0.5,
			Some(StdRng::seed_from_u64(7)),
		);
		let mut previous = Duration::ZERO;

		for step in 0..8 {
			tracker.next("h", clock.now());

			let current = tracker.get("h");

			if step == 0 {
				assert!(current >= secs(1) && current <= Duration::from_millis(1500));
			} else {
				assert!(current >= (previous * 2).min(secs(3600)));
				assert!(current <= (previous * 2).mul_f64(1.5).min(secs(3600)));
			}

			previous = current;
		}
	}

	#[test]
	fn zero_windows_disable_backoff() {
		let clock = FakeClock::new();
		let tracker = BackoffTracker::with_clock(Duration::ZERO, Duration::ZERO, clock.clone());

		tracker.next("h", clock.now());

		assert_eq!(tracker.get("h"), Duration::ZERO);
		assert!(!tracker.is_in_backoff_since("h", clock.now()));
	}
}
