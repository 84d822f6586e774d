//! Token-bucket limiter with exact integer refill accounting and cancellable reservations.
//!
//! The bucket is tracked as the instant at which it would hold zero tokens (`empty_at`, in
//! nanoseconds since the limiter's origin). The token count at `now` is
//! `(now - empty_at) / interval`, saturated at `burst`, where `interval = 1 / qps`. Admitting an
//! event moves `empty_at` forward by one interval. When the bucket is already empty, the move
//! pushes `empty_at` past `now`: the event owns a future slot and waits for it, and the next
//! reservation lands one interval later still. Clock readings that move backwards leave
//! `empty_at` untouched and therefore never create tokens.

// self
use crate::{
	_prelude::*,
	cancel::CancelToken,
	clock::{Clock, PassiveClock, RealClock},
	error::{ConfigError, validate_qps},
	limiter::{PassiveRateLimiter, RateLimiter},
	obs::{self, PaceEvent, PaceSpan},
};

const NANOS_PER_SEC: f64 = 1_000_000_000.;

/// Blocking token-bucket limiter admitting `qps` events per second with bursts up to `burst`.
pub struct TokenBucket {
	bucket: Bucket,
	clock: Arc<dyn Clock>,
}
impl TokenBucket {
	/// Creates a bucket on the wall clock. The bucket starts full.
	pub fn new(qps: f64, burst: u32) -> Result<Self, ConfigError> {
		Self::with_clock(qps, burst, RealClock)
	}

	/// Creates a bucket driven by `clock`. The bucket starts full.
	pub fn with_clock(
		qps: f64,
		burst: u32,
		clock: impl 'static + Clock,
	) -> Result<Self, ConfigError> {
		Self::with_shared_clock(qps, burst, Arc::new(clock))
	}

	/// Creates a bucket driven by a clock shared with other components.
	pub fn with_shared_clock(
		qps: f64,
		burst: u32,
		clock: Arc<dyn Clock>,
	) -> Result<Self, ConfigError> {
		let bucket = Bucket::new(qps, burst, clock.now())?;

		Ok(Self { bucket, clock })
	}

	/// Reserves the next token slot and reports how long the caller must wait for it.
	///
	/// The token is accounted for immediately. Call [`Reservation::cancel`] to hand an unused
	/// slot back before it arrives.
	pub fn reserve(&self) -> Reservation<'_> {
		let now = self.clock.now();
		let (slot, delay) = self.bucket.reserve(now);

		if delay.is_zero() {
			obs::observe(PaceEvent::Admitted, "token_bucket", delay);
		} else {
			obs::observe(PaceEvent::Delayed, "token_bucket", delay);
		}

		Reservation { bucket: self, slot, delay, time_to_act: now + delay }
	}

	/// Returns the number of whole or fractional tokens available right now (never negative).
	pub fn tokens(&self) -> f64 {
		self.bucket.tokens(self.clock.now())
	}

	/// Returns the configured burst capacity.
	pub fn burst(&self) -> u32 {
		self.bucket.burst
	}
}
impl Debug for TokenBucket {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenBucket")
			.field("qps", &self.bucket.qps)
			.field("burst", &self.bucket.burst)
			.field("tokens", &self.tokens())
			.finish()
	}
}
impl PassiveRateLimiter for TokenBucket {
	fn try_accept(&self) -> bool {
		try_accept_observed(&self.bucket, self.clock.now())
	}

	fn stop(&self) {}

	fn qps(&self) -> f64 {
		self.bucket.qps
	}
}
impl RateLimiter for TokenBucket {
	fn accept(&self) {
		let _span = PaceSpan::new("accept").entered();
		let reservation = self.reserve();

		self.clock.sleep(reservation.delay);
	}

	fn wait(&self, cancel: &CancelToken) -> Result<()> {
		let _span = PaceSpan::new("wait").entered();

		if cancel.is_cancelled() {
			obs::observe(PaceEvent::Cancelled, "token_bucket", Duration::ZERO);

			return Err(Error::Cancelled);
		}

		let reservation = self.reserve();

		if reservation.delay.is_zero() {
			return Ok(());
		}

		self.clock.sleep_cancellable(reservation.delay, cancel).inspect_err(|_| {
			obs::observe(PaceEvent::Cancelled, "token_bucket", reservation.delay);
			reservation.cancel();
		})
	}
}

/// Non-blocking token bucket for callers that only ever try to admit.
pub struct PassiveTokenBucket {
	bucket: Bucket,
	clock: Arc<dyn PassiveClock>,
}
impl PassiveTokenBucket {
	/// Creates a passive bucket driven by `clock`. The bucket starts full.
	pub fn with_clock(
		qps: f64,
		burst: u32,
		clock: impl 'static + PassiveClock,
	) -> Result<Self, ConfigError> {
		Self::with_shared_clock(qps, burst, Arc::new(clock))
	}

	/// Creates a passive bucket driven by a clock shared with other components.
	pub fn with_shared_clock(
		qps: f64,
		burst: u32,
		clock: Arc<dyn PassiveClock>,
	) -> Result<Self, ConfigError> {
		let bucket = Bucket::new(qps, burst, clock.now())?;

		Ok(Self { bucket, clock })
	}

	/// Returns the number of tokens available right now (never negative).
	pub fn tokens(&self) -> f64 {
		self.bucket.tokens(self.clock.now())
	}
}
impl Debug for PassiveTokenBucket {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PassiveTokenBucket")
			.field("qps", &self.bucket.qps)
			.field("burst", &self.bucket.burst)
			.finish()
	}
}
impl PassiveRateLimiter for PassiveTokenBucket {
	fn try_accept(&self) -> bool {
		try_accept_observed(&self.bucket, self.clock.now())
	}

	fn stop(&self) {}

	fn qps(&self) -> f64 {
		self.bucket.qps
	}
}

/// A token slot handed out by [`TokenBucket::reserve`].
#[must_use = "dropping a reservation keeps its token; call `cancel` to return it"]
pub struct Reservation<'a> {
	bucket: &'a TokenBucket,
	slot: i128,
	delay: Duration,
	time_to_act: Instant,
}
impl Reservation<'_> {
	/// Returns how long the holder must wait, measured from the reservation instant.
	pub fn delay(&self) -> Duration {
		self.delay
	}

	/// Returns the instant at which the reserved token becomes usable.
	pub fn time_to_act(&self) -> Instant {
		self.time_to_act
	}

	/// Returns the unused token to the bucket.
	///
	/// Nothing is restored once the slot has arrived. Reservations stacked on top of this one keep
	/// their slots, and the returned token becomes available to the next admission.
	pub fn cancel(self) {
		self.bucket.bucket.cancel(self.slot, self.bucket.clock.now());
	}
}
impl Debug for Reservation<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Reservation").field("delay", &self.delay).finish()
	}
}

fn try_accept_observed(bucket: &Bucket, now: Instant) -> bool {
	let admitted = bucket.try_take(now);

	obs::record_event(if admitted { PaceEvent::Admitted } else { PaceEvent::Rejected });

	admitted
}

struct Bucket {
	qps: f64,
	burst: u32,
	origin: Instant,
	/// Nanoseconds needed to regenerate one token.
	interval: i128,
	/// Nanoseconds needed to regenerate a full bucket.
	capacity: i128,
	empty_at: Mutex<i128>,
}
impl Bucket {
	fn new(qps: f64, burst: u32, origin: Instant) -> Result<Self, ConfigError> {
		validate_qps(qps)?;

		if burst == 0 {
			return Err(ConfigError::ZeroBurst);
		}

		// `validate_qps` caps the rate at one event per nanosecond.
		let interval = ((NANOS_PER_SEC / qps).round() as i128).max(1);
		let capacity = interval.saturating_mul(burst as i128);

		Ok(Self { qps, burst, origin, interval, capacity, empty_at: Mutex::new(-capacity) })
	}

	fn elapsed(&self, now: Instant) -> i128 {
		now.saturating_duration_since(self.origin).as_nanos() as i128
	}

	// Tokens above `burst` are never stored, so an idle bucket saturates here.
	fn refilled(&self, empty_at: i128, now: i128) -> i128 {
		empty_at.max(now - self.capacity)
	}

	fn tokens(&self, now: Instant) -> f64 {
		let now = self.elapsed(now);
		let empty_at = self.refilled(*self.empty_at.lock(), now);

		((now - empty_at).max(0) as f64 / self.interval as f64).min(self.burst as f64)
	}

	fn try_take(&self, now: Instant) -> bool {
		let now = self.elapsed(now);
		let mut empty_at = self.empty_at.lock();
		let next = self.refilled(*empty_at, now) + self.interval;

		if next <= now {
			*empty_at = next;

			true
		} else {
			false
		}
	}

	fn reserve(&self, now: Instant) -> (i128, Duration) {
		let now = self.elapsed(now);
		let mut empty_at = self.empty_at.lock();
		let slot = self.refilled(*empty_at, now) + self.interval;

		*empty_at = slot;

		(slot, nanos_to_duration(slot - now))
	}

	fn cancel(&self, slot: i128, now: Instant) {
		let now = self.elapsed(now);
		let mut empty_at = self.empty_at.lock();

		if slot > now {
			*empty_at -= self.interval;
		}
	}
}

fn nanos_to_duration(nanos: i128) -> Duration {
	if nanos <= 0 {
		Duration::ZERO
	} else {
		Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::clock::FakeClock;

	fn bucket(qps: f64, burst: u32) -> (TokenBucket, FakeClock) {
		let clock = FakeClock::new();
		let bucket = TokenBucket::with_clock(qps, burst, clock.clone())
			.expect("Token bucket fixture should be valid.");

		(bucket, clock)
	}

	#[test]
	fn construction_rejects_invalid_configuration() {
		assert!(matches!(
			TokenBucket::with_clock(0., 1, FakeClock::new()),
			Err(ConfigError::InvalidQps { .. })
		));
		assert!(matches!(
			TokenBucket::with_clock(-3., 1, FakeClock::new()),
			Err(ConfigError::InvalidQps { .. })
		));
		assert!(matches!(
			TokenBucket::with_clock(2e9, 1, FakeClock::new()),
			Err(ConfigError::InvalidQps { .. })
		));
		assert!(matches!(
			TokenBucket::with_clock(1., 0, FakeClock::new()),
			Err(ConfigError::ZeroBurst)
		));
	}

	#[test]
	fn starts_full_and_reports_configuration() {
		let (bucket, _) = bucket(5., 3);

		assert_eq!(bucket.tokens(), 3.);
		assert_eq!(bucket.qps(), 5.);
		assert_eq!(bucket.burst(), 3);

		bucket.stop();
	}

	#[test]
	fn reservations_take_consecutive_slots() {
		let (bucket, clock) = bucket(4., 1);
		let first = bucket.reserve();
		let second = bucket.reserve();
		let third = bucket.reserve();

		assert_eq!(first.delay(), Duration::ZERO);
		assert_eq!(second.delay(), Duration::from_millis(250));
		assert_eq!(third.delay(), Duration::from_millis(500));
		assert_eq!(third.time_to_act(), clock.at(Duration::from_millis(500)));
		assert_eq!(bucket.tokens(), 0.);
	}

	#[test]
	fn fractional_tokens_shorten_the_wait() {
		let (bucket, clock) = bucket(1., 1);

		assert!(bucket.try_accept());

		clock.step(Duration::from_millis(300));

		assert!((bucket.tokens() - 0.3).abs() < 1e-9);
		assert_eq!(bucket.reserve().delay(), Duration::from_millis(700));
	}

	#[test]
	fn backwards_clock_creates_no_tokens() {
		let (bucket, clock) = bucket(1., 1);

		clock.set(Duration::from_secs(10));

		assert!(bucket.try_accept());

		clock.set(Duration::from_secs(5));

		assert!(!bucket.try_accept());

		clock.set(Duration::from_millis(10_500));

		assert!(!bucket.try_accept());

		clock.set(Duration::from_secs(11));

		assert!(bucket.try_accept());
	}

	#[test]
	fn cancelling_latest_reservation_restores_token() {
		let (bucket, clock) = bucket(1., 1);

		assert!(bucket.try_accept());

		let reservation = bucket.reserve();

		assert_eq!(reservation.delay(), Duration::from_secs(1));

		clock.step(Duration::from_millis(200));
		reservation.cancel();
		clock.step(Duration::from_millis(800));

		assert!(bucket.try_accept());
		assert!(!bucket.try_accept());
	}

	#[test]
	fn cancelling_earlier_reservation_carries_token_forward() {
		let (bucket, clock) = bucket(1., 1);

		assert!(bucket.try_accept());

		let first = bucket.reserve();
		let second = bucket.reserve();

		assert_eq!(second.delay(), Duration::from_secs(2));

		first.cancel();

		assert_eq!(second.time_to_act(), clock.at(Duration::from_secs(2)));

		clock.step(Duration::from_secs(2));

		assert!(bucket.try_accept());
		assert!(!bucket.try_accept());
	}

	#[test]
	fn cancelling_arrived_reservation_keeps_token_consumed() {
		let (bucket, clock) = bucket(1., 1);
		let reservation = bucket.reserve();

		clock.step(Duration::from_millis(500));
		reservation.cancel();

		assert!(!bucket.try_accept());
	}

	#[test]
	fn accept_advances_fake_clock_by_interval() {
		let (bucket, clock) = bucket(10., 1);

		for _ in 0..5 {
			bucket.accept();
		}

		assert_eq!(clock.elapsed(), Duration::from_millis(400));
	}

	#[test]
	fn wait_fails_fast_on_fired_signal_without_consuming() {
		let (bucket, _) = bucket(1., 1);
		let cancel = CancelToken::new();

		cancel.cancel();

		assert!(matches!(bucket.wait(&cancel), Err(Error::Cancelled)));
		assert!(bucket.try_accept());
	}

	#[test]
	fn passive_bucket_paces_try_accept() {
		let clock = FakeClock::new();
		let bucket = PassiveTokenBucket::with_clock(2., 1, clock.clone())
			.expect("Passive bucket fixture should be valid.");

		assert!(bucket.try_accept());
		assert!(!bucket.try_accept());

		clock.step(Duration::from_millis(499));

		assert!(!bucket.try_accept());

		clock.step(Duration::from_millis(1));

		assert!(bucket.try_accept());
		assert_eq!(bucket.qps(), 2.);
		assert_eq!(bucket.tokens(), 0.);
	}

	#[test]
	fn concurrent_reservations_never_share_a_slot() {
		let (bucket, _) = bucket(100., 1);
		let bucket = Arc::new(bucket);
		let handles = (0..8)
			.map(|_| {
				let bucket = bucket.clone();

				thread::spawn(move || {
					(0..25).map(|_| bucket.reserve().delay()).collect::<Vec<_>>()
				})
			})
			.collect::<Vec<_>>();
		let mut delays = handles
			.into_iter()
			.flat_map(|h| h.join().expect("Reserving thread should not panic."))
			.collect::<Vec<_>>();

		delays.sort();
		delays.dedup();

		assert_eq!(delays.len(), 200);
		assert_eq!(delays[0], Duration::ZERO);
		assert_eq!(delays[199], Duration::from_millis(1990));
	}
}
