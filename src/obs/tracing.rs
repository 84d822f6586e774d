// self
use crate::{_prelude::*, obs::PaceEvent};

/// A span builder wrapped around blocking admissions.
#[derive(Clone, Debug)]
pub struct PaceSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl PaceSpan {
	/// Creates a new span tagged with the provided stage (call site).
	pub fn new(stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::debug_span!("request_pacer.pace", stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = stage;

			Self {}
		}
	}

	/// Enters the span for the duration of the returned guard.
	pub fn entered(self) -> PaceSpanGuard {
		#[cfg(feature = "tracing")]
		{
			PaceSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			PaceSpanGuard {}
		}
	}
}

/// RAII guard returned by [`PaceSpan::entered`].
pub struct PaceSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for PaceSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("PaceSpanGuard(..)")
	}
}

/// Emits a `debug` event describing `event` for `key` (when enabled).
pub fn trace_event(event: PaceEvent, key: &str, window: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(
			event = event.as_str(),
			key,
			window_ms = window.as_millis() as u64,
			"pacing event"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (event, key, window);
	}
}

/// Emits a `debug` event for a response that neither grows nor resets a backoff window.
pub fn trace_skipped_status(
	key: &str,
	status: Option<u16>,
	error: Option<&(dyn StdError + 'static)>,
) {
	#[cfg(feature = "tracing")]
	{
		let error = error.map(|e| e.to_string());

		tracing::debug!(key, status = ?status, error = ?error, "response does not advance backoff");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (key, status, error);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn pace_span_noop_without_tracing() {
		let _guard = PaceSpan::new("test").entered();

		trace_event(PaceEvent::Admitted, "bucket", Duration::ZERO);
		trace_skipped_status("host", Some(404), None);
	}
}
