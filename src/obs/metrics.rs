// self
use crate::obs::PaceEvent;

/// Records a pacing event via the global metrics recorder (when enabled).
pub fn record_event(event: PaceEvent) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("request_pacer_event_total", "event" => event.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = event;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_event_noop_without_metrics() {
		record_event(PaceEvent::Rejected);
	}
}
