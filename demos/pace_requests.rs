//! Demonstrates pacing requests to a mock server: the token bucket spaces admissions while the
//! per-host backoff grows on `503` responses and clears once the server answers `200` again.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use request_pacer::{
	clock::RealClock,
	config::PacerConfig,
	pacer::{PaceDecision, RequestPacer, RetryDirective},
	reqwest::Client,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let overload_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/overload");
			then.status(503);
		})
		.await;
	let ok_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/ok");
			then.status(200);
		})
		.await;
	let pacer = PacerConfig::from_json_str(
		r#"{
			"limiter": { "qps": 5.0, "burst": 2 },
			"backoff": { "default_duration_ms": 200, "max_duration_ms": 2000 }
		}"#,
	)?
	.build(Arc::new(RealClock))?;
	let client = Client::new();

	for path in ["/overload", "/overload", "/overload", "/ok", "/ok"] {
		send(&pacer, &client, &Url::parse(&server.url(path))?).await?;
	}

	overload_mock.assert_hits_async(3).await;
	ok_mock.assert_hits_async(2).await;

	Ok(())
}

async fn send(pacer: &RequestPacer, client: &Client, url: &Url) -> Result<()> {
	while let PaceDecision::Delay(directive) = pacer.plan(url) {
		let RetryDirective { recommended_backoff, reason } = directive;

		println!("{url}: holding for {recommended_backoff:?} ({reason:?}).");

		tokio::time::sleep(recommended_backoff).await;
	}

	let result = client.get(url.clone()).send().await;

	pacer.record_reqwest(url, &result);

	let status = result?.status();

	println!("{url}: {status}, window now {:?}.", pacer.backoff.calculate_backoff(url));

	Ok(())
}
