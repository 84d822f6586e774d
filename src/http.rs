//! Bridges `reqwest` request outcomes into backoff transitions.
//!
//! [`ResponseOutcome`] reduces a `reqwest` result to the `(error, status)` pair a
//! [`BackoffManager`] understands, and [`BackoffManagerExt::update_from_reqwest`] feeds it in
//! one call. Errors produced by `error_for_status` keep their status code, so an overloaded
//! server still grows its window even when the caller converted the response into an error.

// crates.io
use reqwest::{Error as ReqwestError, Response};
// self
use crate::{_prelude::*, backoff::BackoffManager, pacer::RequestPacer};

/// Classification of a single `reqwest` request outcome.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResponseOutcome {
	/// HTTP status code, if the server answered.
	pub status: Option<u16>,
	/// Whether the request surfaced a transport or status error.
	pub failed: bool,
}
impl ResponseOutcome {
	/// Classifies a received response.
	pub fn from_response(response: &Response) -> Self {
		Self { status: Some(response.status().as_u16()), failed: false }
	}

	/// Classifies a request error, keeping the status attached by `error_for_status`.
	pub fn from_error(error: &ReqwestError) -> Self {
		Self { status: error.status().map(|status| status.as_u16()), failed: true }
	}

	/// Classifies either side of a `reqwest` result.
	pub fn from_result(result: &Result<Response, ReqwestError>) -> Self {
		match result {
			Ok(response) => Self::from_response(response),
			Err(error) => Self::from_error(error),
		}
	}

	/// Returns the status in [`BackoffManager::update_backoff`] form (`0` for no response).
	pub fn status_code(&self) -> u16 {
		self.status.unwrap_or_default()
	}
}

/// Convenience methods for recording `reqwest` outcomes on any [`BackoffManager`].
pub trait BackoffManagerExt
where
	Self: BackoffManager,
{
	/// Records the outcome of a `reqwest` request to `url`.
	fn update_from_reqwest(&self, url: &Url, result: &Result<Response, ReqwestError>) {
		let outcome = ResponseOutcome::from_result(result);
		let error = result.as_ref().err().map(|e| e as &(dyn StdError + 'static));

		self.update_backoff(url, error, outcome.status_code());
	}
}
impl<T> BackoffManagerExt for T where T: ?Sized + BackoffManager {}

impl RequestPacer {
	/// Records the outcome of a `reqwest` request to `url`.
	pub fn record_reqwest(&self, url: &Url, result: &Result<Response, ReqwestError>) {
		self.backoff.update_from_reqwest(url, result);
	}
}
