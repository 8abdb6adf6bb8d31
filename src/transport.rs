//! Request/response over HTTP POST with JSON bodies.

use crate::platform::Timers;
use core::time::Duration;
use futures::{
	future::{self, Either, LocalBoxFuture},
	pin_mut,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{instrument, trace};

#[derive(Debug, Error)]
pub enum TransportError {
	/// Any status other than 200. `body` is the raw response text.
	#[error("HTTP {status}: {body}")]
	Status { status: u16, body: String },
	#[error("no response from {url}!")]
	Timeout { url: String },
	#[error("network failure: {0}")]
	Network(String),
	#[error("invalid JSON: {0}")]
	Json(#[from] serde_json::Error),
}

/// A raw POST primitive. Implementations resolve exactly once per call.
pub trait Transport {
	/// Posts `body` to `url` and resolves with the response text of a `200`.
	fn post(&self, url: &str, body: String) -> LocalBoxFuture<'static, Result<String, TransportError>>;
}

/// Posts `data` as JSON and decodes the response.
///
/// The request races `timeout` if there is one. Whichever finishes first decides the outcome and the other is dropped,
/// so a response arriving after the timeout is ignored.
/// Pass [`None`] for requests that may legitimately block indefinitely, like long-poll pulls.
///
/// # Errors
///
/// On network failure, non-200 status, timeout, or if either side isn't valid JSON.
pub async fn send<In, Out>(transport: &dyn Transport, timers: &dyn Timers, url: &str, data: &In, timeout: Option<Duration>) -> Result<Out, TransportError>
where
	In: Serialize + ?Sized,
	Out: DeserializeOwned,
{
	let text = post_json(transport, timers, url, data, timeout).await?;
	Ok(serde_json::from_str(&text)?)
}

/// Like [`send`], but returns the response text undecoded.
///
/// # Errors
///
/// On network failure, non-200 status, timeout, or if `data` can't be serialised.
#[instrument(skip(transport, timers, data))]
pub async fn post_json<In>(transport: &dyn Transport, timers: &dyn Timers, url: &str, data: &In, timeout: Option<Duration>) -> Result<String, TransportError>
where
	In: Serialize + ?Sized,
{
	let body = serde_json::to_string(data)?;
	if cfg!(feature = "dangerous-logging") {
		trace!(%body, "send");
	}

	let request = transport.post(url, body);
	let text = match timeout {
		None => request.await?,
		Some(timeout) => {
			let timer = timers.sleep(timeout);
			pin_mut!(request, timer);
			match future::select(request, timer).await {
				Either::Left((response, _)) => response?,
				Either::Right(((), _)) => {
					trace!("timed out");
					return Err(TransportError::Timeout { url: url.to_owned() });
				}
			}
		}
	};

	if cfg!(feature = "dangerous-logging") {
		trace!(%text, "receive");
	}
	Ok(text)
}
