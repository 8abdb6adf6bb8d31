use core::time::Duration;
use serde::Deserialize;

/// Runtime knobs. Every field is optional in JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Endpoint for pulls and event batches. Defaults to the current window location, read fresh for each request.
	pub url: Option<String>,
	/// Timeout for event batch sends. `0` disables it. Pulls never time out.
	pub event_timeout_ms: u64,
	/// Fixed delay between failed pulls.
	pub retry_delay_ms: u64,
	/// Events arriving within this window of each other share one request.
	pub debounce_ms: u64,
	/// Upper bound for how long a coalesced `input` event waits for other traffic before it is flushed on its own.
	pub input_flush_ms: u64,
	pub flash_class: String,
	/// Should match the CSS animation length.
	pub flash_duration_ms: u64,
	pub disconnected_opacity: f32,
	pub expired_opacity: f32,
	/// Whether `eval` directives may run at all.
	pub allow_eval: bool,
}
impl Default for Config {
	fn default() -> Self {
		Self {
			url: None,
			event_timeout_ms: 5000,
			retry_delay_ms: 1000,
			debounce_ms: 1,
			input_flush_ms: 500,
			flash_class: "flash".to_owned(),
			flash_duration_ms: 1500,
			disconnected_opacity: 0.7,
			expired_opacity: 0.3,
			allow_eval: true,
		}
	}
}
impl Config {
	/// # Errors
	///
	/// Iff `json` isn't a valid (partial) configuration object.
	pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(json)
	}

	#[must_use]
	pub fn event_timeout(&self) -> Option<Duration> {
		match self.event_timeout_ms {
			0 => None,
			ms => Some(Duration::from_millis(ms)),
		}
	}

	#[must_use]
	pub fn retry_delay(&self) -> Duration {
		Duration::from_millis(self.retry_delay_ms)
	}

	#[must_use]
	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}

	#[must_use]
	pub fn input_flush(&self) -> Duration {
		Duration::from_millis(self.input_flush_ms)
	}

	#[must_use]
	pub fn flash_duration(&self) -> Duration {
		Duration::from_millis(self.flash_duration_ms)
	}
}
