//! The long-poll loop of one session.
//!
//! ```text
//! Starting → Polling → (Retrying ⇄ Polling) → Applying → Polling → … → Expired | Errored
//! ```
//!
//! Pulls are strictly sequential: each one is awaited and its directives applied before the next is issued.

use crate::{
	addressing::ROOT_MARKER,
	config::Config,
	diff::{DiffError, Updater},
	flash::Flasher,
	platform::{Dom, Host, ScriptError},
	protocol::{Directive, Envelope, PullResponse},
	transport::{self, TransportError},
	window::{self, Connection, WINDOW_ICON, WINDOW_LOCATION, WINDOW_TITLE},
};
use std::{cell::Cell, rc::Rc};
use thiserror::Error;
use tracing::{error, info, instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Starting,
	/// A pull is in flight.
	Polling,
	/// The last pull failed; waiting out the retry delay.
	Retrying,
	Applying,
	Expired,
	Errored,
}

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
	Expired,
}

#[derive(Debug, Error)]
pub enum SessionError {
	#[error("mono_id not found")]
	NoRoot,
	#[error("multiple mono_id not supported yet")]
	MultipleRoots,
	#[error("mono_id can't be empty")]
	EmptyId,
	#[error("session root {0:?} is no longer in the document")]
	RootGone(String),
	/// The server sent an `error` directive.
	#[error("{0}")]
	Server(String),
	/// A pull response that isn't a valid directive list, including unknown diff kinds.
	#[error("invalid pull response: {0}")]
	Protocol(#[from] serde_json::Error),
	#[error(transparent)]
	Diff(#[from] DiffError),
	#[error(transparent)]
	Script(#[from] ScriptError),
}

pub struct Session<D: Dom> {
	host: Host<D>,
	config: Rc<Config>,
	mono_id: String,
	flasher: Rc<Flasher<D>>,
	updater: Updater<D>,
	state: Rc<Cell<SessionState>>,
}
impl<D: Dom + 'static> Session<D> {
	/// Finds the session root and applies its initial window state.
	///
	/// # Errors
	///
	/// Iff there isn't exactly one session root, or its id is empty.
	#[instrument(skip(host, config))]
	pub fn start(host: Host<D>, config: Rc<Config>) -> Result<Self, SessionError> {
		let dom = &*host.dom;
		let mut roots = dom.session_roots();
		let root = match roots.len() {
			0 => return Err(SessionError::NoRoot),
			1 => roots.remove(0),
			_ => return Err(SessionError::MultipleRoots),
		};
		let mono_id = dom.attribute(&root, ROOT_MARKER).unwrap_or_default();
		if mono_id.is_empty() {
			return Err(SessionError::EmptyId);
		}

		if let Some(location) = dom.attribute(&root, WINDOW_LOCATION).filter(|location| !location.is_empty()) {
			window::set_window_location(dom, &location);
		}
		if let Some(title) = dom.attribute(&root, WINDOW_TITLE) {
			window::set_window_title(dom, &title);
		}
		window::set_window_icon(dom, &root, WINDOW_ICON);

		let flasher = Rc::new(Flasher::new(host.dom.clone(), host.timers.clone(), &config.flash_class, config.flash_duration()));
		let updater = Updater::new(host.dom.clone(), flasher.clone());
		Ok(Self {
			host,
			config,
			mono_id,
			flasher,
			updater,
			state: Rc::new(Cell::new(SessionState::Starting)),
		})
	}

	#[must_use]
	pub fn mono_id(&self) -> &str {
		&self.mono_id
	}

	#[must_use]
	pub fn state(&self) -> SessionState {
		self.state.get()
	}

	/// A handle that keeps observing the state while [`Session::run`] owns the session.
	#[must_use]
	pub fn state_handle(&self) -> Rc<Cell<SessionState>> {
		self.state.clone()
	}

	fn set_state(&self, state: SessionState) {
		trace!(?state);
		self.state.set(state);
	}

	/// The root is looked up again for every batch, in case a diff replaced it.
	fn root(&self) -> Result<D::Element, SessionError> {
		let dom = &*self.host.dom;
		dom.session_roots()
			.into_iter()
			.find(|root| dom.attribute(root, ROOT_MARKER).as_deref() == Some(self.mono_id.as_str()))
			.ok_or_else(|| SessionError::RootGone(self.mono_id.clone()))
	}

	fn show(&self, connection: Connection) {
		match self.root() {
			Ok(root) => window::show_connection(&*self.host.dom, &root, connection, &self.config),
			Err(error) => warn!("Can't show connection state: {}", error),
		}
	}

	/// Pulls and applies directives until the session expires or fails.
	///
	/// Transport failures are retried indefinitely after a fixed delay.
	///
	/// # Errors
	///
	/// On an `error` directive, an undecodable response, a failed script or a diff batch that can't be applied. All of these are terminal.
	#[instrument(skip(self), fields(mono_id = %self.mono_id))]
	pub async fn run(self) -> Result<SessionEnd, SessionError> {
		info!("started");
		let result = self.pull_loop().await;
		match &result {
			Ok(SessionEnd::Expired) => self.set_state(SessionState::Expired),
			Err(error) => {
				error!("{}", error);
				self.set_state(SessionState::Errored);
			}
		}
		self.flasher.cancel_all();
		result
	}

	async fn pull_loop(&self) -> Result<SessionEnd, SessionError> {
		let pull = Envelope::Pull { mono_id: self.mono_id.clone() };
		let mut disconnected = false;
		loop {
			self.set_state(SessionState::Polling);
			let url = self.config.url.clone().unwrap_or_else(|| self.host.dom.window_location());
			let text = match transport::post_json(&*self.host.transport, &*self.host.timers, &url, &pull, None).await {
				Ok(text) => text,
				Err(TransportError::Json(error)) => return Err(error.into()),
				Err(error) => {
					self.set_state(SessionState::Retrying);
					if !disconnected {
						warn!("retrying... ({})", error);
						disconnected = true;
						self.show(Connection::Disconnected);
					}
					self.host.timers.sleep(self.config.retry_delay()).await;
					continue;
				}
			};
			if disconnected {
				info!("reconnected");
				disconnected = false;
				self.show(Connection::Connected);
			}

			// Not retried: the server has already handed this batch out.
			let response: PullResponse = serde_json::from_str(&text)?;

			for directive in response.into_directives() {
				match directive {
					Directive::Eval { code } => {
						info!("<< eval");
						if cfg!(feature = "dangerous-logging") {
							trace!(%code);
						}
						if !self.config.allow_eval {
							return Err(ScriptError::Disabled.into());
						}
						self.host.scripts.eval(&code)?;
					}
					Directive::Update { diffs } => {
						info!("<< update with {} diff(s)", diffs.len());
						self.set_state(SessionState::Applying);
						let root = self.root()?;
						self.updater.apply(&root, &diffs)?;
					}
					Directive::Ignore => (),
					Directive::Expired => {
						info!("expired");
						self.show(Connection::Expired);
						return Ok(SessionEnd::Expired);
					}
					Directive::Error { message } => {
						self.host.dom.alert(&message);
						return Err(SessionError::Server(message));
					}
				}
			}
		}
	}
}
