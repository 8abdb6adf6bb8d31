//! Captures user interaction inside session roots and reports it to the server.
//!
//! Capture is delegated: the browser backend listens once per event kind at the document level and hands every event to [`EventCapture::handle`],
//! so elements inserted by later diffs are covered automatically.
//!
//! Delivery is at-most-once. Events of one session that arrive within the debounce window share one request,
//! and `input` events are coalesced per path unless their element is marked `on_input="immediate"`.

use crate::{
	addressing::{self, Found},
	config::Config,
	flash::SKIP_FLASH,
	platform::{Dom, Host},
	protocol::{ClickEvent, Envelope, InEvent, InputEvent, KeydownEvent, Modifiers, SpecialKey, Stub},
	transport,
};
use serde::de::IgnoredAny;
use std::{cell::RefCell, rc::Rc};
use tracing::{debug, error, info, trace};

/// The interaction kinds that are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	Click,
	DblClick,
	Keydown,
	Change,
	Blur,
	Input,
}
impl EventKind {
	pub const ALL: [EventKind; 6] = [EventKind::Click, EventKind::DblClick, EventKind::Keydown, EventKind::Change, EventKind::Blur, EventKind::Input];

	/// The DOM event type.
	#[must_use]
	pub fn dom_name(self) -> &'static str {
		match self {
			EventKind::Click => "click",
			EventKind::DblClick => "dblclick",
			EventKind::Keydown => "keydown",
			EventKind::Change => "change",
			EventKind::Blur => "blur",
			EventKind::Input => "input",
		}
	}

	/// The attribute an element needs to be reported for this kind.
	#[must_use]
	pub fn listener(self) -> &'static str {
		match self {
			EventKind::Click => "on_click",
			EventKind::DblClick => "on_dblclick",
			EventKind::Keydown => "on_keydown",
			EventKind::Change => "on_change",
			EventKind::Blur => "on_blur",
			EventKind::Input => "on_input",
		}
	}
}

/// What the browser backend extracted from a native event.
#[derive(Debug, Clone)]
pub struct RawEvent<E> {
	pub kind: EventKind,
	pub target: E,
	pub modifiers: Modifiers,
	/// The pressed key, for [`EventKind::Keydown`].
	pub key: String,
	/// The new value, for [`EventKind::Input`]. Checkboxes report `"true"` or `"false"`.
	pub value: String,
	/// The target's resolved link target, if it has one.
	pub href: Option<String>,
}
impl<E> RawEvent<E> {
	pub fn new(kind: EventKind, target: E) -> Self {
		Self {
			kind,
			target,
			modifiers: Modifiers::default(),
			key: String::new(),
			value: String::new(),
			href: None,
		}
	}

	pub fn click(target: E, modifiers: Modifiers) -> Self {
		Self { modifiers, ..Self::new(EventKind::Click, target) }
	}

	pub fn keydown(target: E, key: impl Into<String>, modifiers: Modifiers) -> Self {
		Self {
			modifiers,
			key: key.into(),
			..Self::new(EventKind::Keydown, target)
		}
	}

	pub fn input(target: E, value: impl Into<String>) -> Self {
		Self { value: value.into(), ..Self::new(EventKind::Input, target) }
	}

	#[must_use]
	pub fn with_href(self, href: impl Into<String>) -> Self {
		Self { href: Some(href.into()), ..self }
	}
}

/// Whether the native event's default action must be suppressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[must_use]
pub struct Handled {
	pub prevent_default: bool,
}

/// A keydown of just one modifier, like pressing Meta on its own, is noise.
fn is_lone_modifier(keydown: &KeydownEvent) -> bool {
	let modifier = match keydown.key.as_str() {
		"Alt" => SpecialKey::Alt,
		"Control" => SpecialKey::Ctrl,
		"Shift" => SpecialKey::Shift,
		"Meta" => SpecialKey::Meta,
		_ => return false,
	};
	keydown.special_keys == [modifier]
}

struct PendingInput {
	mono_id: String,
	key: String,
	event: InEvent,
}

#[derive(Default)]
struct Outbox {
	/// Per session, in order of first event.
	batches: Vec<(String, Vec<InEvent>)>,
	/// Coalesced `input` events, latest per (session, path).
	inputs: Vec<PendingInput>,
	/// Bumped by every queued event, so only the last debounce timer flushes.
	generation: u64,
	input_tick_pending: bool,
}

pub struct EventCapture<D: Dom> {
	host: Host<D>,
	config: Rc<Config>,
	outbox: Rc<RefCell<Outbox>>,
}
impl<D: Dom> Clone for EventCapture<D> {
	fn clone(&self) -> Self {
		Self {
			host: self.host.clone(),
			config: self.config.clone(),
			outbox: self.outbox.clone(),
		}
	}
}
impl<D: Dom + 'static> EventCapture<D> {
	pub fn new(host: Host<D>, config: Rc<Config>) -> Self {
		Self {
			host,
			config,
			outbox: Rc::default(),
		}
	}

	/// Turns one native event into at most one [`InEvent`] and queues it.
	pub fn handle(&self, raw: RawEvent<D::Element>) -> Handled {
		let dom = &*self.host.dom;
		let RawEvent { kind, target, modifiers, key, value, href } = raw;
		let found = |listener: Option<&str>| {
			let found = addressing::find_listener(dom, &target, listener);
			if found.is_none() {
				trace!(kind = kind.dom_name(), "No listener.");
			}
			found
		};

		match kind {
			EventKind::Click => {
				let location = href.unwrap_or_default();
				if !location.is_empty() && location == dom.window_location() {
					return Handled::default();
				}
				if dom.tag_name(&target) == "a" && !location.is_empty() {
					// Redirect: keep the URL client-side and let the server render the new location.
					let Found { mono_id, root, .. } = match found(None) {
						Some(found) => found,
						None => return Handled::default(),
					};
					dom.push_window_location(&location);
					dom.set_attribute(&root, SKIP_FLASH, "true");
					self.post_event(&mono_id, InEvent::Location { el: addressing::Path::root(), location });
				} else {
					let Found { mono_id, path, .. } = match found(Some(kind.listener())) {
						Some(found) => found,
						None => return Handled::default(),
					};
					self.post_event(
						&mono_id,
						InEvent::Click {
							el: path,
							click: ClickEvent { special_keys: modifiers.special_keys() },
						},
					);
				}
				Handled { prevent_default: true }
			}
			EventKind::DblClick => {
				if let Some(Found { mono_id, path, .. }) = found(Some(kind.listener())) {
					self.post_event(
						&mono_id,
						InEvent::DblClick {
							el: path,
							dblclick: ClickEvent { special_keys: modifiers.special_keys() },
						},
					);
				}
				Handled::default()
			}
			EventKind::Keydown => {
				let keydown = KeydownEvent { key, special_keys: modifiers.special_keys() };
				if is_lone_modifier(&keydown) {
					return Handled::default();
				}
				if let Some(Found { mono_id, path, .. }) = found(Some(kind.listener())) {
					self.post_event(&mono_id, InEvent::Keydown { el: path, keydown });
				}
				Handled::default()
			}
			EventKind::Change => {
				if let Some(Found { mono_id, path, .. }) = found(Some(kind.listener())) {
					self.post_event(&mono_id, InEvent::Change { el: path, change: Stub::default() });
				}
				Handled::default()
			}
			EventKind::Blur => {
				if let Some(Found { mono_id, path, .. }) = found(Some(kind.listener())) {
					self.post_event(&mono_id, InEvent::Blur { el: path, blur: Stub::default() });
				}
				Handled::default()
			}
			EventKind::Input => {
				// Inputs are reported from anywhere inside a session root so the server sees every value.
				let Found { mono_id, path, .. } = match found(None) {
					Some(found) => found,
					None => return Handled::default(),
				};
				let immediate = dom.attribute(&target, kind.listener()).as_deref() == Some("immediate");
				let key = path.key();
				let event = InEvent::Input { el: path, input: InputEvent { value } };
				if immediate {
					self.outbox.borrow_mut().inputs.retain(|pending| !(pending.mono_id == mono_id && pending.key == key));
					self.post_event(&mono_id, event);
				} else {
					self.coalesce_input(mono_id, key, event);
				}
				Handled::default()
			}
		}
	}

	/// Back/forward navigation: reports the new location to the main session.
	pub fn popstate(&self) {
		let dom = &*self.host.dom;
		let root = match dom.session_roots().into_iter().next() {
			Some(root) => root,
			None => {
				debug!("popstate outside of any session.");
				return;
			}
		};
		let mono_id = match dom.attribute(&root, addressing::ROOT_MARKER) {
			Some(mono_id) => mono_id,
			None => return,
		};
		dom.set_attribute(&root, SKIP_FLASH, "true");
		self.post_event(
			&mono_id,
			InEvent::Location {
				el: addressing::Path::root(),
				location: dom.window_location(),
			},
		);
	}

	fn coalesce_input(&self, mono_id: String, key: String, event: InEvent) {
		let schedule_tick = {
			let mut outbox = self.outbox.borrow_mut();
			match outbox.inputs.iter_mut().find(|pending| pending.mono_id == mono_id && pending.key == key) {
				Some(pending) => pending.event = event,
				None => outbox.inputs.push(PendingInput { mono_id, key, event }),
			}
			!std::mem::replace(&mut outbox.input_tick_pending, true)
		};

		if schedule_tick {
			let this = self.clone();
			let tick = self.host.timers.sleep(self.config.input_flush());
			self.host.timers.spawn(Box::pin(async move {
				tick.await;
				let flush = {
					let mut outbox = this.outbox.borrow_mut();
					outbox.input_tick_pending = false;
					!outbox.inputs.is_empty()
				};
				if flush {
					this.flush();
				}
			}));
		}
	}

	fn post_event(&self, mono_id: &str, event: InEvent) {
		if cfg!(feature = "dangerous-logging") {
			trace!(?event, "Queued.");
		} else {
			trace!(kind = event.kind(), path = %event.path(), "Queued.");
		}

		let generation = {
			let mut outbox = self.outbox.borrow_mut();
			match outbox.batches.iter_mut().find(|(id, _)| id == mono_id) {
				Some((_, events)) => events.push(event),
				None => outbox.batches.push((mono_id.to_owned(), vec![event])),
			}
			outbox.generation += 1;
			outbox.generation
		};

		let this = self.clone();
		let debounce = self.host.timers.sleep(self.config.debounce());
		self.host.timers.spawn(Box::pin(async move {
			debounce.await;
			if this.outbox.borrow().generation == generation {
				this.flush();
			}
		}));
	}

	/// Sends everything queued right away, one request per session.
	///
	/// Coalesced inputs go first in their session's batch.
	pub fn flush(&self) {
		let (batches, inputs) = {
			let mut outbox = self.outbox.borrow_mut();
			(std::mem::take(&mut outbox.batches), std::mem::take(&mut outbox.inputs))
		};

		let mut sessions: Vec<(String, Vec<InEvent>)> = Vec::new();
		for PendingInput { mono_id, event, .. } in inputs {
			match sessions.iter_mut().find(|(id, _)| *id == mono_id) {
				Some((_, events)) => events.push(event),
				None => sessions.push((mono_id, vec![event])),
			}
		}
		for (mono_id, batch) in batches {
			match sessions.iter_mut().find(|(id, _)| *id == mono_id) {
				Some((_, events)) => events.extend(batch),
				None => sessions.push((mono_id, batch)),
			}
		}

		for (mono_id, events) in sessions {
			info!(mono_id = %mono_id, ">> {} event(s)", events.len());
			let host = self.host.clone();
			let url = self.config.url.clone().unwrap_or_else(|| host.dom.window_location());
			let timeout = self.config.event_timeout();
			let envelope = Envelope::Events { mono_id, events };
			self.host.timers.spawn(Box::pin(async move {
				if let Err(error) = transport::send::<_, IgnoredAny>(&*host.transport, &*host.timers, &url, &envelope, timeout).await {
					error!("can't send event: {}", error);
				}
			}));
		}
	}
}
