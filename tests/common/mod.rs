#![allow(dead_code)]

use core::time::Duration;
use futures::future::{self, LocalBoxFuture};
use mono_client::{
	mem::{MemDom, MemElement},
	platform::DisabledScripts,
	Config, Dom, Host, ScriptSink, Timers, Transport, TransportError,
};
use serde_json::Value;
use std::{
	cell::{Cell, RefCell},
	collections::VecDeque,
	rc::Rc,
};
use tokio::time::Instant;

pub const LOCATION: &str = "http://app.test/";

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

/// Paused-clock timers. Spawning requires a [`tokio::task::LocalSet`].
pub struct TokioTimers;
impl Timers for TokioTimers {
	fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
		Box::pin(tokio::time::sleep(duration))
	}

	fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
		drop(tokio::task::spawn_local(task));
	}
}

pub enum Reply {
	Ok(String),
	Fail,
	Status(u16),
	Hang,
	Delayed(Duration, String),
}
impl Reply {
	pub fn json(value: Value) -> Self {
		Reply::Ok(value.to_string())
	}
}

#[derive(Debug, Clone)]
pub struct Request {
	pub url: String,
	pub body: Value,
	pub at: Instant,
}
impl Request {
	pub fn is_pull(&self) -> bool {
		self.body["kind"] == "pull"
	}
}

#[derive(Default)]
struct Inner {
	requests: RefCell<Vec<Request>>,
	pulls: RefCell<VecDeque<Reply>>,
	events: RefCell<VecDeque<Reply>>,
	pulls_in_flight: Cell<usize>,
	max_pulls_in_flight: Cell<usize>,
}

/// Scripted server. Pulls without a scripted reply hang, event posts without one get `{}`.
#[derive(Clone, Default)]
pub struct MockTransport {
	inner: Rc<Inner>,
}
impl MockTransport {
	pub fn reply_to_pull(&self, reply: Reply) -> &Self {
		self.inner.pulls.borrow_mut().push_back(reply);
		self
	}

	pub fn reply_to_events(&self, reply: Reply) -> &Self {
		self.inner.events.borrow_mut().push_back(reply);
		self
	}

	pub fn requests(&self) -> Vec<Request> {
		self.inner.requests.borrow().clone()
	}

	pub fn pulls(&self) -> Vec<Request> {
		self.requests().into_iter().filter(Request::is_pull).collect()
	}

	pub fn event_posts(&self) -> Vec<Request> {
		self.requests().into_iter().filter(|request| !request.is_pull()).collect()
	}

	pub fn max_pulls_in_flight(&self) -> usize {
		self.inner.max_pulls_in_flight.get()
	}
}

struct PullGuard(Rc<Inner>);
impl Drop for PullGuard {
	fn drop(&mut self) {
		self.0.pulls_in_flight.set(self.0.pulls_in_flight.get() - 1);
	}
}

impl Transport for MockTransport {
	fn post(&self, url: &str, body: String) -> LocalBoxFuture<'static, Result<String, TransportError>> {
		let body: Value = serde_json::from_str(&body).unwrap();
		let request = Request { url: url.to_owned(), body, at: Instant::now() };
		let pull = request.is_pull();
		let reply = if pull {
			self.inner.pulls.borrow_mut().pop_front().unwrap_or(Reply::Hang)
		} else {
			self.inner.events.borrow_mut().pop_front().unwrap_or_else(|| Reply::Ok("{}".to_owned()))
		};
		self.inner.requests.borrow_mut().push(request);

		let guard = pull.then(|| {
			let in_flight = self.inner.pulls_in_flight.get() + 1;
			self.inner.pulls_in_flight.set(in_flight);
			self.inner.max_pulls_in_flight.set(self.inner.max_pulls_in_flight.get().max(in_flight));
			PullGuard(self.inner.clone())
		});
		Box::pin(async move {
			let _guard = guard;
			match reply {
				Reply::Ok(text) => Ok(text),
				Reply::Fail => Err(TransportError::Network("connection refused".to_owned())),
				Reply::Status(status) => Err(TransportError::Status { status, body: String::new() }),
				Reply::Hang => future::pending().await,
				Reply::Delayed(delay, text) => {
					tokio::time::sleep(delay).await;
					Ok(text)
				}
			}
		})
	}
}

pub struct Harness {
	pub dom: Rc<MemDom>,
	pub transport: MockTransport,
	pub host: Host<MemDom>,
	pub config: Rc<Config>,
}

pub fn harness(body_html: &str) -> Harness {
	harness_with(body_html, Config::default(), Rc::new(DisabledScripts))
}

pub fn harness_with(body_html: &str, config: Config, scripts: Rc<dyn ScriptSink>) -> Harness {
	init_tracing();
	let dom = Rc::new(MemDom::new(LOCATION, body_html));
	let transport = MockTransport::default();
	let host = Host::new(dom.clone(), Rc::new(transport.clone()), Rc::new(TokioTimers), scripts);
	Harness {
		dom,
		transport,
		host,
		config: Rc::new(config),
	}
}

/// The first session root.
pub fn root(dom: &MemDom) -> MemElement {
	dom.session_roots().remove(0)
}

/// Follows element child indices from `element`.
pub fn at(dom: &MemDom, element: &MemElement, indices: &[usize]) -> MemElement {
	indices.iter().fold(element.clone(), |element, &index| dom.child(&element, index).unwrap())
}

pub fn has_class(dom: &MemDom, element: &MemElement, class: &str) -> bool {
	dom.attribute(element, "class").unwrap_or_default().split_whitespace().any(|c| c == class)
}
