//! The browser backend.
//!
//! [`run`] is the page entry point: it reads the session root, attaches one delegated listener per event kind and starts the pull loop.

use crate::{
	addressing::ROOT_MARKER,
	config::Config,
	events::{EventCapture, EventKind, RawEvent},
	platform::{DisabledScripts, Dom, Host, ScriptError, ScriptSink, Timers},
	protocol::Modifiers,
	session::Session,
	transport::{Transport, TransportError},
};
use core::time::Duration;
use futures::future::LocalBoxFuture;
use js_sys::{Object, Promise, Reflect};
use std::rc::Rc;
use tracing::{error, info};
use wasm_bindgen::{closure::Closure, prelude::wasm_bindgen, JsCast, JsValue};
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{Document, Element, HtmlAnchorElement, HtmlElement, HtmlInputElement, HtmlLinkElement, KeyboardEvent, MouseEvent, Request, RequestInit, Response, Window};

/// Attribute on the session root holding a JSON [`Config`].
pub const CONFIG_ATTRIBUTE: &str = "mono_config";

#[derive(Debug, Clone)]
pub struct WebDom {
	window: Window,
	document: Document,
}
impl WebDom {
	/// # Errors
	///
	/// Iff `window` has no document.
	pub fn new(window: Window) -> Result<Self, JsValue> {
		let document = window.document().ok_or_else(|| JsValue::from_str("mono: No document found."))?;
		Ok(Self { window, document })
	}
}

fn log_js_error(action: &str, result: Result<impl Sized, JsValue>) {
	if let Err(error) = result {
		error!("Failed to {}: {:?}", action, error);
	}
}

impl Dom for WebDom {
	type Element = Element;

	fn session_roots(&self) -> Vec<Element> {
		let selector = format!("[{}]", ROOT_MARKER);
		match self.document.query_selector_all(&selector) {
			Ok(nodes) => (0..nodes.length()).filter_map(|i| nodes.item(i)).filter_map(|node| node.dyn_into::<Element>().ok()).collect(),
			Err(error) => {
				error!("Failed to query session roots: {:?}", error);
				Vec::new()
			}
		}
	}

	fn element_by_id(&self, id: &str) -> Option<Element> {
		self.document.get_element_by_id(id)
	}

	fn children_len(&self, element: &Element) -> usize {
		element.children().length() as usize
	}

	fn child(&self, element: &Element, index: usize) -> Option<Element> {
		element.children().item(u32::try_from(index).ok()?)
	}

	fn parent(&self, element: &Element) -> Option<Element> {
		element.parent_element()
	}

	fn tag_name(&self, element: &Element) -> String {
		element.tag_name().to_ascii_lowercase()
	}

	fn attribute(&self, element: &Element, name: &str) -> Option<String> {
		element.get_attribute(name)
	}

	fn has_attribute(&self, element: &Element, name: &str) -> bool {
		element.has_attribute(name)
	}

	fn set_attribute(&self, element: &Element, name: &str, value: &str) {
		log_js_error("set attribute", element.set_attribute(name, value));
	}

	fn remove_attribute(&self, element: &Element, name: &str) {
		log_js_error("remove attribute", element.remove_attribute(name));
	}

	fn set_string_property(&self, element: &Element, name: &str, value: &str) {
		log_js_error("set property", Reflect::set(element, &JsValue::from_str(name), &JsValue::from_str(value)));
	}

	fn set_bool_property(&self, element: &Element, name: &str, value: bool) {
		log_js_error("set property", Reflect::set(element, &JsValue::from_str(name), &JsValue::from_bool(value)));
	}

	fn delete_property(&self, element: &Element, name: &str) {
		log_js_error("delete property", Reflect::delete_property(element.unchecked_ref::<Object>(), &JsValue::from_str(name)));
	}

	fn parse_html(&self, html: &str) -> Vec<Element> {
		let container = match self.document.create_element("div") {
			Ok(container) => container,
			Err(error) => {
				error!("Failed to create fragment container: {:?}", error);
				return Vec::new();
			}
		};
		container.set_inner_html(html);
		let children = container.children();
		(0..children.length()).filter_map(|i| children.item(i)).collect()
	}

	fn replace_element(&self, old: &Element, new: &Element) {
		log_js_error("replace element", old.replace_with_with_node_1(new));
	}

	fn append_child(&self, parent: &Element, child: &Element) {
		log_js_error("append child", parent.append_child(child));
	}

	fn remove_last_child(&self, parent: &Element) {
		if let Some(last) = parent.last_element_child() {
			last.remove();
		}
	}

	fn set_text(&self, element: &Element, text: &str) {
		element.set_text_content(Some(text));
	}

	fn set_inner_html(&self, element: &Element, html: &str) {
		element.set_inner_html(html);
	}

	fn inner_html(&self, element: &Element) -> String {
		element.inner_html()
	}

	fn add_class(&self, element: &Element, class: &str) {
		log_js_error("add class", element.class_list().add_1(class));
	}

	fn remove_class(&self, element: &Element, class: &str) {
		log_js_error("remove class", element.class_list().remove_1(class));
	}

	fn force_reflow(&self, element: &Element) {
		if let Some(element) = element.dyn_ref::<HtmlElement>() {
			// Reading layout flushes pending style changes.
			let _ = element.offset_width();
		}
	}

	fn window_location(&self) -> String {
		self.window.location().href().unwrap_or_default()
	}

	fn push_window_location(&self, location: &str) {
		match self.window.history() {
			Ok(history) => log_js_error("push history state", history.push_state_with_url(&Object::new(), "", Some(location))),
			Err(error) => error!("No history: {:?}", error),
		}
	}

	fn set_window_title(&self, title: &str) {
		self.document.set_title(title);
	}

	fn set_favicon(&self, href: &str) {
		let existing = self.document.query_selector("link[rel~='icon']").ok().flatten().and_then(|link| link.dyn_into::<HtmlLinkElement>().ok());
		let link = match existing {
			Some(link) => link,
			None => {
				let link = match self.document.create_element("link").map(JsCast::unchecked_into::<HtmlLinkElement>) {
					Ok(link) => link,
					Err(error) => {
						error!("Failed to create favicon link: {:?}", error);
						return;
					}
				};
				link.set_rel("icon");
				match self.document.head() {
					Some(head) => log_js_error("insert favicon link", head.append_child(&link)),
					None => {
						error!("No <head> to put the favicon into.");
						return;
					}
				}
				link
			}
		};
		if link.href() != href {
			link.set_href(href);
		}
	}

	fn set_page_opacity(&self, opacity: f32) {
		if let Some(body) = self.document.body() {
			log_js_error("set opacity", body.style().set_property("opacity", &opacity.to_string()));
		}
	}

	fn alert(&self, message: &str) {
		log_js_error("alert", self.window.alert_with_message(message));
	}
}

/// `fetch`-based [`Transport`].
#[derive(Debug, Clone)]
pub struct FetchTransport {
	window: Window,
}
impl FetchTransport {
	#[must_use]
	pub fn new(window: Window) -> Self {
		Self { window }
	}
}

fn network_error(error: JsValue) -> TransportError {
	TransportError::Network(format!("{:?}", error))
}

impl Transport for FetchTransport {
	fn post(&self, url: &str, body: String) -> LocalBoxFuture<'static, Result<String, TransportError>> {
		let window = self.window.clone();
		let url = url.to_owned();
		Box::pin(async move {
			let init = RequestInit::new();
			init.set_method("POST");
			init.set_body(&JsValue::from_str(&body));
			let request = Request::new_with_str_and_init(&url, &init).map_err(network_error)?;

			let response: Response = JsFuture::from(window.fetch_with_request(&request)).await.map_err(network_error)?.dyn_into().map_err(network_error)?;
			let text = JsFuture::from(response.text().map_err(network_error)?).await.map_err(network_error)?.as_string().unwrap_or_default();
			if response.status() != 200 {
				return Err(TransportError::Status { status: response.status(), body: text });
			}
			Ok(text)
		})
	}
}

/// `setTimeout` and the `wasm-bindgen-futures` executor.
#[derive(Debug, Clone)]
pub struct WebTimers {
	window: Window,
}
impl WebTimers {
	#[must_use]
	pub fn new(window: Window) -> Self {
		Self { window }
	}
}
impl Timers for WebTimers {
	fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
		let window = self.window.clone();
		let ms = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
		let promise = Promise::new(&mut |resolve, _reject| {
			log_js_error("set timeout", window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms));
		});
		Box::pin(async move {
			let _ = JsFuture::from(promise).await;
		})
	}

	fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
		spawn_local(task);
	}
}

/// Runs server-sent code through the global `eval`, in strict mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvalScripts;
impl ScriptSink for EvalScripts {
	fn eval(&self, code: &str) -> Result<(), ScriptError> {
		js_sys::eval(&format!("'use strict'; {}", code)).map(drop).map_err(|error| ScriptError::Thrown(format!("{:?}", error)))
	}
}

fn raw_event(kind: EventKind, event: &web_sys::Event) -> Option<RawEvent<Element>> {
	let target = event.target()?.dyn_into::<Element>().ok()?;
	let mut raw = RawEvent::new(kind, target);

	if let Some(mouse) = event.dyn_ref::<MouseEvent>() {
		raw.modifiers = Modifiers {
			alt: mouse.alt_key(),
			ctrl: mouse.ctrl_key(),
			shift: mouse.shift_key(),
			meta: mouse.meta_key(),
		};
	}
	if let Some(keyboard) = event.dyn_ref::<KeyboardEvent>() {
		raw.modifiers = Modifiers {
			alt: keyboard.alt_key(),
			ctrl: keyboard.ctrl_key(),
			shift: keyboard.shift_key(),
			meta: keyboard.meta_key(),
		};
		raw.key = keyboard.key();
	}
	if kind == EventKind::Input {
		raw.value = match raw.target.dyn_ref::<HtmlInputElement>() {
			Some(input) if input.type_() == "checkbox" => input.checked().to_string(),
			Some(input) => input.value(),
			None => Reflect::get(&raw.target, &JsValue::from_str("value")).ok().and_then(|value| value.as_string()).unwrap_or_default(),
		};
	}
	if let Some(anchor) = raw.target.dyn_ref::<HtmlAnchorElement>() {
		raw.href = Some(anchor.href());
	}
	Some(raw)
}

/// Attaches one delegated listener per [`EventKind`] to `<body>`, plus `popstate` on the window.
///
/// The listeners live as long as the page.
///
/// # Errors
///
/// Iff there's no `<body>` or a listener can't be attached.
pub fn listen(capture: &EventCapture<WebDom>, window: &Window, document: &Document) -> Result<(), JsValue> {
	let body = document.body().ok_or_else(|| JsValue::from_str("mono: No <body> found."))?;
	for kind in EventKind::ALL {
		let capture = capture.clone();
		let listener = Closure::wrap(Box::new(move |event: web_sys::Event| {
			if let Some(raw) = raw_event(kind, &event) {
				if capture.handle(raw).prevent_default {
					event.prevent_default();
				}
			}
		}) as Box<dyn FnMut(web_sys::Event)>);
		// `blur` doesn't bubble.
		let use_capture = kind == EventKind::Blur;
		body.add_event_listener_with_callback_and_bool(kind.dom_name(), listener.as_ref().unchecked_ref(), use_capture)?;
		listener.forget();
	}

	let capture = capture.clone();
	let popstate = Closure::wrap(Box::new(move |_: web_sys::Event| capture.popstate()) as Box<dyn FnMut(web_sys::Event)>);
	window.add_event_listener_with_callback("popstate", popstate.as_ref().unchecked_ref())?;
	popstate.forget();
	Ok(())
}

/// Starts the client for the page's session root.
///
/// # Errors
///
/// Iff the page has no usable session root, its `mono_config` is invalid, or the listeners can't be attached.
#[wasm_bindgen]
pub fn run() -> Result<(), JsValue> {
	tracing_wasm::set_as_global_default();

	let window = web_sys::window().ok_or_else(|| JsValue::from_str("mono: No window found."))?;
	let dom = Rc::new(WebDom::new(window.clone())?);

	let config = match dom.session_roots().first().and_then(|root| root.get_attribute(CONFIG_ATTRIBUTE)) {
		Some(json) => Config::from_json(&json).map_err(|error| JsValue::from_str(&format!("mono: Invalid {}: {}", CONFIG_ATTRIBUTE, error)))?,
		None => Config::default(),
	};
	let config = Rc::new(config);
	let scripts: Rc<dyn ScriptSink> = if config.allow_eval { Rc::new(EvalScripts) } else { Rc::new(DisabledScripts) };

	let document = dom.document.clone();
	let host = Host::new(dom, Rc::new(FetchTransport::new(window.clone())), Rc::new(WebTimers::new(window.clone())), scripts);
	listen(&EventCapture::new(host.clone(), config.clone()), &window, &document)?;

	let session = Session::start(host, config).map_err(|error| JsValue::from_str(&error.to_string()))?;
	spawn_local(async move {
		match session.run().await {
			Ok(end) => info!("Session ended: {:?}", end),
			Err(error) => error!("Session failed: {}", error),
		}
	});
	Ok(())
}
