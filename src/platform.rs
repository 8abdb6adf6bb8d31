//! The seams between the protocol engine and whatever actually hosts the page.
//!
//! Everything here is single-threaded: handles are shared through [`Rc`], futures are [`LocalBoxFuture`]s.

use crate::transport::Transport;
use core::{fmt::Debug, time::Duration};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use thiserror::Error;

/// A live element tree plus the window-level surface around it.
///
/// Child indices count **elements** only, never text or comment nodes.
/// All structural mutation of the session subtree must go through [`crate::diff::Updater`];
/// anything else desynchronises positional [`crate::Path`]s from the server's view.
pub trait Dom {
	/// A cheap handle to one element. Equality is identity.
	type Element: Clone + PartialEq + Debug;

	/// All elements carrying a `mono_id` attribute, in document order.
	fn session_roots(&self) -> Vec<Self::Element>;
	fn element_by_id(&self, id: &str) -> Option<Self::Element>;

	fn children_len(&self, element: &Self::Element) -> usize;
	fn child(&self, element: &Self::Element, index: usize) -> Option<Self::Element>;
	fn parent(&self, element: &Self::Element) -> Option<Self::Element>;
	/// ASCII-lowercase.
	fn tag_name(&self, element: &Self::Element) -> String;

	fn attribute(&self, element: &Self::Element, name: &str) -> Option<String>;
	fn has_attribute(&self, element: &Self::Element, name: &str) -> bool {
		self.attribute(element, name).is_some()
	}
	fn set_attribute(&self, element: &Self::Element, name: &str, value: &str);
	fn remove_attribute(&self, element: &Self::Element, name: &str);

	/// Sets a script-level property, like an input's live `value`.
	fn set_string_property(&self, element: &Self::Element, name: &str, value: &str);
	fn set_bool_property(&self, element: &Self::Element, name: &str, value: bool);
	fn delete_property(&self, element: &Self::Element, name: &str);

	/// Parses `html` detached from the document and returns its top-level elements.
	fn parse_html(&self, html: &str) -> Vec<Self::Element>;
	/// Puts `new` into `old`'s slot.
	fn replace_element(&self, old: &Self::Element, new: &Self::Element);
	fn append_child(&self, parent: &Self::Element, child: &Self::Element);
	fn remove_last_child(&self, parent: &Self::Element);
	/// Replaces all content of `element` with a single text node.
	fn set_text(&self, element: &Self::Element, text: &str);
	fn set_inner_html(&self, element: &Self::Element, html: &str);
	fn inner_html(&self, element: &Self::Element) -> String;

	fn add_class(&self, element: &Self::Element, class: &str);
	fn remove_class(&self, element: &Self::Element, class: &str);
	/// Forces a synchronous style/layout pass so a re-added class restarts its transition.
	fn force_reflow(&self, element: &Self::Element);

	fn window_location(&self) -> String;
	/// Pushes `location` into the session history without navigating.
	fn push_window_location(&self, location: &str);
	fn set_window_title(&self, title: &str);
	fn set_favicon(&self, href: &str);
	fn set_page_opacity(&self, opacity: f32);
	fn alert(&self, message: &str);
}

/// Single-threaded timers and task spawning.
pub trait Timers {
	fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
	fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

#[derive(Debug, Error)]
pub enum ScriptError {
	#[error("script evaluation is disabled")]
	Disabled,
	#[error("script threw: {0}")]
	Thrown(String),
}

/// Where server-sent `eval` code goes.
///
/// The code runs with access to the current document and session.
/// Deployments that don't trust their server with that can plug in [`DisabledScripts`].
pub trait ScriptSink {
	/// # Errors
	///
	/// Iff the script could not be run or threw.
	fn eval(&self, code: &str) -> Result<(), ScriptError>;
}

/// Refuses every script.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledScripts;
impl ScriptSink for DisabledScripts {
	fn eval(&self, _code: &str) -> Result<(), ScriptError> {
		Err(ScriptError::Disabled)
	}
}

/// Everything a session needs from its environment.
pub struct Host<D: Dom> {
	pub dom: Rc<D>,
	pub transport: Rc<dyn Transport>,
	pub timers: Rc<dyn Timers>,
	pub scripts: Rc<dyn ScriptSink>,
}
impl<D: Dom> Host<D> {
	pub fn new(dom: Rc<D>, transport: Rc<dyn Transport>, timers: Rc<dyn Timers>, scripts: Rc<dyn ScriptSink>) -> Self {
		Self { dom, transport, timers, scripts }
	}
}
impl<D: Dom> Clone for Host<D> {
	fn clone(&self) -> Self {
		Self {
			dom: self.dom.clone(),
			transport: self.transport.clone(),
			timers: self.timers.clone(),
			scripts: self.scripts.clone(),
		}
	}
}
