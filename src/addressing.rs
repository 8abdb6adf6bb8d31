//! Positional element addressing relative to a session root.
//!
//! Paths are not keyed. They stay valid only as long as the server's model of the tree and the live DOM agree on every index up to the addressed node.

use crate::platform::Dom;
use core::fmt::{self, Display, Formatter};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Attribute marking a session root. Its value is the session id.
pub const ROOT_MARKER: &str = "mono_id";

/// Child indices from the session root downwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<usize>);
impl Path {
	#[must_use]
	pub fn root() -> Self {
		Self(Vec::new())
	}

	/// The comma-joined form, used as a map key.
	#[must_use]
	pub fn key(&self) -> String {
		let mut key = String::new();
		for (i, index) in self.0.iter().enumerate() {
			if i > 0 {
				key.push(',');
			}
			key.push_str(&index.to_string());
		}
		key
	}

	#[must_use]
	pub fn is_root(&self) -> bool {
		self.0.is_empty()
	}
}
impl From<Vec<usize>> for Path {
	fn from(indices: Vec<usize>) -> Self {
		Self(indices)
	}
}
impl Display for Path {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "[{}]", self.key())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("wrong path {path}: child index {index} is out of bounds at depth {depth} (only {len} children)")]
pub struct AddressingError {
	pub path: Path,
	pub depth: usize,
	pub index: usize,
	pub len: usize,
}

/// Descends from `root` by `path`.
///
/// # Errors
///
/// Iff an index is out of bounds at any step.
pub fn resolve<D: Dom + ?Sized>(dom: &D, root: &D::Element, path: &Path) -> Result<D::Element, AddressingError> {
	let mut element = root.clone();
	for (depth, &index) in path.0.iter().enumerate() {
		element = match dom.child(&element, index) {
			Some(child) => child,
			None => {
				return Err(AddressingError {
					path: path.clone(),
					depth,
					index,
					len: dom.children_len(&element),
				})
			}
		};
	}
	Ok(element)
}

/// The element position within its parent's element children.
pub fn index_in_parent<D: Dom + ?Sized>(dom: &D, parent: &D::Element, element: &D::Element) -> Option<usize> {
	(0..dom.children_len(parent)).find(|&i| dom.child(parent, i).as_ref() == Some(element))
}

/// An interested element, addressed from its session root.
#[derive(Debug, Clone, PartialEq)]
pub struct Found<E> {
	pub mono_id: String,
	pub root: E,
	pub path: Path,
	/// The nearest element (inclusive) that carries the listener marker.
	pub listener: E,
}

/// Walks up from `target` to the nearest session root, looking for an element carrying `listener` on the way.
///
/// The returned path addresses the listening element, not necessarily `target` itself.
/// With `listener: None`, any element inside a session root qualifies.
///
/// Returns [`None`] if no listener was found before reaching a root, or if `target` isn't inside one at all.
pub fn find_listener<D: Dom + ?Sized>(dom: &D, target: &D::Element, listener: Option<&str>) -> Option<Found<D::Element>> {
	let mut indices = Vec::new();
	let mut current = target.clone();
	let mut listening = None;
	loop {
		if listening.is_none() && listener.map_or(true, |listener| dom.has_attribute(&current, listener)) {
			listening = Some(current.clone());
		}
		if let Some(listening) = &listening {
			if let Some(mono_id) = dom.attribute(&current, ROOT_MARKER) {
				indices.reverse();
				return Some(Found {
					mono_id,
					root: current,
					path: Path(indices),
					listener: listening.clone(),
				});
			}
		}
		let parent = dom.parent(&current)?;
		if listening.is_some() {
			match index_in_parent(dom, &parent, &current) {
				Some(index) => indices.push(index),
				None => {
					trace!("Element not among its parent's children. Ignoring.");
					return None;
				}
			}
		}
		current = parent;
	}
}
