//! Applies server-computed diff batches to the live tree.
//!
//! Instructions run strictly in order and every path is resolved fresh, since earlier instructions in a batch may move or create what later ones address.
//! Any failure aborts the rest of the batch. There is no rollback: a desynchronised tree can't be repaired client-side.

use crate::{
	addressing::{self, AddressingError, Path},
	flash::{self, Flasher, SKIP_FLASH},
	platform::Dom,
	protocol::{AttrKey, AttrKind, AttrValue, Attrs, Diff},
	window::{self, WindowAttr},
};
use std::rc::Rc;
use thiserror::Error;
use tracing::{error, instrument, trace, trace_span};

#[derive(Debug, Error)]
pub enum DiffError {
	#[error(transparent)]
	Addressing(#[from] AddressingError),
	#[error("exactly one element expected at {path}, but the fragment has {count}")]
	Fragment { path: Path, count: usize },
	#[error("can't grow children at {path} from {current} to {requested}")]
	Grow { path: Path, current: usize, requested: usize },
	#[error("invalid bool_prop value for {name:?}: {value:?}")]
	BoolProp { name: String, value: String },
}

pub struct Updater<D: Dom> {
	dom: Rc<D>,
	flasher: Rc<Flasher<D>>,
}
impl<D: Dom + 'static> Updater<D> {
	pub fn new(dom: Rc<D>, flasher: Rc<Flasher<D>>) -> Self {
		Self { dom, flasher }
	}

	/// Applies `diffs` below `root`, then flashes every distinct region they touched, once.
	///
	/// Flashing is skipped (and the marker cleared) if `root` carries [`SKIP_FLASH`].
	///
	/// # Errors
	///
	/// On the first instruction that can't be applied. Earlier instructions stay applied and nothing is flashed.
	#[instrument(skip(self, diffs), fields(diffs = diffs.len()))]
	pub fn apply(&self, root: &D::Element, diffs: &[Diff]) -> Result<(), DiffError> {
		let mut batch = Batch {
			dom: &*self.dom,
			root,
			flash: Vec::new(),
		};
		for diff in diffs {
			let span = trace_span!("diff", kind = diff.kind(), path = %diff.path());
			let _enter = span.enter();
			if let Err(error) = batch.apply(diff) {
				error!("{}", error);
				return Err(error);
			}
		}

		if self.dom.has_attribute(root, SKIP_FLASH) {
			trace!("Skipping flash for {} element(s).", batch.flash.len());
		} else {
			for element in &batch.flash {
				self.flasher.flash(element);
			}
		}
		self.dom.remove_attribute(root, SKIP_FLASH);
		Ok(())
	}
}

struct Batch<'a, D: Dom> {
	dom: &'a D,
	root: &'a D::Element,
	/// Deduplicated, in first-touch order.
	flash: Vec<D::Element>,
}
impl<'a, D: Dom> Batch<'a, D> {
	fn resolve(&self, path: &Path) -> Result<D::Element, AddressingError> {
		addressing::resolve(self.dom, self.root, path)
	}

	fn apply(&mut self, diff: &Diff) -> Result<(), DiffError> {
		match diff {
			Diff::Replace { path, html } => {
				let old = self.resolve(path)?;
				let new = self.build(path, html)?;
				self.dom.replace_element(&old, &new);
				self.touch(&new);
			}
			Diff::AddChildren { path, htmls } => {
				for html in htmls {
					let parent = self.resolve(path)?;
					let child = self.build(path, html)?;
					self.dom.append_child(&parent, &child);
					self.touch(&child);
				}
			}
			&Diff::SetChildrenLen { ref path, len } => {
				let parent = self.resolve(path)?;
				let current = self.dom.children_len(&parent);
				if current < len {
					return Err(DiffError::Grow {
						path: path.clone(),
						current,
						requested: len,
					});
				}
				for _ in len..current {
					self.dom.remove_last_child(&parent);
				}
				// The removed elements are gone, so the parent flashes instead.
				self.touch(&parent);
			}
			Diff::SetAttrs { path, attrs: Attrs(attrs) } => {
				let element = self.resolve(path)?;
				for (name, value) in attrs {
					self.set_attr(&element, name, value)?;
				}
				self.touch(&element);
			}
			Diff::DelAttrs { path, attrs } => {
				let element = self.resolve(path)?;
				for key in attrs {
					self.del_attr(&element, key);
				}
				self.touch(&element);
			}
			Diff::SetText { path, text } => {
				let element = self.resolve(path)?;
				self.dom.set_text(&element, text);
				self.touch(&element);
			}
			Diff::SetHtml { path, html } => {
				let element = self.resolve(path)?;
				self.dom.set_inner_html(&element, html);
				self.touch(&element);
			}
		}
		Ok(())
	}

	fn build(&self, path: &Path, html: &str) -> Result<D::Element, DiffError> {
		let mut elements = self.dom.parse_html(html);
		if elements.len() != 1 {
			return Err(DiffError::Fragment {
				path: path.clone(),
				count: elements.len(),
			});
		}
		Ok(elements.remove(0))
	}

	fn set_attr(&self, element: &D::Element, name: &str, AttrValue { value, kind }: &AttrValue) -> Result<(), DiffError> {
		if let Some(window_attr) = WindowAttr::from_key(name) {
			window::set(self.dom, self.root, window_attr, value);
		}

		match kind {
			AttrKind::StringAttr => self.dom.set_attribute(element, name, value),
			AttrKind::StringProp => self.dom.set_string_property(element, name, value),
			AttrKind::BoolProp => {
				let value = match value.as_str() {
					"true" => true,
					"false" => false,
					_ => {
						return Err(DiffError::BoolProp {
							name: name.to_owned(),
							value: value.clone(),
						})
					}
				};
				self.dom.set_bool_property(element, name, value)
			}
		}
		Ok(())
	}

	fn del_attr(&self, element: &D::Element, AttrKey { name, kind }: &AttrKey) {
		match kind {
			AttrKind::StringAttr => self.dom.remove_attribute(element, name),
			AttrKind::StringProp => {
				self.dom.delete_property(element, name);
				self.dom.remove_attribute(element, name);
			}
			AttrKind::BoolProp => self.dom.set_bool_property(element, name, false),
		}

		if let Some(window_attr) = WindowAttr::from_key(name) {
			window::unset(self.dom, self.root, window_attr);
		}
	}

	fn touch(&mut self, element: &D::Element) {
		if let Some(target) = flash::flash_target(self.dom, element) {
			if !self.flash.contains(&target) {
				self.flash.push(target);
			}
		}
	}
}
