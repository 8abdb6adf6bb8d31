//! One-shot highlight of changed regions.
//!
//! Each flashed element gets a stable generated id (the `data-flash_id` attribute).
//! Its state lives in a table owned by the [`Flasher`], not in globals, so a session teardown can [`Flasher::cancel_all`].

use crate::platform::{Dom, Timers};
use core::time::Duration;
use hashbrown::HashMap;
use std::{cell::RefCell, rc::Rc};
use tracing::trace;

/// Marks the nearest element that should flash when something inside it changes.
pub const FLASH: &str = "flash";
/// Stops the upward search for a [`FLASH`] marker.
pub const NO_FLASH: &str = "noflash";
/// Set on a session root to suppress flashing for the next batch only.
pub const SKIP_FLASH: &str = "skip_flash";
pub const FLASH_ID: &str = "data-flash_id";

struct FlashTable<E> {
	next_id: u64,
	next_generation: u64,
	/// Flash id to the generation of the most recent trigger and the flashing element. Present while the class is on.
	active: HashMap<u64, (u64, E)>,
}
impl<E> Default for FlashTable<E> {
	fn default() -> Self {
		Self {
			next_id: 0,
			next_generation: 0,
			active: HashMap::new(),
		}
	}
}

pub struct Flasher<D: Dom> {
	dom: Rc<D>,
	timers: Rc<dyn Timers>,
	class: Rc<str>,
	duration: Duration,
	table: Rc<RefCell<FlashTable<D::Element>>>,
}
impl<D: Dom + 'static> Flasher<D> {
	pub fn new(dom: Rc<D>, timers: Rc<dyn Timers>, class: &str, duration: Duration) -> Self {
		Self {
			dom,
			timers,
			class: class.into(),
			duration,
			table: Rc::default(),
		}
	}

	/// Number of elements currently highlighted.
	#[must_use]
	pub fn active_len(&self) -> usize {
		self.table.borrow().active.len()
	}

	fn flash_id(&self, element: &D::Element) -> u64 {
		if let Some(id) = self.dom.attribute(element, FLASH_ID).and_then(|id| id.parse().ok()) {
			return id;
		}
		let mut table = self.table.borrow_mut();
		let id = table.next_id;
		table.next_id += 1;
		self.dom.set_attribute(element, FLASH_ID, &id.to_string());
		id
	}

	/// Highlights `element` for the configured duration.
	///
	/// Re-triggering an active flash restarts it: the class is removed, and re-added after a reflow on the next tick.
	/// The earlier expiry becomes a no-op.
	pub fn flash(&self, element: &D::Element) {
		let id = self.flash_id(element);
		let generation = {
			let mut table = self.table.borrow_mut();
			table.next_generation += 1;
			table.next_generation
		};
		let restarting = self.table.borrow_mut().active.insert(id, (generation, element.clone())).is_some();

		if restarting {
			trace!(id, "Restarting flash.");
			self.dom.remove_class(element, &self.class);
			let (dom, table, class, element) = (self.dom.clone(), self.table.clone(), self.class.clone(), element.clone());
			let tick = self.timers.sleep(Duration::ZERO);
			self.timers.spawn(Box::pin(async move {
				tick.await;
				if table.borrow().active.get(&id).map(|&(current, _)| current) == Some(generation) {
					dom.force_reflow(&element);
					dom.add_class(&element, &class);
				}
			}));
		} else {
			self.dom.add_class(element, &self.class);
		}

		let (dom, table, class, element) = (self.dom.clone(), self.table.clone(), self.class.clone(), element.clone());
		let expiry = self.timers.sleep(self.duration);
		self.timers.spawn(Box::pin(async move {
			expiry.await;
			let mut table = table.borrow_mut();
			if table.active.get(&id).map(|&(current, _)| current) == Some(generation) {
				table.active.remove(&id);
				drop(table);
				dom.remove_class(&element, &class);
			}
		}));
	}

	/// Ends all running flashes now. Their pending timers become no-ops.
	pub fn cancel_all(&self) {
		let active: Vec<_> = self.table.borrow_mut().active.drain().map(|(_, (_, element))| element).collect();
		for element in active {
			self.dom.remove_class(&element, &self.class);
		}
	}
}

/// The nearest element (inclusive) marked [`FLASH`], unless a [`NO_FLASH`] marker comes first.
pub fn flash_target<D: Dom + ?Sized>(dom: &D, element: &D::Element) -> Option<D::Element> {
	let mut current = Some(element.clone());
	while let Some(element) = current {
		if dom.has_attribute(&element, NO_FLASH) {
			return None;
		}
		if dom.has_attribute(&element, FLASH) {
			return Some(element);
		}
		current = dom.parent(&element);
	}
	None
}
