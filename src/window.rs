//! Window-level state that is addressed through reserved attributes rather than through the tree.

use crate::{config::Config, platform::Dom};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{trace, warn};

pub const WINDOW_TITLE: &str = "window_title";
pub const WINDOW_LOCATION: &str = "window_location";
pub const WINDOW_ICON: &str = "window_icon";
pub const WINDOW_ICON_DISABLED: &str = "window_icon_disabled";

/// A reserved attribute key that is diverted to the window instead of (only) the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAttr {
	Title,
	Location,
	Icon,
}
impl WindowAttr {
	#[must_use]
	pub fn from_key(key: &str) -> Option<Self> {
		match key {
			WINDOW_TITLE => Some(WindowAttr::Title),
			WINDOW_LOCATION => Some(WindowAttr::Location),
			WINDOW_ICON => Some(WindowAttr::Icon),
			_ => None,
		}
	}
}

pub fn set_window_title<D: Dom + ?Sized>(dom: &D, title: &str) {
	dom.set_window_title(title);
}

/// Pushes `location` into the history, unless it's already current.
pub fn set_window_location<D: Dom + ?Sized>(dom: &D, location: &str) {
	if dom.window_location() != location {
		trace!("Pushing window location.");
		dom.push_window_location(location);
	}
}

/// Sets the favicon from `root`'s `attr` attribute or, failing that, from an element with `attr` as its id.
///
/// A value starting with `#` names a template element whose content is an SVG image.
/// Anything else is used as the icon href directly.
pub fn set_window_icon<D: Dom + ?Sized>(dom: &D, root: &D::Element, attr: &str) {
	let href_or_id = dom.attribute(root, attr).filter(|value| !value.is_empty()).or_else(|| {
		let id = format!("#{}", attr);
		dom.element_by_id(attr).map(|_| id)
	});
	if let Some(href_or_id) = href_or_id {
		apply_icon(dom, &href_or_id);
	}
}

fn apply_icon<D: Dom + ?Sized>(dom: &D, href_or_id: &str) {
	if let Some(id) = href_or_id.strip_prefix('#') {
		match dom.element_by_id(id) {
			Some(template) => dom.set_favicon(&svg_to_data_url(&dom.inner_html(&template))),
			None => warn!("Window icon template #{} not found.", id),
		}
	} else {
		dom.set_favicon(href_or_id);
	}
}

#[must_use]
pub fn svg_to_data_url(svg: &str) -> String {
	format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}

/// Applies a reserved attribute's value to the window.
pub fn set<D: Dom + ?Sized>(dom: &D, root: &D::Element, attr: WindowAttr, value: &str) {
	match attr {
		WindowAttr::Title => set_window_title(dom, value),
		WindowAttr::Location => set_window_location(dom, value),
		WindowAttr::Icon => {
			if value.is_empty() {
				set_window_icon(dom, root, WINDOW_ICON)
			} else {
				apply_icon(dom, value)
			}
		}
	}
}

/// Reverts a reserved attribute on the window. Locations are never reverted.
pub fn unset<D: Dom + ?Sized>(dom: &D, root: &D::Element, attr: WindowAttr) {
	match attr {
		WindowAttr::Title => set_window_title(dom, ""),
		WindowAttr::Location => (),
		WindowAttr::Icon => set_window_icon(dom, root, WINDOW_ICON),
	}
}

/// The page-level connection affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
	Connected,
	Disconnected,
	Expired,
}

pub fn show_connection<D: Dom + ?Sized>(dom: &D, root: &D::Element, connection: Connection, config: &Config) {
	match connection {
		Connection::Connected => {
			set_window_icon(dom, root, WINDOW_ICON);
			dom.set_page_opacity(1.0);
		}
		Connection::Disconnected => {
			set_window_icon(dom, root, WINDOW_ICON_DISABLED);
			dom.set_page_opacity(config.disconnected_opacity);
		}
		Connection::Expired => {
			set_window_icon(dom, root, WINDOW_ICON_DISABLED);
			dom.set_page_opacity(config.expired_opacity);
		}
	}
}
