//! Wire format, JSON over HTTP POST.
//!
//! Client to server: [`Envelope`], either a `pull` or a batch of [`InEvent`]s.
//! Server to client: a [`PullResponse`] that normalises to a list of [`Directive`]s.
//!
//! Diffs use the ordered instruction-array encoding, e.g. `["set_text", [0], "2"]`.

use crate::addressing::Path;
use core::fmt::{self, Formatter};
use serde::{
	de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor},
	ser::{SerializeMap, SerializeSeq},
	Deserialize, Deserializer, Serialize, Serializer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialKey {
	Alt,
	Ctrl,
	Shift,
	Meta,
}

/// Pressed modifiers of a pointer or keyboard event.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
	pub alt: bool,
	pub ctrl: bool,
	pub shift: bool,
	pub meta: bool,
}
impl Modifiers {
	/// In wire order: alt, ctrl, shift, meta.
	#[must_use]
	pub fn special_keys(self) -> Vec<SpecialKey> {
		[(self.alt, SpecialKey::Alt), (self.ctrl, SpecialKey::Ctrl), (self.shift, SpecialKey::Shift), (self.meta, SpecialKey::Meta)]
			.iter()
			.filter(|(pressed, _)| *pressed)
			.map(|&(_, key)| key)
			.collect()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
	pub special_keys: Vec<SpecialKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeydownEvent {
	pub key: String,
	pub special_keys: Vec<SpecialKey>,
}

/// Payload of events that carry no data of their own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stub {
	pub stub: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
	pub value: String,
}

/// One user interaction, attributed to the listening element at `el`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InEvent {
	/// `el` is always the root path; the server requires the field.
	Location { el: Path, location: String },
	Click { el: Path, click: ClickEvent },
	#[serde(rename = "dblclick")]
	DblClick { el: Path, dblclick: ClickEvent },
	Keydown { el: Path, keydown: KeydownEvent },
	Change { el: Path, change: Stub },
	Blur { el: Path, blur: Stub },
	Input { el: Path, input: InputEvent },
}
impl InEvent {
	#[must_use]
	pub fn path(&self) -> &Path {
		match self {
			InEvent::Location { el, .. }
			| InEvent::Click { el, .. }
			| InEvent::DblClick { el, .. }
			| InEvent::Keydown { el, .. }
			| InEvent::Change { el, .. }
			| InEvent::Blur { el, .. }
			| InEvent::Input { el, .. } => el,
		}
	}

	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			InEvent::Location { .. } => "location",
			InEvent::Click { .. } => "click",
			InEvent::DblClick { .. } => "dblclick",
			InEvent::Keydown { .. } => "keydown",
			InEvent::Change { .. } => "change",
			InEvent::Blur { .. } => "blur",
			InEvent::Input { .. } => "input",
		}
	}
}

/// Client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
	Events { mono_id: String, events: Vec<InEvent> },
	Pull { mono_id: String },
}

/// Server to client, one entry of a pull response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
	/// Run `code` as a one-off script.
	Eval { code: String },
	Update { diffs: Vec<Diff> },
	/// Heartbeat.
	Ignore,
	/// The session is gone. Terminal.
	Expired,
	/// Fatal.
	Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Wrapped {
	Events { events: Vec<Directive> },
}

/// Every shape a pull response has had: an array of directives, the `events` wrapper, or a bare directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PullResponse {
	Batch(Vec<Directive>),
	Wrapped(Wrapped),
	Single(Directive),
}
impl PullResponse {
	#[must_use]
	pub fn into_directives(self) -> Vec<Directive> {
		match self {
			PullResponse::Batch(directives) | PullResponse::Wrapped(Wrapped::Events { events: directives }) => directives,
			PullResponse::Single(directive) => vec![directive],
		}
	}
}

/// How an attribute value is applied to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrKind {
	/// A plain DOM attribute.
	StringAttr,
	/// A script-level property, like an input's live value.
	StringProp,
	/// A boolean property. The value must be exactly `"true"` or `"false"`.
	BoolProp,
}
impl Default for AttrKind {
	fn default() -> Self {
		AttrKind::StringAttr
	}
}

/// `"value"` or `["value", kind]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Tagged", into = "Tagged")]
pub struct AttrValue {
	pub value: String,
	pub kind: AttrKind,
}
impl AttrValue {
	pub fn new(value: impl Into<String>, kind: AttrKind) -> Self {
		Self { value: value.into(), kind }
	}
}

/// `"name"` or `["name", kind]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Tagged", into = "Tagged")]
pub struct AttrKey {
	pub name: String,
	pub kind: AttrKind,
}
impl AttrKey {
	pub fn new(name: impl Into<String>, kind: AttrKind) -> Self {
		Self { name: name.into(), kind }
	}
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Tagged {
	Plain(String),
	Kinded(String, AttrKind),
}
impl From<Tagged> for AttrValue {
	fn from(tagged: Tagged) -> Self {
		match tagged {
			Tagged::Plain(value) => Self::new(value, AttrKind::StringAttr),
			Tagged::Kinded(value, kind) => Self::new(value, kind),
		}
	}
}
impl From<AttrValue> for Tagged {
	fn from(value: AttrValue) -> Self {
		match value.kind {
			AttrKind::StringAttr => Tagged::Plain(value.value),
			kind => Tagged::Kinded(value.value, kind),
		}
	}
}
impl From<Tagged> for AttrKey {
	fn from(tagged: Tagged) -> Self {
		match tagged {
			Tagged::Plain(name) => Self::new(name, AttrKind::StringAttr),
			Tagged::Kinded(name, kind) => Self::new(name, kind),
		}
	}
}
impl From<AttrKey> for Tagged {
	fn from(key: AttrKey) -> Self {
		match key.kind {
			AttrKind::StringAttr => Tagged::Plain(key.name),
			kind => Tagged::Kinded(key.name, kind),
		}
	}
}

/// Attribute assignments in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs(pub Vec<(String, AttrValue)>);
impl Serialize for Attrs {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.0.len()))?;
		for (name, value) in &self.0 {
			map.serialize_entry(name, value)?;
		}
		map.end()
	}
}
impl<'de> Deserialize<'de> for Attrs {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		struct AttrsVisitor;
		impl<'de> Visitor<'de> for AttrsVisitor {
			type Value = Attrs;

			fn expecting(&self, f: &mut Formatter) -> fmt::Result {
				f.write_str("a map of attribute names to values")
			}

			fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Attrs, A::Error> {
				let mut attrs = Vec::with_capacity(map.size_hint().unwrap_or(0));
				while let Some(entry) = map.next_entry()? {
					attrs.push(entry);
				}
				Ok(Attrs(attrs))
			}
		}
		deserializer.deserialize_map(AttrsVisitor)
	}
}

/// One tree-addressed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
	/// Substitutes the element at `path` with the single element `html` parses to.
	Replace { path: Path, html: String },
	/// Appends each fragment (one element each) to the element at `path`.
	AddChildren { path: Path, htmls: Vec<String> },
	/// Removes trailing element children until `len` remain. Never grows.
	SetChildrenLen { path: Path, len: usize },
	SetAttrs { path: Path, attrs: Attrs },
	DelAttrs { path: Path, attrs: Vec<AttrKey> },
	SetText { path: Path, text: String },
	SetHtml { path: Path, html: String },
}

pub const DIFF_KINDS: &[&str] = &["replace", "add_children", "set_children_len", "set_attrs", "del_attrs", "set_text", "set_html"];

impl Diff {
	#[must_use]
	pub fn path(&self) -> &Path {
		match self {
			Diff::Replace { path, .. }
			| Diff::AddChildren { path, .. }
			| Diff::SetChildrenLen { path, .. }
			| Diff::SetAttrs { path, .. }
			| Diff::DelAttrs { path, .. }
			| Diff::SetText { path, .. }
			| Diff::SetHtml { path, .. } => path,
		}
	}

	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Diff::Replace { .. } => "replace",
			Diff::AddChildren { .. } => "add_children",
			Diff::SetChildrenLen { .. } => "set_children_len",
			Diff::SetAttrs { .. } => "set_attrs",
			Diff::DelAttrs { .. } => "del_attrs",
			Diff::SetText { .. } => "set_text",
			Diff::SetHtml { .. } => "set_html",
		}
	}
}

impl Serialize for Diff {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut seq = serializer.serialize_seq(Some(3))?;
		seq.serialize_element(self.kind())?;
		seq.serialize_element(self.path())?;
		match self {
			Diff::Replace { html, .. } | Diff::SetHtml { html, .. } => seq.serialize_element(html)?,
			Diff::AddChildren { htmls, .. } => seq.serialize_element(htmls)?,
			Diff::SetChildrenLen { len, .. } => seq.serialize_element(len)?,
			Diff::SetAttrs { attrs, .. } => seq.serialize_element(attrs)?,
			Diff::DelAttrs { attrs, .. } => seq.serialize_element(attrs)?,
			Diff::SetText { text, .. } => seq.serialize_element(text)?,
		}
		seq.end()
	}
}

impl<'de> Deserialize<'de> for Diff {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		struct DiffVisitor;
		impl<'de> Visitor<'de> for DiffVisitor {
			type Value = Diff;

			fn expecting(&self, f: &mut Formatter) -> fmt::Result {
				f.write_str("a diff instruction array like [\"set_text\", [0], \"text\"]")
			}

			fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Diff, A::Error> {
				fn next<'de, A: SeqAccess<'de>, T: Deserialize<'de>>(seq: &mut A, i: usize) -> Result<T, A::Error> {
					seq.next_element()?.ok_or_else(|| de::Error::invalid_length(i, &"3 elements"))
				}

				let kind: String = next(&mut seq, 0)?;
				let path: Path = next(&mut seq, 1)?;
				let diff = match kind.as_str() {
					"replace" => Diff::Replace { path, html: next(&mut seq, 2)? },
					"add_children" => Diff::AddChildren { path, htmls: next(&mut seq, 2)? },
					"set_children_len" => Diff::SetChildrenLen { path, len: next(&mut seq, 2)? },
					"set_attrs" => Diff::SetAttrs { path, attrs: next(&mut seq, 2)? },
					"del_attrs" => Diff::DelAttrs { path, attrs: next(&mut seq, 2)? },
					"set_text" => Diff::SetText { path, text: next(&mut seq, 2)? },
					"set_html" => Diff::SetHtml { path, html: next(&mut seq, 2)? },
					other => return Err(de::Error::unknown_variant(other, DIFF_KINDS)),
				};
				if seq.next_element::<IgnoredAny>()?.is_some() {
					return Err(de::Error::invalid_length(4, &"3 elements"));
				}
				Ok(diff)
			}
		}
		deserializer.deserialize_seq(DiffVisitor)
	}
}
