//! An in-memory [`Dom`], for headless hosts and tests.
//!
//! Fragments are parsed by a small forgiving tokenizer: elements, attributes (quoted, unquoted or bare), text, void elements and comments (dropped).
//! It doesn't implement the HTML5 tree construction rules, so implied end tags and the like aren't inserted.

use crate::{addressing::ROOT_MARKER, platform::Dom};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
	String(String),
	Bool(bool),
}

enum Content {
	Element {
		tag: String,
		attributes: Vec<(String, String)>,
		properties: HashMap<String, Property>,
	},
	Text(String),
}

struct NodeData {
	content: Content,
	parent: Weak<RefCell<NodeData>>,
	children: Vec<Node>,
}

#[derive(Clone)]
struct Node(Rc<RefCell<NodeData>>);
impl Node {
	fn new(content: Content) -> Self {
		Self(Rc::new(RefCell::new(NodeData {
			content,
			parent: Weak::new(),
			children: Vec::new(),
		})))
	}

	fn is_element(&self) -> bool {
		matches!(self.0.borrow().content, Content::Element { .. })
	}

	fn parent(&self) -> Option<Node> {
		self.0.borrow().parent.upgrade().map(Node)
	}

	fn detach(&self) {
		if let Some(parent) = self.parent() {
			parent.0.borrow_mut().children.retain(|child| !Rc::ptr_eq(&child.0, &self.0));
		}
		self.0.borrow_mut().parent = Weak::new();
	}

	fn set_children(&self, children: Vec<Node>) {
		for child in self.0.borrow_mut().children.drain(..) {
			child.0.borrow_mut().parent = Weak::new();
		}
		for child in &children {
			child.detach();
			child.0.borrow_mut().parent = Rc::downgrade(&self.0);
		}
		self.0.borrow_mut().children = children;
	}

	fn push(&self, child: Node) {
		child.detach();
		child.0.borrow_mut().parent = Rc::downgrade(&self.0);
		self.0.borrow_mut().children.push(child);
	}

	fn element_children(&self) -> Vec<Node> {
		self.0.borrow().children.iter().filter(|child| child.is_element()).cloned().collect()
	}
}

/// An element handle. Equality is identity.
#[derive(Clone)]
pub struct MemElement(Node);
impl PartialEq for MemElement {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&(self.0).0, &(other.0).0)
	}
}
impl Debug for MemElement {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match &(self.0).0.borrow().content {
			Content::Element { tag, attributes, .. } => {
				write!(f, "<{}", tag)?;
				for (name, value) in attributes {
					write!(f, " {}={:?}", name, value)?;
				}
				f.write_str(">")
			}
			Content::Text(text) => write!(f, "{:?}", text),
		}
	}
}

fn element(tag: &str, attributes: Vec<(String, String)>) -> Node {
	Node::new(Content::Element {
		tag: tag.to_ascii_lowercase(),
		attributes,
		properties: HashMap::new(),
	})
}

/// A document with a `<body>` and just enough window around it.
pub struct MemDom {
	body: MemElement,
	title: RefCell<String>,
	history: RefCell<Vec<String>>,
	favicon: RefCell<Option<String>>,
	opacity: Cell<f32>,
	alerts: RefCell<Vec<String>>,
	reflows: Cell<usize>,
}
impl MemDom {
	/// A document at `location` whose body contains `body_html`.
	#[must_use]
	pub fn new(location: &str, body_html: &str) -> Self {
		let body = element("body", Vec::new());
		body.set_children(parse(body_html));
		Self {
			body: MemElement(body),
			title: RefCell::default(),
			history: RefCell::new(vec![location.to_owned()]),
			favicon: RefCell::default(),
			opacity: Cell::new(1.0),
			alerts: RefCell::default(),
			reflows: Cell::new(0),
		}
	}

	#[must_use]
	pub fn body(&self) -> MemElement {
		self.body.clone()
	}

	#[must_use]
	pub fn outer_html(&self, element: &MemElement) -> String {
		let mut html = String::new();
		serialize(&element.0, &mut html);
		html
	}

	#[must_use]
	pub fn text_content(&self, element: &MemElement) -> String {
		fn collect(node: &Node, text: &mut String) {
			if let Content::Text(data) = &node.0.borrow().content {
				text.push_str(data);
			}
			for child in &node.0.borrow().children {
				collect(child, text);
			}
		}
		let mut text = String::new();
		collect(&element.0, &mut text);
		text
	}

	#[must_use]
	pub fn property(&self, element: &MemElement, name: &str) -> Option<Property> {
		match &(element.0).0.borrow().content {
			Content::Element { properties, .. } => properties.get(name).cloned(),
			Content::Text(_) => None,
		}
	}

	#[must_use]
	pub fn title(&self) -> String {
		self.title.borrow().clone()
	}

	/// Every location the window has been at, oldest first.
	#[must_use]
	pub fn history(&self) -> Vec<String> {
		self.history.borrow().clone()
	}

	#[must_use]
	pub fn favicon(&self) -> Option<String> {
		self.favicon.borrow().clone()
	}

	#[must_use]
	pub fn opacity(&self) -> f32 {
		self.opacity.get()
	}

	#[must_use]
	pub fn alerts(&self) -> Vec<String> {
		self.alerts.borrow().clone()
	}

	#[must_use]
	pub fn reflow_count(&self) -> usize {
		self.reflows.get()
	}

	fn find(&self, predicate: &dyn Fn(&MemElement) -> bool) -> Vec<MemElement> {
		fn walk(node: &Node, predicate: &dyn Fn(&MemElement) -> bool, found: &mut Vec<MemElement>) {
			for child in node.element_children() {
				let element = MemElement(child.clone());
				if predicate(&element) {
					found.push(element);
				}
				walk(&child, predicate, found);
			}
		}
		let mut found = Vec::new();
		walk(&self.body.0, predicate, &mut found);
		found
	}

	fn with_element<T>(element: &MemElement, f: impl FnOnce(&mut Vec<(String, String)>, &mut HashMap<String, Property>) -> T) -> Option<T> {
		match &mut (element.0).0.borrow_mut().content {
			Content::Element { attributes, properties, .. } => Some(f(attributes, properties)),
			Content::Text(_) => None,
		}
	}
}

impl Dom for MemDom {
	type Element = MemElement;

	fn session_roots(&self) -> Vec<MemElement> {
		self.find(&|element| self.has_attribute(element, ROOT_MARKER))
	}

	fn element_by_id(&self, id: &str) -> Option<MemElement> {
		self.find(&|element| self.attribute(element, "id").as_deref() == Some(id)).into_iter().next()
	}

	fn children_len(&self, element: &MemElement) -> usize {
		element.0.element_children().len()
	}

	fn child(&self, element: &MemElement, index: usize) -> Option<MemElement> {
		element.0.element_children().into_iter().nth(index).map(MemElement)
	}

	fn parent(&self, element: &MemElement) -> Option<MemElement> {
		element.0.parent().map(MemElement)
	}

	fn tag_name(&self, element: &MemElement) -> String {
		match &(element.0).0.borrow().content {
			Content::Element { tag, .. } => tag.clone(),
			Content::Text(_) => String::new(),
		}
	}

	fn attribute(&self, element: &MemElement, name: &str) -> Option<String> {
		match &(element.0).0.borrow().content {
			Content::Element { attributes, .. } => attributes.iter().find(|(n, _)| n == name).map(|(_, value)| value.clone()),
			Content::Text(_) => None,
		}
	}

	fn set_attribute(&self, element: &MemElement, name: &str, value: &str) {
		Self::with_element(element, |attributes, _| match attributes.iter_mut().find(|(n, _)| n == name) {
			Some((_, existing)) => *existing = value.to_owned(),
			None => attributes.push((name.to_owned(), value.to_owned())),
		});
	}

	fn remove_attribute(&self, element: &MemElement, name: &str) {
		Self::with_element(element, |attributes, _| attributes.retain(|(n, _)| n != name));
	}

	fn set_string_property(&self, element: &MemElement, name: &str, value: &str) {
		Self::with_element(element, |_, properties| properties.insert(name.to_owned(), Property::String(value.to_owned())));
	}

	fn set_bool_property(&self, element: &MemElement, name: &str, value: bool) {
		Self::with_element(element, |_, properties| properties.insert(name.to_owned(), Property::Bool(value)));
	}

	fn delete_property(&self, element: &MemElement, name: &str) {
		Self::with_element(element, |_, properties| properties.remove(name));
	}

	fn parse_html(&self, html: &str) -> Vec<MemElement> {
		parse(html).into_iter().filter(Node::is_element).map(MemElement).collect()
	}

	fn replace_element(&self, old: &MemElement, new: &MemElement) {
		let parent = match old.0.parent() {
			Some(parent) => parent,
			None => return,
		};
		new.0.detach();
		let mut parent_data = parent.0.borrow_mut();
		if let Some(slot) = parent_data.children.iter_mut().find(|child| Rc::ptr_eq(&child.0, &(old.0).0)) {
			*slot = new.0.clone();
			(new.0).0.borrow_mut().parent = Rc::downgrade(&parent.0);
			(old.0).0.borrow_mut().parent = Weak::new();
		}
	}

	fn append_child(&self, parent: &MemElement, child: &MemElement) {
		parent.0.push(child.0.clone());
	}

	fn remove_last_child(&self, parent: &MemElement) {
		if let Some(last) = parent.0.element_children().pop() {
			last.detach();
		}
	}

	fn set_text(&self, element: &MemElement, text: &str) {
		let children = if text.is_empty() { Vec::new() } else { vec![Node::new(Content::Text(text.to_owned()))] };
		element.0.set_children(children);
	}

	fn set_inner_html(&self, element: &MemElement, html: &str) {
		element.0.set_children(parse(html));
	}

	fn inner_html(&self, element: &MemElement) -> String {
		let mut html = String::new();
		for child in &(element.0).0.borrow().children {
			serialize(child, &mut html);
		}
		html
	}

	fn add_class(&self, element: &MemElement, class: &str) {
		let mut classes: Vec<String> = self.attribute(element, "class").unwrap_or_default().split_whitespace().map(str::to_owned).collect();
		if !classes.iter().any(|c| c == class) {
			classes.push(class.to_owned());
			self.set_attribute(element, "class", &classes.join(" "));
		}
	}

	fn remove_class(&self, element: &MemElement, class: &str) {
		if let Some(existing) = self.attribute(element, "class") {
			let classes: Vec<&str> = existing.split_whitespace().filter(|c| *c != class).collect();
			self.set_attribute(element, "class", &classes.join(" "));
		}
	}

	fn force_reflow(&self, _element: &MemElement) {
		self.reflows.set(self.reflows.get() + 1);
	}

	fn window_location(&self) -> String {
		self.history.borrow().last().cloned().unwrap_or_default()
	}

	fn push_window_location(&self, location: &str) {
		self.history.borrow_mut().push(location.to_owned());
	}

	fn set_window_title(&self, title: &str) {
		*self.title.borrow_mut() = title.to_owned();
	}

	fn set_favicon(&self, href: &str) {
		*self.favicon.borrow_mut() = Some(href.to_owned());
	}

	fn set_page_opacity(&self, opacity: f32) {
		self.opacity.set(opacity);
	}

	fn alert(&self, message: &str) {
		self.alerts.borrow_mut().push(message.to_owned());
	}
}

fn is_void_element(name: &str) -> bool {
	matches!(
		name,
		"area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta" | "param" | "source" | "track" | "wbr"
	)
}

fn is_name_char(c: u8) -> bool {
	c.is_ascii_alphanumeric() || c == b'-' || c == b'_' || c == b':'
}

fn decode_entities(text: &str) -> String {
	if !text.contains('&') {
		return text.to_owned();
	}
	text.replace("&lt;", "<").replace("&gt;", ">").replace("&quot;", "\"").replace("&#39;", "'").replace("&amp;", "&")
}

fn escape(text: &str, attribute: bool) -> String {
	let escaped = text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;");
	if attribute {
		escaped.replace('"', "&quot;")
	} else {
		escaped
	}
}

/// Parses a fragment into its top-level nodes.
fn parse(input: &str) -> Vec<Node> {
	let fragment = element("template", Vec::new());
	let mut open = vec![fragment.clone()];
	let bytes = input.as_bytes();
	let len = bytes.len();
	let mut i = 0;

	// Slices are only cut at ASCII structural bytes, so they stay on UTF-8 boundaries.
	while i < len {
		let current = open.last().cloned().unwrap_or_else(|| fragment.clone());
		if bytes[i] != b'<' {
			let start = i;
			while i < len && bytes[i] != b'<' {
				i += 1;
			}
			current.push(Node::new(Content::Text(decode_entities(&input[start..i]))));
			continue;
		}

		if input[i..].starts_with("<!--") {
			i = input[i + 4..].find("-->").map_or(len, |end| i + 4 + end + 3);
			continue;
		}
		if input[i..].starts_with("<!") {
			i = input[i..].find('>').map_or(len, |end| i + end + 1);
			continue;
		}

		if i + 1 < len && bytes[i + 1] == b'/' {
			let start = i + 2;
			let mut j = start;
			while j < len && is_name_char(bytes[j]) {
				j += 1;
			}
			let name = input[start..j].to_ascii_lowercase();
			i = input[j..].find('>').map_or(len, |end| j + end + 1);
			if let Some(position) = open.iter().rposition(|node| matches!(&node.0.borrow().content, Content::Element { tag, .. } if *tag == name)) {
				if position > 0 {
					open.truncate(position);
				}
			}
			continue;
		}

		let start = i + 1;
		let mut j = start;
		while j < len && is_name_char(bytes[j]) {
			j += 1;
		}
		if j == start {
			// A lone '<' is text.
			current.push(Node::new(Content::Text("<".to_owned())));
			i += 1;
			continue;
		}
		let name = input[start..j].to_ascii_lowercase();

		let mut attributes: Vec<(String, String)> = Vec::new();
		let mut self_closing = false;
		let mut k = j;
		loop {
			while k < len && bytes[k].is_ascii_whitespace() {
				k += 1;
			}
			if k >= len {
				break;
			}
			if bytes[k] == b'>' {
				k += 1;
				break;
			}
			if bytes[k] == b'/' {
				if k + 1 < len && bytes[k + 1] == b'>' {
					self_closing = true;
					k += 2;
					break;
				}
				k += 1;
				continue;
			}
			let name_start = k;
			while k < len && is_name_char(bytes[k]) {
				k += 1;
			}
			if name_start == k {
				k += 1;
				continue;
			}
			let attribute_name = input[name_start..k].to_ascii_lowercase();
			while k < len && bytes[k].is_ascii_whitespace() {
				k += 1;
			}
			let mut value = String::new();
			if k < len && bytes[k] == b'=' {
				k += 1;
				while k < len && bytes[k].is_ascii_whitespace() {
					k += 1;
				}
				if k < len && (bytes[k] == b'"' || bytes[k] == b'\'') {
					let quote = bytes[k];
					k += 1;
					let value_start = k;
					while k < len && bytes[k] != quote {
						k += 1;
					}
					value = decode_entities(&input[value_start..k]);
					if k < len {
						k += 1;
					}
				} else {
					let value_start = k;
					while k < len && !bytes[k].is_ascii_whitespace() && bytes[k] != b'>' {
						k += 1;
					}
					value = decode_entities(&input[value_start..k]);
				}
			}
			if !attributes.iter().any(|(n, _)| *n == attribute_name) {
				attributes.push((attribute_name, value));
			}
		}
		i = k;

		let node = element(&name, attributes);
		current.push(node.clone());
		if !self_closing && !is_void_element(&name) {
			open.push(node);
		}
	}

	let nodes = fragment.0.borrow().children.clone();
	fragment.set_children(Vec::new());
	nodes
}

fn serialize(node: &Node, html: &mut String) {
	let data = node.0.borrow();
	match &data.content {
		Content::Text(text) => html.push_str(&escape(text, false)),
		Content::Element { tag, attributes, .. } => {
			html.push('<');
			html.push_str(tag);
			for (name, value) in attributes {
				html.push(' ');
				html.push_str(name);
				html.push_str("=\"");
				html.push_str(&escape(value, true));
				html.push('"');
			}
			html.push('>');
			if is_void_element(tag) {
				return;
			}
			for child in &data.children {
				serialize(child, html);
			}
			html.push_str("</");
			html.push_str(tag);
			html.push('>');
		}
	}
}
