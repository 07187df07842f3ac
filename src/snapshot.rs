//! The normalized, callback-free tree a render produces, and its HTML serialization.

use crate::component::{BindingId, ComponentId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snap {
	Text(String),
	Raw(String),
	Tag(SnapTag),
}

impl Snap {
	pub fn as_tag(&self) -> Option<&SnapTag> {
		match self {
			Snap::Tag(tag) => Some(tag),
			Snap::Text(_) | Snap::Raw(_) => None,
		}
	}

	/// The component identity, if this is a component's tag.
	pub fn component(&self) -> Option<&ComponentId> {
		self.as_tag().and_then(|tag| tag.component.as_ref())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapTag {
	pub name: String,
	pub void: bool,
	/// Fully resolved. Flags have an empty value.
	pub attributes: BTreeMap<String, String>,
	pub children: Vec<Snap>,
	pub component: Option<ComponentId>,
	/// Bindings registered for this tag during the render that produced it.
	pub bindings: Vec<BindingId>,
}

impl SnapTag {
	pub fn new(name: impl Into<String>, void: bool) -> Self {
		Self {
			name: name.into(),
			void,
			attributes: BTreeMap::new(),
			children: Vec::new(),
			component: None,
			bindings: Vec::new(),
		}
	}

	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.get(name).map(String::as_str)
	}

	/// Bindings of this tag and all its descendants.
	pub fn collect_bindings(&self, into: &mut Vec<BindingId>) {
		into.extend(self.bindings.iter().cloned());
		for child in &self.children {
			if let Snap::Tag(tag) = child {
				tag.collect_bindings(into);
			}
		}
	}
}

/// Merges adjacent text and drops empty text, in place.
pub fn coalesce(snaps: &mut Vec<Snap>) {
	let mut coalesced: Vec<Snap> = Vec::with_capacity(snaps.len());
	for snap in snaps.drain(..) {
		match (coalesced.last_mut(), snap) {
			(_, Snap::Text(text)) if text.is_empty() => (),
			(Some(Snap::Text(previous)), Snap::Text(text)) => previous.push_str(&text),
			(_, snap) => coalesced.push(snap),
		}
	}
	*snaps = coalesced;
}

pub fn find_component<'a>(snaps: &'a [Snap], id: &ComponentId) -> Option<&'a SnapTag> {
	snaps.iter().filter_map(Snap::as_tag).find_map(|tag| {
		if tag.component.as_ref() == Some(id) {
			Some(tag)
		} else {
			find_component(&tag.children, id)
		}
	})
}

pub fn find_component_mut<'a>(snaps: &'a mut [Snap], id: &ComponentId) -> Option<&'a mut SnapTag> {
	for snap in snaps {
		if let Snap::Tag(tag) = snap {
			if tag.component.as_ref() == Some(id) {
				return Some(tag);
			}
			if let Some(found) = find_component_mut(&mut tag.children, id) {
				return Some(found);
			}
		}
	}
	None
}

pub fn collect_bindings(snaps: &[Snap]) -> Vec<BindingId> {
	let mut bindings = Vec::new();
	for tag in snaps.iter().filter_map(Snap::as_tag) {
		tag.collect_bindings(&mut bindings);
	}
	bindings
}

#[must_use]
pub fn to_html(snaps: &[Snap]) -> String {
	let mut html = String::new();
	for snap in snaps {
		write_snap(&mut html, snap);
	}
	html
}

#[must_use]
pub fn snap_to_html(snap: &Snap) -> String {
	let mut html = String::new();
	write_snap(&mut html, snap);
	html
}

#[must_use]
pub fn tag_to_html(tag: &SnapTag) -> String {
	let mut html = String::new();
	write_tag(&mut html, tag);
	html
}

fn write_snap(html: &mut String, snap: &Snap) {
	match snap {
		Snap::Text(text) => escape_into(html, text, false),
		Snap::Raw(markup) => html.push_str(markup),
		Snap::Tag(tag) => write_tag(html, tag),
	}
}

fn write_tag(html: &mut String, tag: &SnapTag) {
	html.push('<');
	html.push_str(&tag.name);
	for (name, value) in &tag.attributes {
		html.push(' ');
		html.push_str(name);
		if !value.is_empty() {
			html.push_str("=\"");
			escape_into(html, value, true);
			html.push('"');
		}
	}
	html.push('>');
	if tag.void {
		return;
	}
	for child in &tag.children {
		write_snap(html, child);
	}
	html.push_str("</");
	html.push_str(&tag.name);
	html.push('>');
}

pub fn escape(text: &str, attribute: bool) -> String {
	let mut escaped = String::with_capacity(text.len());
	escape_into(&mut escaped, text, attribute);
	escaped
}

fn escape_into(html: &mut String, text: &str, attribute: bool) {
	for c in text.chars() {
		match c {
			'&' => html.push_str("&amp;"),
			'<' => html.push_str("&lt;"),
			'>' => html.push_str("&gt;"),
			'"' if attribute => html.push_str("&quot;"),
			c => html.push(c),
		}
	}
}
