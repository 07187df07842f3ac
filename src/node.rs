//! The declarative tree vocabulary: nodes, tags, attributes and the class/style toggle maps.
//!
//! A [`Node`] tree is *live*: cells, components and dynamic nodes are read when the [`Pipeline`](`crate::pipeline::Pipeline`)
//! walks past them, so the same tree can be rendered again and again while the state it observes changes.

use crate::{
	cell::{Cell, Observe},
	component::{Component, ComponentList},
	error::ModelError,
	plugin::AttributePlugin,
};
use core::fmt::{self, Debug, Display};
use std::sync::Arc;

/// HTML elements that never have children or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr"];

#[derive(Clone, Default)]
pub enum Node {
	/// Pruned during rendering.
	#[default]
	Empty,
	Text(String),
	/// A markup fragment emitted verbatim.
	Raw(String),
	Tag(Tag),
	Component(Component),
	Group(Vec<Node>),
	/// A live-bound scalar, read at render time.
	Cell(Arc<dyn Observe>),
	/// Produces a node at render time.
	Dynamic(Arc<dyn Fn() -> Node + Send + Sync>),
}

impl Node {
	pub fn raw(markup: impl Into<String>) -> Self {
		Self::Raw(markup.into())
	}

	pub fn dynamic(f: impl Fn() -> Node + Send + Sync + 'static) -> Self {
		Self::Dynamic(Arc::new(f))
	}

	pub fn group(nodes: impl IntoIterator<Item = Node>) -> Self {
		Self::Group(nodes.into_iter().collect())
	}

	/// Whether rendering this node can't produce anything, without evaluating callbacks.
	pub fn is_prunable(&self) -> bool {
		match self {
			Node::Empty => true,
			Node::Text(text) | Node::Raw(text) => text.is_empty(),
			Node::Group(nodes) => nodes.iter().all(Node::is_prunable),
			Node::Tag(_) | Node::Component(_) | Node::Cell(_) | Node::Dynamic(_) => false,
		}
	}
}

impl Debug for Node {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Node::Empty => f.write_str("Empty"),
			Node::Text(text) => f.debug_tuple("Text").field(text).finish(),
			Node::Raw(markup) => f.debug_tuple("Raw").field(markup).finish(),
			Node::Tag(tag) => tag.fmt(f),
			Node::Component(component) => component.fmt(f),
			Node::Group(nodes) => f.debug_tuple("Group").field(nodes).finish(),
			Node::Cell(cell) => f.debug_tuple("Cell").field(&cell.read()).finish(),
			Node::Dynamic(_) => f.write_str("Dynamic(..)"),
		}
	}
}

impl From<&str> for Node {
	fn from(text: &str) -> Self {
		Node::Text(text.to_owned())
	}
}

impl From<String> for Node {
	fn from(text: String) -> Self {
		Node::Text(text)
	}
}

impl From<&String> for Node {
	fn from(text: &String) -> Self {
		Node::Text(text.clone())
	}
}

macro_rules! scalar_nodes {
	($($scalar:ty),*$(,)?) => {$(
		impl From<$scalar> for Node {
			fn from(scalar: $scalar) -> Self {
				Node::Text(scalar.to_string())
			}
		}
	)*};
}
scalar_nodes!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char);

impl From<Tag> for Node {
	fn from(tag: Tag) -> Self {
		Node::Tag(tag)
	}
}

impl From<Component> for Node {
	fn from(component: Component) -> Self {
		Node::Component(component)
	}
}

impl From<&Component> for Node {
	fn from(component: &Component) -> Self {
		Node::Component(component.clone())
	}
}

impl From<Vec<Node>> for Node {
	fn from(nodes: Vec<Node>) -> Self {
		Node::Group(nodes)
	}
}

impl<T: Into<Node>> From<Option<T>> for Node {
	fn from(node: Option<T>) -> Self {
		node.map_or(Node::Empty, Into::into)
	}
}

impl<T: Display + Send + Sync + 'static> From<Cell<T>> for Node {
	fn from(cell: Cell<T>) -> Self {
		Node::Cell(Arc::new(cell))
	}
}

impl<T: Display + Send + Sync + 'static> From<&Cell<T>> for Node {
	fn from(cell: &Cell<T>) -> Self {
		Node::Cell(Arc::new(cell.clone()))
	}
}

impl From<&ComponentList> for Node {
	/// Renders the list's current items whenever it is walked.
	fn from(list: &ComponentList) -> Self {
		let list = list.clone();
		Node::dynamic(move || Node::Group(list.items().into_iter().map(Node::Component).collect()))
	}
}

impl From<ComponentList> for Node {
	fn from(list: ComponentList) -> Self {
		Node::from(&list)
	}
}

#[derive(Clone)]
pub enum AttrValue {
	Text(String),
	/// Present without a value, like `disabled`.
	Flag,
	Bound(Arc<dyn Observe>),
}

impl Debug for AttrValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AttrValue::Text(text) => f.debug_tuple("Text").field(text).finish(),
			AttrValue::Flag => f.write_str("Flag"),
			AttrValue::Bound(cell) => f.debug_tuple("Bound").field(&cell.read()).finish(),
		}
	}
}

/// A named attribute. A `value` of `None` removes the attribute when merged into a [`Tag`].
#[derive(Clone)]
pub struct Attribute {
	name: String,
	value: Option<AttrValue>,
	plugin: Option<Arc<dyn AttributePlugin>>,
}

impl Attribute {
	pub fn new(name: impl AsRef<str>, value: impl Into<String>) -> Self {
		Self::with_value(name, Some(AttrValue::Text(value.into())))
	}

	pub fn flag(name: impl AsRef<str>) -> Self {
		Self::with_value(name, Some(AttrValue::Flag))
	}

	/// Re-reads `cell` every time the attribute is rendered.
	pub fn bound<T: Display + Send + Sync + 'static>(name: impl AsRef<str>, cell: &Cell<T>) -> Self {
		Self::with_value(name, Some(AttrValue::Bound(Arc::new(cell.clone()))))
	}

	pub fn remove(name: impl AsRef<str>) -> Self {
		Self::with_value(name, None)
	}

	pub fn with_value(name: impl AsRef<str>, value: Option<AttrValue>) -> Self {
		Self {
			name: name.as_ref().to_ascii_lowercase(),
			value,
			plugin: None,
		}
	}

	/// Attaches a plugin that is initialized once per page, the first time this attribute is rendered.
	#[must_use]
	pub fn with_plugin(mut self, plugin: Arc<dyn AttributePlugin>) -> Self {
		self.plugin = Some(plugin);
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn value(&self) -> Option<&AttrValue> {
		self.value.as_ref()
	}

	pub fn plugin(&self) -> Option<&Arc<dyn AttributePlugin>> {
		self.plugin.as_ref()
	}

	/// The value as it would be rendered right now. Flags render as the empty string.
	pub fn resolve(&self) -> Option<String> {
		self.value.as_ref().map(|value| match value {
			AttrValue::Text(text) => text.clone(),
			AttrValue::Flag => String::new(),
			AttrValue::Bound(cell) => cell.read(),
		})
	}
}

impl Debug for Attribute {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("Attribute");
		debug.field("name", &self.name).field("value", &self.value);
		if let Some(plugin) = &self.plugin {
			debug.field("plugin", &plugin.name());
		}
		debug.finish()
	}
}

/// Ordered set of present classes. Re-adding a removed class appends it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassMap(Vec<String>);

impl ClassMap {
	pub fn set(&mut self, name: &str, present: bool) {
		let position = self.0.iter().position(|class| class == name);
		match (position, present) {
			(None, true) => self.0.push(name.to_owned()),
			(Some(i), false) => {
				self.0.remove(i);
			}
			(Some(_), true) | (None, false) => (),
		}
	}

	pub fn contains(&self, name: &str) -> bool {
		self.0.iter().any(|class| class == name)
	}

	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn clear(&mut self) {
		self.0.clear();
	}

	/// The `class` attribute value.
	pub fn render(&self) -> String {
		self.0.join(" ")
	}
}

/// Ordered style declarations. Changing a present property keeps its position, re-adding a removed one appends it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleMap(Vec<(String, String)>);

impl StyleMap {
	pub fn set(&mut self, property: &str, value: Option<&str>) {
		let position = self.0.iter().position(|(name, _)| name == property);
		match (position, value) {
			(Some(i), Some(value)) => value.clone_into(&mut self.0[i].1),
			(None, Some(value)) => self.0.push((property.to_owned(), value.to_owned())),
			(Some(i), None) => {
				self.0.remove(i);
			}
			(None, None) => (),
		}
	}

	pub fn get(&self, property: &str) -> Option<&str> {
		self.0.iter().find(|(name, _)| name == property).map(|(_, value)| value.as_str())
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn clear(&mut self) {
		self.0.clear();
	}

	/// The `style` attribute value.
	pub fn render(&self) -> String {
		self.0.iter().map(|(name, value)| format!("{}:{}", name, value)).collect::<Vec<_>>().join(";")
	}
}

/// One argument to [`Tag::new`] or [`Tag::add`], classified by conversion.
#[derive(Debug, Clone)]
pub enum Arg {
	Attribute(Attribute),
	Class(Vec<(String, bool)>),
	Style(Vec<(String, Option<String>)>),
	Node(Node),
	Many(Vec<Arg>),
}

impl From<Attribute> for Arg {
	fn from(attribute: Attribute) -> Self {
		Arg::Attribute(attribute)
	}
}

impl From<Vec<Arg>> for Arg {
	fn from(args: Vec<Arg>) -> Self {
		Arg::Many(args)
	}
}

macro_rules! node_args {
	($($node:ty),*$(,)?) => {$(
		impl From<$node> for Arg {
			fn from(node: $node) -> Self {
				Arg::Node(node.into())
			}
		}
	)*};
}
node_args!(Node, &str, String, &String, Tag, Component, &Component, Vec<Node>, ComponentList, &ComponentList);
node_args!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char);

impl<T: Into<Node>> From<Option<T>> for Arg {
	fn from(node: Option<T>) -> Self {
		Arg::Node(node.into())
	}
}

impl<T: Display + Send + Sync + 'static> From<Cell<T>> for Arg {
	fn from(cell: Cell<T>) -> Self {
		Arg::Node(cell.into())
	}
}

impl<T: Display + Send + Sync + 'static> From<&Cell<T>> for Arg {
	fn from(cell: &Cell<T>) -> Self {
		Arg::Node(cell.into())
	}
}

/// Adds (or keeps) a class.
pub fn class(name: impl Into<String>) -> Arg {
	Arg::Class(vec![(name.into(), true)])
}

/// Adds or removes a class.
pub fn class_if(name: impl Into<String>, present: bool) -> Arg {
	Arg::Class(vec![(name.into(), present)])
}

/// Adds every class of a whitespace separated list.
pub fn classes(names: &str) -> Arg {
	Arg::Class(names.split_whitespace().map(|name| (name.to_owned(), true)).collect())
}

pub fn style(property: impl Into<String>, value: impl Into<String>) -> Arg {
	Arg::Style(vec![(property.into(), Some(value.into()))])
}

pub fn style_remove(property: impl Into<String>) -> Arg {
	Arg::Style(vec![(property.into(), None)])
}

#[derive(Clone)]
pub struct Tag {
	name: String,
	void: bool,
	attributes: Vec<Attribute>,
	classes: ClassMap,
	styles: StyleMap,
	children: Vec<Node>,
}

impl Tag {
	/// # Errors
	///
	/// Iff the tag name or any attribute, class or style name is malformed.
	pub fn new(name: &str, args: impl IntoIterator<Item = Arg>) -> Result<Self, ModelError> {
		let name = name.to_ascii_lowercase();
		validate_tag_name(&name)?;
		let mut tag = Self {
			void: VOID_ELEMENTS.contains(&name.as_str()),
			name,
			attributes: Vec::new(),
			classes: ClassMap::default(),
			styles: StyleMap::default(),
			children: Vec::new(),
		};
		for arg in args {
			tag.add(arg)?;
		}
		Ok(tag)
	}

	pub fn empty(name: &str) -> Result<Self, ModelError> {
		Self::new(name, None)
	}

	/// Merges `arg` into this tag.
	///
	/// # Errors
	///
	/// Iff a name in `arg` is malformed. Arguments of a [`Arg::Many`] before the malformed one stay merged.
	pub fn add(&mut self, arg: impl Into<Arg>) -> Result<(), ModelError> {
		match arg.into() {
			Arg::Attribute(attribute) => self.add_attribute(attribute)?,
			Arg::Class(entries) => {
				for (name, present) in entries {
					validate_token("class", &name)?;
					self.classes.set(&name, present);
				}
			}
			Arg::Style(entries) => {
				for (property, value) in entries {
					validate_style_property(&property)?;
					self.styles.set(&property, value.as_deref());
				}
			}
			Arg::Node(node) => {
				if !node.is_prunable() {
					self.children.push(node);
				}
			}
			Arg::Many(args) => {
				for arg in args {
					self.add(arg)?;
				}
			}
		}
		Ok(())
	}

	/// Builder-style [`Tag::add`].
	pub fn with(mut self, arg: impl Into<Arg>) -> Result<Self, ModelError> {
		self.add(arg)?;
		Ok(self)
	}

	fn add_attribute(&mut self, attribute: Attribute) -> Result<(), ModelError> {
		validate_attribute_name(&attribute.name)?;
		match (attribute.name.as_str(), attribute.value()) {
			// Plain `class` and `style` values merge into the toggle maps so that both spellings compose.
			("class", Some(AttrValue::Text(list))) => {
				for name in list.split_whitespace() {
					self.classes.set(name, true);
				}
				return Ok(());
			}
			("style", Some(AttrValue::Text(declarations))) => {
				for declaration in declarations.split(';') {
					if let Some((property, value)) = declaration.split_once(':') {
						let property = property.trim();
						validate_style_property(property)?;
						self.styles.set(property, Some(value.trim()));
					}
				}
				return Ok(());
			}
			("class", None) => {
				self.classes.clear();
				return Ok(());
			}
			("style", None) => {
				self.styles.clear();
				return Ok(());
			}
			("class" | "style", Some(_)) => return Err(invalid("attribute", &attribute.name, "only takes a text value")),
			_ => (),
		}

		let position = self.attributes.iter().position(|existing| existing.name == attribute.name);
		match (position, attribute.value.is_some()) {
			(Some(i), true) => self.attributes[i] = attribute,
			(None, true) => self.attributes.push(attribute),
			(Some(i), false) => {
				self.attributes.remove(i);
			}
			(None, false) => (),
		}
		Ok(())
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn is_void(&self) -> bool {
		self.void
	}

	pub fn set_void(&mut self, void: bool) {
		self.void = void;
	}

	pub fn attribute(&self, name: &str) -> Option<&Attribute> {
		self.attributes.iter().find(|attribute| attribute.name == name)
	}

	pub fn attributes(&self) -> &[Attribute] {
		&self.attributes
	}

	pub fn classes(&self) -> &ClassMap {
		&self.classes
	}

	pub fn styles(&self) -> &StyleMap {
		&self.styles
	}

	pub fn children(&self) -> &[Node] {
		&self.children
	}

	pub fn push(&mut self, child: impl Into<Node>) {
		let child = child.into();
		if !child.is_prunable() {
			self.children.push(child);
		}
	}

	pub fn set_children(&mut self, children: impl IntoIterator<Item = Node>) {
		self.children = children.into_iter().filter(|child| !child.is_prunable()).collect();
	}

	pub fn clear_children(&mut self) {
		self.children.clear();
	}
}

impl Debug for Tag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Tag")
			.field("name", &self.name)
			.field("void", &self.void)
			.field("attributes", &self.attributes)
			.field("classes", &self.classes)
			.field("styles", &self.styles)
			.field("children", &self.children)
			.finish()
	}
}

fn invalid(kind: &'static str, name: &str, reason: &'static str) -> ModelError {
	ModelError::InvalidElement { kind, name: name.to_owned(), reason }
}

fn validate_tag_name(name: &str) -> Result<(), ModelError> {
	let mut chars = name.chars();
	match chars.next() {
		None => Err(invalid("tag", name, "is empty")),
		Some(first) if !first.is_ascii_alphabetic() => Err(invalid("tag", name, "must start with an ASCII letter")),
		Some(_) if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') => Err(invalid("tag", name, "may only contain ASCII alphanumerics and '-'")),
		Some(_) => Ok(()),
	}
}

fn validate_attribute_name(name: &str) -> Result<(), ModelError> {
	if name.is_empty() {
		Err(invalid("attribute", name, "is empty"))
	} else if name.chars().any(|c| c.is_whitespace() || c.is_control() || matches!(c, '"' | '\'' | '>' | '/' | '=' | '<')) {
		Err(invalid("attribute", name, "contains a forbidden character"))
	} else {
		Ok(())
	}
}

fn validate_token(kind: &'static str, name: &str) -> Result<(), ModelError> {
	if name.is_empty() {
		Err(invalid(kind, name, "is empty"))
	} else if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
		Err(invalid(kind, name, "contains whitespace"))
	} else {
		Ok(())
	}
}

fn validate_style_property(property: &str) -> Result<(), ModelError> {
	validate_token("style", property)?;
	if property.contains([':', ';']) {
		Err(invalid("style", property, "contains ':' or ';'"))
	} else {
		Ok(())
	}
}

/// Collects heterogeneous [`Tag`] arguments into a `Vec<Arg>`.
///
/// ```
/// use live_dom::{args, node::{class, Tag}};
///
/// let tag = Tag::new("p", args!["Count: ", 1, class("big")]).unwrap();
/// assert_eq!(tag.children().len(), 2);
/// ```
#[macro_export]
macro_rules! args {
	($($arg:expr),*$(,)?) => {
		::std::vec![$($crate::node::Arg::from($arg)),*]
	};
}
