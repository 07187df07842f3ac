//! Components: tags with a stable identity, event bindings and lifecycle hooks.

use crate::{
	error::ModelError,
	node::{Arg, Node, Tag},
	protocol::Event,
};
use core::{
	fmt::{self, Debug, Display},
	sync::atomic::{AtomicBool, Ordering},
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

/// Attribute carrying a component's [`ComponentId`] in rendered markup.
pub const ID_ATTRIBUTE: &str = "data-live-id";
/// Attribute carrying a component's combined event bindings in rendered markup.
pub const BINDINGS_ATTRIBUTE: &str = "data-live-on";

fn generate_id() -> Arc<str> {
	Uuid::new_v4().simple().to_string().into()
}

fn validate_id(kind: &'static str, id: &str) -> Result<(), ModelError> {
	if id.is_empty() {
		Err(ModelError::InvalidElement { kind, name: id.to_owned(), reason: "is empty" })
	} else if id == "doc" {
		Err(ModelError::InvalidElement { kind, name: id.to_owned(), reason: "is reserved for the document root" })
	} else if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
		Err(ModelError::InvalidElement {
			kind,
			name: id.to_owned(),
			reason: "may only contain ASCII alphanumerics, '-' and '_'",
		})
	} else {
		Ok(())
	}
}

/// Stable identity of a [`Component`] instance. Diff addressing and lifecycle tracking are keyed on it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(Arc<str>);

impl ComponentId {
	pub fn generate() -> Self {
		Self(generate_id())
	}

	pub fn new(id: &str) -> Result<Self, ModelError> {
		validate_id("component id", id)?;
		Ok(Self(id.into()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Display for ComponentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl Debug for ComponentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ComponentId({})", self.0)
	}
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(Arc<str>);

impl BindingId {
	pub fn generate() -> Self {
		Self(generate_id())
	}

	pub fn new(id: &str) -> Result<Self, ModelError> {
		validate_id("binding id", id)?;
		Ok(Self(id.into()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Display for BindingId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl Debug for BindingId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BindingId({})", self.0)
	}
}

/// What a handler gets to see besides the [`Event`] itself.
pub struct EventContext<'a> {
	pub component: &'a Component,
	pub binding: &'a EventBinding,
}

pub type Handler = Arc<dyn Fn(&EventContext<'_>, &Event) + Send + Sync>;
type Hook = Arc<dyn Fn(&Component) + Send + Sync>;
type Release = Box<dyn FnOnce() + Send>;

#[derive(Clone)]
pub struct EventBinding {
	id: BindingId,
	event: String,
	handler: Handler,
	component: ComponentId,
	once: bool,
}

impl EventBinding {
	pub fn id(&self) -> &BindingId {
		&self.id
	}

	/// The DOM event type, like `click`.
	pub fn event(&self) -> &str {
		&self.event
	}

	pub fn component(&self) -> &ComponentId {
		&self.component
	}

	/// Removed from its component after the first dispatch.
	pub fn is_once(&self) -> bool {
		self.once
	}

	pub fn call(&self, component: &Component, event: &Event) {
		(self.handler)(&EventContext { component, binding: self }, event);
	}
}

impl Debug for EventBinding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventBinding")
			.field("id", &self.id)
			.field("event", &self.event)
			.field("component", &self.component)
			.field("once", &self.once)
			.finish_non_exhaustive()
	}
}

/// A shared handle to a component instance. Clones keep the identity.
#[derive(Clone)]
pub struct Component {
	inner: Arc<Inner>,
}

struct Inner {
	id: ComponentId,
	tag: Mutex<Tag>,
	render: Mutex<Option<Arc<dyn Fn() -> Node + Send + Sync>>>,
	bindings: Mutex<Vec<EventBinding>>,
	on_mount: Mutex<Option<Hook>>,
	on_unmount: Mutex<Option<Hook>>,
	on_teardown: Mutex<Option<Hook>>,
	releases: Mutex<Vec<Release>>,
	auto_render: AtomicBool,
}

impl Component {
	pub fn new(name: &str, args: impl IntoIterator<Item = Arg>) -> Result<Self, ModelError> {
		Self::with_id(ComponentId::generate(), name, args)
	}

	pub fn with_id(id: ComponentId, name: &str, args: impl IntoIterator<Item = Arg>) -> Result<Self, ModelError> {
		Ok(Self {
			inner: Arc::new(Inner {
				id,
				tag: Mutex::new(Tag::new(name, args)?),
				render: Mutex::new(None),
				bindings: Mutex::new(Vec::new()),
				on_mount: Mutex::new(None),
				on_unmount: Mutex::new(None),
				on_teardown: Mutex::new(None),
				releases: Mutex::new(Vec::new()),
				auto_render: AtomicBool::new(true),
			}),
		})
	}

	pub fn id(&self) -> &ComponentId {
		&self.inner.id
	}

	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Merges `arg` into the component's own tag.
	pub fn add(&self, arg: impl Into<Arg>) -> Result<(), ModelError> {
		self.inner.tag.lock().add(arg)
	}

	pub fn with_tag<R>(&self, f: impl FnOnce(&mut Tag) -> R) -> R {
		f(&mut self.inner.tag.lock())
	}

	/// A copy of the component's tag as it is right now.
	pub fn tag(&self) -> Tag {
		self.inner.tag.lock().clone()
	}

	/// Sets the callback producing the component's children on each render, after the tag's own children.
	#[must_use]
	pub fn render_with(self, render: impl Fn() -> Node + Send + Sync + 'static) -> Self {
		*self.inner.render.lock() = Some(Arc::new(render));
		self
	}

	/// Invokes the render callback, if any. Called by the pipeline while walking.
	pub fn render_children(&self) -> Node {
		let render = self.inner.render.lock().clone();
		render.map_or(Node::Empty, |render| render())
	}

	pub fn on(&self, event: &str, handler: impl Fn(&EventContext<'_>, &Event) + Send + Sync + 'static) -> BindingId {
		self.bind(event, Arc::new(handler), false)
	}

	/// Like [`Component::on`], but the binding removes itself after its first dispatch.
	pub fn once(&self, event: &str, handler: impl Fn(&EventContext<'_>, &Event) + Send + Sync + 'static) -> BindingId {
		self.bind(event, Arc::new(handler), true)
	}

	fn bind(&self, event: &str, handler: Handler, once: bool) -> BindingId {
		let id = BindingId::generate();
		self.inner.bindings.lock().push(EventBinding {
			id: id.clone(),
			event: event.to_ascii_lowercase(),
			handler,
			component: self.inner.id.clone(),
			once,
		});
		id
	}

	/// Removes a binding. Returns whether it was attached.
	pub fn off(&self, id: &BindingId) -> bool {
		let mut bindings = self.inner.bindings.lock();
		let before = bindings.len();
		bindings.retain(|binding| &binding.id != id);
		bindings.len() != before
	}

	pub fn bindings(&self) -> Vec<EventBinding> {
		self.inner.bindings.lock().clone()
	}

	pub fn binding(&self, id: &BindingId) -> Option<EventBinding> {
		self.inner.bindings.lock().iter().find(|binding| &binding.id == id).cloned()
	}

	/// Whether handling one of this component's events re-renders the whole page (`true`, the default)
	/// or only this component's own subtree (`false`).
	pub fn set_auto_render(&self, auto_render: bool) {
		self.inner.auto_render.store(auto_render, Ordering::Release);
	}

	pub fn auto_render(&self) -> bool {
		self.inner.auto_render.load(Ordering::Acquire)
	}

	/// Runs the first time a page observes this component.
	pub fn on_mount(&self, hook: impl Fn(&Component) + Send + Sync + 'static) {
		*self.inner.on_mount.lock() = Some(Arc::new(hook));
	}

	/// Runs when the owning session shuts down while this component is still mounted.
	pub fn on_unmount(&self, hook: impl Fn(&Component) + Send + Sync + 'static) {
		*self.inner.on_unmount.lock() = Some(Arc::new(hook));
	}

	/// Runs whenever the component is permanently removed, e.g. by [`ComponentList::remove`].
	pub fn on_teardown(&self, hook: impl Fn(&Component) + Send + Sync + 'static) {
		*self.inner.on_teardown.lock() = Some(Arc::new(hook));
	}

	pub(crate) fn fire_mount(&self) {
		let hook = self.inner.on_mount.lock().clone();
		if let Some(hook) = hook {
			trace!(component = %self.inner.id, "Mount hook.");
			hook(self);
		}
	}

	pub(crate) fn fire_unmount(&self) {
		let hook = self.inner.on_unmount.lock().clone();
		if let Some(hook) = hook {
			trace!(component = %self.inner.id, "Unmount hook.");
			hook(self);
		}
	}

	/// Registers a one-shot callback that releases tracking state held elsewhere.
	pub(crate) fn add_release(&self, release: impl FnOnce() + Send + 'static) {
		self.inner.releases.lock().push(Box::new(release));
	}

	pub(crate) fn release_count(&self) -> usize {
		self.inner.releases.lock().len()
	}

	/// Removes this component from every structure tracking it and runs its teardown hook.
	pub fn teardown(&self) {
		let releases = core::mem::take(&mut *self.inner.releases.lock());
		trace!(component = %self.inner.id, releases = releases.len(), "Teardown.");
		for release in releases {
			release();
		}
		let hook = self.inner.on_teardown.lock().clone();
		if let Some(hook) = hook {
			hook(self);
		}
	}
}

impl Debug for Component {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Component")
			.field("id", &self.inner.id)
			.field("tag", &self.inner.tag.lock().name())
			.field("auto_render", &self.auto_render())
			.finish_non_exhaustive()
	}
}

/// An ordered, shared collection of child components.
///
/// Removing an item tears it down, so that a page doesn't keep tracking items that churn through the list.
#[derive(Clone, Default)]
pub struct ComponentList {
	items: Arc<Mutex<Vec<Component>>>,
}

impl ComponentList {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&self, component: Component) {
		self.items.lock().push(component);
	}

	/// Inserts at `index`, or at the end if `index` is out of bounds.
	pub fn insert(&self, index: usize, component: Component) {
		let mut items = self.items.lock();
		let index = index.min(items.len());
		items.insert(index, component);
	}

	pub fn remove(&self, id: &ComponentId) -> Option<Component> {
		let removed = {
			let mut items = self.items.lock();
			let index = items.iter().position(|item| item.id() == id)?;
			items.remove(index)
		};
		removed.teardown();
		Some(removed)
	}

	pub fn retain(&self, mut keep: impl FnMut(&Component) -> bool) {
		let removed: Vec<_> = {
			let mut items = self.items.lock();
			let (kept, removed) = items.drain(..).partition(|item| keep(item));
			*items = kept;
			removed
		};
		for component in removed {
			component.teardown();
		}
	}

	pub fn clear(&self) {
		self.retain(|_| false);
	}

	pub fn items(&self) -> Vec<Component> {
		self.items.lock().clone()
	}

	pub fn get(&self, index: usize) -> Option<Component> {
		self.items.lock().get(index).cloned()
	}

	pub fn len(&self) -> usize {
		self.items.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.lock().is_empty()
	}
}

impl Debug for ComponentList {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.items.lock().iter().map(Component::id)).finish()
	}
}
