//! The render pipeline: walks a live [`Node`] tree into a [`Snap`] list, calling each enabled [`Stage`]'s hooks on the way.

use crate::{
	component::{Component, EventBinding, ID_ATTRIBUTE},
	config::RenderConfig,
	error::PipelineError,
	node::{Node, Tag},
	plugin::AttributePlugin,
	snapshot::{self, Snap, SnapTag},
	stages::{BindingStage, MountStage, PluginStage, TeardownStage},
	tracker::Tracker,
};
use core::fmt::{self, Debug};
use std::sync::Arc;
use tracing::{error, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

/// Returned by a hook to stop the current walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
	/// The in-flight snapshot is invalid. The walk starts over.
	Restart,
	/// The render fails.
	Fail(String),
}

pub type Flow = Result<(), Interrupt>;

/// An attribute on its way into a [`SnapTag`]. Hooks may rewrite or drop (`value: None`) it.
#[derive(Clone)]
pub struct RenderAttribute<'n> {
	pub name: String,
	pub value: Option<String>,
	pub plugin: Option<&'n Arc<dyn AttributePlugin>>,
}

impl Debug for RenderAttribute<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderAttribute")
			.field("name", &self.name)
			.field("value", &self.value)
			.field("plugin", &self.plugin.map(|plugin| plugin.name()))
			.finish()
	}
}

/// State of one walk, shared by all hooks.
pub struct WalkContext<'a> {
	pub tracker: &'a Tracker,
	/// Bindings registered so far in this walk.
	pub bindings: Vec<EventBinding>,
	/// The component whose own tag is being processed. `None` while walking plain tags, including a component's children.
	pub component: Option<Component>,
}

impl<'a> WalkContext<'a> {
	fn new(tracker: &'a Tracker) -> Self {
		Self { tracker, bindings: Vec::new(), component: None }
	}
}

/// Hooks a stage can implement. All default to doing nothing.
#[allow(unused_variables)]
pub trait StageHooks: Send + Sync {
	fn before_walk(&self, cx: &mut WalkContext<'_>, root: &Node) -> Flow {
		Ok(())
	}

	/// Called for every text-producing node, including cells.
	fn on_text(&self, cx: &mut WalkContext<'_>, text: &mut String) -> Flow {
		Ok(())
	}

	fn before_tag(&self, cx: &mut WalkContext<'_>, tag: &mut SnapTag) -> Flow {
		Ok(())
	}

	fn before_attribute(&self, cx: &mut WalkContext<'_>, attribute: &mut RenderAttribute<'_>) -> Flow {
		Ok(())
	}

	fn after_attribute(&self, cx: &mut WalkContext<'_>, attribute: &RenderAttribute<'_>) -> Flow {
		Ok(())
	}

	/// Called after the tag's children were walked.
	fn after_tag(&self, cx: &mut WalkContext<'_>, tag: &mut SnapTag) -> Flow {
		Ok(())
	}

	fn after_walk(&self, cx: &mut WalkContext<'_>, snapshot: &mut Vec<Snap>) -> Flow {
		Ok(())
	}
}

pub struct Stage {
	name: String,
	enabled: bool,
	hooks: Box<dyn StageHooks>,
}

impl Stage {
	pub fn new(name: impl Into<String>, hooks: impl StageHooks + 'static) -> Self {
		Self { name: name.into(), enabled: true, hooks: Box::new(hooks) }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}
}

impl Debug for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Stage").field("name", &self.name).field("enabled", &self.enabled).finish_non_exhaustive()
	}
}

/// A successful walk.
#[derive(Debug)]
pub struct Rendered {
	pub snapshot: Vec<Snap>,
	pub bindings: Vec<EventBinding>,
	pub restarts: usize,
}

enum Halt {
	Restart { stage: String },
	Fail { stage: String, message: String },
	DepthLimit,
}

/// Nesting budget of one walk step. Elements and dynamic nodes each take one level.
fn descend(depth_limit: usize) -> Result<usize, Halt> {
	depth_limit.checked_sub(1).ok_or_else(|| {
		error!("Depth limit reached");
		Halt::DepthLimit
	})
}

#[derive(Debug)]
pub struct Pipeline {
	stages: Vec<Stage>,
	depth_limit: usize,
}

impl Default for Pipeline {
	fn default() -> Self {
		Self { stages: Vec::new(), depth_limit: RenderConfig::default().depth_limit }
	}
}

impl Pipeline {
	/// A pipeline without stages.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// How deep elements and dynamic nodes may nest before a walk fails.
	pub fn set_depth_limit(&mut self, depth_limit: usize) {
		self.depth_limit = depth_limit;
	}

	pub fn depth_limit(&self) -> usize {
		self.depth_limit
	}

	/// `mount`, `plugins`, `bindings`, `teardown`.
	#[must_use]
	pub fn standard() -> Self {
		Self {
			stages: vec![
				Stage::new(MountStage::NAME, MountStage),
				Stage::new(PluginStage::NAME, PluginStage),
				Stage::new(BindingStage::NAME, BindingStage),
				Stage::new(TeardownStage::NAME, TeardownStage),
			],
			..Self::default()
		}
	}

	pub fn stage_names(&self) -> Vec<&str> {
		self.stages.iter().map(Stage::name).collect()
	}

	fn position(&self, name: &str) -> Result<usize, PipelineError> {
		self.stages
			.iter()
			.position(|stage| stage.name == name)
			.ok_or_else(|| PipelineError::UnknownStage(name.to_owned()))
	}

	fn check_unique(&self, stage: &Stage) -> Result<(), PipelineError> {
		if self.stages.iter().any(|existing| existing.name == stage.name) {
			Err(PipelineError::DuplicateStage(stage.name.clone()))
		} else {
			Ok(())
		}
	}

	pub fn push(&mut self, stage: Stage) -> Result<(), PipelineError> {
		self.check_unique(&stage)?;
		self.stages.push(stage);
		Ok(())
	}

	pub fn insert_before(&mut self, anchor: &str, stage: Stage) -> Result<(), PipelineError> {
		let i = self.position(anchor)?;
		self.check_unique(&stage)?;
		self.stages.insert(i, stage);
		Ok(())
	}

	pub fn insert_after(&mut self, anchor: &str, stage: Stage) -> Result<(), PipelineError> {
		let i = self.position(anchor)?;
		self.check_unique(&stage)?;
		self.stages.insert(i + 1, stage);
		Ok(())
	}

	pub fn remove(&mut self, name: &str) -> Result<Stage, PipelineError> {
		let i = self.position(name)?;
		Ok(self.stages.remove(i))
	}

	pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), PipelineError> {
		let i = self.position(name)?;
		self.stages[i].enabled = enabled;
		Ok(())
	}

	/// Walks `root` into a normalized snapshot.
	///
	/// # Errors
	///
	/// Iff a stage fails, the tree nests deeper than the depth limit, or the walk was restarted more than
	/// `max_restarts` times.
	#[instrument(skip(self, tracker, root))]
	pub fn render(&self, tracker: &Tracker, root: &Node, max_restarts: usize) -> Result<Rendered, PipelineError> {
		let mut restarts = 0;
		loop {
			let mut cx = WalkContext::new(tracker);
			match self.walk(&mut cx, root) {
				Ok(snapshot) => {
					trace!(restarts, bindings = cx.bindings.len(), "Render complete.");
					return Ok(Rendered { snapshot, bindings: cx.bindings, restarts });
				}
				Err(Halt::Restart { stage }) => {
					restarts += 1;
					if restarts > max_restarts {
						if STATIC_MAX_LEVEL >= Level::WARN {
							warn!("Stage {:?} requested restart #{}, giving up.", stage, restarts);
						}
						return Err(PipelineError::RestartLimit(max_restarts));
					}
					trace!(stage = stage.as_str(), restarts, "Render restarted.");
				}
				Err(Halt::Fail { stage, message }) => return Err(PipelineError::Stage { stage, message }),
				Err(Halt::DepthLimit) => return Err(PipelineError::DepthLimit(self.depth_limit)),
			}
		}
	}

	/// Walks a single component into its tag.
	///
	/// # Errors
	///
	/// As [`Pipeline::render`].
	pub fn render_component(&self, tracker: &Tracker, component: &Component, max_restarts: usize) -> Result<(SnapTag, Vec<EventBinding>), PipelineError> {
		let Rendered { snapshot, bindings, .. } = self.render(tracker, &Node::Component(component.clone()), max_restarts)?;
		match snapshot.into_iter().next() {
			Some(Snap::Tag(tag)) => Ok((tag, bindings)),
			_ => Err(PipelineError::Stage {
				stage: "walk".to_owned(),
				message: format!("component {} did not render to a tag", component.id()),
			}),
		}
	}

	fn each(&self, mut hook: impl FnMut(&dyn StageHooks) -> Flow) -> Result<(), Halt> {
		for stage in self.stages.iter().filter(|stage| stage.enabled) {
			hook(&*stage.hooks).map_err(|interrupt| match interrupt {
				Interrupt::Restart => Halt::Restart { stage: stage.name.clone() },
				Interrupt::Fail(message) => Halt::Fail { stage: stage.name.clone(), message },
			})?;
		}
		Ok(())
	}

	fn walk(&self, cx: &mut WalkContext<'_>, root: &Node) -> Result<Vec<Snap>, Halt> {
		self.each(|hooks| hooks.before_walk(cx, root))?;
		let mut snapshot = Vec::new();
		self.walk_node(cx, root, &mut snapshot, self.depth_limit)?;
		snapshot::coalesce(&mut snapshot);
		self.each(|hooks| hooks.after_walk(cx, &mut snapshot))?;
		Ok(snapshot)
	}

	fn walk_node(&self, cx: &mut WalkContext<'_>, node: &Node, out: &mut Vec<Snap>, depth_limit: usize) -> Result<(), Halt> {
		match node {
			Node::Empty => Ok(()),
			Node::Text(text) => self.walk_text(cx, text.clone(), out),
			Node::Cell(cell) => self.walk_text(cx, cell.read(), out),
			Node::Raw(markup) => {
				if !markup.is_empty() {
					out.push(Snap::Raw(markup.clone()));
				}
				Ok(())
			}
			Node::Group(nodes) => {
				for node in nodes {
					self.walk_node(cx, node, out, depth_limit)?;
				}
				Ok(())
			}
			Node::Dynamic(produce) => {
				let depth_limit = descend(depth_limit)?;
				let node = produce();
				self.walk_node(cx, &node, out, depth_limit)
			}
			Node::Tag(tag) => {
				let snap = self.walk_tag(cx, tag, None, depth_limit)?;
				out.push(Snap::Tag(snap));
				Ok(())
			}
			Node::Component(component) => {
				let tag = component.tag();
				let snap = self.walk_tag(cx, &tag, Some(component), depth_limit)?;
				out.push(Snap::Tag(snap));
				Ok(())
			}
		}
	}

	fn walk_text(&self, cx: &mut WalkContext<'_>, mut text: String, out: &mut Vec<Snap>) -> Result<(), Halt> {
		self.each(|hooks| hooks.on_text(cx, &mut text))?;
		if !text.is_empty() {
			out.push(Snap::Text(text));
		}
		Ok(())
	}

	fn walk_tag(&self, cx: &mut WalkContext<'_>, tag: &Tag, component: Option<&Component>, depth_limit: usize) -> Result<SnapTag, Halt> {
		let span = trace_span!("walk_tag", name = tag.name(), component = ?component.map(Component::id));
		let _enter = span.enter();
		let depth_limit = descend(depth_limit)?;

		let mut snap = SnapTag::new(tag.name(), tag.is_void());
		if let Some(component) = component {
			snap.component = Some(component.id().clone());
			snap.attributes.insert(ID_ATTRIBUTE.to_owned(), component.id().to_string());
		}
		cx.component = component.cloned();
		self.each(|hooks| hooks.before_tag(cx, &mut snap))?;

		let classes = (!tag.classes().is_empty()).then(|| RenderAttribute {
			name: "class".to_owned(),
			value: Some(tag.classes().render()),
			plugin: None,
		});
		let styles = (!tag.styles().is_empty()).then(|| RenderAttribute {
			name: "style".to_owned(),
			value: Some(tag.styles().render()),
			plugin: None,
		});
		let attributes = tag
			.attributes()
			.iter()
			.map(|attribute| RenderAttribute {
				name: attribute.name().to_owned(),
				value: attribute.resolve(),
				plugin: attribute.plugin(),
			})
			.chain(classes)
			.chain(styles);
		for mut attribute in attributes {
			self.each(|hooks| hooks.before_attribute(cx, &mut attribute))?;
			if let Some(value) = &attribute.value {
				snap.attributes.insert(attribute.name.clone(), value.clone());
			}
			self.each(|hooks| hooks.after_attribute(cx, &attribute))?;
		}

		cx.component = None;
		let rendered_children = component.map(Component::render_children);
		let children = tag.children().iter().chain(rendered_children.as_ref());
		if snap.void {
			if STATIC_MAX_LEVEL >= Level::WARN && children.clone().any(|child| !child.is_prunable()) {
				warn!("Void element <{}> has children, which are not rendered.", snap.name);
			}
		} else {
			for child in children {
				self.walk_node(cx, child, &mut snap.children, depth_limit)?;
			}
			snapshot::coalesce(&mut snap.children);
		}

		cx.component = component.cloned();
		self.each(|hooks| hooks.after_tag(cx, &mut snap))?;
		cx.component = None;
		Ok(snap)
	}
}
