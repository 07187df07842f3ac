//! One document instance: its live tree, its render state and the operations that turn state changes into patches.

use crate::{
	component::{BindingId, ComponentId, EventBinding, ID_ATTRIBUTE},
	config::RenderConfig,
	diff::{Diff, Differ, Selector},
	error::{DiffError, Error},
	node::Node,
	pipeline::Pipeline,
	protocol::Event,
	session::SessionId,
	snapshot::{self, Snap},
	tracker::Tracker,
};
use core::{
	fmt::{self, Debug},
	time::Duration,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument, level_filters::STATIC_MAX_LEVEL, trace, warn, Level};

const HASH_PLACEHOLDER: &str = "{{live-hash}}";

/// A periodic out-of-band update. After each tick, the page is re-rendered and the resulting patch sent.
#[derive(Clone)]
pub struct Timer {
	pub period: Duration,
	tick: Arc<dyn Fn() + Send + Sync>,
}

impl Timer {
	pub fn tick(&self) {
		(self.tick)();
	}
}

impl Debug for Timer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Timer").field("period", &self.period).finish_non_exhaustive()
	}
}

pub struct Page {
	title: String,
	head: Vec<Node>,
	body: Node,
	pipeline: Pipeline,
	tracker: Tracker,
	differ: Differ,
	max_restarts: usize,
	previous: Option<Vec<Snap>>,
	timers: Vec<Timer>,
	closed: bool,
}

impl Page {
	pub fn new(body: impl Into<Node>, config: &RenderConfig) -> Self {
		let mut pipeline = Pipeline::standard();
		pipeline.set_depth_limit(config.depth_limit);
		Self {
			title: String::new(),
			head: Vec::new(),
			body: body.into(),
			pipeline,
			tracker: Tracker::new(),
			differ: Differ::new(config.depth_limit),
			max_restarts: config.max_restarts,
			previous: None,
			timers: Vec::new(),
			closed: false,
		}
	}

	#[must_use]
	pub fn with_title(mut self, title: impl Into<String>) -> Self {
		self.title = title.into();
		self
	}

	/// Adds static markup to the document head.
	#[must_use]
	pub fn with_head(mut self, node: impl Into<Node>) -> Self {
		self.head.push(node.into());
		self
	}

	pub fn title(&self) -> &str {
		&self.title
	}

	pub fn pipeline_mut(&mut self) -> &mut Pipeline {
		&mut self.pipeline
	}

	pub fn tracker(&self) -> &Tracker {
		&self.tracker
	}

	/// The last committed snapshot of the body.
	pub fn snapshot(&self) -> Option<&[Snap]> {
		self.previous.as_deref()
	}

	pub fn is_closed(&self) -> bool {
		self.closed
	}

	/// Registers a periodic callback. Timers run while a connection is attached.
	pub fn every(&mut self, period: Duration, tick: impl Fn() + Send + Sync + 'static) {
		self.timers.push(Timer { period, tick: Arc::new(tick) });
	}

	pub fn timers(&self) -> &[Timer] {
		&self.timers
	}

	/// The body followed by the scripts of initialized attribute plugins.
	fn root(&self) -> Node {
		let tracker = self.tracker.clone();
		Node::Group(vec![self.body.clone(), Node::dynamic(move || Node::Group(tracker.plugin_scripts()))])
	}

	fn render_body(&self) -> Result<(Vec<Snap>, Vec<EventBinding>), Error> {
		let rendered = self.pipeline.render(&self.tracker, &self.root(), self.max_restarts)?;
		Ok((rendered.snapshot, rendered.bindings))
	}

	fn commit(&mut self, snapshot: Vec<Snap>, bindings: Vec<EventBinding>) {
		self.tracker.commit_bindings(bindings);
		self.previous = Some(snapshot);
	}

	/// Renders the complete static document and makes it the baseline for subsequent diffs.
	///
	/// # Errors
	///
	/// Iff the render fails.
	#[instrument(skip(self))]
	pub fn render_document(&mut self, session: Option<&SessionId>) -> Result<String, Error> {
		let (body, bindings) = self.render_body()?;
		let body_html = snapshot::to_html(&body);
		self.commit(body, bindings);

		let head = Pipeline::new().render(&Tracker::new(), &Node::Group(self.head.clone()), self.max_restarts)?;
		let mut html = String::from("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
		html.push_str("<title>");
		html.push_str(&snapshot::escape(&self.title, false));
		html.push_str("</title>");
		if let Some(session) = session {
			html.push_str("<meta name=\"live-session\" content=\"");
			html.push_str(&snapshot::escape(session.as_str(), true));
			html.push_str("\">");
		}
		html.push_str("<meta name=\"live-hash\" content=\"");
		html.push_str(HASH_PLACEHOLDER);
		html.push_str("\">");
		html.push_str(&snapshot::to_html(&head.snapshot));
		html.push_str("</head><body ");
		html.push_str(ID_ATTRIBUTE);
		html.push_str("=\"");
		html.push_str(Selector::DOCUMENT);
		html.push_str("\">");
		html.push_str(&body_html);
		html.push_str("</body></html>");

		let hash = Sha256::digest(body_html.as_bytes()).iter().map(|byte| format!("{:02x}", byte)).collect::<String>();
		trace!(hash = hash.as_str(), "Rendered document.");
		Ok(html.replacen(HASH_PLACEHOLDER, &hash, 1))
	}

	/// Re-renders everything and diffs it against the previous snapshot.
	///
	/// Nothing is committed if the render or diff fails.
	///
	/// # Errors
	///
	/// Iff the render or diff fails.
	#[instrument(skip(self))]
	pub fn render_full(&mut self) -> Result<Vec<Diff>, Error> {
		let (snapshot, bindings) = self.render_body()?;
		let diffs = self.differ.diff(&Selector::Document, self.previous.as_deref().unwrap_or_default(), &snapshot)?;
		self.commit(snapshot, bindings);
		Ok(diffs)
	}

	/// Re-renders a single component and diffs only its subtree, addressed to its id.
	///
	/// Falls back to [`Page::render_full`] if the component isn't part of the previous snapshot
	/// or rendering it initialized a plugin.
	///
	/// # Errors
	///
	/// Iff the render or diff fails.
	#[instrument(skip(self))]
	pub fn render_component(&mut self, id: &ComponentId) -> Result<Vec<Diff>, Error> {
		let Some(component) = self.tracker.mounted(id) else {
			debug!("Component not mounted, rendering everything.");
			return self.render_full();
		};
		let plugins = self.tracker.plugin_count();
		let (tag, bindings) = self.pipeline.render_component(&self.tracker, &component, self.max_restarts)?;
		if self.tracker.plugin_count() != plugins {
			return self.render_full();
		}

		let Some(old) = self.previous.as_deref_mut().and_then(|previous| snapshot::find_component_mut(previous, id)) else {
			if STATIC_MAX_LEVEL >= Level::DEBUG {
				debug!("{}", DiffError::MissingComponent(id.clone()));
			}
			return self.render_full();
		};
		let diffs = self.differ.diff_tag(&Selector::Component(id.clone()), old, &tag)?;

		let mut removed = Vec::new();
		old.collect_bindings(&mut removed);
		let freed = self.tracker.rebind(&removed, bindings);
		trace!(freed, "Rebound component bindings.");
		*old = tag;
		Ok(diffs)
	}

	/// Renders everything as creates into an empty root, for clients whose document state is unknown.
	///
	/// # Errors
	///
	/// Iff the render fails.
	#[instrument(skip(self))]
	pub fn reset(&mut self) -> Result<Vec<Diff>, Error> {
		let (snapshot, bindings) = self.render_body()?;
		let diffs = Differ::create_all(&Selector::Document, &snapshot);
		self.commit(snapshot, bindings);
		Ok(diffs)
	}

	/// Invokes the handlers bound to `ids`, then re-renders.
	///
	/// Any handled component with auto-render enabled causes a full render. Otherwise each handled component is
	/// re-rendered on its own.
	///
	/// # Errors
	///
	/// Iff the re-render fails. Unknown or stale binding ids are skipped.
	#[instrument(skip(self, event), fields(event = event.event_type.as_str()))]
	pub fn dispatch(&mut self, event: &Event, ids: &[BindingId]) -> Result<Vec<Diff>, Error> {
		let mut full = false;
		let mut partial: Vec<ComponentId> = Vec::new();
		for id in ids {
			let Some(binding) = self.tracker.binding(id) else {
				debug!(binding = %id, "Unknown binding.");
				continue;
			};
			let Some(component) = self.tracker.mounted(binding.component()) else {
				debug!(binding = %id, "Binding of an unmounted component.");
				continue;
			};
			if component.binding(id).is_none() {
				debug!(binding = %id, "Binding was detached.");
				continue;
			}
			if binding.is_once() {
				component.off(id);
			}
			binding.call(&component, event);

			if component.auto_render() {
				full = true;
			} else if !partial.contains(component.id()) {
				partial.push(component.id().clone());
			}
		}

		if full {
			self.render_full()
		} else {
			let mut diffs = Vec::new();
			for id in &partial {
				diffs.extend(self.render_component(id)?);
			}
			Ok(diffs)
		}
	}

	/// Fires the unmount hook of every still-mounted component once and drops all tracking state. Idempotent.
	pub fn close(&mut self) {
		if self.closed {
			return;
		}
		self.closed = true;
		let mounted = self.tracker.drain_mounted();
		if STATIC_MAX_LEVEL >= Level::WARN && mounted.len() >= 10_000 {
			warn!("Closing a page with {} mounted components.", mounted.len());
		}
		for component in mounted {
			component.fire_unmount();
		}
		self.tracker.clear();
		self.timers.clear();
		self.previous = None;
	}
}

impl Debug for Page {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Page")
			.field("title", &self.title)
			.field("pipeline", &self.pipeline)
			.field("tracker", &self.tracker)
			.field("timers", &self.timers.len())
			.field("closed", &self.closed)
			.finish_non_exhaustive()
	}
}
