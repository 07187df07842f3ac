//! Snapshot reconciliation: computes the ordered, addressed operations that turn one [`Snap`] list into another.
//!
//! # Addressing
//!
//! Each [`Diff`] is addressed by a [`Selector`] and a child index path below it. The selector is the document root
//! until recursion enters a component whose identity is the same on both sides, at which point it becomes that
//! component and the path restarts at `[]`. This keeps a component's own operations stable when its siblings move.
//!
//! # Ordering
//!
//! Within one child list, operations are emitted as follows:
//!
//! 1. deletes of components that are gone, in descending index order,
//! 2. then, for each stretch between components kept on both sides (their *anchors*), from left to right:
//!    pairwise operations at ascending indices, creates of surplus new nodes at ascending indices,
//!    deletes of surplus old nodes at descending indices, and finally the anchor component's own operations.
//!
//! Every index is valid against the list as left by all previous operations, so a client applies them in order.

use crate::{
	component::ComponentId,
	error::DiffError,
	snapshot::{Snap, SnapTag},
};
use core::fmt::{self, Display};
use hashbrown::HashMap;
use tracing::{error, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, Level};

/// The root an operation's path is relative to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
	/// The document body.
	Document,
	Component(ComponentId),
}

impl Selector {
	pub const DOCUMENT: &'static str = "doc";
}

impl Display for Selector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Selector::Document => f.write_str(Self::DOCUMENT),
			Selector::Component(id) => Display::fmt(id, f),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
	Create,
	Update,
	Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
	Text(String),
	Raw(String),
	Tag(SnapTag),
	/// `value` is `None` for deletes.
	Attribute { name: String, value: Option<String> },
}

impl Payload {
	fn node(snap: &Snap) -> Self {
		match snap {
			Snap::Text(text) => Payload::Text(text.clone()),
			Snap::Raw(markup) => Payload::Raw(markup.clone()),
			Snap::Tag(tag) => Payload::Tag(tag.clone()),
		}
	}

	/// The category of `snap` without its content, for deletes.
	fn hollow(snap: &Snap) -> Self {
		match snap {
			Snap::Text(_) => Payload::Text(String::new()),
			Snap::Raw(_) => Payload::Raw(String::new()),
			Snap::Tag(tag) => {
				let mut hollow = SnapTag::new(tag.name.clone(), tag.void);
				hollow.component = tag.component.clone();
				Payload::Tag(hollow)
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
	pub root: Selector,
	/// Child indices below `root`. For attribute operations, the path of the element that owns the attribute.
	pub path: Vec<usize>,
	pub kind: DiffKind,
	pub payload: Payload,
}

/// Stateless apart from its configured depth limit.
#[derive(Debug, Clone, Copy)]
pub struct Differ {
	depth_limit: usize,
}

impl Differ {
	#[must_use]
	pub fn new(depth_limit: usize) -> Self {
		Self { depth_limit }
	}

	/// Diffs two child lists of `root`.
	///
	/// # Errors
	///
	/// Iff the trees nest deeper than the depth limit.
	#[instrument(skip(old, new), fields(old.len = old.len(), new.len = new.len()))]
	pub fn diff(&self, root: &Selector, old: &[Snap], new: &[Snap]) -> Result<Vec<Diff>, DiffError> {
		let mut diffs = Vec::new();
		self.diff_children(&mut diffs, root, &[], old, new, self.depth_limit)?;
		trace!(diffs = diffs.len(), "Diff complete.");
		Ok(diffs)
	}

	/// Diffs a single tag, typically a component re-rendered on its own.
	///
	/// # Errors
	///
	/// Iff the trees nest deeper than the depth limit.
	#[instrument(skip(old, new), fields(old.name = old.name.as_str(), new.name = new.name.as_str()))]
	pub fn diff_tag(&self, root: &Selector, old: &SnapTag, new: &SnapTag) -> Result<Vec<Diff>, DiffError> {
		let mut diffs = Vec::new();
		self.diff_tags(&mut diffs, root, &[], old, new, self.depth_limit)?;
		Ok(diffs)
	}

	/// Creates every node of `new` into an empty root.
	#[must_use]
	pub fn create_all(root: &Selector, new: &[Snap]) -> Vec<Diff> {
		new.iter()
			.enumerate()
			.map(|(i, snap)| Diff { root: root.clone(), path: vec![i], kind: DiffKind::Create, payload: Payload::node(snap) })
			.collect()
	}

	fn diff_children(&self, diffs: &mut Vec<Diff>, root: &Selector, path: &[usize], old: &[Snap], new: &[Snap], depth_limit: usize) -> Result<(), DiffError> {
		if depth_limit == 0 {
			if cfg!(feature = "log-paths") {
				error!("Depth limit reached at {}/{:?}", root, path);
			} else {
				error!("Depth limit reached");
			}
			return Err(DiffError::DepthLimit);
		}
		let at = |i: usize| {
			let mut path = path.to_vec();
			path.push(i);
			path
		};

		// Keyed deletes.
		let new_ids: HashMap<&ComponentId, usize> = new.iter().enumerate().filter_map(|(i, snap)| snap.component().map(|id| (id, i))).collect();
		let mut working: Vec<&Snap> = Vec::with_capacity(old.len());
		let mut gone = Vec::new();
		for (i, snap) in old.iter().enumerate() {
			match snap.component() {
				Some(id) if !new_ids.contains_key(id) => gone.push(i),
				_ => working.push(snap),
			}
		}
		for &i in gone.iter().rev() {
			let span = trace_span!("Removing component", i, id = ?old[i].component());
			let _enter = span.enter();
			diffs.push(Diff { root: root.clone(), path: at(i), kind: DiffKind::Delete, payload: Payload::hollow(&old[i]) });
		}

		// Anchors: components kept on both sides, in an order both lists agree on.
		let mut anchors: Vec<(usize, usize)> = Vec::new();
		{
			let working_ids: HashMap<&ComponentId, usize> = working.iter().enumerate().filter_map(|(i, snap)| snap.component().map(|id| (id, i))).collect();
			let mut last = None;
			for (j, snap) in new.iter().enumerate() {
				if let Some(&i) = snap.component().and_then(|id| working_ids.get(id)) {
					if last.map_or(true, |last| i > last) {
						anchors.push((i, j));
						last = Some(i);
					}
				}
			}
		}

		let mut position = 0;
		let (mut w, mut n) = (0, 0);
		for anchor in anchors.iter().copied().map(Some).chain(Some(None)) {
			let (w_end, n_end) = anchor.unwrap_or((working.len(), new.len()));
			let stretch_old = &working[w..w_end];
			let stretch_new = &new[n..n_end];

			let paired = stretch_old.len().min(stretch_new.len());
			for i in 0..paired {
				self.diff_node(diffs, root, &at(position + i), stretch_old[i], &stretch_new[i], depth_limit)?;
			}
			for (i, snap) in stretch_new.iter().enumerate().skip(paired) {
				diffs.push(Diff { root: root.clone(), path: at(position + i), kind: DiffKind::Create, payload: Payload::node(snap) });
			}
			for i in (stretch_new.len()..stretch_old.len()).rev() {
				diffs.push(Diff { root: root.clone(), path: at(position + i), kind: DiffKind::Delete, payload: Payload::hollow(stretch_old[i]) });
			}
			position += stretch_new.len();

			if let Some((w_anchor, n_anchor)) = anchor {
				self.diff_node(diffs, root, &at(position), working[w_anchor], &new[n_anchor], depth_limit)?;
				position += 1;
				w = w_anchor + 1;
				n = n_anchor + 1;
			}
		}
		debug_assert_eq!(position, new.len());
		Ok(())
	}

	fn diff_node(&self, diffs: &mut Vec<Diff>, root: &Selector, path: &[usize], old: &Snap, new: &Snap, depth_limit: usize) -> Result<(), DiffError> {
		match (old, new) {
			(Snap::Text(t_1), Snap::Text(t_2)) => {
				if t_1 != t_2 {
					if STATIC_MAX_LEVEL >= Level::TRACE && cfg!(feature = "dangerous-logging") {
						trace!("Updating text {:?} -> {:?}", t_1, t_2);
					}
					diffs.push(Diff { root: root.clone(), path: path.to_vec(), kind: DiffKind::Update, payload: Payload::Text(t_2.clone()) });
				}
			}
			(Snap::Raw(r_1), Snap::Raw(r_2)) => {
				if r_1 != r_2 {
					diffs.push(Diff { root: root.clone(), path: path.to_vec(), kind: DiffKind::Update, payload: Payload::Raw(r_2.clone()) });
				}
			}
			(Snap::Tag(e_1), Snap::Tag(e_2)) => self.diff_tags(diffs, root, path, e_1, e_2, depth_limit)?,

			// Mismatching categories: Destroy and rebuild.
			(old, new) => {
				let span = trace_span!("Replace mismatching");
				let _enter = span.enter();
				diffs.push(Diff { root: root.clone(), path: path.to_vec(), kind: DiffKind::Delete, payload: Payload::hollow(old) });
				diffs.push(Diff { root: root.clone(), path: path.to_vec(), kind: DiffKind::Create, payload: Payload::node(new) });
			}
		}
		Ok(())
	}

	fn diff_tags(&self, diffs: &mut Vec<Diff>, root: &Selector, path: &[usize], old: &SnapTag, new: &SnapTag, depth_limit: usize) -> Result<(), DiffError> {
		let span = trace_span!("Diffing element", tag = new.name.as_str(), component = ?new.component);
		let _enter = span.enter();

		let component_root;
		let (root, path) = match (&old.component, &new.component) {
			(Some(c_1), Some(c_2)) if c_1 == c_2 => {
				component_root = Selector::Component(c_2.clone());
				(&component_root, &[][..])
			}
			_ => (root, path),
		};

		if old.name != new.name || old.void != new.void || old.component != new.component {
			diffs.push(Diff { root: root.clone(), path: path.to_vec(), kind: DiffKind::Update, payload: Payload::Tag(new.clone()) });
			return Ok(());
		}

		for name in old.attributes.keys().filter(|name| !new.attributes.contains_key(*name)) {
			diffs.push(Diff {
				root: root.clone(),
				path: path.to_vec(),
				kind: DiffKind::Delete,
				payload: Payload::Attribute { name: name.clone(), value: None },
			});
		}
		for (name, value) in &new.attributes {
			let kind = match old.attributes.get(name) {
				None => DiffKind::Create,
				Some(old_value) if old_value != value => DiffKind::Update,
				Some(_) => continue,
			};
			diffs.push(Diff {
				root: root.clone(),
				path: path.to_vec(),
				kind,
				payload: Payload::Attribute { name: name.clone(), value: Some(value.clone()) },
			});
		}

		self.diff_children(diffs, root, path, &old.children, &new.children, depth_limit.saturating_sub(1))
	}
}
