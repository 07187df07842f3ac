//! Per-page tracking state: mounted components, installed teardowns, initialized plugins and the binding table.
//!
//! Every entry added here has a removal path. Components leave through the release callback installed by the
//! `teardown` stage, bindings leave once no committed snapshot references them anymore.
//!
//! User callbacks are never invoked while the tracker's lock is held.

use crate::{
	component::{BindingId, Component, ComponentId, EventBinding},
	node::Node,
	rc_hash_map::RcHashMap,
};
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

#[derive(Clone, Default)]
pub struct Tracker {
	state: Arc<Mutex<TrackerState>>,
}

#[derive(Default)]
struct TrackerState {
	mounted: HashMap<ComponentId, Component>,
	teardown_installed: HashSet<ComponentId>,
	bindings: BindingTable,
	plugins: HashSet<&'static str>,
	plugin_scripts: Vec<Node>,
}

/// Binding id → binding, counted by the number of committed snapshot subtrees referencing it.
#[derive(Default)]
struct BindingTable(RcHashMap<BindingId, u32, EventBinding>);

impl BindingTable {
	fn replace_all(&mut self, bindings: Vec<EventBinding>) {
		self.0.clear();
		self.add(bindings);
	}

	fn add(&mut self, bindings: Vec<EventBinding>) {
		for binding in bindings {
			let id = binding.id().clone();
			if let Err(error) = self.0.increment_or_insert_with(id, || binding) {
				warn!("Binding table: {}", error);
			}
		}
	}

	fn rebind(&mut self, removed: &[BindingId], added: Vec<EventBinding>) -> usize {
		self.add(added);
		for id in removed {
			if let Err(error) = self.0.weak_decrement(id) {
				warn!("Binding table: {}", error);
			}
		}
		self.0.drain_weak().count()
	}

	fn remove_owned(&mut self, component: &ComponentId) {
		self.0.retain(|_, binding| binding.component() != component);
	}
}

impl Tracker {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Records `component` as mounted. Returns whether this is its first observation.
	pub fn mount(&self, component: &Component) -> bool {
		let mut state = self.state.lock();
		if state.mounted.contains_key(component.id()) {
			false
		} else {
			state.mounted.insert(component.id().clone(), component.clone());
			true
		}
	}

	pub fn is_mounted(&self, id: &ComponentId) -> bool {
		self.state.lock().mounted.contains_key(id)
	}

	pub fn mounted(&self, id: &ComponentId) -> Option<Component> {
		self.state.lock().mounted.get(id).cloned()
	}

	pub fn mounted_len(&self) -> usize {
		self.state.lock().mounted.len()
	}

	/// Empties the mounted set, for shutdown.
	pub fn drain_mounted(&self) -> Vec<Component> {
		self.state.lock().mounted.drain().map(|(_, component)| component).collect()
	}

	/// Marks `component` as having a tracker-release teardown. Returns `false` if it already had one.
	pub(crate) fn mark_teardown(&self, component: &Component) -> bool {
		self.state.lock().teardown_installed.insert(component.id().clone())
	}

	pub fn teardown_len(&self) -> usize {
		self.state.lock().teardown_installed.len()
	}

	/// A callback that drops every trace of `id` from this tracker, if it still exists by then.
	pub(crate) fn releaser(&self, id: ComponentId) -> impl FnOnce() + Send + 'static {
		let state: Weak<Mutex<TrackerState>> = Arc::downgrade(&self.state);
		move || {
			if let Some(state) = state.upgrade() {
				let mut state = state.lock();
				state.mounted.remove(&id);
				state.teardown_installed.remove(&id);
				state.bindings.remove_owned(&id);
				trace!(component = %id, "Released from tracker.");
			}
		}
	}

	pub fn is_plugin_initialized(&self, name: &str) -> bool {
		self.state.lock().plugins.contains(name)
	}

	/// Records an initialized plugin and its script. Returns `false` (and drops `script`) if it was known already.
	pub fn register_plugin(&self, name: &'static str, script: Node) -> bool {
		let mut state = self.state.lock();
		if state.plugins.insert(name) {
			state.plugin_scripts.push(script);
			true
		} else {
			false
		}
	}

	pub fn plugin_count(&self) -> usize {
		self.state.lock().plugins.len()
	}

	pub fn plugin_scripts(&self) -> Vec<Node> {
		self.state.lock().plugin_scripts.clone()
	}

	pub fn binding(&self, id: &BindingId) -> Option<EventBinding> {
		self.state.lock().bindings.0.get(id).cloned()
	}

	pub fn binding_count(&self) -> usize {
		self.state.lock().bindings.0.len()
	}

	/// Replaces the binding table with the bindings of a freshly committed full snapshot.
	pub fn commit_bindings(&self, bindings: Vec<EventBinding>) {
		self.state.lock().bindings.replace_all(bindings);
	}

	/// Swaps the bindings of a re-rendered subtree. Returns how many bindings were freed.
	pub fn rebind(&self, removed: &[BindingId], added: Vec<EventBinding>) -> usize {
		self.state.lock().bindings.rebind(removed, added)
	}

	/// Drops all state.
	pub fn clear(&self) {
		let mut state = self.state.lock();
		state.mounted.clear();
		state.teardown_installed.clear();
		state.bindings.0.clear();
		state.plugins.clear();
		state.plugin_scripts.clear();
	}
}

impl core::fmt::Debug for Tracker {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("Tracker")
			.field("mounted", &state.mounted.len())
			.field("teardown_installed", &state.teardown_installed.len())
			.field("bindings", &state.bindings.0.len())
			.field("plugins", &state.plugins)
			.finish()
	}
}
