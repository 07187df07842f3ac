//! The built-in stages installed by [`Pipeline::standard`](`crate::pipeline::Pipeline::standard`).

use crate::{
	component::BINDINGS_ATTRIBUTE,
	pipeline::{Flow, Interrupt, RenderAttribute, StageHooks, WalkContext},
	snapshot::SnapTag,
};
use tracing::{debug, trace};

/// Fires a component's mount hook the first time the page sees its identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct MountStage;

impl MountStage {
	pub const NAME: &'static str = "mount";
}

impl StageHooks for MountStage {
	fn before_tag(&self, cx: &mut WalkContext<'_>, _tag: &mut SnapTag) -> Flow {
		if let Some(component) = &cx.component {
			if cx.tracker.mount(component) {
				component.fire_mount();
			}
		}
		Ok(())
	}
}

/// Initializes attribute plugins on first use.
///
/// The plugin's script becomes part of the page root, which the snapshot under construction doesn't contain yet,
/// so the walk is restarted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PluginStage;

impl PluginStage {
	pub const NAME: &'static str = "plugins";
}

impl StageHooks for PluginStage {
	fn before_attribute(&self, cx: &mut WalkContext<'_>, attribute: &mut RenderAttribute<'_>) -> Flow {
		match attribute.plugin {
			Some(plugin) if !cx.tracker.is_plugin_initialized(plugin.name()) => {
				let script = plugin.initialize();
				if cx.tracker.register_plugin(plugin.name(), script) {
					debug!(plugin = plugin.name(), "Initialized attribute plugin.");
				}
				Err(Interrupt::Restart)
			}
			_ => Ok(()),
		}
	}
}

/// Collects each component's bindings into the walk and writes them into `data-live-on`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindingStage;

impl BindingStage {
	pub const NAME: &'static str = "bindings";
}

impl StageHooks for BindingStage {
	fn after_tag(&self, cx: &mut WalkContext<'_>, tag: &mut SnapTag) -> Flow {
		let Some(component) = &cx.component else { return Ok(()) };
		let bindings = component.bindings();
		if bindings.is_empty() {
			return Ok(());
		}
		let list = bindings.iter().map(|binding| format!("{}:{}", binding.event(), binding.id())).collect::<Vec<_>>().join(",");
		tag.attributes.insert(BINDINGS_ATTRIBUTE.to_owned(), list);
		tag.bindings = bindings.iter().map(|binding| binding.id().clone()).collect();
		cx.bindings.extend(bindings);
		Ok(())
	}
}

/// Gives every tracked component a teardown that releases it from the tracker.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeardownStage;

impl TeardownStage {
	pub const NAME: &'static str = "teardown";
}

impl StageHooks for TeardownStage {
	fn before_tag(&self, cx: &mut WalkContext<'_>, _tag: &mut SnapTag) -> Flow {
		if let Some(component) = &cx.component {
			if cx.tracker.mark_teardown(component) {
				trace!(component = %component.id(), "Installing tracker release.");
				component.add_release(cx.tracker.releaser(component.id().clone()));
			}
		}
		Ok(())
	}
}
