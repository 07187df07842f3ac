mod harness_;

use live_dom::{
	args,
	error::PipelineError,
	node::{class, Attribute, Node, Tag},
	pipeline::{Flow, Interrupt, Pipeline, RenderAttribute, Stage, StageHooks, WalkContext},
	plugin::AttributePlugin,
	snapshot::{self, Snap, SnapTag},
	stages::{BindingStage, MountStage},
	tracker::Tracker,
	Cell, Component,
};
use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc,
};

fn render(pipeline: &Pipeline, tracker: &Tracker, root: &Node) -> Vec<Snap> {
	pipeline.render(tracker, root, 8).unwrap().snapshot
}

#[test]
fn adjacent_text_coalesces_before_diffing() {
	harness_::init_logging();
	let root = Node::group([Node::from("a"), Node::from("b"), Node::from(Tag::empty("p").unwrap())]);
	let snapshot = render(&Pipeline::standard(), &Tracker::new(), &root);
	assert_eq!(snapshot.len(), 2);
	assert_eq!(snapshot[0], Snap::Text("ab".into()));
	assert!(matches!(&snapshot[1], Snap::Tag(tag) if tag.name == "p"));
}

#[test]
fn groups_flatten_and_empties_are_pruned() {
	let root = Node::group([
		Node::Empty,
		Node::group([Node::from("x"), Node::group([Node::from(String::new()), Node::from("y")])]),
		Node::dynamic(|| Node::Empty),
		Node::raw("<hr>"),
	]);
	let snapshot = render(&Pipeline::new(), &Tracker::new(), &root);
	assert_eq!(snapshot, vec![Snap::Text("xy".into()), Snap::Raw("<hr>".into())]);
}

#[test]
fn cells_and_dynamics_are_read_at_render_time() {
	let count = Cell::new(0);
	let root = Node::from(Tag::new("p", args!["Count: ", &count, Attribute::bound("data-count", &count)]).unwrap());
	let tracker = Tracker::new();
	let pipeline = Pipeline::standard();

	count.set(5);
	let snapshot = render(&pipeline, &tracker, &root);
	assert_eq!(snapshot::to_html(&snapshot), "<p data-count=\"5\">Count: 5</p>");
}

#[test]
fn components_carry_identity_and_bindings() {
	let button = Component::new("button", args![class("primary")]).unwrap().render_with(|| "Go".into());
	let binding = button.on("click", |_, _| ());
	let tracker = Tracker::new();
	let rendered = Pipeline::standard().render(&tracker, &Node::from(&button), 8).unwrap();

	let Snap::Tag(tag) = &rendered.snapshot[0] else { panic!() };
	assert_eq!(tag.component.as_ref(), Some(button.id()));
	assert_eq!(tag.attribute("data-live-id"), Some(button.id().as_str()));
	assert_eq!(tag.attribute("data-live-on"), Some(format!("click:{}", binding).as_str()));
	assert_eq!(tag.attribute("class"), Some("primary"));
	assert_eq!(tag.bindings, vec![binding.clone()]);
	assert_eq!(rendered.bindings.len(), 1);
	assert_eq!(tag.children, vec![Snap::Text("Go".into())]);
}

#[test]
fn mount_fires_once_per_identity() {
	let mounts = Arc::new(AtomicUsize::new(0));
	let component = Component::new("div", None).unwrap();
	{
		let mounts = mounts.clone();
		component.on_mount(move |_| {
			mounts.fetch_add(1, Ordering::SeqCst);
		});
	}
	let root = Node::group([Node::from(&component), Node::from(&component)]);
	let tracker = Tracker::new();
	let pipeline = Pipeline::standard();
	render(&pipeline, &tracker, &root);
	render(&pipeline, &tracker, &root);
	assert_eq!(mounts.load(Ordering::SeqCst), 1);
	assert!(tracker.is_mounted(component.id()));

	component.teardown();
	assert!(!tracker.is_mounted(component.id()));
	render(&pipeline, &tracker, &root);
	assert_eq!(mounts.load(Ordering::SeqCst), 2);
}

#[test]
fn stages_can_be_positioned_removed_and_disabled() {
	struct Nop;
	impl StageHooks for Nop {}

	let mut pipeline = Pipeline::standard();
	assert_eq!(pipeline.stage_names(), ["mount", "plugins", "bindings", "teardown"]);

	pipeline.insert_before("bindings", Stage::new("a", Nop)).unwrap();
	pipeline.insert_after("teardown", Stage::new("b", Nop)).unwrap();
	pipeline.push(Stage::new("c", Nop)).unwrap();
	assert_eq!(pipeline.stage_names(), ["mount", "plugins", "a", "bindings", "teardown", "b", "c"]);

	assert_eq!(pipeline.insert_before("nope", Stage::new("d", Nop)), Err(PipelineError::UnknownStage("nope".into())));
	assert_eq!(pipeline.push(Stage::new("a", Nop)), Err(PipelineError::DuplicateStage("a".into())));
	assert_eq!(pipeline.remove("a").unwrap().name(), "a");
	assert!(pipeline.remove("a").is_err());

	pipeline.set_enabled(BindingStage::NAME, false).unwrap();
	let component = Component::new("div", None).unwrap();
	component.on("click", |_, _| ());
	let rendered = pipeline.render(&Tracker::new(), &Node::from(&component), 0).unwrap();
	assert!(rendered.bindings.is_empty());
	assert_eq!(rendered.snapshot[0].as_tag().unwrap().attribute("data-live-on"), None);
}

#[test]
fn hooks_compose_in_list_order() {
	struct Suffix(&'static str);
	impl StageHooks for Suffix {
		fn on_text(&self, _: &mut WalkContext<'_>, text: &mut String) -> Flow {
			text.push_str(self.0);
			Ok(())
		}

		fn after_tag(&self, _: &mut WalkContext<'_>, tag: &mut SnapTag) -> Flow {
			tag.attributes.entry("data-order".into()).or_default().push_str(self.0);
			Ok(())
		}
	}

	let mut pipeline = Pipeline::new();
	pipeline.push(Stage::new("one", Suffix("1"))).unwrap();
	pipeline.push(Stage::new("two", Suffix("2"))).unwrap();
	let snapshot = render(&pipeline, &Tracker::new(), &Tag::new("p", args!["x"]).unwrap().into());
	assert_eq!(snapshot::to_html(&snapshot), "<p data-order=\"12\">x12</p>");

	pipeline.set_enabled("one", false).unwrap();
	let snapshot = render(&pipeline, &Tracker::new(), &Tag::new("p", args!["x"]).unwrap().into());
	assert_eq!(snapshot::to_html(&snapshot), "<p data-order=\"2\">x2</p>");
}

#[test]
fn attribute_hooks_can_rewrite_and_drop() {
	struct Redact;
	impl StageHooks for Redact {
		fn before_attribute(&self, _: &mut WalkContext<'_>, attribute: &mut RenderAttribute<'_>) -> Flow {
			match attribute.name.as_str() {
				"secret" => attribute.value = None,
				"title" => attribute.value = attribute.value.as_ref().map(|value| value.to_uppercase()),
				_ => (),
			}
			Ok(())
		}
	}

	let mut pipeline = Pipeline::new();
	pipeline.push(Stage::new("redact", Redact)).unwrap();
	let tag = Tag::new("p", args![Attribute::new("secret", "x"), Attribute::new("title", "hi")]).unwrap();
	assert_eq!(snapshot::to_html(&render(&pipeline, &Tracker::new(), &tag.into())), "<p title=\"HI\"></p>");
}

struct Focus {
	initialized: AtomicUsize,
}

impl AttributePlugin for Focus {
	fn name(&self) -> &'static str {
		"focus"
	}

	fn initialize(&self) -> Node {
		self.initialized.fetch_add(1, Ordering::SeqCst);
		Node::raw("<script>focus()</script>")
	}
}

#[test]
fn plugins_initialize_once_and_restart_the_walk() {
	let focus = Arc::new(Focus { initialized: AtomicUsize::new(0) });
	let plugin: Arc<dyn AttributePlugin> = focus.clone();
	let input = Tag::new("input", args![Attribute::flag("autofocus").with_plugin(plugin.clone())]).unwrap();
	let other = Tag::new("input", args![Attribute::flag("autofocus").with_plugin(plugin)]).unwrap();
	let tracker = Tracker::new();
	let scripts = {
		let tracker = tracker.clone();
		Node::dynamic(move || Node::Group(tracker.plugin_scripts()))
	};
	let root = Node::group([Node::from(input), Node::from(other), scripts]);

	let rendered = Pipeline::standard().render(&tracker, &root, 8).unwrap();
	assert_eq!(rendered.restarts, 1);
	assert_eq!(focus.initialized.load(Ordering::SeqCst), 1);
	assert_eq!(snapshot::to_html(&rendered.snapshot), "<input autofocus><input autofocus><script>focus()</script>");

	let rendered = Pipeline::standard().render(&tracker, &root, 8).unwrap();
	assert_eq!(rendered.restarts, 0);
	assert_eq!(focus.initialized.load(Ordering::SeqCst), 1);
}

#[test]
fn restarts_are_bounded() {
	struct AlwaysRestart;
	impl StageHooks for AlwaysRestart {
		fn before_walk(&self, _: &mut WalkContext<'_>, _: &Node) -> Flow {
			Err(Interrupt::Restart)
		}
	}

	let mut pipeline = Pipeline::new();
	pipeline.push(Stage::new("loop", AlwaysRestart)).unwrap();
	assert_eq!(pipeline.render(&Tracker::new(), &Node::Empty, 3).unwrap_err(), PipelineError::RestartLimit(3));
}

#[test]
fn failing_stage_names_itself() {
	struct Fail;
	impl StageHooks for Fail {
		fn before_tag(&self, _: &mut WalkContext<'_>, _: &mut SnapTag) -> Flow {
			Err(Interrupt::Fail("nope".into()))
		}
	}

	let mut pipeline = Pipeline::standard();
	pipeline.insert_after(MountStage::NAME, Stage::new("fail", Fail)).unwrap();
	assert_eq!(
		pipeline.render(&Tracker::new(), &Tag::empty("p").unwrap().into(), 8).unwrap_err(),
		PipelineError::Stage { stage: "fail".into(), message: "nope".into() }
	);
}

#[test]
fn deep_trees_stop_at_the_depth_limit() {
	let mut root = Node::from("leaf");
	for _ in 0..6 {
		root = Tag::new("div", args![root]).unwrap().into();
	}
	let root = Node::dynamic(move || root.clone());

	let mut pipeline = Pipeline::standard();
	pipeline.set_depth_limit(6);
	assert_eq!(pipeline.render(&Tracker::new(), &root, 8).unwrap_err(), PipelineError::DepthLimit(6));

	pipeline.set_depth_limit(7);
	let rendered = pipeline.render(&Tracker::new(), &root, 8).unwrap();
	assert!(snapshot::to_html(&rendered.snapshot).ends_with("leaf</div></div></div></div></div></div>"));
}
