use live_dom::{
	args,
	error::ModelError,
	node::{class, class_if, classes, style, style_remove, Attribute, AttrValue, Node, Tag},
	Cell, Component, ComponentList,
};

#[test]
fn tag_names_are_lowercased_and_void_is_derived() {
	let tag = Tag::empty("BR").unwrap();
	assert_eq!(tag.name(), "br");
	assert!(tag.is_void());
	assert!(!Tag::empty("div").unwrap().is_void());
}

#[test]
fn malformed_names_fail_at_construction() {
	assert!(matches!(Tag::empty(""), Err(ModelError::InvalidElement { kind: "tag", .. })));
	assert!(matches!(Tag::empty("1div"), Err(ModelError::InvalidElement { kind: "tag", .. })));
	assert!(matches!(Tag::new("div", args![Attribute::new("a b", "x")]), Err(ModelError::InvalidElement { kind: "attribute", .. })));
	assert!(matches!(Tag::new("div", args![class("")]), Err(ModelError::InvalidElement { kind: "class", .. })));
	assert!(matches!(Tag::new("div", args![style("a:b", "x")]), Err(ModelError::InvalidElement { kind: "style", .. })));
}

#[test]
fn attributes_replace_in_place_and_remove() {
	let mut tag = Tag::new("input", args![Attribute::new("Type", "text"), Attribute::flag("disabled"), Attribute::new("value", "a")]).unwrap();
	tag.add(Attribute::new("type", "number")).unwrap();
	tag.add(Attribute::remove("disabled")).unwrap();
	let names: Vec<_> = tag.attributes().iter().map(Attribute::name).collect();
	assert_eq!(names, ["type", "value"]);
	assert_eq!(tag.attribute("type").and_then(Attribute::resolve).as_deref(), Some("number"));
}

#[test]
fn class_toggle_moves_to_the_end() {
	let mut tag = Tag::new("p", args![classes("a b c")]).unwrap();
	tag.add(class_if("a", false)).unwrap();
	tag.add(class_if("a", true)).unwrap();
	assert_eq!(tag.classes().render(), "b c a");

	tag.add(class("b")).unwrap();
	assert_eq!(tag.classes().render(), "b c a");
}

#[test]
fn styles_keep_position_on_change() {
	let mut tag = Tag::new("p", args![style("color", "red"), style("margin", "0")]).unwrap();
	tag.add(style("color", "blue")).unwrap();
	assert_eq!(tag.styles().render(), "color:blue;margin:0");
	tag.add(style_remove("color")).unwrap();
	tag.add(style("color", "green")).unwrap();
	assert_eq!(tag.styles().render(), "margin:0;color:green");
}

#[test]
fn plain_class_and_style_attributes_merge_into_the_maps() {
	let tag = Tag::new("p", args![Attribute::new("class", "x y"), class("z"), Attribute::new("style", "a: 1; b:2")]).unwrap();
	assert!(tag.attribute("class").is_none());
	assert_eq!(tag.classes().render(), "x y z");
	assert_eq!(tag.styles().get("a"), Some("1"));
	assert_eq!(tag.styles().get("b"), Some("2"));
}

#[test]
fn scalars_and_empties_classify_as_nodes() {
	let tag = Tag::new("p", args!["a", 1_u8, 2.5_f64, true, 'c', String::new(), None::<&str>, Node::Empty]).unwrap();
	let texts: Vec<_> = tag
		.children()
		.iter()
		.map(|child| match child {
			Node::Text(text) => text.as_str(),
			other => panic!("{:?}", other),
		})
		.collect();
	assert_eq!(texts, ["a", "1", "2.5", "true", "c"]);
}

#[test]
fn bound_attributes_read_their_cell() {
	let cell = Cell::new(1);
	let attribute = Attribute::bound("data-count", &cell);
	assert!(matches!(attribute.value(), Some(AttrValue::Bound(_))));
	cell.set(2);
	assert_eq!(attribute.resolve().as_deref(), Some("2"));
}

#[test]
fn component_identity_survives_clones() {
	let component = Component::new("div", args![class("box")]).unwrap();
	let clone = component.clone();
	assert!(component.ptr_eq(&clone));
	assert_eq!(component.id(), clone.id());

	let binding = clone.on("click", |_, _| ());
	assert_eq!(component.bindings().len(), 1);
	assert!(component.off(&binding));
	assert!(!component.off(&binding));
}

#[test]
fn component_list_removal_tears_down() {
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	};

	let torn_down = Arc::new(AtomicUsize::new(0));
	let list = ComponentList::new();
	for _ in 0..3 {
		let component = Component::new("li", None).unwrap();
		let torn_down = torn_down.clone();
		component.on_teardown(move |_| {
			torn_down.fetch_add(1, Ordering::SeqCst);
		});
		list.push(component);
	}
	let first = list.get(0).unwrap();
	assert!(list.remove(first.id()).is_some());
	assert!(list.remove(first.id()).is_none());
	assert_eq!(torn_down.load(Ordering::SeqCst), 1);

	list.insert(99, Component::new("li", None).unwrap());
	assert_eq!(list.len(), 3);
	list.clear();
	assert!(list.is_empty());
	assert_eq!(torn_down.load(Ordering::SeqCst), 3);
}

#[test]
fn removing_class_or_style_clears_the_maps() {
	let mut tag = Tag::new("p", args![classes("a b"), style("color", "red"), Attribute::new("title", "t")]).unwrap();
	tag.add(Attribute::remove("class")).unwrap();
	tag.add(Attribute::remove("style")).unwrap();
	assert!(tag.classes().is_empty());
	assert!(tag.styles().is_empty());
	assert_eq!(tag.attributes().len(), 1);

	tag.add(class("c")).unwrap();
	assert_eq!(tag.classes().render(), "c");
}

#[test]
fn class_and_style_only_take_text() {
	let cell = Cell::new("x");
	for attribute in [Attribute::flag("class"), Attribute::bound("style", &cell), Attribute::bound("CLASS", &cell)] {
		assert!(matches!(
			Tag::new("p", args![attribute]),
			Err(ModelError::InvalidElement { kind: "attribute", reason: "only takes a text value", .. })
		));
	}
}
