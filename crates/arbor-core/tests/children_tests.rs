use std::cell::Cell;
use std::rc::Rc;

use arbor_testing::TestBed;

use arbor_core::component::{Component, ComponentSpec, RenderError};
use arbor_core::node::{component, element, text, Props, VNode};
use arbor_core::{attrs, children};

fn keyed_item(key: &str) -> VNode {
    element("li", attrs! { "key" => key }, children![key])
}

#[test]
fn keyed_permutation_reuses_every_handle() {
    let bed = TestBed::new();
    bed.render(element(
        "ul",
        attrs! {},
        children![keyed_item("a"), keyed_item("b"), keyed_item("c")],
    ))
    .unwrap();
    let list = bed.children()[0];
    let before = bed.children_of(list);
    assert_eq!(before.len(), 3);

    bed.render(element(
        "ul",
        attrs! {},
        children![keyed_item("c"), keyed_item("a"), keyed_item("b")],
    ))
    .unwrap();
    let after = bed.children_of(list);
    assert_eq!(after, vec![before[2], before[0], before[1]]);
}

#[test]
fn keyed_permutation_moves_one_node() {
    let bed = TestBed::new();
    bed.render(element(
        "ul",
        attrs! {},
        children![keyed_item("a"), keyed_item("b"), keyed_item("c")],
    ))
    .unwrap();
    let before = bed.mutations();
    bed.render(element(
        "ul",
        attrs! {},
        children![keyed_item("c"), keyed_item("a"), keyed_item("b")],
    ))
    .unwrap();
    // Moving c to the front is a single insert; a and b already follow.
    assert_eq!(bed.mutations() - before, 1);
}

struct Tracked {
    unmounts: Rc<Cell<usize>>,
}

impl Component for Tracked {
    fn render(&mut self, props: &Props, _children: &[VNode]) -> Result<VNode, RenderError> {
        let label = match props.get("label") {
            Some(arbor_core::node::PropValue::Text(label)) => label.to_string(),
            _ => String::new(),
        };
        Ok(element("li", attrs! {}, children![label]))
    }

    fn before_unmount(&mut self) {
        self.unmounts.set(self.unmounts.get() + 1);
    }
}

#[test]
fn removing_one_keyed_child_unmounts_exactly_once() {
    let unmounts = Rc::new(Cell::new(0usize));
    let spec = {
        let unmounts = Rc::clone(&unmounts);
        ComponentSpec::stateful("Tracked", move || {
            Box::new(Tracked {
                unmounts: Rc::clone(&unmounts),
            })
        })
    };
    let item = |key: &str| {
        component(&spec, attrs! { "key" => key, "label" => key }, children![])
    };
    let bed = TestBed::new();
    bed.render(element(
        "ul",
        attrs! {},
        children![item("a"), item("b"), item("c")],
    ))
    .unwrap();
    let list = bed.children()[0];
    let before = bed.children_of(list);

    bed.render(element("ul", attrs! {}, children![item("a"), item("c")]))
        .unwrap();
    assert_eq!(unmounts.get(), 1);
    let after = bed.children_of(list);
    assert_eq!(after, vec![before[0], before[2]]);
}

#[test]
fn unkeyed_front_insertion_reuses_the_tail() {
    let bed = TestBed::new();
    bed.render(element(
        "div",
        attrs! {},
        children![text("x"), text("y"), text("z")],
    ))
    .unwrap();
    let wrap = bed.children()[0];
    let before = bed.children_of(wrap);
    let mutations = bed.mutations();

    bed.render(element(
        "div",
        attrs! {},
        children![text("w"), text("x"), text("y"), text("z")],
    ))
    .unwrap();
    let after = bed.children_of(wrap);
    assert_eq!(after.len(), 4);
    // x, y, z keep their handles and content; only w is new.
    assert_eq!(&after[1..], &before[..]);
    // One create plus one insert, no text rewrites.
    assert_eq!(bed.mutations() - mutations, 2);
}

#[test]
fn unkeyed_middle_removal_reuses_survivors() {
    let bed = TestBed::new();
    bed.render(element(
        "div",
        attrs! {},
        children![text("x"), text("y"), text("z")],
    ))
    .unwrap();
    let wrap = bed.children()[0];
    let before = bed.children_of(wrap);

    bed.render(element("div", attrs! {}, children![text("x"), text("z")]))
        .unwrap();
    let after = bed.children_of(wrap);
    assert_eq!(after, vec![before[0], before[2]]);
}

#[test]
fn unkeyed_edit_patches_in_place() {
    let bed = TestBed::new();
    bed.render(element(
        "div",
        attrs! {},
        children![text("a"), text("b"), text("c")],
    ))
    .unwrap();
    let wrap = bed.children()[0];
    let before = bed.children_of(wrap);

    bed.render(element(
        "div",
        attrs! {},
        children![text("one"), text("two"), text("three")],
    ))
    .unwrap();
    let after = bed.children_of(wrap);
    assert_eq!(after, before);
    assert_eq!(bed.text(after[0]).as_deref(), Some("one"));
    assert_eq!(bed.text(after[2]).as_deref(), Some("three"));
}

#[test]
fn duplicate_keys_first_occurrence_wins() {
    let bed = TestBed::new();
    bed.render(element("ul", attrs! {}, children![keyed_item("a")]))
        .unwrap();
    let list = bed.children()[0];
    let original = bed.children_of(list)[0];

    // Authoring error: two children claim the same key. The first keeps
    // the old handle, the second is created fresh.
    bed.render(element(
        "ul",
        attrs! {},
        children![keyed_item("a"), keyed_item("a")],
    ))
    .unwrap();
    let after = bed.children_of(list);
    assert_eq!(after.len(), 2);
    assert_eq!(after[0], original);
    assert_ne!(after[1], original);
}

#[test]
fn kind_change_under_a_matching_key_remounts() {
    let bed = TestBed::new();
    bed.render(element(
        "div",
        attrs! {},
        children![element("span", attrs! { "key" => "k" }, children![])],
    ))
    .unwrap();
    let wrap = bed.children()[0];
    let span = bed.children_of(wrap)[0];

    bed.render(element(
        "div",
        attrs! {},
        children![element("em", attrs! { "key" => "k" }, children![])],
    ))
    .unwrap();
    let replacement = bed.children_of(wrap)[0];
    assert_ne!(replacement, span);
    assert_eq!(bed.tag(replacement).as_deref(), Some("em"));
}

#[test]
fn keyed_and_unkeyed_siblings_do_not_cross_match() {
    let bed = TestBed::new();
    bed.render(element(
        "div",
        attrs! {},
        children![keyed_item("a"), text("plain")],
    ))
    .unwrap();
    let wrap = bed.children()[0];
    let before = bed.children_of(wrap);

    bed.render(element(
        "div",
        attrs! {},
        children![text("plain"), keyed_item("a")],
    ))
    .unwrap();
    let after = bed.children_of(wrap);
    assert_eq!(after.len(), 2);
    assert_eq!(after[0], before[1]);
    assert_eq!(after[1], before[0]);
}
