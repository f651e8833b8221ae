use std::cell::{Cell, RefCell};
use std::rc::Rc;

use arbor_testing::TestBed;

use arbor_core::component::ComponentSpec;
use arbor_core::host::{EventHandler, Host, HostId};
use arbor_core::intercept;
use arbor_core::node::{component, element, fragment, text, NodeRef, StyleValue};
use arbor_core::scheduler::FrameWaker;
use arbor_core::{attrs, children};

#[test]
fn render_builds_the_described_structure() {
    let bed = TestBed::new();
    bed.render(element(
        "section",
        attrs! { "class" => "hero", "tabindex" => 3 },
        children![
            element("h1", attrs! {}, children![text("title")]),
            text("intro"),
        ],
    ))
    .unwrap();
    let section = bed.children()[0];
    assert_eq!(bed.tag(section).as_deref(), Some("section"));
    assert_eq!(bed.attribute(section, "class").as_deref(), Some("hero"));
    assert_eq!(bed.attribute(section, "tabindex").as_deref(), Some("3"));
    let kids = bed.children_of(section);
    assert_eq!(bed.tag(kids[0]).as_deref(), Some("h1"));
    assert_eq!(bed.text(kids[1]).as_deref(), Some("intro"));
}

#[test]
fn identical_rerender_performs_zero_host_mutations() {
    let inner = ComponentSpec::function("Inner", |_, _| {
        Ok(element("li", attrs! { "class" => "row" }, children![text("x")]))
    });
    let tree = {
        let inner = inner.clone();
        move || {
            element(
                "ul",
                attrs! { "class" => "list" },
                children![
                    fragment(children![text("head")]),
                    component(&inner, attrs! {}, children![]),
                    text("tail"),
                ],
            )
        }
    };
    let bed = TestBed::new();
    bed.render(tree()).unwrap();
    bed.assert_no_mutations("identical re-render", || bed.render(tree()).unwrap());
}

#[test]
fn attribute_diff_applies_exact_deltas() {
    let bed = TestBed::new();
    bed.render(element(
        "div",
        attrs! { "class" => "a", "id" => "x", "title" => "t" },
        children![],
    ))
    .unwrap();
    let node = bed.children()[0];

    let before = bed.mutations();
    bed.render(element(
        "div",
        attrs! { "class" => "b", "id" => "x" },
        children![],
    ))
    .unwrap();
    assert_eq!(bed.attribute(node, "class").as_deref(), Some("b"));
    assert_eq!(bed.attribute(node, "id").as_deref(), Some("x"));
    assert_eq!(bed.attribute(node, "title"), None);
    // One removal plus one changed write; the unchanged key was skipped.
    assert_eq!(bed.mutations() - before, 2);
}

#[test]
fn boolean_props_control_attribute_presence() {
    let bed = TestBed::new();
    bed.render(element(
        "input",
        attrs! { "disabled" => true },
        children![],
    ))
    .unwrap();
    let input = bed.children()[0];
    assert_eq!(bed.attribute(input, "disabled").as_deref(), Some(""));

    bed.render(element(
        "input",
        attrs! { "disabled" => false },
        children![],
    ))
    .unwrap();
    assert_eq!(bed.attribute(input, "disabled"), None);
}

#[test]
fn style_maps_patch_per_property() {
    let bed = TestBed::new();
    bed.render(element(
        "div",
        attrs! { "style" => StyleValue::map([("color", "red"), ("width", "10px")]) },
        children![],
    ))
    .unwrap();
    let node = bed.children()[0];
    assert_eq!(bed.style(node, "color").as_deref(), Some("red"));
    assert_eq!(bed.style(node, "width").as_deref(), Some("10px"));

    bed.render(element(
        "div",
        attrs! { "style" => StyleValue::map([("color", "blue")]) },
        children![],
    ))
    .unwrap();
    assert_eq!(bed.style(node, "color").as_deref(), Some("blue"));
    assert_eq!(bed.style(node, "width"), None);
}

#[test]
fn raw_style_strings_write_the_style_attribute() {
    let bed = TestBed::new();
    bed.render(element(
        "div",
        attrs! { "style" => StyleValue::raw("color: red") },
        children![],
    ))
    .unwrap();
    let node = bed.children()[0];
    assert_eq!(bed.attribute(node, "style").as_deref(), Some("color: red"));
}

#[test]
fn replacing_a_handler_rebinds_the_listener() {
    let first = Rc::new(Cell::new(0));
    let second = Rc::new(Cell::new(0));
    let bed = TestBed::new();
    let make = |counter: &Rc<Cell<i32>>| {
        let counter = Rc::clone(counter);
        EventHandler::new(move |_| counter.set(counter.get() + 1))
    };
    bed.render(element(
        "button",
        attrs! { "onclick" => make(&first) },
        children![],
    ))
    .unwrap();
    bed.render(element(
        "button",
        attrs! { "onclick" => make(&second) },
        children![],
    ))
    .unwrap();
    let button = bed.children()[0];
    bed.click(button).unwrap();
    assert_eq!(first.get(), 0);
    assert_eq!(second.get(), 1);
}

#[test]
fn removed_handler_key_unbinds_the_listener() {
    let hits = Rc::new(Cell::new(0));
    let bed = TestBed::new();
    let handler = {
        let hits = Rc::clone(&hits);
        EventHandler::new(move |_| hits.set(hits.get() + 1))
    };
    bed.render(element(
        "button",
        attrs! { "onclick" => handler },
        children![],
    ))
    .unwrap();
    bed.render(element("button", attrs! {}, children![])).unwrap();
    let button = bed.children()[0];
    assert!(!bed.click(button).unwrap());
    assert_eq!(hits.get(), 0);
}

#[test]
fn dispatch_without_listener_reports_false() {
    let bed = TestBed::new();
    bed.render(element("div", attrs! {}, children![])).unwrap();
    let node = bed.children()[0];
    assert!(!bed.dispatch(node, "click").unwrap());
}

#[test]
fn refs_receive_the_output_handle_and_release_it() {
    let (node_ref, cell) = NodeRef::cell();
    let bed = TestBed::new();
    bed.render(element(
        "div",
        attrs! {},
        children![element("input", attrs! { "ref" => node_ref }, children![])],
    ))
    .unwrap();
    let wrap = bed.children()[0];
    let input = bed.children_of(wrap)[0];
    assert_eq!(cell.get(), Some(input));

    bed.render(element("div", attrs! {}, children![])).unwrap();
    assert_eq!(cell.get(), None);
}

#[test]
fn ref_callbacks_see_mount_and_unmount() {
    let log: Rc<RefCell<Vec<Option<HostId>>>> = Rc::new(RefCell::new(Vec::new()));
    let node_ref = {
        let log = Rc::clone(&log);
        NodeRef::callback(move |value| log.borrow_mut().push(value))
    };
    let bed = TestBed::new();
    bed.render(element("p", attrs! { "ref" => node_ref }, children![]))
        .unwrap();
    let p = bed.children()[0];
    bed.unmount().unwrap();
    assert_eq!(*log.borrow(), [Some(p), None]);
}

#[test]
fn unmount_detaches_everything() {
    let bed = TestBed::new();
    bed.render(element(
        "div",
        attrs! {},
        children![element("span", attrs! {}, children![text("x")])],
    ))
    .unwrap();
    assert_eq!(bed.children().len(), 1);
    bed.unmount().unwrap();
    assert!(bed.children().is_empty());
    // Only the container itself remains in the host arena.
    assert_eq!(bed.host().borrow().len(), 1);
}

#[test]
fn interception_points_fire_and_uninstall() {
    let created = Rc::new(Cell::new(0));
    let diffed = Rc::new(Cell::new(0));
    let committed = Rc::new(Cell::new(0));
    let unmounted = Rc::new(Cell::new(0));
    let reg_created = {
        let created = Rc::clone(&created);
        intercept::on_node_created(move |_| created.set(created.get() + 1))
    };
    let reg_diff = {
        let diffed = Rc::clone(&diffed);
        intercept::on_before_diff(move |_| diffed.set(diffed.get() + 1))
    };
    let reg_commit = {
        let committed = Rc::clone(&committed);
        intercept::on_after_commit(move |_| committed.set(committed.get() + 1))
    };
    let reg_unmount = {
        let unmounted = Rc::clone(&unmounted);
        intercept::on_before_unmount(move |_| unmounted.set(unmounted.get() + 1))
    };

    let bed = TestBed::new();
    bed.render(element("div", attrs! {}, children![text("a")]))
        .unwrap();
    assert_eq!(created.get(), 2);
    assert_eq!(diffed.get(), 2);
    assert_eq!(committed.get(), 1);
    assert_eq!(unmounted.get(), 0);

    bed.unmount().unwrap();
    // The element and its text child both announce their teardown.
    assert_eq!(unmounted.get(), 2);

    reg_created.uninstall();
    reg_diff.uninstall();
    reg_commit.uninstall();
    reg_unmount.uninstall();
    let _ = element("div", attrs! {}, children![]);
    assert_eq!(created.get(), 2);
}

#[test]
fn interceptors_chain_in_install_order() {
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    let first = {
        let log = Rc::clone(&log);
        intercept::on_node_created(move |_| log.borrow_mut().push("first"))
    };
    let second = {
        let log = Rc::clone(&log);
        intercept::on_node_created(move |_| log.borrow_mut().push("second"))
    };
    let _ = text("x");
    assert_eq!(*log.borrow(), ["first", "second"]);
    first.uninstall();
    second.uninstall();
}

fn prerender_card(bed: &TestBed) -> (HostId, HostId, HostId) {
    let mut host = bed.host().borrow_mut();
    let container = bed.container();
    let card = host.create_element("div");
    host.set_attribute(card, "class", "card").unwrap();
    host.insert_after(container, card, None).unwrap();
    let span = host.create_element("span");
    host.insert_after(card, span, None).unwrap();
    let greeting = host.create_text("hi");
    host.insert_after(span, greeting, None).unwrap();
    (card, span, greeting)
}

#[test]
fn hydrate_adopts_matching_markup_without_creating_nodes() {
    let bed = TestBed::new();
    let (card, span, greeting) = prerender_card(&bed);
    let nodes_before = bed.host().borrow().len();

    bed.hydrate(element(
        "div",
        attrs! { "class" => "card" },
        children![element("span", attrs! {}, children![text("hi")])],
    ))
    .unwrap();

    assert_eq!(bed.host().borrow().len(), nodes_before);
    assert_eq!(bed.children(), vec![card]);
    assert_eq!(bed.children_of(card), vec![span]);
    assert_eq!(bed.children_of(span), vec![greeting]);

    // The adopted tree diffs like a rendered one.
    bed.assert_no_mutations("re-render after hydration", || {
        bed.render(element(
            "div",
            attrs! { "class" => "card" },
            children![element("span", attrs! {}, children![text("hi")])],
        ))
        .unwrap()
    });
}

#[test]
fn hydrate_patches_stale_text_and_attributes() {
    let bed = TestBed::new();
    let (card, _span, greeting) = prerender_card(&bed);
    {
        let mut host = bed.host().borrow_mut();
        host.set_attribute(card, "data-stale", "yes").unwrap();
    }

    bed.hydrate(element(
        "div",
        attrs! { "class" => "card" },
        children![element("span", attrs! {}, children![text("hello")])],
    ))
    .unwrap();

    assert_eq!(bed.text(greeting).as_deref(), Some("hello"));
    assert_eq!(bed.attribute(card, "data-stale"), None);
    assert_eq!(bed.attribute(card, "class").as_deref(), Some("card"));
}

#[test]
fn hydrate_falls_back_when_the_shape_check_fails() {
    let bed = TestBed::new();
    let container = bed.container();
    let (em, extra) = {
        let mut host = bed.host().borrow_mut();
        let em = host.create_element("em");
        host.insert_after(container, em, None).unwrap();
        let extra = host.create_element("aside");
        host.insert_after(container, extra, Some(em)).unwrap();
        (em, extra)
    };

    bed.hydrate(element("div", attrs! {}, children![])).unwrap();

    let kids = bed.children();
    assert_eq!(kids.len(), 1);
    assert_eq!(bed.tag(kids[0]).as_deref(), Some("div"));
    assert_ne!(kids[0], em);
    // The unclaimed pre-rendered nodes were released.
    assert!(bed.host().borrow().tag_of(extra).is_none());
}

struct Woken(Rc<Cell<bool>>);

impl FrameWaker for Woken {
    fn wake(&self) {
        self.0.set(true);
    }
}

#[test]
fn deferred_mode_waits_for_an_explicit_flush() {
    let renders = Rc::new(Cell::new(0));
    let setter_out: Rc<RefCell<Option<arbor_core::hooks::Setter<i32>>>> = Rc::new(RefCell::new(None));
    let spec = {
        let renders = Rc::clone(&renders);
        let setter_out = Rc::clone(&setter_out);
        ComponentSpec::function("Deferred", move |_, _| {
            renders.set(renders.get() + 1);
            let (value, set) = arbor_core::hooks::use_state(|| 0);
            *setter_out.borrow_mut() = Some(set.clone());
            Ok(element("p", attrs! {}, children![value.to_string()]))
        })
    };
    let bed = TestBed::new();
    let woken = Rc::new(Cell::new(false));
    bed.root().set_frame_waker(Some(Rc::new(Woken(Rc::clone(&woken)))));
    bed.root().set_deferred(true);

    bed.render(component(&spec, attrs! {}, children![])).unwrap();
    assert_eq!(renders.get(), 1);

    let set = setter_out.borrow().clone().unwrap();
    set.set(9);
    set.set(10);
    // Nothing ran yet; the embedder was only woken.
    assert_eq!(renders.get(), 1);
    assert!(woken.get());
    assert!(bed.root().has_pending());

    bed.root().flush().unwrap();
    assert_eq!(renders.get(), 2);
    let p = bed.children()[0];
    let label = bed.children_of(p)[0];
    assert_eq!(bed.text(label).as_deref(), Some("10"));
}
