use std::cell::{Cell, RefCell};
use std::rc::Rc;

use arbor_testing::TestBed;

use arbor_core::component::{Component, ComponentSpec, RenderError};
use arbor_core::hooks::{use_error_boundary, use_effect, BoundaryReset, EffectResult};
use arbor_core::node::{component, element, fragment, text, ChildSpec, Props, VNode};
use arbor_core::{attrs, children};

fn bomb_spec() -> ComponentSpec {
    ComponentSpec::function("Bomb", |_, _| Err(RenderError::render("boom")))
}

fn boundary_spec() -> ComponentSpec {
    ComponentSpec::function("Boundary", |_, children| {
        let (error, _reset) = use_error_boundary();
        match error {
            Some(error) => Ok(element(
                "div",
                attrs! { "class" => "fallback" },
                children![error.message().to_string()],
            )),
            None => Ok(fragment(
                children.iter().cloned().map(ChildSpec::from).collect(),
            )),
        }
    })
}

#[test]
fn boundary_substitutes_fallback_and_spares_siblings() {
    let boundary = boundary_spec();
    let bomb = bomb_spec();
    let bed = TestBed::new();
    bed.render(element(
        "div",
        attrs! {},
        children![
            component(
                &boundary,
                attrs! {},
                children![component(&bomb, attrs! {}, children![])]
            ),
            element("span", attrs! { "class" => "ok" }, children![]),
        ],
    ))
    .unwrap();

    let wrap = bed.children()[0];
    let kids = bed.children_of(wrap);
    assert_eq!(kids.len(), 2);
    assert_eq!(bed.attribute(kids[0], "class").as_deref(), Some("fallback"));
    let message = bed.children_of(kids[0])[0];
    assert_eq!(bed.text(message).as_deref(), Some("boom"));
    // The sibling outside the failing branch is untouched.
    assert_eq!(bed.attribute(kids[1], "class").as_deref(), Some("ok"));
}

#[test]
fn error_without_a_boundary_propagates_to_the_caller() {
    let bomb = bomb_spec();
    let bed = TestBed::new();
    let result = bed.render(element(
        "div",
        attrs! {},
        children![component(&bomb, attrs! {}, children![])],
    ));
    let err = result.unwrap_err();
    assert_eq!(err.message(), "boom");
    assert_eq!(err.component(), Some("Bomb"));
    // Nothing was committed.
    assert!(bed.children().is_empty());
}

#[test]
fn committed_siblings_survive_a_failed_update_pass() {
    let toggle = Rc::new(Cell::new(false));
    let conditional_bomb = {
        let toggle = Rc::clone(&toggle);
        ComponentSpec::function("MaybeBomb", move |_, _| {
            if toggle.get() {
                Err(RenderError::render("late boom"))
            } else {
                Ok(element("p", attrs! {}, children![text("fine")]))
            }
        })
    };
    let bed = TestBed::new();
    let tree = |label: &str| {
        element(
            "div",
            attrs! {},
            children![
                element("span", attrs! { "class" => label }, children![]),
                component(&conditional_bomb, attrs! {}, children![]),
            ],
        )
    };
    bed.render(tree("first")).unwrap();
    let wrap = bed.children()[0];

    toggle.set(true);
    assert!(bed.render(tree("second")).is_err());
    let kids = bed.children_of(wrap);
    // The sibling committed earlier in the failing pass keeps its new
    // props; the failing position keeps its old output.
    assert_eq!(bed.attribute(kids[0], "class").as_deref(), Some("second"));
    assert_eq!(bed.tag(kids[1]).as_deref(), Some("p"));

    // The tree stays diffable: a later pass picks up from committed state.
    toggle.set(false);
    bed.render(tree("third")).unwrap();
    assert_eq!(
        bed.attribute(bed.children_of(wrap)[0], "class").as_deref(),
        Some("third")
    );
}

struct CatchAll {
    message: Option<String>,
}

impl Component for CatchAll {
    fn render(&mut self, _props: &Props, children: &[VNode]) -> Result<VNode, RenderError> {
        match &self.message {
            Some(message) => Ok(element(
                "div",
                attrs! { "class" => "caught" },
                children![message.clone()],
            )),
            None => Ok(fragment(
                children.iter().cloned().map(ChildSpec::from).collect(),
            )),
        }
    }

    fn catch(&mut self, error: &RenderError) -> bool {
        self.message = Some(error.message().to_string());
        true
    }
}

#[test]
fn class_catch_capability_handles_descendant_failures() {
    let boundary = ComponentSpec::stateful("CatchAll", || Box::new(CatchAll { message: None }));
    let bomb = bomb_spec();
    let bed = TestBed::new();
    bed.render(component(
        &boundary,
        attrs! {},
        children![component(&bomb, attrs! {}, children![])],
    ))
    .unwrap();
    let top = bed.children()[0];
    assert_eq!(bed.attribute(top, "class").as_deref(), Some("caught"));
}

#[test]
fn nested_boundaries_catch_at_the_nearest_ancestor() {
    let inner = boundary_spec();
    let outer = ComponentSpec::stateful("Outer", || Box::new(CatchAll { message: None }));
    let bomb = bomb_spec();
    let bed = TestBed::new();
    bed.render(component(
        &outer,
        attrs! {},
        children![component(
            &inner,
            attrs! {},
            children![component(&bomb, attrs! {}, children![])]
        )],
    ))
    .unwrap();
    let top = bed.children()[0];
    // The inner boundary handled it; the outer one never saw the error.
    assert_eq!(bed.attribute(top, "class").as_deref(), Some("fallback"));
}

#[test]
fn effect_failures_reach_the_boundary_without_unwinding_the_commit() {
    let boundary = boundary_spec();
    let effect_bomb = ComponentSpec::function("EffectBomb", |_, _| {
        use_effect(&(), || EffectResult::fail(RenderError::render("effect boom")));
        Ok(element("p", attrs! {}, children![text("committed")]))
    });
    let bed = TestBed::new();
    bed.render(component(
        &boundary,
        attrs! {},
        children![component(&effect_bomb, attrs! {}, children![])],
    ))
    .unwrap();
    // The failing effect ran after its pass committed; the boundary then
    // re-rendered with the captured error.
    let top = bed.children()[0];
    assert_eq!(bed.attribute(top, "class").as_deref(), Some("fallback"));
}

#[test]
fn partially_created_children_of_a_failing_subtree_are_removed() {
    let boundary = boundary_spec();
    let bomb = bomb_spec();
    let bed = TestBed::new();
    bed.render(component(
        &boundary,
        attrs! {},
        children![
            element("span", attrs! { "class" => "early" }, children![]),
            component(&bomb, attrs! {}, children![]),
        ],
    ))
    .unwrap();
    // The span created before the failure was taken back out; only the
    // fallback occupies the container.
    let kids = bed.children();
    assert_eq!(kids.len(), 1);
    assert_eq!(bed.attribute(kids[0], "class").as_deref(), Some("fallback"));
}

struct MountProbe {
    mounts: Rc<Cell<usize>>,
}

impl Component for MountProbe {
    fn render(&mut self, _props: &Props, _children: &[VNode]) -> Result<VNode, RenderError> {
        Ok(element("span", attrs! {}, children![]))
    }

    fn mounted(&mut self) {
        self.mounts.set(self.mounts.get() + 1);
    }
}

#[test]
fn discarded_siblings_of_a_failure_never_hear_mounted() {
    let mounts = Rc::new(Cell::new(0usize));
    let probe = {
        let mounts = Rc::clone(&mounts);
        ComponentSpec::stateful("MountProbe", move || {
            Box::new(MountProbe {
                mounts: Rc::clone(&mounts),
            })
        })
    };
    let boundary = boundary_spec();
    let bomb = bomb_spec();
    let bed = TestBed::new();
    bed.render(component(
        &boundary,
        attrs! {},
        children![
            component(&probe, attrs! {}, children![]),
            component(&bomb, attrs! {}, children![]),
        ],
    ))
    .unwrap();
    let top = bed.children()[0];
    assert_eq!(bed.attribute(top, "class").as_deref(), Some("fallback"));
    // The probe committed and was discarded within the same pass; it
    // never counted as mounted.
    assert_eq!(mounts.get(), 0);
}

#[test]
fn boundary_reset_restores_the_children() {
    let armed = Rc::new(Cell::new(true));
    let reset_out: Rc<RefCell<Option<BoundaryReset>>> = Rc::new(RefCell::new(None));
    let bomb = {
        let armed = Rc::clone(&armed);
        ComponentSpec::function("ArmedBomb", move |_, _| {
            if armed.get() {
                Err(RenderError::render("armed"))
            } else {
                Ok(element("p", attrs! {}, children![text("recovered")]))
            }
        })
    };
    let boundary = {
        let reset_out = Rc::clone(&reset_out);
        ComponentSpec::function("Boundary", move |_, children| {
            let (error, reset) = use_error_boundary();
            *reset_out.borrow_mut() = Some(reset);
            match error {
                Some(_) => Ok(element("div", attrs! { "class" => "fallback" }, children![])),
                None => Ok(fragment(
                    children.iter().cloned().map(ChildSpec::from).collect(),
                )),
            }
        })
    };
    let bed = TestBed::new();
    bed.render(component(
        &boundary,
        attrs! {},
        children![component(&bomb, attrs! {}, children![])],
    ))
    .unwrap();
    let top = bed.children()[0];
    assert_eq!(bed.attribute(top, "class").as_deref(), Some("fallback"));

    armed.set(false);
    let reset = reset_out.borrow().clone().unwrap();
    reset.reset();
    let top = bed.children()[0];
    assert_eq!(bed.tag(top).as_deref(), Some("p"));
}
