//! A memory-host test bed for driving the reconciler in unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use arbor_core::{Event, Host, HostId, MemoryHost, RenderError, Root, VNode};

/// A [`Root`] mounted over a fresh [`MemoryHost`] container, with
/// shortcuts for the assertions the reconciler tests make over and over:
/// mutation counting, event dispatch, and host-tree inspection.
pub struct TestBed {
    host: Rc<RefCell<MemoryHost>>,
    root: Root,
    container: HostId,
}

impl TestBed {
    pub fn new() -> Self {
        let host = Rc::new(RefCell::new(MemoryHost::new()));
        let container = host.borrow_mut().create_element("root");
        let root = Root::new(Rc::clone(&host) as Rc<RefCell<dyn arbor_core::Host>>, container);
        Self {
            host,
            root,
            container,
        }
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn host(&self) -> &Rc<RefCell<MemoryHost>> {
        &self.host
    }

    pub fn container(&self) -> HostId {
        self.container
    }

    pub fn render(&self, node: VNode) -> Result<(), RenderError> {
        self.root.render(node)
    }

    pub fn hydrate(&self, node: VNode) -> Result<(), RenderError> {
        self.root.hydrate(node)
    }

    pub fn unmount(&self) -> Result<(), RenderError> {
        self.root.unmount()
    }

    /// Total host mutations so far.
    pub fn mutations(&self) -> u64 {
        self.host.borrow().mutations()
    }

    /// Runs `f` and asserts it performed zero host mutations.
    pub fn assert_no_mutations<R>(&self, label: &str, f: impl FnOnce() -> R) -> R {
        let before = self.mutations();
        let value = f();
        let after = self.mutations();
        assert_eq!(
            before, after,
            "{label}: expected zero host mutations, got {}",
            after - before
        );
        value
    }

    /// Direct children of the container.
    pub fn children(&self) -> Vec<HostId> {
        self.host.borrow().children_of(self.container)
    }

    pub fn children_of(&self, id: HostId) -> Vec<HostId> {
        self.host.borrow().children_of(id)
    }

    pub fn tag(&self, id: HostId) -> Option<String> {
        self.host.borrow().tag_of(id).map(|tag| tag.to_string())
    }

    pub fn text(&self, id: HostId) -> Option<String> {
        self.host.borrow().text_of(id).map(|text| text.to_string())
    }

    pub fn attribute(&self, id: HostId, name: &str) -> Option<String> {
        self.host
            .borrow()
            .attribute(id, name)
            .map(|value| value.to_string())
    }

    pub fn style(&self, id: HostId, prop: &str) -> Option<String> {
        self.host
            .borrow()
            .style_of(id, prop)
            .map(|value| value.to_string())
    }

    /// The container's children rendered as text content, elements as
    /// their tag. Convenience for list-reconciliation assertions.
    pub fn outline(&self) -> Vec<String> {
        let host = self.host.borrow();
        host.children_of(self.container)
            .into_iter()
            .map(|id| match host.text_of(id) {
                Some(text) => text.to_string(),
                None => host
                    .tag_of(id)
                    .map(|tag| format!("<{tag}>"))
                    .unwrap_or_else(|| "?".to_string()),
            })
            .collect()
    }

    pub fn dump(&self) -> String {
        self.host.borrow().dump(self.container)
    }

    /// Dispatches a named event to `target` through the root (inside a
    /// batch, the way a real event source would).
    pub fn dispatch(&self, target: HostId, name: &str) -> Result<bool, RenderError> {
        self.root.dispatch(target, &Event::new(name))
    }

    pub fn click(&self, target: HostId) -> Result<bool, RenderError> {
        self.dispatch(target, "click")
    }
}

impl Default for TestBed {
    fn default() -> Self {
        Self::new()
    }
}
