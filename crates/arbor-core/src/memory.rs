//! In-memory [`Host`] implementation.
//!
//! Backs the unit tests and headless embedders. Every mutating call bumps
//! a counter so tests can assert that an idempotent pass touched nothing.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::host::{Event, EventHandler, Host, HostError, HostId, HostNode};

enum MemoryKind {
    Element { tag: Rc<str> },
    Text { text: Rc<str> },
}

struct MemoryNode {
    kind: MemoryKind,
    attributes: IndexMap<Rc<str>, Rc<str>>,
    styles: IndexMap<Rc<str>, Rc<str>>,
    listeners: IndexMap<Rc<str>, EventHandler>,
    parent: Option<HostId>,
    children: Vec<HostId>,
}

impl MemoryNode {
    fn new(kind: MemoryKind) -> Self {
        Self {
            kind,
            attributes: IndexMap::new(),
            styles: IndexMap::new(),
            listeners: IndexMap::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<Option<MemoryNode>>,
    mutations: u64,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total mutating calls issued so far. Reads never count.
    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatches `event` to the listener bound on `id`, if any.
    pub fn dispatch(&self, id: HostId, event: &Event) -> bool {
        match self.listener(id, event.name()) {
            Some(handler) => {
                handler.invoke(event);
                true
            }
            None => false,
        }
    }

    pub fn tag_of(&self, id: HostId) -> Option<Rc<str>> {
        match &self.node(id).ok()?.kind {
            MemoryKind::Element { tag } => Some(Rc::clone(tag)),
            MemoryKind::Text { .. } => None,
        }
    }

    pub fn text_of(&self, id: HostId) -> Option<Rc<str>> {
        match &self.node(id).ok()?.kind {
            MemoryKind::Text { text } => Some(Rc::clone(text)),
            MemoryKind::Element { .. } => None,
        }
    }

    pub fn attribute(&self, id: HostId, name: &str) -> Option<Rc<str>> {
        self.node(id).ok()?.attributes.get(name).cloned()
    }

    pub fn style_of(&self, id: HostId, prop: &str) -> Option<Rc<str>> {
        self.node(id).ok()?.styles.get(prop).cloned()
    }

    pub fn children_of(&self, id: HostId) -> Vec<HostId> {
        self.node(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Renders the subtree under `id` as an indented outline, one node per
    /// line. Debugging aid for tests.
    pub fn dump(&self, id: HostId) -> String {
        let mut output = String::new();
        self.dump_node(&mut output, id, 0);
        output
    }

    fn dump_node(&self, output: &mut String, id: HostId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.node(id) {
            Ok(node) => {
                match &node.kind {
                    MemoryKind::Element { tag } => {
                        output.push_str(&format!("{indent}[{id}] <{tag}>"));
                        for (name, value) in &node.attributes {
                            output.push_str(&format!(" {name}={value:?}"));
                        }
                        output.push('\n');
                    }
                    MemoryKind::Text { text } => {
                        output.push_str(&format!("{indent}[{id}] {text:?}\n"));
                    }
                }
                for child in node.children.clone() {
                    self.dump_node(output, child, depth + 1);
                }
            }
            Err(_) => output.push_str(&format!("{indent}[{id}] (missing)\n")),
        }
    }

    fn node(&self, id: HostId) -> Result<&MemoryNode, HostError> {
        self.nodes
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(HostError::Missing { id })
    }

    fn node_mut(&mut self, id: HostId) -> Result<&mut MemoryNode, HostError> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(HostError::Missing { id })
    }

    fn push(&mut self, node: MemoryNode) -> HostId {
        let id = self.nodes.len();
        self.nodes.push(Some(node));
        self.mutations += 1;
        id
    }
}

impl Host for MemoryHost {
    fn create_element(&mut self, tag: &str) -> HostId {
        self.push(MemoryNode::new(MemoryKind::Element { tag: tag.into() }))
    }

    fn create_text(&mut self, text: &str) -> HostId {
        self.push(MemoryNode::new(MemoryKind::Text { text: text.into() }))
    }

    fn set_text(&mut self, id: HostId, text: &str) -> Result<(), HostError> {
        {
            let node = self.node_mut(id)?;
            match &mut node.kind {
                MemoryKind::Text { text: slot } => *slot = text.into(),
                MemoryKind::Element { .. } => {
                    return Err(HostError::KindMismatch {
                        id,
                        expected: "text",
                    })
                }
            }
        }
        self.mutations += 1;
        Ok(())
    }

    fn set_attribute(&mut self, id: HostId, name: &str, value: &str) -> Result<(), HostError> {
        self.node_mut(id)?.attributes.insert(name.into(), value.into());
        self.mutations += 1;
        Ok(())
    }

    fn remove_attribute(&mut self, id: HostId, name: &str) -> Result<(), HostError> {
        self.node_mut(id)?.attributes.shift_remove(name);
        self.mutations += 1;
        Ok(())
    }

    fn set_style(&mut self, id: HostId, prop: &str, value: &str) -> Result<(), HostError> {
        self.node_mut(id)?.styles.insert(prop.into(), value.into());
        self.mutations += 1;
        Ok(())
    }

    fn remove_style(&mut self, id: HostId, prop: &str) -> Result<(), HostError> {
        self.node_mut(id)?.styles.shift_remove(prop);
        self.mutations += 1;
        Ok(())
    }

    fn set_listener(
        &mut self,
        id: HostId,
        event: &str,
        handler: Option<EventHandler>,
    ) -> Result<(), HostError> {
        let node = self.node_mut(id)?;
        match handler {
            Some(handler) => {
                node.listeners.insert(event.into(), handler);
            }
            None => {
                node.listeners.shift_remove(event);
            }
        }
        self.mutations += 1;
        Ok(())
    }

    fn insert_after(
        &mut self,
        parent: HostId,
        child: HostId,
        prev: Option<HostId>,
    ) -> Result<(), HostError> {
        // Unlink from any current parent first.
        if let Some(old_parent) = self.node(child)?.parent {
            let old = self.node_mut(old_parent)?;
            old.children.retain(|&c| c != child);
        }
        let parent_node = self.node_mut(parent)?;
        let index = match prev {
            Some(prev_id) => {
                let at = parent_node
                    .children
                    .iter()
                    .position(|&c| c == prev_id)
                    .ok_or(HostError::Missing { id: prev_id })?;
                at + 1
            }
            None => 0,
        };
        parent_node.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        self.mutations += 1;
        Ok(())
    }

    fn detach(&mut self, parent: HostId, child: HostId) -> Result<(), HostError> {
        self.node_mut(parent)?.children.retain(|&c| c != child);
        self.node_mut(child)?.parent = None;
        self.mutations += 1;
        Ok(())
    }

    fn release(&mut self, id: HostId) -> Result<(), HostError> {
        // Children first, then this node.
        let children = self.node(id)?.children.clone();
        for child in children {
            let _ = self.release(child);
        }
        let slot = self.nodes.get_mut(id).ok_or(HostError::Missing { id })?;
        slot.take();
        self.mutations += 1;
        Ok(())
    }

    fn parent_of(&self, id: HostId) -> Option<HostId> {
        self.node(id).ok()?.parent
    }

    fn prev_sibling(&self, id: HostId) -> Option<HostId> {
        let parent = self.node(id).ok()?.parent?;
        let siblings = &self.node(parent).ok()?.children;
        let at = siblings.iter().position(|&c| c == id)?;
        if at == 0 {
            None
        } else {
            Some(siblings[at - 1])
        }
    }

    fn first_child(&self, id: HostId) -> Option<HostId> {
        self.node(id).ok()?.children.first().copied()
    }

    fn next_sibling(&self, id: HostId) -> Option<HostId> {
        let parent = self.node(id).ok()?.parent?;
        let siblings = &self.node(parent).ok()?.children;
        let at = siblings.iter().position(|&c| c == id)?;
        siblings.get(at + 1).copied()
    }

    fn describe(&self, id: HostId) -> Result<HostNode, HostError> {
        Ok(match &self.node(id)?.kind {
            MemoryKind::Element { tag } => HostNode::Element {
                tag: Rc::clone(tag),
            },
            MemoryKind::Text { text } => HostNode::Text {
                text: Rc::clone(text),
            },
        })
    }

    fn attribute_names(&self, id: HostId) -> Vec<Rc<str>> {
        self.node(id)
            .map(|node| node.attributes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn listener(&self, id: HostId, event: &str) -> Option<EventHandler> {
        self.node(id).ok()?.listeners.get(event).cloned()
    }
}
