//! The immutable node descriptor and its construction rules.
//!
//! A [`VNode`] describes one position of the desired tree for a single
//! render pass. Construction funnels through [`create_node`], which
//! extracts the reserved `key`/`ref` entries from the attribute set and
//! flattens nested child sequences in place. Nodes are never mutated after
//! construction; every render pass produces fresh ones.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::component::ComponentSpec;
use crate::hash::key_of;
use crate::host::{EventHandler, HostId};
use crate::intercept;

/// Stable identity hint for a child, unique only among siblings.
pub type Key = u64;

/// Attribute mapping of a node. Reserved keys `key` and `ref` are
/// extracted at construction and never appear here.
pub type Props = IndexMap<Rc<str>, PropValue>;

/// What a node renders as. Dispatch in the differ is an exhaustive match
/// on this variant, never runtime type inspection.
#[derive(Clone)]
pub enum Kind {
    /// A host element with the given tag.
    Element(Rc<str>),
    /// A text position carrying its content.
    Text(Rc<str>),
    /// A container that produces no host output of its own; how a
    /// component renders to zero or many host nodes.
    Fragment,
    /// A component reference with pointer identity.
    Component(ComponentSpec),
}

impl Kind {
    /// Two kinds are compatible when a render-tree node committed for one
    /// can be reused for the other without replacing its output handle.
    pub(crate) fn compatible(&self, other: &Kind) -> bool {
        match (self, other) {
            (Kind::Element(a), Kind::Element(b)) => a == b,
            (Kind::Text(_), Kind::Text(_)) => true,
            (Kind::Fragment, Kind::Fragment) => true,
            (Kind::Component(a), Kind::Component(b)) => a.is(b),
            _ => false,
        }
    }

    /// Exact-identity check used by the unkeyed matcher's look-ahead to
    /// distinguish a shifted child from an edited one. Stricter than
    /// [`Kind::compatible`] for text positions.
    pub(crate) fn same_content(&self, other: &Kind) -> bool {
        match (self, other) {
            (Kind::Text(a), Kind::Text(b)) => a == b,
            _ => self.compatible(other),
        }
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Element(tag) => write!(f, "<{tag}>"),
            Kind::Text(text) => write!(f, "{text:?}"),
            Kind::Fragment => write!(f, "<>"),
            Kind::Component(spec) => write!(f, "<{}/>", spec.name()),
        }
    }
}

/// A single attribute value. Handlers and opaque data compare by pointer
/// identity; everything else by value.
#[derive(Clone)]
pub enum PropValue {
    Text(Rc<str>),
    Bool(bool),
    Number(f64),
    Style(StyleValue),
    Handler(EventHandler),
    /// Typed payload for component props; invisible to host elements.
    Data(Rc<dyn Any>),
    /// Only observed transiently inside [`create_node`]; the reserved
    /// `ref` entry is extracted before the map is stored.
    Ref(NodeRef),
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Text(a), PropValue::Text(b)) => a == b,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Number(a), PropValue::Number(b)) => a == b,
            (PropValue::Style(a), PropValue::Style(b)) => a == b,
            (PropValue::Handler(a), PropValue::Handler(b)) => a == b,
            (PropValue::Data(a), PropValue::Data(b)) => Rc::ptr_eq(a, b),
            (PropValue::Ref(a), PropValue::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Text(v) => write!(f, "{v:?}"),
            PropValue::Bool(v) => write!(f, "{v}"),
            PropValue::Number(v) => write!(f, "{v}"),
            PropValue::Style(v) => write!(f, "{v:?}"),
            PropValue::Handler(h) => write!(f, "handler#{}", h.id()),
            PropValue::Data(_) => write!(f, "data"),
            PropValue::Ref(_) => write!(f, "ref"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Text(v.into())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Text(v.into())
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Number(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        PropValue::Number(v as f64)
    }
}

impl From<EventHandler> for PropValue {
    fn from(v: EventHandler) -> Self {
        PropValue::Handler(v)
    }
}

impl From<StyleValue> for PropValue {
    fn from(v: StyleValue) -> Self {
        PropValue::Style(v)
    }
}

impl From<NodeRef> for PropValue {
    fn from(v: NodeRef) -> Self {
        PropValue::Ref(v)
    }
}

/// The `style` attribute accepts either a raw string or a property map.
#[derive(Clone, Debug, PartialEq)]
pub enum StyleValue {
    Raw(Rc<str>),
    Map(IndexMap<Rc<str>, Rc<str>>),
}

impl StyleValue {
    pub fn raw(value: &str) -> Self {
        StyleValue::Raw(value.into())
    }

    pub fn map<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        StyleValue::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (Rc::from(k), Rc::from(v)))
                .collect(),
        )
    }
}

/// Receiver for the produced output handle: a callback invoked with
/// `Some(id)` on mount and `None` on unmount, or a shared cell the
/// reconciler keeps current.
#[derive(Clone)]
pub enum NodeRef {
    Callback(Rc<dyn Fn(Option<HostId>)>),
    Cell(Rc<Cell<Option<HostId>>>),
}

impl NodeRef {
    pub fn callback(f: impl Fn(Option<HostId>) + 'static) -> Self {
        NodeRef::Callback(Rc::new(f))
    }

    pub fn cell() -> (Self, Rc<Cell<Option<HostId>>>) {
        let cell = Rc::new(Cell::new(None));
        (NodeRef::Cell(Rc::clone(&cell)), cell)
    }

    pub(crate) fn apply(&self, value: Option<HostId>) {
        match self {
            NodeRef::Callback(f) => f(value),
            NodeRef::Cell(cell) => cell.set(value),
        }
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NodeRef::Callback(a), NodeRef::Callback(b)) => Rc::ptr_eq(a, b),
            (NodeRef::Cell(a), NodeRef::Cell(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// An immutable description of one desired tree position.
#[derive(Clone)]
pub struct VNode {
    pub(crate) kind: Kind,
    pub(crate) props: Props,
    pub(crate) children: Vec<VNode>,
    pub(crate) key: Option<Key>,
    pub(crate) node_ref: Option<NodeRef>,
}

impl VNode {
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn children(&self) -> &[VNode] {
        &self.children
    }

    pub fn key(&self) -> Option<Key> {
        self.key
    }

    pub fn node_ref(&self) -> Option<&NodeRef> {
        self.node_ref.as_ref()
    }

    /// Attaches an explicit sibling key, hashing whatever the author hands
    /// in. Equivalent to a reserved `key` attribute entry.
    pub fn with_key<K: std::hash::Hash>(mut self, key: &K) -> Self {
        self.key = Some(key_of(key));
        self
    }

    pub fn with_ref(mut self, node_ref: NodeRef) -> Self {
        self.node_ref = Some(node_ref);
        self
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VNode");
        s.field("kind", &self.kind);
        if let Some(key) = self.key {
            s.field("key", &key);
        }
        if !self.children.is_empty() {
            s.field("children", &self.children.len());
        }
        s.finish()
    }
}

/// Child input accepted by the constructors: nodes, strings, nested
/// sequences, and droppable placeholders (`None`, booleans).
pub enum ChildSpec {
    Node(VNode),
    Text(String),
    Many(Vec<ChildSpec>),
    Empty,
}

impl From<VNode> for ChildSpec {
    fn from(v: VNode) -> Self {
        ChildSpec::Node(v)
    }
}

impl From<&str> for ChildSpec {
    fn from(v: &str) -> Self {
        ChildSpec::Text(v.to_owned())
    }
}

impl From<String> for ChildSpec {
    fn from(v: String) -> Self {
        ChildSpec::Text(v)
    }
}

impl From<bool> for ChildSpec {
    fn from(_: bool) -> Self {
        ChildSpec::Empty
    }
}

impl<T: Into<ChildSpec>> From<Option<T>> for ChildSpec {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => ChildSpec::Empty,
        }
    }
}

impl<T: Into<ChildSpec>> From<Vec<T>> for ChildSpec {
    fn from(v: Vec<T>) -> Self {
        ChildSpec::Many(v.into_iter().map(Into::into).collect())
    }
}

fn flatten_into(spec: ChildSpec, out: &mut Vec<VNode>) {
    match spec {
        ChildSpec::Node(node) => out.push(node),
        ChildSpec::Text(content) => out.push(text(&content)),
        ChildSpec::Many(list) => {
            for child in list {
                flatten_into(child, out);
            }
        }
        ChildSpec::Empty => {}
    }
}

/// Sole construction entry point for nodes.
///
/// Takes the attribute map by value; the reserved `key` and `ref` entries
/// are pulled out of it before it is embedded in the returned node.
/// Nested child sequences are expanded in place at this nesting level
/// only, and dropped placeholders are discarded while preserving the
/// relative order of the survivors.
pub fn create_node(kind: Kind, mut attrs: Props, children: Vec<ChildSpec>) -> VNode {
    let key = attrs.shift_remove("key").map(|value| match value {
        PropValue::Text(s) => key_of(&s),
        PropValue::Number(n) => key_of(&n.to_bits()),
        PropValue::Bool(b) => key_of(&b),
        other => {
            log::warn!("unhashable key value {other:?}; using its debug form");
            key_of(&format!("{other:?}"))
        }
    });
    let node_ref = attrs.shift_remove("ref").and_then(|value| match value {
        PropValue::Ref(r) => Some(r),
        other => {
            log::warn!("`ref` attribute was not a NodeRef ({other:?}); dropped");
            None
        }
    });
    let mut flat = Vec::new();
    for child in children {
        flatten_into(child, &mut flat);
    }
    let node = VNode {
        kind,
        props: attrs,
        children: flat,
        key,
        node_ref,
    };
    intercept::fire_node_created(&node);
    node
}

/// A host element node.
pub fn element(tag: &str, attrs: Props, children: Vec<ChildSpec>) -> VNode {
    create_node(Kind::Element(tag.into()), attrs, children)
}

/// A text node.
pub fn text(content: &str) -> VNode {
    create_node(Kind::Text(content.into()), Props::new(), Vec::new())
}

/// A fragment: children spliced into the parent with no host output of
/// their own.
pub fn fragment(children: Vec<ChildSpec>) -> VNode {
    create_node(Kind::Fragment, Props::new(), children)
}

/// A component node. `children` are kept on the node for the component to
/// consume; they are never flattened into a surrounding child list.
pub fn component(spec: &ComponentSpec, attrs: Props, children: Vec<ChildSpec>) -> VNode {
    create_node(Kind::Component(spec.clone()), attrs, children)
}

/// Builds a [`Props`] map from `name => value` pairs.
#[macro_export]
macro_rules! attrs {
    () => { $crate::node::Props::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::node::Props::new();
        $(map.insert(std::rc::Rc::from($name), $crate::node::PropValue::from($value));)+
        map
    }};
}

/// Builds a child list, converting each entry through [`ChildSpec`].
#[macro_export]
macro_rules! children {
    () => { Vec::<$crate::node::ChildSpec>::new() };
    ($($child:expr),+ $(,)?) => {
        vec![$($crate::node::ChildSpec::from($child)),+]
    };
}
