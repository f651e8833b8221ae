#![doc = r"Core runtime pieces for the Arbor reconciler.

A caller hands [`Root::render`] an immutable [`VNode`] description of the
desired tree; the differ computes the minimal set of mutations against the
live [`Host`] structure, drives component lifecycles, and flushes hook
effects once the pass has committed."]

pub mod collections;
pub mod hash;

pub mod children;
pub mod component;
pub mod context;
pub mod diff;
pub mod hooks;
pub mod host;
pub mod intercept;
pub mod memory;
pub mod node;
pub mod patch;
pub mod render;
pub mod scheduler;

pub use component::{Component, ComponentSpec, RenderError};
pub use context::{Context, ContextKey};
pub use hash::{hash_one, key_of};
pub use hooks::{
    use_context, use_effect, use_error_boundary, use_id, use_memo, use_ref, use_reducer, use_state,
    BoundaryReset, Dispatch, EffectResult, Setter,
};
pub use host::{Event, EventHandler, Host, HostError, HostId, HostNode};
pub use intercept::{
    on_after_commit, on_before_diff, on_before_unmount, on_node_created, InterceptRegistration,
};
pub use memory::MemoryHost;
pub use node::{
    component, create_node, element, fragment, text, ChildSpec, Key, Kind, NodeRef, PropValue,
    Props, StyleValue, VNode,
};
pub use render::Root;
pub use scheduler::{FrameWaker, UpdateHandle};
