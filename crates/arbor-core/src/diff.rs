//! The recursive differ and commit walker.
//!
//! Walks an old render tree against a new node description and drives the
//! per-position state machine: absent positions are created, compatible
//! ones updated in place, incompatible ones replaced (full unmount, then
//! create), vanished ones removed. Host mutations happen during the walk;
//! lifecycle notifications and effects are queued and run child-before-
//! parent once the pass has committed.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::children;
use crate::component::{next_instance_id, ComponentInstance, RenderError};
use crate::hooks::{self, ScopeCtx};
use crate::host::{Host, HostId, HostNode};
use crate::intercept;
use crate::node::{Key, Kind, NodeRef, Props, VNode};
use crate::patch::patch_props;
use crate::scheduler::{SchedulerInner, UpdateHandle};

pub(crate) type Link = Rc<RefCell<RenderNode>>;
pub(crate) type InstanceHandle = Rc<RefCell<ComponentInstance>>;

/// The mutable, previously-committed counterpart of a [`VNode`]. Owns the
/// produced output handle exclusively; the parent backlink is weak and
/// used for navigation only.
pub(crate) struct RenderNode {
    pub kind: Kind,
    pub props: Props,
    pub key: Option<Key>,
    pub node_ref: Option<NodeRef>,
    pub host: Option<HostId>,
    pub parent: Weak<RefCell<RenderNode>>,
    pub children: Vec<Link>,
    pub instance: Option<InstanceHandle>,
    /// Committed child descriptions of a component node, replayed when
    /// the instance re-renders from a state update.
    pub comp_children: Vec<VNode>,
    pub depth: usize,
    pub dead: bool,
}

/// A post-mutation notification, queued during the walk and run once the
/// pass has committed. Each action keeps a weak reference to its position
/// so notifications for subtrees discarded later in the same pass (a
/// boundary fallback, a failed creation) are skipped rather than fired.
pub(crate) enum CommitAction {
    Ref {
        node: Weak<RefCell<RenderNode>>,
        node_ref: NodeRef,
        value: Option<HostId>,
    },
    Mounted {
        instance: InstanceHandle,
        node: Weak<RefCell<RenderNode>>,
    },
    Updated {
        instance: InstanceHandle,
        node: Weak<RefCell<RenderNode>>,
    },
}

pub(crate) struct EffectEntry {
    pub instance: InstanceHandle,
    pub node: Weak<RefCell<RenderNode>>,
}

/// Everything one commit pass threads through the walk.
pub(crate) struct DiffCtx<'a> {
    pub host: &'a mut dyn Host,
    pub commits: &'a mut Vec<CommitAction>,
    pub effects: &'a mut Vec<EffectEntry>,
    pub scheduler: Rc<SchedulerInner>,
    /// Set while hydrating: existing host children are adopted when the
    /// shape check passes instead of creating fresh output.
    pub hydrating: bool,
    pub adopt_cursor: Option<HostId>,
}

fn new_link(
    kind: Kind,
    props: Props,
    key: Option<Key>,
    node_ref: Option<NodeRef>,
    host: Option<HostId>,
    parent: &Weak<RefCell<RenderNode>>,
    depth: usize,
) -> Link {
    Rc::new(RefCell::new(RenderNode {
        kind,
        props,
        key,
        node_ref,
        host,
        parent: parent.clone(),
        children: Vec::new(),
        instance: None,
        comp_children: Vec::new(),
        depth,
        dead: false,
    }))
}

/// Diffs one position. `anchor` is the last host output already placed
/// under `parent_host`; placement is always relative to it, never to an
/// absolute index, since earlier siblings may render to any number of
/// host outputs.
///
/// Error contract: when this returns `Err` and `old` was compatible, the
/// old node remains the committed (and internally consistent) occupant of
/// the position; when `old` was incompatible or absent, nothing remains
/// committed and any partially created output has been released.
pub(crate) fn diff_node(
    ctx: &mut DiffCtx<'_>,
    parent_host: HostId,
    old: Option<Link>,
    new: VNode,
    parent: &Weak<RefCell<RenderNode>>,
    anchor: &mut Option<HostId>,
    depth: usize,
) -> Result<Link, RenderError> {
    intercept::fire_before_diff(&new);
    if let Some(old_link) = old {
        let compatible = old_link.borrow().kind.compatible(&new.kind);
        if compatible {
            return update_tree(ctx, parent_host, old_link, new, anchor, depth);
        }
        unmount(ctx, &old_link, true)?;
    }
    create_tree(ctx, parent_host, new, parent, anchor, depth)
}

fn create_tree(
    ctx: &mut DiffCtx<'_>,
    parent_host: HostId,
    new: VNode,
    parent: &Weak<RefCell<RenderNode>>,
    anchor: &mut Option<HostId>,
    depth: usize,
) -> Result<Link, RenderError> {
    let VNode {
        kind,
        props,
        children,
        key,
        node_ref,
    } = new;
    match kind {
        Kind::Text(content) => {
            let id = match try_adopt_text(ctx, &content)? {
                Some(id) => id,
                None => ctx.host.create_text(&content),
            };
            let link = new_link(
                Kind::Text(content),
                props,
                key,
                node_ref.clone(),
                Some(id),
                parent,
                depth,
            );
            place(ctx, parent_host, &link, anchor)?;
            if let Some(node_ref) = node_ref {
                ctx.commits.push(CommitAction::Ref {
                    node: Rc::downgrade(&link),
                    node_ref,
                    value: Some(id),
                });
            }
            Ok(link)
        }
        Kind::Element(tag) => {
            let adopted = try_adopt_element(ctx, &tag)?;
            let id = match adopted {
                Some(id) => id,
                None => ctx.host.create_element(&tag),
            };
            patch_props(ctx.host, id, &Props::new(), &props)?;
            if adopted.is_some() {
                strip_stale_attributes(ctx.host, id, &props)?;
            }
            let link = new_link(
                Kind::Element(tag),
                props,
                key,
                node_ref.clone(),
                Some(id),
                parent,
                depth,
            );
            let saved = (ctx.hydrating, ctx.adopt_cursor);
            if adopted.is_some() {
                ctx.adopt_cursor = ctx.host.first_child(id);
            } else {
                // A freshly created element has nothing to adopt inside.
                ctx.hydrating = false;
                ctx.adopt_cursor = None;
            }
            let parent_weak = Rc::downgrade(&link);
            let mut child_links = Vec::with_capacity(children.len());
            let mut child_anchor = None;
            let mut failure = None;
            for child in children {
                match diff_node(ctx, id, None, child, &parent_weak, &mut child_anchor, depth + 1) {
                    Ok(child_link) => child_links.push(child_link),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
            let sweep = if failure.is_none() && adopted.is_some() {
                release_unclaimed(ctx, id)
            } else {
                Ok(())
            };
            (ctx.hydrating, ctx.adopt_cursor) = saved;
            if let Some(err) = failure {
                if adopted.is_none() {
                    // The element was never attached; free it and the
                    // children assembled inside it.
                    let _ = ctx.host.release(id);
                }
                return Err(err);
            }
            sweep?;
            link.borrow_mut().children = child_links;
            place(ctx, parent_host, &link, anchor)?;
            if let Some(node_ref) = node_ref {
                ctx.commits.push(CommitAction::Ref {
                    node: Rc::downgrade(&link),
                    node_ref,
                    value: Some(id),
                });
            }
            Ok(link)
        }
        Kind::Fragment => {
            let link = new_link(Kind::Fragment, props, key, node_ref, None, parent, depth);
            let parent_weak = Rc::downgrade(&link);
            let mut child_links = Vec::new();
            for child in children {
                match diff_node(ctx, parent_host, None, child, &parent_weak, anchor, depth + 1) {
                    Ok(child_link) => child_links.push(child_link),
                    Err(err) => {
                        // Earlier children were already placed under the
                        // live parent; without a committed owner they must
                        // come back out before the error unwinds.
                        for created in &child_links {
                            let _ = unmount(ctx, created, true);
                        }
                        return Err(err);
                    }
                }
            }
            link.borrow_mut().children = child_links;
            Ok(link)
        }
        Kind::Component(spec) => {
            let link = new_link(
                Kind::Component(spec.clone()),
                props,
                key,
                node_ref,
                None,
                parent,
                depth,
            );
            link.borrow_mut().comp_children = children;
            let updater = UpdateHandle {
                scheduler: Rc::downgrade(&ctx.scheduler),
                node: Rc::downgrade(&link),
                instance: next_instance_id(),
            };
            let instance: InstanceHandle =
                Rc::new(RefCell::new(ComponentInstance::new(&spec, updater.clone())));
            {
                let props_guard = link.borrow();
                instance
                    .borrow_mut()
                    .component
                    .initialize(&props_guard.props, updater);
            }
            link.borrow_mut().instance = Some(Rc::clone(&instance));
            render_component(ctx, parent_host, &link, &instance, anchor, depth)?;
            ctx.commits.push(CommitAction::Mounted {
                instance: Rc::clone(&instance),
                node: Rc::downgrade(&link),
            });
            ctx.effects.push(EffectEntry {
                instance,
                node: Rc::downgrade(&link),
            });
            Ok(link)
        }
    }
}

fn update_tree(
    ctx: &mut DiffCtx<'_>,
    parent_host: HostId,
    link: Link,
    new: VNode,
    anchor: &mut Option<HostId>,
    depth: usize,
) -> Result<Link, RenderError> {
    let VNode {
        kind,
        props,
        children,
        key,
        node_ref,
    } = new;
    match kind {
        Kind::Text(content) => {
            let id = link.borrow().host.expect("text position lost its host");
            let changed = {
                let node = link.borrow();
                !matches!(&node.kind, Kind::Text(old) if old.as_ref() == content.as_ref())
            };
            if changed {
                ctx.host.set_text(id, &content)?;
            }
            swap_ref(ctx, &link, node_ref, Some(id));
            {
                let mut node = link.borrow_mut();
                node.kind = Kind::Text(content);
                node.props = props;
                node.key = key;
            }
            place(ctx, parent_host, &link, anchor)?;
            Ok(link)
        }
        Kind::Element(tag) => {
            let id = link.borrow().host.expect("element position lost its host");
            let old_props = link.borrow().props.clone();
            patch_props(ctx.host, id, &old_props, &props)?;
            swap_ref(ctx, &link, node_ref, Some(id));
            {
                let mut node = link.borrow_mut();
                node.kind = Kind::Element(tag);
                node.props = props;
                node.key = key;
            }
            let old_children = std::mem::take(&mut link.borrow_mut().children);
            let mut out = Vec::new();
            let mut child_anchor = None;
            let result = children::diff_children(
                ctx,
                id,
                &link,
                old_children,
                children,
                &mut child_anchor,
                depth + 1,
                &mut out,
            );
            link.borrow_mut().children = out;
            result?;
            place(ctx, parent_host, &link, anchor)?;
            Ok(link)
        }
        Kind::Fragment => {
            {
                let mut node = link.borrow_mut();
                node.props = props;
                node.key = key;
                node.node_ref = node_ref;
            }
            let old_children = std::mem::take(&mut link.borrow_mut().children);
            let mut out = Vec::new();
            let result = children::diff_children(
                ctx,
                parent_host,
                &link,
                old_children,
                children,
                anchor,
                depth + 1,
                &mut out,
            );
            link.borrow_mut().children = out;
            result?;
            Ok(link)
        }
        Kind::Component(spec) => update_component(
            ctx,
            parent_host,
            link,
            spec,
            props,
            children,
            key,
            node_ref,
            anchor,
            depth,
            false,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn update_component(
    ctx: &mut DiffCtx<'_>,
    parent_host: HostId,
    link: Link,
    spec: crate::component::ComponentSpec,
    new_props: Props,
    new_children: Vec<VNode>,
    key: Option<Key>,
    node_ref: Option<NodeRef>,
    anchor: &mut Option<HostId>,
    depth: usize,
    force: bool,
) -> Result<Link, RenderError> {
    let instance = link
        .borrow()
        .instance
        .clone()
        .expect("component position lost its instance");
    if !force {
        let should = {
            let guard = instance.borrow();
            let node = link.borrow();
            guard.component.should_update(&node.props, &new_props)
        };
        if !should {
            // Vetoed: the committed subtree stands, but props carry
            // forward and placement still advances past its outputs.
            let mut node = link.borrow_mut();
            node.kind = Kind::Component(spec);
            node.props = new_props;
            node.comp_children = new_children;
            node.key = key;
            node.node_ref = node_ref;
            drop(node);
            place(ctx, parent_host, &link, anchor)?;
            return Ok(link);
        }
    }
    {
        let mut node = link.borrow_mut();
        node.kind = Kind::Component(spec);
        node.props = new_props;
        node.comp_children = new_children;
        node.key = key;
        node.node_ref = node_ref;
    }
    let instance_id = instance.borrow().id;
    ctx.scheduler.mark_clean(instance_id);
    render_component(ctx, parent_host, &link, &instance, anchor, depth)?;
    ctx.commits.push(CommitAction::Updated {
        instance: Rc::clone(&instance),
        node: Rc::downgrade(&link),
    });
    ctx.effects.push(EffectEntry {
        instance,
        node: Rc::downgrade(&link),
    });
    Ok(link)
}

/// Renders `instance` and diffs its output against the committed child.
/// A failure anywhere in the subtree is first offered to this instance's
/// error-capture capability; a captured error re-renders immediately so
/// the fallback output replaces the failing subtree. A second consecutive
/// failure forwards to the next boundary up.
fn render_component(
    ctx: &mut DiffCtx<'_>,
    parent_host: HostId,
    link: &Link,
    instance: &InstanceHandle,
    anchor: &mut Option<HostId>,
    depth: usize,
) -> Result<(), RenderError> {
    let entry_anchor = *anchor;
    let mut attempts = 0;
    loop {
        let commit_mark = ctx.commits.len();
        let effect_mark = ctx.effects.len();
        *anchor = entry_anchor;
        // A failure in this instance's own render is an ancestor's
        // problem; only descendant failures are offered to this boundary.
        let rendered = render_instance(instance, link)?;
        let old_child = link.borrow().children.first().cloned();
        let old_kept = old_child.clone();
        let parent_weak = Rc::downgrade(link);
        let result = diff_node(ctx, parent_host, old_child, rendered, &parent_weak, anchor, depth + 1);
        match result {
            Ok(child) => {
                link.borrow_mut().children = vec![child];
                return Ok(());
            }
            Err(err) => {
                match old_kept {
                    Some(old) if !old.borrow().dead => {
                        link.borrow_mut().children = vec![old];
                    }
                    _ => link.borrow_mut().children.clear(),
                }
                let handled = attempts == 0 && instance.borrow_mut().try_catch(&err);
                if !handled {
                    return Err(err);
                }
                // The attempt is redone wholesale below; notifications it
                // queued would double up with the fallback's own.
                ctx.commits.truncate(commit_mark);
                ctx.effects.truncate(effect_mark);
                log::warn!(
                    "error boundary <{}/> captured: {err}",
                    instance.borrow().name
                );
                attempts += 1;
            }
        }
    }
}

fn render_instance(instance: &InstanceHandle, link: &Link) -> Result<VNode, RenderError> {
    let (hooks, updater, name) = {
        let guard = instance.borrow();
        (
            Rc::clone(&guard.hooks),
            guard.updater.clone(),
            Rc::clone(&guard.name),
        )
    };
    let (props, children) = {
        let node = link.borrow();
        (node.props.clone(), node.comp_children.clone())
    };
    hooks.borrow_mut().begin();
    let scope = ScopeCtx {
        hooks: Rc::clone(&hooks),
        updater,
        node: Rc::downgrade(link),
    };
    let result = hooks::with_scope(scope, || {
        instance.borrow_mut().component.render(&props, &children)
    });
    let mut tail = hooks.borrow_mut().finish();
    hooks::run_cleanups(&mut tail);
    result.map_err(|err| err.tag_component(&name))
}

fn swap_ref(ctx: &mut DiffCtx<'_>, link: &Link, new_ref: Option<NodeRef>, host: Option<HostId>) {
    let old_ref = link.borrow().node_ref.clone();
    let unchanged = matches!((&old_ref, &new_ref), (Some(old), Some(new)) if old == new)
        || (old_ref.is_none() && new_ref.is_none());
    if !unchanged {
        if let Some(old) = old_ref {
            ctx.commits.push(CommitAction::Ref {
                node: Rc::downgrade(link),
                node_ref: old,
                value: None,
            });
        }
        if let Some(new) = new_ref.clone() {
            ctx.commits.push(CommitAction::Ref {
                node: Rc::downgrade(link),
                node_ref: new,
                value: host,
            });
        }
    }
    link.borrow_mut().node_ref = new_ref;
}

/// Tears a subtree down: notifications child-before-parent, effect
/// cleanups and `before_unmount` before the output handle detaches. Only
/// the topmost host output of the subtree is detached; inner handles are
/// freed with it.
pub(crate) fn unmount(ctx: &mut DiffCtx<'_>, link: &Link, detach: bool) -> Result<(), RenderError> {
    if link.borrow().dead {
        return Ok(());
    }
    if intercept::before_unmount_active() {
        let kind = link.borrow().kind.clone();
        intercept::fire_before_unmount(&kind);
    }
    log::debug!("unmounting {:?}", link.borrow().kind);
    link.borrow_mut().dead = true;
    let (children, host, instance, node_ref) = {
        let mut node = link.borrow_mut();
        (
            std::mem::take(&mut node.children),
            node.host,
            node.instance.take(),
            node.node_ref.take(),
        )
    };
    let child_detach = detach && host.is_none();
    for child in &children {
        unmount(ctx, child, child_detach)?;
    }
    if let Some(instance) = instance {
        let hooks = Rc::clone(&instance.borrow().hooks);
        hooks::teardown(&hooks);
        instance.borrow_mut().component.before_unmount();
        let id = instance.borrow().id;
        ctx.scheduler.mark_clean(id);
    }
    if let Some(node_ref) = node_ref {
        node_ref.apply(None);
    }
    if detach {
        if let Some(id) = host {
            if let Some(parent) = ctx.host.parent_of(id) {
                ctx.host.detach(parent, id)?;
            }
            ctx.host.release(id)?;
        }
    }
    Ok(())
}

fn collect_hosts(link: &Link, out: &mut Vec<HostId>) {
    let node = link.borrow();
    if let Some(id) = node.host {
        out.push(id);
        return;
    }
    for child in &node.children {
        collect_hosts(child, out);
    }
}

/// Moves or inserts the subtree's host outputs so they directly follow
/// `anchor` under `parent_host`, then advances `anchor` past them. An
/// output already in position is left untouched.
pub(crate) fn place(
    ctx: &mut DiffCtx<'_>,
    parent_host: HostId,
    link: &Link,
    anchor: &mut Option<HostId>,
) -> Result<(), RenderError> {
    let mut outputs = Vec::new();
    collect_hosts(link, &mut outputs);
    for id in outputs {
        let in_place =
            ctx.host.parent_of(id) == Some(parent_host) && ctx.host.prev_sibling(id) == *anchor;
        if !in_place {
            ctx.host.insert_after(parent_host, id, *anchor)?;
        }
        *anchor = Some(id);
    }
    Ok(())
}

/// Nearest ancestor host output that contains this position.
pub(crate) fn host_parent_of(link: &Link, container: HostId) -> HostId {
    let mut current = link.borrow().parent.upgrade();
    while let Some(node) = current {
        if let Some(id) = node.borrow().host {
            return id;
        }
        let parent = node.borrow().parent.upgrade();
        current = parent;
    }
    container
}

fn last_host(link: &Link) -> Option<HostId> {
    let node = link.borrow();
    if let Some(id) = node.host {
        return Some(id);
    }
    node.children.iter().rev().find_map(last_host)
}

/// The host output immediately preceding this position: the last output
/// of any earlier sibling, walked up through output-less ancestors.
pub(crate) fn host_prev_of(link: &Link) -> Option<HostId> {
    let mut node = Rc::clone(link);
    loop {
        let parent = node.borrow().parent.upgrade()?;
        let index = {
            let guard = parent.borrow();
            guard
                .children
                .iter()
                .position(|child| Rc::ptr_eq(child, &node))?
        };
        let found = {
            let guard = parent.borrow();
            guard.children[..index].iter().rev().find_map(last_host)
        };
        if let Some(id) = found {
            return Some(id);
        }
        if parent.borrow().host.is_some() {
            return None;
        }
        node = parent;
    }
}

fn still_committed(node: &Weak<RefCell<RenderNode>>) -> bool {
    node.upgrade().is_some_and(|link| !link.borrow().dead)
}

pub(crate) fn run_commits(commits: Vec<CommitAction>) {
    for action in commits {
        match action {
            CommitAction::Ref {
                node,
                node_ref,
                value,
            } => {
                if still_committed(&node) {
                    node_ref.apply(value);
                }
            }
            CommitAction::Mounted { instance, node } => {
                if still_committed(&node) {
                    instance.borrow_mut().component.mounted();
                }
            }
            CommitAction::Updated { instance, node } => {
                if still_committed(&node) {
                    instance.borrow_mut().component.updated();
                }
            }
        }
    }
}

/// Routes an error raised after commit (an effect failure) to the nearest
/// ancestor boundary. The already-committed pass is never unwound; the
/// boundary is scheduled to re-render with the captured error instead.
pub(crate) fn dispatch_to_boundary(node: &Weak<RefCell<RenderNode>>, error: &RenderError) -> bool {
    let mut current = node.upgrade().and_then(|n| n.borrow().parent.upgrade());
    while let Some(candidate) = current {
        let instance = candidate.borrow().instance.clone();
        if let Some(instance) = instance {
            if instance.borrow_mut().try_catch(error) {
                instance.borrow().updater.invalidate();
                return true;
            }
        }
        let parent = candidate.borrow().parent.upgrade();
        current = parent;
    }
    false
}

fn try_adopt_element(ctx: &mut DiffCtx<'_>, tag: &str) -> Result<Option<HostId>, RenderError> {
    if !ctx.hydrating {
        return Ok(None);
    }
    let Some(candidate) = ctx.adopt_cursor else {
        return Ok(None);
    };
    match ctx.host.describe(candidate)? {
        HostNode::Element { tag: existing } if existing.as_ref() == tag => {
            ctx.adopt_cursor = ctx.host.next_sibling(candidate);
            Ok(Some(candidate))
        }
        _ => Ok(None),
    }
}

fn try_adopt_text(ctx: &mut DiffCtx<'_>, content: &str) -> Result<Option<HostId>, RenderError> {
    if !ctx.hydrating {
        return Ok(None);
    }
    let Some(candidate) = ctx.adopt_cursor else {
        return Ok(None);
    };
    match ctx.host.describe(candidate)? {
        HostNode::Text { text } => {
            ctx.adopt_cursor = ctx.host.next_sibling(candidate);
            if text.as_ref() != content {
                ctx.host.set_text(candidate, content)?;
            }
            Ok(Some(candidate))
        }
        _ => Ok(None),
    }
}

/// After an adopted element's children are hydrated, anything left under
/// it came from the pre-render and has no counterpart; drop it.
fn release_unclaimed(ctx: &mut DiffCtx<'_>, parent: HostId) -> Result<(), RenderError> {
    let mut cursor = ctx.adopt_cursor;
    while let Some(extra) = cursor {
        cursor = ctx.host.next_sibling(extra);
        ctx.host.detach(parent, extra)?;
        ctx.host.release(extra)?;
    }
    ctx.adopt_cursor = None;
    Ok(())
}

/// Same sweep for the container itself, used by the root after a
/// hydration pass.
pub(crate) fn release_unclaimed_in(
    ctx: &mut DiffCtx<'_>,
    parent: HostId,
) -> Result<(), RenderError> {
    release_unclaimed(ctx, parent)
}

fn strip_stale_attributes(
    host: &mut dyn Host,
    id: HostId,
    props: &Props,
) -> Result<(), RenderError> {
    let existing = host.attribute_names(id);
    for name in existing {
        let keep = match props.get(name.as_ref()) {
            Some(value) => !matches!(value, crate::node::PropValue::Bool(false)),
            None => false,
        };
        if !keep {
            host.remove_attribute(id, &name)?;
        }
    }
    Ok(())
}
