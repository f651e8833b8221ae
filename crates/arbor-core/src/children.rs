//! List reconciliation for the ordered children of one parent.
//!
//! Reuses old render-tree children wherever a compatible match exists and
//! emits a minimal sequence of move/insert/remove operations. Matching is
//! exact-key first; unkeyed entries fall back to the old child at the
//! same remaining position, with a single-step look-ahead on both sides
//! to tell a shifted child apart from an edited one. Placement anchors to
//! the last placed sibling's final host output, never an absolute index.

use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::component::RenderError;
use crate::diff::{diff_node, unmount, DiffCtx, Link};
use crate::host::HostId;
use crate::node::{Key, VNode};

fn next_unkeyed(old_slots: &[Option<Link>], from: usize) -> Option<usize> {
    (from..old_slots.len())
        .find(|&index| old_slots[index].as_ref().is_some_and(|link| link.borrow().key.is_none()))
}

fn same_content(link: &Link, node: &VNode) -> bool {
    link.borrow().kind.same_content(&node.kind)
}

/// Reconciles `old_children` against `new_children` under `parent_host`,
/// filling `out` with the new committed child list (also on failure, so
/// the parent always holds a consistent list).
///
/// Duplicate-key policy: the first new entry to claim a key wins the
/// match; later claimants are treated as unmatched and created fresh.
/// This is deliberate, observable behavior, not an accident of scan
/// order.
#[allow(clippy::too_many_arguments)]
pub(crate) fn diff_children(
    ctx: &mut DiffCtx<'_>,
    parent_host: HostId,
    parent: &Link,
    old_children: Vec<Link>,
    new_children: Vec<VNode>,
    anchor: &mut Option<HostId>,
    depth: usize,
    out: &mut Vec<Link>,
) -> Result<(), RenderError> {
    let parent_weak = Rc::downgrade(parent);
    let mut old_slots: Vec<Option<Link>> = old_children.into_iter().map(Some).collect();

    let mut by_key: HashMap<Key, usize> = HashMap::new();
    for (index, slot) in old_slots.iter().enumerate() {
        let key = slot.as_ref().and_then(|link| link.borrow().key);
        if let Some(key) = key {
            if by_key.contains_key(&key) {
                log::warn!("duplicate key {key:#x} among children; first occurrence wins");
            } else {
                by_key.insert(key, index);
            }
        }
    }

    let mut new_slots: Vec<Option<VNode>> = new_children.into_iter().map(Some).collect();
    let mut cursor = 0usize;

    for i in 0..new_slots.len() {
        let new_node = new_slots[i].take().expect("new child consumed twice");
        let matched: Option<Link> = match new_node.key() {
            Some(key) => match by_key.get(&key) {
                Some(&index) => {
                    let taken = old_slots[index].take();
                    if taken.is_none() {
                        log::warn!(
                            "duplicate key {key:#x} among new children; treating as unmatched"
                        );
                    }
                    taken
                }
                None => None,
            },
            None => match next_unkeyed(&old_slots, cursor) {
                None => None,
                Some(j) => {
                    if same_content(old_slots[j].as_ref().unwrap(), &new_node) {
                        cursor = j + 1;
                        old_slots[j].take()
                    } else {
                        // Does the next new entry want this old child? Then
                        // the current one is an insertion.
                        let candidate_serves_next = new_slots
                            .get(i + 1)
                            .and_then(|slot| slot.as_ref())
                            .is_some_and(|peek| {
                                peek.key().is_none()
                                    && same_content(old_slots[j].as_ref().unwrap(), peek)
                            });
                        if candidate_serves_next {
                            None
                        } else {
                            // Does the following old child match exactly?
                            // Then the current old one was removed.
                            let k = next_unkeyed(&old_slots, j + 1);
                            let skipped_old_matches = k.is_some_and(|k| {
                                same_content(old_slots[k].as_ref().unwrap(), &new_node)
                            });
                            if skipped_old_matches {
                                let removed = old_slots[j].take().unwrap();
                                unmount(ctx, &removed, true)?;
                                let k = k.unwrap();
                                cursor = k + 1;
                                old_slots[k].take()
                            } else {
                                // Same position, edited in place (or
                                // replaced, if the kind changed).
                                cursor = j + 1;
                                old_slots[j].take()
                            }
                        }
                    }
                }
            },
        };

        let matched_kept = matched.clone();
        match diff_node(ctx, parent_host, matched, new_node, &parent_weak, anchor, depth) {
            Ok(link) => out.push(link),
            Err(err) => {
                if let Some(old) = matched_kept {
                    if !old.borrow().dead {
                        out.push(old);
                    }
                }
                for slot in std::mem::take(&mut old_slots).into_iter().flatten() {
                    if !slot.borrow().dead {
                        out.push(slot);
                    }
                }
                return Err(err);
            }
        }
    }

    // Anything not consumed by a match is gone; tear down in old order.
    for index in 0..old_slots.len() {
        let Some(slot) = old_slots[index].take() else {
            continue;
        };
        if let Err(err) = unmount(ctx, &slot, true) {
            for rest in std::mem::take(&mut old_slots).into_iter().flatten() {
                if !rest.borrow().dead {
                    out.push(rest);
                }
            }
            return Err(err);
        }
    }
    Ok(())
}
