//! Read-only traversal over a [`Conversation`] forest.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use log::warn;

use crate::{Conversation, InvariantViolation, NodeId};

/// Ids from the root of `id`'s tree down to `id` itself.
///
/// Returns an empty path if `id` does not exist. The walk is bounded by the node count,
/// so a corrupted parent chain cannot loop forever.
pub fn path_to_root(conv: &Conversation, id: &NodeId) -> Vec<NodeId> {
    let mut path = Vec::new();
    let mut cursor = conv.node(id);
    while let Some(node) = cursor {
        if path.len() > conv.node_count() {
            warn!("parent chain from {id} exceeds node count, truncating");
            break;
        }
        path.push(node.id().clone());
        cursor = node.parent_id().and_then(|p| conv.node(p));
    }
    path.reverse();
    path
}

/// Collects `id` and all transitive descendants grouped by depth (0 = `id`).
///
/// Dangling child ids are treated as already-absent leaves.
pub fn subtree_levels(conv: &Conversation, id: &NodeId) -> Vec<Vec<NodeId>> {
    if !conv.contains(id) {
        return Vec::new();
    }

    let mut visited: HashSet<NodeId> = HashSet::new();
    visited.insert(id.clone());
    let mut levels = vec![vec![id.clone()]];

    loop {
        let mut next = Vec::new();
        for parent in levels.last().into_iter().flatten() {
            let Some(node) = conv.node(parent) else {
                continue;
            };
            for child in node.child_ids() {
                if !conv.contains(child) {
                    warn!("dangling child id {child} under {parent}");
                    continue;
                }
                if visited.insert(child.clone()) {
                    next.push(child.clone());
                }
            }
        }
        if next.is_empty() {
            break;
        }
        levels.push(next);
    }

    levels
}

/// Hash over the set of ids and each node's `child_ids`.
///
/// Content and positions do not contribute, so streaming text never changes it.
pub fn structure_signature(conv: &Conversation) -> u64 {
    let mut hasher = DefaultHasher::new();
    conv.node_count().hash(&mut hasher);
    for (id, node) in conv.nodes_iter() {
        id.hash(&mut hasher);
        node.child_ids().hash(&mut hasher);
    }
    hasher.finish()
}

/// Verifies bidirectional parent/child consistency, acyclicity and id uniqueness.
///
/// # Errors
/// Returns the first violation found.
pub fn check_invariants(conv: &Conversation) -> Result<(), InvariantViolation> {
    for (key, node) in conv.nodes_iter() {
        if key != node.id() {
            return Err(InvariantViolation::KeyMismatch {
                key: key.clone(),
                id: node.id().clone(),
            });
        }

        let mut seen = HashSet::new();
        for child_id in node.child_ids() {
            if !seen.insert(child_id) {
                return Err(InvariantViolation::DuplicateChild {
                    parent: key.clone(),
                    child: child_id.clone(),
                });
            }
            let points_back = conv
                .node(child_id)
                .is_some_and(|c| c.parent_id() == Some(key));
            if !points_back {
                return Err(InvariantViolation::MissingBackReference {
                    parent: key.clone(),
                    child: child_id.clone(),
                });
            }
        }

        if let Some(parent_id) = node.parent_id() {
            let Some(parent) = conv.node(parent_id) else {
                return Err(InvariantViolation::DanglingParent {
                    parent: parent_id.clone(),
                    child: key.clone(),
                });
            };
            if !parent.child_ids().contains(key) {
                return Err(InvariantViolation::MissingChildEntry {
                    parent: parent_id.clone(),
                    child: key.clone(),
                });
            }
        }

        let mut hops = 0;
        let mut cursor = node;
        while let Some(p) = cursor.parent_id().and_then(|p| conv.node(p)) {
            hops += 1;
            if hops > conv.node_count() {
                return Err(InvariantViolation::Cycle(key.clone()));
            }
            cursor = p;
        }
    }

    Ok(())
}
