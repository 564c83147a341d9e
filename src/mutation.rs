//! Structural and content changes on a [`Conversation`].
//!
//! Each function validates before it writes, so a `None`/`false` result means the
//! conversation was left untouched. [`crate::ConversationEngine`] wraps these with
//! snapshot publishing.

use std::collections::HashSet;

use egui::Pos2;
use log::debug;
use rand::Rng;

use crate::graph::path_to_root;
use crate::layouts::placement::{branch_locations, child_location};
use crate::{Conversation, Node, NodeDraft, NodeId, NodePatch, Role, SettingsPlacement};

/// New empty user input box with no parent.
pub fn create_root<R: Rng + ?Sized>(
    conv: &mut Conversation,
    rng: &mut R,
    location: Pos2,
) -> NodeId {
    let id = conv.fresh_id(rng);
    conv.insert(Node::from_draft(id.clone(), NodeDraft::prompt(""), location));
    debug!("created root {id}");
    id
}

/// Appends a child to `parent_id`.
///
/// Without a draft, an empty editing user node is created. Positions come from the
/// placement heuristic; `hint` is honoured only for assistant drafts. Returns `None`
/// if the parent does not exist.
pub fn add_child<R: Rng + ?Sized>(
    conv: &mut Conversation,
    rng: &mut R,
    settings: &SettingsPlacement,
    parent_id: &NodeId,
    hint: Option<Pos2>,
    draft: Option<NodeDraft>,
) -> Option<NodeId> {
    let seeded = child_location(conv, settings, parent_id)?;
    let draft = draft.unwrap_or_else(|| NodeDraft::prompt(""));
    let location = match hint {
        Some(h) if draft.role == Role::Assistant && h.x.is_finite() && h.y.is_finite() => h,
        _ => seeded,
    };

    let id = conv.fresh_id(rng);
    let mut node = Node::from_draft(id.clone(), draft, location);
    node.set_parent_id(Some(parent_id.clone()));
    conv.insert(node);
    conv.node_mut(parent_id)?.push_child(id.clone());
    debug!("added child {id} under {parent_id}");
    Some(id)
}

/// Merges content fields into the node. Never changes structure.
pub fn update_content(conv: &mut Conversation, id: &NodeId, patch: &NodePatch) -> bool {
    conv.node_mut(id).is_some_and(|n| n.apply(patch))
}

/// Manual drag: sets the position and pins the node for good.
pub fn move_node(conv: &mut Conversation, id: &NodeId, location: Pos2) -> bool {
    if !location.x.is_finite() || !location.y.is_finite() {
        return false;
    }
    let Some(node) = conv.node_mut(id) else {
        return false;
    };
    if node.pinned() && node.location() == location {
        return false;
    }
    node.set_location(location);
    node.set_pinned(true);
    true
}

/// Position write from the layout. Pinned nodes are never touched.
pub fn set_layout_location(conv: &mut Conversation, id: &NodeId, location: Pos2) -> bool {
    if !location.x.is_finite() || !location.y.is_finite() {
        return false;
    }
    match conv.node_mut(id) {
        Some(node) if !node.pinned() && node.location() != location => {
            node.set_location(location);
            true
        }
        _ => false,
    }
}

/// Removes `ids` from the store.
///
/// Surviving parents lose the removed ids from `child_ids`; surviving children of removed
/// nodes are detached so every snapshot stays consistent. Returns the ids actually removed.
pub fn remove_nodes(conv: &mut Conversation, ids: &[NodeId]) -> Vec<NodeId> {
    let doomed: HashSet<&NodeId> = ids.iter().collect();
    let mut removed = Vec::new();

    for id in ids {
        let Some(node) = conv.remove(id) else {
            continue;
        };

        if let Some(parent_id) = node.parent_id() {
            if let Some(parent) = conv.node_mut(parent_id) {
                parent.retain_children(|c| c != id);
            }
        }

        for child in node.child_ids() {
            if doomed.contains(child) {
                continue;
            }
            if let Some(c) = conv.node_mut(child) {
                if c.parent_id() == Some(id) {
                    c.set_parent_id(None);
                }
            }
        }

        removed.push(node.id().clone());
    }

    removed
}

/// Clones the root→`id` path into a fresh parallel chain.
///
/// Content and role are copied; the last clone is left open for editing. The original
/// path is not modified. Returns the new ids root-first, or `None` if `id` is unknown.
pub fn branch<R: Rng + ?Sized>(
    conv: &mut Conversation,
    rng: &mut R,
    settings: &SettingsPlacement,
    id: &NodeId,
) -> Option<Vec<NodeId>> {
    let path = path_to_root(conv, id);
    if path.is_empty() {
        return None;
    }
    let locations = branch_locations(conv, settings, id, path.len());

    let mut clones: Vec<Node> = Vec::with_capacity(path.len());
    for (original_id, location) in path.iter().zip(locations) {
        let original = conv.node(original_id)?;
        let draft = NodeDraft {
            role: original.role(),
            content: original.content().to_owned(),
            editing: false,
            thinking: original.thinking().map(str::to_owned),
            model: original.model().map(str::to_owned),
            provider_id: original.provider_id().map(str::to_owned),
        };
        let clone_id = loop {
            let candidate = conv.fresh_id(rng);
            if clones.iter().all(|c| c.id() != &candidate) {
                break candidate;
            }
        };
        let mut clone = Node::from_draft(clone_id, draft, location);
        if let Some(prev) = clones.last_mut() {
            clone.set_parent_id(Some(prev.id().clone()));
            prev.push_child(clone.id().clone());
        }
        clones.push(clone);
    }

    if let Some(last) = clones.last_mut() {
        last.apply(&NodePatch::default().with_editing(true));
    }

    let ids: Vec<NodeId> = clones.iter().map(|c| c.id().clone()).collect();
    for clone in clones {
        conv.insert(clone);
    }
    debug!("branched {} nodes from {id}", ids.len());
    Some(ids)
}

/// Metadata only.
pub fn rename(conv: &mut Conversation, title: &str) -> bool {
    if conv.title() == title {
        return false;
    }
    conv.set_title(title.to_owned());
    true
}
