use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::node::{Node, NodeId};

pub const DEFAULT_TITLE: &str = "New conversation";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub(crate) fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(NodeId::generate(rng).as_str().to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A forest of message trees plus metadata.
///
/// Nodes live in a flat id-keyed store; relations are ids only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    id: ConversationId,
    title: String,
    #[serde(default)]
    nodes: BTreeMap<NodeId, Node>,
    #[serde(default)]
    last_modified: i64,
}

impl Conversation {
    pub fn new(id: ConversationId) -> Self {
        Self {
            id,
            title: DEFAULT_TITLE.to_owned(),
            nodes: BTreeMap::new(),
            last_modified: now_millis(),
        }
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub(crate) fn set_title(&mut self, title: String) {
        self.title = title;
    }

    /// Milliseconds since the unix epoch of the last published change.
    pub fn last_modified(&self) -> i64 {
        self.last_modified
    }

    pub(crate) fn touch(&mut self) {
        self.last_modified = now_millis();
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes_iter(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes without a parent, one per tree of the forest.
    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.is_root())
    }

    /// Children of `id` in `child_ids` order. Dangling ids are skipped.
    pub fn children<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .get(id)
            .map(|n| n.child_ids())
            .unwrap_or_default()
            .iter()
            .filter_map(|c| self.nodes.get(c))
    }

    pub fn parent(&self, id: &NodeId) -> Option<&Node> {
        self.nodes
            .get(id)
            .and_then(Node::parent_id)
            .and_then(|p| self.nodes.get(p))
    }

    pub(crate) fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id().clone(), node);
    }

    pub(crate) fn remove(&mut self, id: &NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    pub(crate) fn fresh_id<R: Rng + ?Sized>(&self, rng: &mut R) -> NodeId {
        loop {
            let id = NodeId::generate(rng);
            if !self.nodes.contains_key(&id) {
                return id;
            }
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
