use std::fmt;

use egui::Pos2;
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

const ID_LEN: usize = 16;

/// Opaque node identifier. Generated on creation and never reused within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub(crate) fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let id: String = rng
            .sample_iter(&Alphanumeric)
            .take(ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Author of a message bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(v: &bool) -> bool {
    !*v
}

/// One message bubble on the canvas.
///
/// Relations to other nodes are plain ids: `parent_id` is a lookup-only back-reference
/// and `child_ids` keeps rendering and branch order. Structural fields are only written
/// by the mutation functions in this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    id: NodeId,
    content: String,
    role: Role,
    x: f32,
    y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<NodeId>,
    #[serde(default)]
    child_ids: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "is_false")]
    pinned: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    editing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thinking_time_seconds: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider_id: Option<String>,
}

impl Node {
    pub(crate) fn new(id: NodeId, role: Role, location: Pos2) -> Self {
        Self {
            id,
            content: String::new(),
            role,
            x: location.x,
            y: location.y,
            parent_id: None,
            child_ids: Vec::new(),
            pinned: false,
            editing: false,
            thinking: None,
            thinking_time_seconds: None,
            model: None,
            provider_id: None,
        }
    }

    pub(crate) fn from_draft(id: NodeId, draft: NodeDraft, location: Pos2) -> Self {
        let mut node = Self::new(id, draft.role, location);
        node.content = draft.content;
        node.editing = draft.editing;
        node.thinking = draft.thinking;
        node.model = draft.model;
        node.provider_id = draft.provider_id;
        node
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn location(&self) -> Pos2 {
        Pos2::new(self.x, self.y)
    }

    pub(crate) fn set_location(&mut self, location: Pos2) {
        self.x = location.x;
        self.y = location.y;
    }

    pub fn parent_id(&self) -> Option<&NodeId> {
        self.parent_id.as_ref()
    }

    pub(crate) fn set_parent_id(&mut self, parent: Option<NodeId>) {
        self.parent_id = parent;
    }

    pub fn child_ids(&self) -> &[NodeId] {
        &self.child_ids
    }

    pub(crate) fn push_child(&mut self, child: NodeId) {
        self.child_ids.push(child);
    }

    pub(crate) fn retain_children(&mut self, keep: impl FnMut(&NodeId) -> bool) {
        self.child_ids.retain(keep);
    }

    pub fn pinned(&self) -> bool {
        self.pinned
    }

    pub(crate) fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    pub fn editing(&self) -> bool {
        self.editing
    }

    pub fn thinking(&self) -> Option<&str> {
        self.thinking.as_deref()
    }

    pub fn thinking_time_seconds(&self) -> Option<f32> {
        self.thinking_time_seconds
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Merges the patch into the node. Returns whether anything changed.
    pub(crate) fn apply(&mut self, patch: &NodePatch) -> bool {
        let mut changed = false;
        if let Some(content) = &patch.content {
            if self.content != *content {
                self.content.clone_from(content);
                changed = true;
            }
        }
        if let Some(thinking) = &patch.thinking {
            if self.thinking.as_ref() != Some(thinking) {
                self.thinking = Some(thinking.clone());
                changed = true;
            }
        }
        if let Some(secs) = patch.thinking_time_seconds {
            if self.thinking_time_seconds != Some(secs) {
                self.thinking_time_seconds = Some(secs);
                changed = true;
            }
        }
        if let Some(editing) = patch.editing {
            if self.editing != editing {
                self.editing = editing;
                changed = true;
            }
        }
        changed
    }
}

/// Content-only change for a node. Never touches structure or position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_time_seconds: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editing: Option<bool>,
}

impl NodePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_thinking(mut self, thinking: impl Into<String>) -> Self {
        self.thinking = Some(thinking.into());
        self
    }

    pub fn with_thinking_time(mut self, seconds: f32) -> Self {
        self.thinking_time_seconds = Some(seconds);
        self
    }

    pub fn with_editing(mut self, editing: bool) -> Self {
        self.editing = Some(editing);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.thinking.is_none()
            && self.thinking_time_seconds.is_none()
            && self.editing.is_none()
    }

    /// Folds `later` on top of `self`; fields set in `later` win.
    pub(crate) fn merge(&mut self, later: NodePatch) {
        if later.content.is_some() {
            self.content = later.content;
        }
        if later.thinking.is_some() {
            self.thinking = later.thinking;
        }
        if later.thinking_time_seconds.is_some() {
            self.thinking_time_seconds = later.thinking_time_seconds;
        }
        if later.editing.is_some() {
            self.editing = later.editing;
        }
    }
}

/// A node built by the caller before it is linked into a conversation.
///
/// The engine assigns the id and the tree links; everything else is taken from the draft.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeDraft {
    pub role: Role,
    pub content: String,
    pub editing: bool,
    pub thinking: Option<String>,
    pub model: Option<String>,
    pub provider_id: Option<String>,
}

impl NodeDraft {
    /// Empty user input box awaiting submission.
    pub fn prompt(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            editing: true,
            ..Default::default()
        }
    }

    /// Assistant reply, usually the empty placeholder a stream fills in.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn generated_ids_are_alphanumeric() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = NodeId::generate(&mut rng);
        assert_eq!(id.as_str().len(), ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, NodeId::generate(&mut rng));
    }

    #[test]
    fn patch_is_idempotent() {
        let mut node = Node::new(NodeId::new("a"), Role::User, Pos2::ZERO);
        let patch = NodePatch::content("X").with_editing(false);
        assert!(node.apply(&patch));
        let once = node.clone();
        assert!(!node.apply(&patch));
        assert_eq!(node, once);
    }

    #[test]
    fn merge_prefers_later_fields() {
        let mut first = NodePatch::content("a").with_thinking("t");
        first.merge(NodePatch::content("b"));
        assert_eq!(first.content.as_deref(), Some("b"));
        assert_eq!(first.thinking.as_deref(), Some("t"));
    }
}
