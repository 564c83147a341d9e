use serde::{Deserialize, Serialize};

use crate::NodeId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadNodeCreated {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub pos: [f32; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadNodeRemoved {
    pub id: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadNodeMove {
    pub id: NodeId,
    pub new_pos: [f32; 2],
    /// `true` for a manual drag, `false` for a layout write.
    pub pinned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadContentUpdated {
    pub id: NodeId,
}

/// A cascade level started animating, or was removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadCascadeLevel {
    pub target: NodeId,
    pub depth: usize,
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadPan {
    pub new_pan: [f32; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadZoom {
    pub new_zoom: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadReplyFinished {
    pub id: NodeId,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadLayoutSettled {
    pub steps: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    NodeCreated(PayloadNodeCreated),
    NodeRemoved(PayloadNodeRemoved),
    NodeMoved(PayloadNodeMove),
    ContentUpdated(PayloadContentUpdated),
    CascadeLevel(PayloadCascadeLevel),
    Pan(PayloadPan),
    Zoom(PayloadZoom),
    ReplyFinished(PayloadReplyFinished),
    LayoutSettled(PayloadLayoutSettled),
}
