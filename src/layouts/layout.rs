use std::collections::HashSet;
use std::fmt::Debug;
use std::time::Duration;

use egui::Pos2;
use serde::{de::DeserializeOwned, Serialize};

use crate::{Conversation, NodeId};

/// Serializable parameters and running state of a layout.
pub trait LayoutState: Serialize + DeserializeOwned + Default + Debug + Clone {}

pub trait Layout<S>: Default
where
    S: LayoutState,
{
    /// Creates a new layout from the given state.
    fn from_state(state: S) -> Self;

    /// Called on every engine tick. Returns the node positions to write into the next
    /// snapshot; nodes in `frozen` must not appear in the result.
    fn next(
        &mut self,
        conv: &Conversation,
        frozen: &HashSet<NodeId>,
        now: Duration,
    ) -> Vec<(NodeId, Pos2)>;

    /// Returns the current state of the layout.
    fn state(&self) -> S;
}
