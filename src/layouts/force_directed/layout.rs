use std::collections::{HashMap, HashSet};
use std::time::Duration;

use egui::Pos2;
use log::{debug, info};
use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};

use super::simulation::{relax_step, Body, SimGraph};
use crate::graph::structure_signature;
use crate::layouts::placement::node_size;
use crate::layouts::{Layout, LayoutState};
use crate::{Conversation, NodeId, SettingsPlacement};

/// Parameters and running state of the force relaxation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceDirectedState {
    pub is_running: bool,
    /// Current temperature.
    pub alpha: f32,
    /// Temperature set when the structure changes.
    pub alpha_restart: f32,
    pub alpha_min: f32,
    pub alpha_decay: f32,
    pub alpha_target: f32,
    /// Fraction of velocity lost per tick.
    pub velocity_decay: f32,
    pub link_distance: f32,
    pub link_strength: f32,
    pub charge_strength: f32,
    pub charge_max_distance: f32,
    pub center_strength: f32,
    pub collide_strength: f32,
    pub collide_padding: f32,
    /// Minimum time between two position flushes.
    pub flush_interval_ms: u64,
    /// Per-node movement below this many pixels is not flushed.
    pub flush_epsilon: f32,
    pub step_count: u64,
}

impl LayoutState for ForceDirectedState {}

impl Default for ForceDirectedState {
    fn default() -> Self {
        Self {
            is_running: false,
            alpha: 0.0,
            alpha_restart: 1.0,
            alpha_min: 0.001,
            // reaches alpha_min from 1.0 in ~300 ticks
            alpha_decay: 1.0 - 0.001_f32.powf(1.0 / 300.0),
            alpha_target: 0.0,
            velocity_decay: 0.4,
            link_distance: 300.0,
            link_strength: 0.7,
            charge_strength: -400.0,
            charge_max_distance: 900.0,
            center_strength: 0.01,
            collide_strength: 0.7,
            collide_padding: 12.0,
            flush_interval_ms: 50,
            flush_epsilon: 0.5,
            step_count: 0,
        }
    }
}

/// Force relaxation driven by structural changes of a conversation.
///
/// Bodies are rebuilt whenever the structure signature changes; pure content edits leave
/// the simulation alone. Pinned and frozen nodes are read but never written.
#[derive(Debug, Default)]
pub struct ForceDirected {
    state: ForceDirectedState,
    placement: SettingsPlacement,
    graph: SimGraph,
    index: HashMap<NodeId, NodeIndex>,
    signature: Option<u64>,
    last_flush: Option<Duration>,
}

impl ForceDirected {
    pub fn new(state: ForceDirectedState, placement: SettingsPlacement) -> Self {
        Self {
            state,
            placement,
            ..Default::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    pub fn alpha(&self) -> f32 {
        self.state.alpha
    }

    /// Halts the simulation until the next structural change.
    pub fn stop(&mut self) {
        self.state.is_running = false;
    }

    /// Forgets the tracked structure so the next [`Self::sync`] rebuilds.
    pub fn reset(&mut self) {
        self.signature = None;
        self.graph.clear();
        self.index.clear();
    }

    /// Current simulated position of a node, if it is tracked.
    pub fn body_position(&self, id: &NodeId) -> Option<Pos2> {
        self.index.get(id).map(|&idx| self.graph[idx].pos)
    }

    /// Rebuilds bodies and restarts if the structure changed since the last call.
    pub fn sync(&mut self, conv: &Conversation) -> bool {
        let signature = structure_signature(conv);
        if self.signature == Some(signature) {
            return false;
        }
        self.signature = Some(signature);
        self.rebuild(conv);

        let has_free = conv.nodes_iter().any(|(_, n)| !n.pinned());
        if has_free {
            self.state.alpha = self.state.alpha_restart;
            self.state.is_running = true;
            info!(
                "layout restarted with {} nodes and {} links",
                self.graph.node_count(),
                self.graph.edge_count()
            );
        }
        true
    }

    fn rebuild(&mut self, conv: &Conversation) {
        let old_velocity: HashMap<NodeId, egui::Vec2> = self
            .graph
            .node_weights()
            .map(|b| (b.id.clone(), b.vel))
            .collect();

        self.graph.clear();
        self.index.clear();

        for (id, node) in conv.nodes_iter() {
            let size = node_size(&self.placement, node);
            let mut body = Body::new(id.clone(), node.location(), (size.x + size.y) / 4.0);
            body.vel = old_velocity.get(id).copied().unwrap_or_default();
            body.fixed = node.pinned();
            let idx = self.graph.add_node(body);
            self.index.insert(id.clone(), idx);
        }

        for (id, node) in conv.nodes_iter() {
            let Some(&parent) = self.index.get(id) else {
                continue;
            };
            for child in node.child_ids() {
                if let Some(&c) = self.index.get(child) {
                    self.graph.add_edge(parent, c, ());
                }
            }
        }
    }

    /// Pulls pinned/frozen flags, their positions and current radii from the snapshot.
    fn refresh(&mut self, conv: &Conversation, frozen: &HashSet<NodeId>) -> bool {
        let mut any_free = false;
        for body in self.graph.node_weights_mut() {
            let Some(node) = conv.node(&body.id) else {
                body.fixed = true;
                continue;
            };
            body.fixed = node.pinned() || frozen.contains(&body.id);
            if body.fixed {
                body.pos = node.location();
            } else {
                any_free = true;
            }
            let size = node_size(&self.placement, node);
            body.radius = (size.x + size.y) / 4.0;
        }
        any_free
    }

    /// Runs one tick and returns the position writes that are due.
    ///
    /// Writes are throttled to one batch per `flush_interval_ms` and skip nodes that
    /// moved less than `flush_epsilon`. The tick that settles the simulation always
    /// flushes.
    pub fn tick(
        &mut self,
        conv: &Conversation,
        frozen: &HashSet<NodeId>,
        now: Duration,
    ) -> Vec<(NodeId, Pos2)> {
        if !self.state.is_running || self.graph.node_count() == 0 {
            return Vec::new();
        }
        if !self.refresh(conv, frozen) {
            self.state.is_running = false;
            debug!("layout halted: no free nodes");
            return Vec::new();
        }

        let s = &mut self.state;
        s.alpha += (s.alpha_target - s.alpha) * s.alpha_decay;
        relax_step(&mut self.graph, &self.state, self.state.alpha);
        self.state.step_count += 1;

        let settled = self.state.alpha < self.state.alpha_min;
        if settled {
            self.state.is_running = false;
            info!("layout settled after {} steps", self.state.step_count);
        }

        let interval = Duration::from_millis(self.state.flush_interval_ms);
        let due = settled
            || self
                .last_flush
                .is_none_or(|t| now.saturating_sub(t) >= interval);
        if !due {
            return Vec::new();
        }
        self.last_flush = Some(now);

        let writes: Vec<(NodeId, Pos2)> = self
            .graph
            .node_weights()
            .filter(|b| !b.fixed)
            .filter_map(|b| {
                let node = conv.node(&b.id)?;
                let moved = (b.pos - node.location()).length();
                (moved > self.state.flush_epsilon).then(|| (b.id.clone(), b.pos))
            })
            .collect();
        if !writes.is_empty() {
            debug!("flushing {} layout positions", writes.len());
        }
        writes
    }
}

impl Layout<ForceDirectedState> for ForceDirected {
    fn from_state(state: ForceDirectedState) -> Self {
        Self::new(state, SettingsPlacement::default())
    }

    fn next(
        &mut self,
        conv: &Conversation,
        frozen: &HashSet<NodeId>,
        now: Duration,
    ) -> Vec<(NodeId, Pos2)> {
        self.sync(conv);
        self.tick(conv, frozen, now)
    }

    fn state(&self) -> ForceDirectedState {
        self.state.clone()
    }
}
