use egui::{Pos2, Vec2};
use petgraph::{stable_graph::StableGraph, visit::NodeIndexable, Undirected};

use super::forces::{CenterForce, ChargeForce, CollideForce, Force, LinkForce};
use super::ForceDirectedState;
use crate::NodeId;

/// Simulation particle mirroring one conversation node.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub id: NodeId,
    pub pos: Pos2,
    pub vel: Vec2,
    pub radius: f32,
    /// Read by the forces, never moved by them.
    pub fixed: bool,
}

impl Body {
    pub fn new(id: NodeId, pos: Pos2, radius: f32) -> Self {
        Self {
            id,
            pos,
            vel: Vec2::ZERO,
            radius,
            fixed: false,
        }
    }
}

/// Bodies plus parent/child links.
pub type SimGraph = StableGraph<Body, (), Undirected>;

/// Advances the simulation by one tick at the given `alpha`.
///
/// Forces accumulate into velocities, velocities are damped, then positions move.
/// Fixed bodies keep their position and lose any velocity. Returns the largest
/// displacement of a free body.
pub fn relax_step(g: &mut SimGraph, params: &ForceDirectedState, alpha: f32) -> f32 {
    let mut vel = vec![Vec2::ZERO; g.node_bound()];
    for idx in g.node_indices() {
        vel[idx.index()] = g[idx].vel;
    }

    LinkForce::from(params).apply(g, &mut vel, alpha);
    ChargeForce::from(params).apply(g, &mut vel, alpha);
    CenterForce::from(params).apply(g, &mut vel, alpha);
    CollideForce::from(params).apply(g, &mut vel, alpha);

    let keep = 1.0 - params.velocity_decay;
    let mut max_step = 0.0_f32;
    let indices: Vec<_> = g.node_indices().collect();
    for idx in indices {
        let body = &mut g[idx];
        if body.fixed {
            body.vel = Vec2::ZERO;
            continue;
        }
        let v = vel[idx.index()] * keep;
        let next = body.pos + v;
        if !next.x.is_finite() || !next.y.is_finite() {
            body.vel = Vec2::ZERO;
            continue;
        }
        body.vel = v;
        body.pos = next;
        max_step = max_step.max(v.length());
    }
    max_step
}
