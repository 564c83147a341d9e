use egui::Vec2;
use petgraph::stable_graph::NodeIndex;

use super::simulation::SimGraph;
use super::ForceDirectedState;

/// One force contributing to body velocities.
///
/// `vel` is indexed by `NodeIndex::index()` and accumulates across forces before the
/// integration step.
pub trait Force {
    fn apply(&self, g: &SimGraph, vel: &mut [Vec2], alpha: f32);
}

/// Tiny deterministic offset used when two bodies coincide.
fn jiggle(a: usize, b: usize) -> Vec2 {
    let sx = if (a + b) % 2 == 0 { 1.0 } else { -1.0 };
    let sy = if a < b { 1.0 } else { -1.0 };
    Vec2::new(
        sx * (1.0 + ((a * 31 + b * 17) % 7) as f32) * 1e-3,
        sy * (1.0 + ((a * 13 + b * 7) % 5) as f32) * 1e-3,
    )
}

/// Spring between parent and child pulling toward `distance`.
#[derive(Debug, Clone, Copy)]
pub struct LinkForce {
    pub distance: f32,
    pub strength: f32,
}

impl From<&ForceDirectedState> for LinkForce {
    fn from(s: &ForceDirectedState) -> Self {
        Self {
            distance: s.link_distance,
            strength: s.link_strength,
        }
    }
}

impl Force for LinkForce {
    fn apply(&self, g: &SimGraph, vel: &mut [Vec2], alpha: f32) {
        for e in g.edge_indices() {
            let Some((s, t)) = g.edge_endpoints(e) else {
                continue;
            };
            let (si, ti) = (s.index(), t.index());
            let mut delta = (g[t].pos + vel[ti]) - (g[s].pos + vel[si]);
            if delta.length_sq() < f32::EPSILON {
                delta = jiggle(si, ti);
            }
            let l = delta.length();
            let k = (l - self.distance) / l * alpha * self.strength;
            let d = delta * k;

            let (deg_s, deg_t) = (degree(g, s), degree(g, t));
            let bias = deg_s / (deg_s + deg_t);
            vel[ti] -= d * bias;
            vel[si] += d * (1.0 - bias);
        }
    }
}

fn degree(g: &SimGraph, idx: NodeIndex) -> f32 {
    g.neighbors(idx).count().max(1) as f32
}

/// Pairwise repulsion, ignored beyond `distance_max`.
#[derive(Debug, Clone, Copy)]
pub struct ChargeForce {
    /// Negative values repel.
    pub strength: f32,
    pub distance_max: f32,
    pub distance_min: f32,
}

impl From<&ForceDirectedState> for ChargeForce {
    fn from(s: &ForceDirectedState) -> Self {
        Self {
            strength: s.charge_strength,
            distance_max: s.charge_max_distance,
            distance_min: 1.0,
        }
    }
}

impl Force for ChargeForce {
    fn apply(&self, g: &SimGraph, vel: &mut [Vec2], alpha: f32) {
        let indices: Vec<NodeIndex> = g.node_indices().collect();
        let max2 = self.distance_max * self.distance_max;
        let min2 = self.distance_min * self.distance_min;

        for (n, &i) in indices.iter().enumerate() {
            for &j in &indices[n + 1..] {
                let mut delta = g[j].pos - g[i].pos;
                if delta.length_sq() < f32::EPSILON {
                    delta = jiggle(i.index(), j.index());
                }
                let l2 = delta.length_sq();
                if l2 >= max2 {
                    continue;
                }
                let w = self.strength * alpha / l2.max(min2);
                vel[i.index()] += delta * w;
                vel[j.index()] -= delta * w;
            }
        }
    }
}

/// Weak pull of every body toward the world origin.
#[derive(Debug, Clone, Copy)]
pub struct CenterForce {
    pub strength: f32,
}

impl From<&ForceDirectedState> for CenterForce {
    fn from(s: &ForceDirectedState) -> Self {
        Self {
            strength: s.center_strength,
        }
    }
}

impl Force for CenterForce {
    fn apply(&self, g: &SimGraph, vel: &mut [Vec2], alpha: f32) {
        if self.strength == 0.0 {
            return;
        }
        for idx in g.node_indices() {
            vel[idx.index()] -= g[idx].pos.to_vec2() * self.strength * alpha;
        }
    }
}

/// Keeps bodies from overlapping, using each body's approximate radius.
///
/// Not scaled by alpha, so overlaps are resolved even as the simulation cools.
#[derive(Debug, Clone, Copy)]
pub struct CollideForce {
    pub strength: f32,
    pub padding: f32,
}

impl From<&ForceDirectedState> for CollideForce {
    fn from(s: &ForceDirectedState) -> Self {
        Self {
            strength: s.collide_strength,
            padding: s.collide_padding,
        }
    }
}

impl Force for CollideForce {
    fn apply(&self, g: &SimGraph, vel: &mut [Vec2], _alpha: f32) {
        let indices: Vec<NodeIndex> = g.node_indices().collect();

        for (n, &i) in indices.iter().enumerate() {
            for &j in &indices[n + 1..] {
                let (a, b) = (&g[i], &g[j]);
                if a.fixed && b.fixed {
                    continue;
                }
                let (ri, rj) = (a.radius + self.padding, b.radius + self.padding);
                let r = ri + rj;
                let mut delta = (a.pos + vel[i.index()]) - (b.pos + vel[j.index()]);
                if delta.length_sq() >= r * r {
                    continue;
                }
                if delta.length_sq() < f32::EPSILON {
                    delta = jiggle(i.index(), j.index());
                }
                let l = delta.length();
                let push = delta * ((r - l) / l * self.strength);

                let share_i = if b.fixed {
                    1.0
                } else if a.fixed {
                    0.0
                } else {
                    let (ri2, rj2) = (ri * ri, rj * rj);
                    rj2 / (ri2 + rj2)
                };
                vel[i.index()] += push * share_i;
                vel[j.index()] -= push * (1.0 - share_i);
            }
        }
    }
}
