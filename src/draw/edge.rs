use egui::{epaint::CubicBezierShape, Color32, Pos2, Rect, Shape, Stroke, Vec2};
use log::warn;

use crate::Viewport;

/// Below this, a coordinate difference counts as zero and the edge is drawn straight.
pub const SLOPE_EPSILON: f32 = 1e-3;

/// Parent→child connector in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeCurve {
    Straight {
        from: Pos2,
        to: Pos2,
    },
    Cubic {
        from: Pos2,
        ctrl: [Pos2; 2],
        to: Pos2,
    },
}

impl EdgeCurve {
    /// Routes an edge between two node rectangles.
    ///
    /// Steep pairs leave the parent's bottom and enter the child's top (or the reverse when
    /// the child sits above); shallow pairs connect the facing sides. Aligned centres give a
    /// straight segment. Returns `None` for non-finite input.
    pub fn between(parent: Rect, child: Rect) -> Option<Self> {
        if !rect_is_finite(parent) || !rect_is_finite(child) {
            warn!("skipping edge with non-finite endpoints: {parent:?} -> {child:?}");
            return None;
        }
        let (pc, cc) = (parent.center(), child.center());
        let (dx, dy) = (cc.x - pc.x, cc.y - pc.y);

        if dx.abs() < SLOPE_EPSILON {
            let (from, to) = vertical_ports(parent, child, dy);
            return Some(Self::Straight { from, to });
        }
        if dy.abs() < SLOPE_EPSILON {
            let (from, to) = horizontal_ports(parent, child, dx);
            return Some(Self::Straight { from, to });
        }

        let slope = dy / dx;
        let curve = if slope.abs() >= 1.0 {
            let (from, to) = vertical_ports(parent, child, dy);
            let bend = Vec2::new(0.0, (to.y - from.y) / 2.0);
            Self::Cubic {
                from,
                ctrl: [from + bend, to - bend],
                to,
            }
        } else {
            let (from, to) = horizontal_ports(parent, child, dx);
            let bend = Vec2::new((to.x - from.x) / 2.0, 0.0);
            Self::Cubic {
                from,
                ctrl: [from + bend, to - bend],
                to,
            }
        };
        Some(curve)
    }

    pub fn endpoints(&self) -> (Pos2, Pos2) {
        match *self {
            Self::Straight { from, to } | Self::Cubic { from, to, .. } => (from, to),
        }
    }

    /// Point at `t ∈ [0, 1]` along the edge.
    pub fn sample(&self, t: f32) -> Pos2 {
        match *self {
            Self::Straight { from, to } => from.lerp(to, t),
            Self::Cubic { from, ctrl, to } => {
                let u = 1.0 - t;
                let v = from.to_vec2() * (u * u * u)
                    + ctrl[0].to_vec2() * (3.0 * u * u * t)
                    + ctrl[1].to_vec2() * (3.0 * u * t * t)
                    + to.to_vec2() * (t * t * t);
                v.to_pos2()
            }
        }
    }

    /// Screen-space shape for painting.
    pub fn to_shape(&self, stroke: Stroke, viewport: &Viewport) -> Shape {
        let stroke = Stroke::new(viewport.world_to_screen_size(stroke.width), stroke.color);
        match *self {
            Self::Straight { from, to } => Shape::line_segment(
                [viewport.world_to_screen(from), viewport.world_to_screen(to)],
                stroke,
            ),
            Self::Cubic { from, ctrl, to } => {
                let points = [from, ctrl[0], ctrl[1], to].map(|p| viewport.world_to_screen(p));
                Shape::CubicBezier(CubicBezierShape::from_points_stroke(
                    points,
                    false,
                    Color32::TRANSPARENT,
                    stroke,
                ))
            }
        }
    }
}

fn rect_is_finite(r: Rect) -> bool {
    r.min.x.is_finite() && r.min.y.is_finite() && r.max.x.is_finite() && r.max.y.is_finite()
}

fn vertical_ports(parent: Rect, child: Rect, dy: f32) -> (Pos2, Pos2) {
    if dy >= 0.0 {
        (parent.center_bottom(), child.center_top())
    } else {
        (parent.center_top(), child.center_bottom())
    }
}

fn horizontal_ports(parent: Rect, child: Rect, dx: f32) -> (Pos2, Pos2) {
    if dx >= 0.0 {
        (parent.right_center(), child.left_center())
    } else {
        (parent.left_center(), child.right_center())
    }
}
