use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

use crate::settings::SettingsNavigation;
use crate::NodeId;

/// What sits under the pointer, as reported by the host's hit testing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitTarget {
    /// Empty canvas.
    Canvas,
    Node(NodeId),
    /// An interactive control inside a node (input, dropdown, button).
    Control,
}

/// Outcome of a pointer or wheel event.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewportAction {
    None,
    Panned(Vec2),
    Zoomed(f32),
    /// Node drag; `to` is the new world position.
    MoveNode { id: NodeId, to: Pos2 },
    CreateRoot(Pos2),
    /// Not handled here; the host should let the event propagate.
    Bubble,
}

#[derive(Debug, Clone, Default, PartialEq)]
enum Gesture {
    #[default]
    Idle,
    Panning {
        last: Pos2,
    },
    Dragging {
        id: NodeId,
        /// Pointer position relative to the node origin, in world units.
        grab: Vec2,
    },
}

/// Pan offset and zoom factor tying screen coordinates to world coordinates.
///
/// `world = (screen - pan) / zoom`. Zoom scales about the screen origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pan: Vec2,
    zoom: f32,
    #[serde(skip)]
    settings: SettingsNavigation,
    #[serde(skip)]
    gesture: Gesture,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(SettingsNavigation::default())
    }
}

impl Viewport {
    pub fn new(settings: SettingsNavigation) -> Self {
        let settings = settings.normalized();
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0_f32.clamp(settings.zoom_min, settings.zoom_max),
            settings,
            gesture: Gesture::Idle,
        }
    }

    pub fn pan(&self) -> Vec2 {
        self.pan
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_pan(&mut self, pan: Vec2) {
        if !pan.x.is_finite() || !pan.y.is_finite() {
            return;
        }
        let limit = self.settings.pan_limit;
        self.pan = Vec2::new(pan.x.clamp(-limit, limit), pan.y.clamp(-limit, limit));
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        if !zoom.is_finite() {
            return;
        }
        self.zoom = zoom.clamp(self.settings.zoom_min, self.settings.zoom_max);
    }

    pub fn screen_to_world(&self, pos: Pos2) -> Pos2 {
        ((pos.to_vec2() - self.pan) / self.zoom).to_pos2()
    }

    pub fn world_to_screen(&self, pos: Pos2) -> Pos2 {
        (pos.to_vec2() * self.zoom + self.pan).to_pos2()
    }

    pub fn world_to_screen_size(&self, size: f32) -> f32 {
        size * self.zoom
    }

    pub fn world_to_screen_rect(&self, rect: Rect) -> Rect {
        Rect::from_min_max(self.world_to_screen(rect.min), self.world_to_screen(rect.max))
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.gesture, Gesture::Dragging { .. })
    }

    /// Starts a gesture. `node_origin` is the world position of the node under the pointer.
    pub fn pointer_down(
        &mut self,
        screen: Pos2,
        target: HitTarget,
        node_origin: Option<Pos2>,
    ) -> ViewportAction {
        match target {
            HitTarget::Canvas => {
                self.gesture = Gesture::Panning { last: screen };
                ViewportAction::None
            }
            HitTarget::Node(id) => {
                let world = self.screen_to_world(screen);
                let grab = node_origin.map_or(Vec2::ZERO, |o| world - o);
                self.gesture = Gesture::Dragging { id, grab };
                ViewportAction::None
            }
            HitTarget::Control => {
                self.gesture = Gesture::Idle;
                ViewportAction::Bubble
            }
        }
    }

    pub fn pointer_move(&mut self, screen: Pos2) -> ViewportAction {
        match &mut self.gesture {
            Gesture::Idle => ViewportAction::None,
            Gesture::Panning { last } => {
                let delta = screen - *last;
                *last = screen;
                self.set_pan(self.pan + delta);
                ViewportAction::Panned(self.pan)
            }
            Gesture::Dragging { id, grab } => {
                let (id, grab) = (id.clone(), *grab);
                let to = self.screen_to_world(screen) - grab;
                ViewportAction::MoveNode { id, to }
            }
        }
    }

    pub fn pointer_up(&mut self) {
        self.gesture = Gesture::Idle;
    }

    /// Positive `delta_y` zooms out, negative zooms in. Wheel events over controls bubble.
    pub fn wheel(&mut self, delta_y: f32, target: &HitTarget) -> ViewportAction {
        if *target == HitTarget::Control {
            return ViewportAction::Bubble;
        }
        if delta_y == 0.0 || !delta_y.is_finite() {
            return ViewportAction::None;
        }
        let ratio = if delta_y > 0.0 {
            self.settings.zoom_out_ratio
        } else {
            self.settings.zoom_in_ratio
        };
        self.set_zoom(self.zoom * ratio);
        ViewportAction::Zoomed(self.zoom)
    }

    /// Double-click on empty canvas asks for a new root at the pointer's world position.
    pub fn double_click(&mut self, screen: Pos2, target: &HitTarget) -> ViewportAction {
        match target {
            HitTarget::Canvas => ViewportAction::CreateRoot(self.screen_to_world(screen)),
            HitTarget::Control => ViewportAction::Bubble,
            HitTarget::Node(_) => ViewportAction::None,
        }
    }
}
