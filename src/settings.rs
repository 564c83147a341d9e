use serde::{Deserialize, Serialize};

use crate::layouts::force_directed::ForceDirectedState;

/// Deterministic placement of freshly created nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPlacement {
    /// Approximate rendered width of a bubble.
    pub node_width: f32,

    /// Height of a bubble with short content.
    pub base_height: f32,

    /// `(content length, extra height)` brackets. The largest exceeded bracket wins.
    pub height_bands: Vec<(usize, f32)>,

    /// Space between a parent's estimated bottom and its first child.
    pub vertical_gap: f32,

    /// Space between siblings and between a branch and its left neighbour.
    pub horizontal_gap: f32,

    /// Vertical step between consecutive clones of a branch.
    pub branch_row_height: f32,
}

impl Default for SettingsPlacement {
    fn default() -> Self {
        Self {
            node_width: 320.0,
            base_height: 120.0,
            height_bands: vec![(150, 60.0), (400, 140.0), (800, 260.0), (1500, 420.0)],
            vertical_gap: 80.0,
            horizontal_gap: 60.0,
            branch_row_height: 200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsNavigation {
    pub zoom_min: f32,
    pub zoom_max: f32,

    /// Multiplier applied on a zoom-in wheel step.
    pub zoom_in_ratio: f32,

    /// Multiplier applied on a zoom-out wheel step.
    pub zoom_out_ratio: f32,

    /// Pan components are clamped to `[-pan_limit, pan_limit]`.
    pub pan_limit: f32,
}

impl Default for SettingsNavigation {
    fn default() -> Self {
        Self {
            zoom_min: 0.1,
            zoom_max: 3.0,
            zoom_in_ratio: 1.1,
            zoom_out_ratio: 0.9,
            pan_limit: 1e6,
        }
    }
}

fn positive(v: f32, fallback: f32) -> f32 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        fallback
    }
}

impl SettingsNavigation {
    /// Repairs values `Viewport` cannot clamp with.
    ///
    /// Non-finite or non-positive zoom bounds and ratios fall back to their defaults,
    /// reversed zoom bounds are swapped and a negative pan limit is mirrored.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();

        let a = positive(self.zoom_min, defaults.zoom_min);
        let b = positive(self.zoom_max, defaults.zoom_max);
        let pan_limit = if self.pan_limit.is_finite() {
            self.pan_limit.abs()
        } else {
            defaults.pan_limit
        };
        Self {
            zoom_min: a.min(b),
            zoom_max: a.max(b),
            zoom_in_ratio: positive(self.zoom_in_ratio, defaults.zoom_in_ratio),
            zoom_out_ratio: positive(self.zoom_out_ratio, defaults.zoom_out_ratio),
            pan_limit,
        }
    }
}

/// Timing of the staggered subtree removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsCascade {
    /// Delay between marking consecutive depth levels.
    pub stagger_ms: u64,

    /// Time a level stays marked before it is removed.
    pub animation_ms: u64,
}

impl Default for SettingsCascade {
    fn default() -> Self {
        Self {
            stagger_ms: 100,
            animation_ms: 400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSelection {
    /// Quoted text beyond this many characters is cut and marked with `ellipsis`.
    pub max_quote_chars: usize,
    pub ellipsis: String,
}

impl Default for SettingsSelection {
    fn default() -> Self {
        Self {
            max_quote_chars: 600,
            ellipsis: "…".to_owned(),
        }
    }
}

/// All engine configuration. Every section falls back to its defaults when omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub placement: SettingsPlacement,
    pub layout: ForceDirectedState,
    pub navigation: SettingsNavigation,
    pub cascade: SettingsCascade,
    pub selection: SettingsSelection,
}

impl Settings {
    /// Parses settings from JSON. Missing fields keep their defaults.
    ///
    /// # Errors
    /// Fails if `json` is not valid JSON or a field has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_placement(mut self, placement: SettingsPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_layout(mut self, layout: ForceDirectedState) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_navigation(mut self, navigation: SettingsNavigation) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn with_cascade(mut self, cascade: SettingsCascade) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_selection(mut self, selection: SettingsSelection) -> Self {
        self.selection = selection;
        self
    }
}
