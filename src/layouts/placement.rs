//! Deterministic seed positions for nodes at the moment they are created.

use egui::{Pos2, Rect, Vec2};

use crate::{Conversation, Node, NodeId, SettingsPlacement};

/// Estimated rendered height of a bubble holding `content_len` characters.
pub fn estimate_height(settings: &SettingsPlacement, content_len: usize) -> f32 {
    let extra = settings
        .height_bands
        .iter()
        .filter(|(threshold, _)| content_len > *threshold)
        .map(|(_, extra)| *extra)
        .fold(0.0_f32, f32::max);
    settings.base_height + extra
}

/// Estimated width and height of a node's bubble.
pub fn node_size(settings: &SettingsPlacement, node: &Node) -> Vec2 {
    Vec2::new(
        settings.node_width,
        estimate_height(settings, node.content().chars().count()),
    )
}

/// World-space bounds of a node; `location` is the top-left corner.
pub fn node_rect(settings: &SettingsPlacement, node: &Node) -> Rect {
    Rect::from_min_size(node.location(), node_size(settings, node))
}

/// Where the next child of `parent_id` goes.
///
/// The first child sits below the parent, spaced by the parent's estimated height.
/// Later siblings fan out to the right of the current rightmost sibling.
pub fn child_location(
    conv: &Conversation,
    settings: &SettingsPlacement,
    parent_id: &NodeId,
) -> Option<Pos2> {
    let parent = conv.node(parent_id)?;

    let rightmost = conv
        .children(parent_id)
        .map(Node::location)
        .max_by(|a, b| a.x.total_cmp(&b.x));

    let loc = match rightmost {
        Some(sibling) => Pos2::new(
            sibling.x + settings.node_width + settings.horizontal_gap,
            sibling.y,
        ),
        None => {
            let height = estimate_height(settings, parent.content().chars().count());
            let p = parent.location();
            Pos2::new(p.x, p.y + height + settings.vertical_gap)
        }
    };
    Some(loc)
}

/// Locations for a cloned root→`target` chain of `chain_len` nodes.
///
/// The chain starts one gap to the right of the rightmost node in `target`'s vertical
/// band and stacks downward by the row height, so its last clone lands in that band.
pub fn branch_locations(
    conv: &Conversation,
    settings: &SettingsPlacement,
    target: &NodeId,
    chain_len: usize,
) -> Vec<Pos2> {
    let Some(node) = conv.node(target) else {
        return Vec::new();
    };
    let band_y = node.location().y;
    let half_band = settings.branch_row_height / 2.0;

    let rightmost_x = conv
        .nodes_iter()
        .map(|(_, n)| n.location())
        .filter(|p| (p.y - band_y).abs() < half_band)
        .map(|p| p.x)
        .fold(node.location().x, f32::max);

    let x = rightmost_x + settings.node_width + settings.horizontal_gap;
    let top = band_y - settings.branch_row_height * chain_len.saturating_sub(1) as f32;

    (0..chain_len)
        .map(|i| Pos2::new(x, top + settings.branch_row_height * i as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mutation, ConversationId, NodeDraft, NodePatch};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn height_grows_with_content_brackets() {
        let s = SettingsPlacement::default();
        assert_eq!(estimate_height(&s, 0), 120.0);
        assert_eq!(estimate_height(&s, 150), 120.0);
        assert_eq!(estimate_height(&s, 151), 180.0);
        assert_eq!(estimate_height(&s, 900), 380.0);
        assert!(estimate_height(&s, 5000) > estimate_height(&s, 1000));
    }

    #[test]
    fn first_child_below_then_siblings_to_the_right() {
        let s = SettingsPlacement::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut conv = Conversation::new(ConversationId::new("c"));
        let root = mutation::create_root(&mut conv, &mut rng, Pos2::new(10.0, 20.0));

        let first = child_location(&conv, &s, &root).unwrap();
        assert_eq!(first, Pos2::new(10.0, 20.0 + 120.0 + 80.0));

        mutation::add_child(&mut conv, &mut rng, &s, &root, None, None).unwrap();
        let second = child_location(&conv, &s, &root).unwrap();
        assert_eq!(second, Pos2::new(10.0 + 320.0 + 60.0, first.y));
    }

    #[test]
    fn long_parent_pushes_child_further_down() {
        let s = SettingsPlacement::default();
        let mut rng = StdRng::seed_from_u64(4);
        let mut conv = Conversation::new(ConversationId::new("c"));
        let short = mutation::create_root(&mut conv, &mut rng, Pos2::ZERO);
        let long = mutation::create_root(&mut conv, &mut rng, Pos2::ZERO);
        mutation::update_content(&mut conv, &long, &NodePatch::content("x".repeat(1000)));

        let a = child_location(&conv, &s, &short).unwrap();
        let b = child_location(&conv, &s, &long).unwrap();
        assert!(b.y > a.y);
    }

    #[test]
    fn branch_starts_right_of_band() {
        let s = SettingsPlacement::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut conv = Conversation::new(ConversationId::new("c"));
        let root = mutation::create_root(&mut conv, &mut rng, Pos2::ZERO);
        let child = mutation::add_child(
            &mut conv,
            &mut rng,
            &s,
            &root,
            None,
            Some(NodeDraft::assistant("hi")),
        )
        .unwrap();
        let child_loc = conv.node(&child).unwrap().location();

        let locs = branch_locations(&conv, &s, &child, 2);
        assert_eq!(locs.len(), 2);
        assert_eq!(locs[1].y, child_loc.y);
        assert_eq!(locs[0].y, child_loc.y - s.branch_row_height);
        assert!(locs.iter().all(|p| p.x > child_loc.x + s.node_width));
    }
}
