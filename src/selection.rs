use egui::{Pos2, Rect};

use crate::settings::SettingsSelection;
use crate::NodeId;

/// A text selection inside one node's rendered content.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSelection {
    pub node: NodeId,
    pub text: String,
    /// Screen-space rects of the selected line fragments.
    pub rects: Vec<Rect>,
}

impl TextSelection {
    pub fn new(node: NodeId, text: impl Into<String>, rects: Vec<Rect>) -> Self {
        Self {
            node,
            text: text.into(),
            rects,
        }
    }

    /// Union of the fragment rects, ignoring degenerate or non-finite ones.
    pub fn bounding_rect(&self) -> Option<Rect> {
        self.rects
            .iter()
            .filter(|r| r.is_finite() && r.is_positive())
            .copied()
            .reduce(|a, b| a.union(b))
    }
}

/// "Reply" button offered next to a selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyAffordance {
    pub node: NodeId,
    /// Screen point the button is anchored at: the selection's bottom-right corner.
    pub anchor: Pos2,
    pub quote: String,
}

/// Builds the affordance, or `None` for an empty or unplaceable selection.
pub fn affordance(
    selection: &TextSelection,
    settings: &SettingsSelection,
) -> Option<ReplyAffordance> {
    if selection.text.trim().is_empty() {
        return None;
    }
    let rect = selection.bounding_rect()?;
    Some(ReplyAffordance {
        node: selection.node.clone(),
        anchor: rect.right_bottom(),
        quote: quote_block(&selection.text, settings.max_quote_chars, &settings.ellipsis),
    })
}

/// Prefixes every line with `> ` after truncating to `max_chars` characters.
///
/// Truncated text ends with `ellipsis`. A trailing blank line separates the quote from
/// whatever the user types next.
pub fn quote_block(text: &str, max_chars: usize, ellipsis: &str) -> String {
    let text = text.trim();
    let body = if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}{ellipsis}", cut.trim_end())
    } else {
        text.to_owned()
    };

    let mut quoted = body
        .lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    quoted.push_str("\n\n");
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::Vec2;

    #[test]
    fn quotes_every_line() {
        assert_eq!(quote_block("first\nsecond", 100, "…"), "> first\n> second\n\n");
    }

    #[test]
    fn truncates_long_selection() {
        let quote = quote_block(&"a".repeat(20), 5, "…");
        assert_eq!(quote, "> aaaaa…\n\n");
        let unicode = quote_block("ééééé", 3, "...");
        assert_eq!(unicode, "> ééé...\n\n");
    }

    #[test]
    fn bounding_rect_covers_all_fragments() {
        let sel = TextSelection::new(
            NodeId::new("n"),
            "two lines",
            vec![
                Rect::from_min_size(Pos2::new(10.0, 10.0), Vec2::new(50.0, 12.0)),
                Rect::from_min_size(Pos2::new(5.0, 24.0), Vec2::new(30.0, 12.0)),
                Rect::NOTHING,
            ],
        );
        assert_eq!(
            sel.bounding_rect(),
            Some(Rect::from_min_max(Pos2::new(5.0, 10.0), Pos2::new(60.0, 36.0)))
        );
        let a = affordance(&sel, &SettingsSelection::default()).unwrap();
        assert_eq!(a.anchor, Pos2::new(60.0, 36.0));
        assert_eq!(a.quote, "> two lines\n\n");
    }

    #[test]
    fn blank_selection_offers_nothing() {
        let rect = Rect::from_min_size(Pos2::ZERO, Vec2::splat(4.0));
        let sel = TextSelection::new(NodeId::new("n"), "  ", vec![rect]);
        assert!(affordance(&sel, &SettingsSelection::default()).is_none());
    }
}
