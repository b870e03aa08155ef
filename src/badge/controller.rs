// src/badge/controller.rs
use super::markup::{badge, BadgeView};
use crate::dom::{Document, NodeId, BADGE_CLASS};
use crate::errors::OverlayError;
use log::debug;
use scraper::Selector;
use std::sync::OnceLock;

fn badge_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse(&format!(".{BADGE_CLASS}")).expect("badge selector"))
}

/// Imperative badge surface over the host document. Holds no state; the
/// card registry owns which badge belongs to which card.
pub struct BadgeController;

impl BadgeController {
    /// Inserts a badge for `card`. It goes right after `anchor`, or after
    /// the link wrapping the anchor so the badge never becomes part of it.
    /// Without an anchor the badge is appended to the card.
    pub fn inject(
        doc: &mut Document,
        card: NodeId,
        anchor: Option<NodeId>,
        view: &BadgeView,
    ) -> Result<NodeId, OverlayError> {
        let markup = badge(view).into_string();
        let placement = anchor
            .filter(|a| doc.contains(card, *a) && *a != card)
            .map(|a| match doc.closest_tag(a, "a", card) {
                Some(link) if link != card => link,
                _ => a,
            });

        let ids = match placement {
            Some(after) => doc.insert_html_after(after, &markup)?,
            None => doc.append_html(card, &markup)?,
        };
        let id = ids
            .into_iter()
            .find(|id| doc.has_class(*id, BADGE_CLASS))
            .ok_or_else(|| OverlayError::Dom("badge markup produced no element".into()))?;
        debug!("badge {} injected ({})", view.key, view.state.as_str());
        Ok(id)
    }

    /// Redraws in place. Returns false when nothing changed.
    pub fn render(
        doc: &mut Document,
        badge_id: NodeId,
        view: &BadgeView,
    ) -> Result<bool, OverlayError> {
        doc.render_in_place(badge_id, &badge(view).into_string())
    }

    pub fn remove(doc: &mut Document, badge_id: NodeId) -> bool {
        doc.detach(badge_id)
    }

    /// Attached to the page and still inside its card.
    pub fn is_attached(doc: &Document, badge_id: NodeId, card: NodeId) -> bool {
        doc.is_connected(badge_id) && doc.contains(card, badge_id)
    }

    /// Badge elements inside `card` other than `keep`.
    pub fn strays(doc: &Document, card: NodeId, keep: Option<NodeId>) -> Vec<NodeId> {
        doc.select_within(card, badge_selector())
            .into_iter()
            .filter(|id| Some(*id) != keep)
            .collect()
    }

    /// Every connected badge in the document.
    pub fn all(doc: &Document) -> Vec<NodeId> {
        doc.select(badge_selector())
    }

    /// The badge containing `node`, if any.
    pub fn enclosing(doc: &Document, node: NodeId) -> Option<NodeId> {
        doc.closest_class(node, BADGE_CLASS)
    }
}
