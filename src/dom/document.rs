// src/dom/document.rs
use crate::errors::OverlayError;
use ego_tree::{NodeId, NodeRef, Tree};
use scraper::node::Element;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::VecDeque;
use tokio::sync::watch;

/// Class carried by every element the overlay injects.
pub const BADGE_CLASS: &str = "rc-badge";

const LOG_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Nodes added or removed. The only kind the primary observer watches.
    ChildList,
    /// Text replaced in place.
    CharacterData,
    /// Element attributes replaced in place.
    Attributes,
}

#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub seq: u64,
    pub kind: MutationKind,
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// A live host page. Wraps a parsed `scraper::Html` and keeps it mutable so
/// both the "host" (tests, replayed page scripts) and the overlay can change
/// it. Node ids are stable across detach/re-attach, which is what lets the
/// registry notice a recycled card.
pub struct Document {
    html: Html,
    log: VecDeque<MutationRecord>,
    seq: u64,
    changes: watch::Sender<u64>,
}

impl Document {
    pub fn parse(markup: &str) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            html: Html::parse_document(markup),
            log: VecDeque::new(),
            seq: 0,
            changes,
        }
    }

    pub fn root(&self) -> NodeId {
        self.html.tree.root().id()
    }

    /// Total number of mutations applied so far.
    pub fn mutation_count(&self) -> u64 {
        self.seq
    }

    /// Wakes whenever the mutation counter moves.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Records after `seq`, or `None` when the bounded log no longer reaches
    /// back that far (the caller should assume everything changed).
    pub fn records_since(&self, seq: u64) -> Option<Vec<MutationRecord>> {
        if seq >= self.seq {
            return Some(Vec::new());
        }
        match self.log.front() {
            Some(first) if first.seq <= seq + 1 => Some(
                self.log
                    .iter()
                    .filter(|r| r.seq > seq)
                    .cloned()
                    .collect(),
            ),
            _ => None,
        }
    }

    // ----- Reads -----

    fn node(&self, id: NodeId) -> Option<NodeRef<'_, Node>> {
        self.html.tree.get(id)
    }

    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.node(id).and_then(ElementRef::wrap)
    }

    /// Connected elements matching `selector`, in document order. Walks from
    /// the root, so detached subtrees left in the arena are never visited.
    pub fn select(&self, selector: &Selector) -> Vec<NodeId> {
        self.select_any(std::slice::from_ref(selector))
    }

    /// Connected elements matching any of `selectors`, each once, in
    /// document order.
    pub fn select_any(&self, selectors: &[Selector]) -> Vec<NodeId> {
        self.html
            .tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| selectors.iter().any(|sel| sel.matches(el)))
            .map(|el| el.id())
            .collect()
    }

    /// Descendants of `root` matching `selector`. Works on detached subtrees.
    pub fn select_within(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.element(root)
            .map(|el| el.select(selector).map(|m| m.id()).collect())
            .unwrap_or_default()
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        let top = node.ancestors().last().map(|a| a.id()).unwrap_or(node.id());
        top == self.root()
    }

    /// True when `id` is `ancestor` or lies inside it.
    pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
        if ancestor == id {
            return true;
        }
        self.node(id)
            .map(|n| n.ancestors().any(|a| a.id() == ancestor))
            .unwrap_or(false)
    }

    pub fn is_visible(&self, id: NodeId) -> bool {
        if !self.is_connected(id) {
            return false;
        }
        let Some(node) = self.node(id) else {
            return false;
        };
        std::iter::once(node)
            .chain(node.ancestors())
            .filter_map(ElementRef::wrap)
            .all(|el| !is_hidden(el.value()))
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.value().name())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.value().attr(name))
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id)
            .map(|el| el.value().classes().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Nearest element at or above `id` (stopping at `stop`, inclusive)
    /// whose tag is `tag`.
    pub fn closest_tag(&self, id: NodeId, tag: &str, stop: NodeId) -> Option<NodeId> {
        let node = self.node(id)?;
        for candidate in std::iter::once(node).chain(node.ancestors()) {
            if let Some(el) = ElementRef::wrap(candidate) {
                if el.value().name().eq_ignore_ascii_case(tag) {
                    return Some(candidate.id());
                }
            }
            if candidate.id() == stop {
                break;
            }
        }
        None
    }

    /// Nearest element at or above `id` carrying `class`.
    pub fn closest_class(&self, id: NodeId, class: &str) -> Option<NodeId> {
        let node = self.node(id)?;
        std::iter::once(node)
            .chain(node.ancestors())
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().classes().any(|c| c == class))
            .map(|el| el.id())
    }

    /// Non-empty, trimmed text chunks under `id`.
    pub fn text_chunks(&self, id: NodeId) -> Vec<String> {
        self.element(id)
            .map(|el| {
                el.text()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Text content with chunks joined by single spaces.
    pub fn text(&self, id: NodeId) -> String {
        self.text_chunks(id).join(" ")
    }

    pub fn outer_html(&self, id: NodeId) -> Option<String> {
        self.element(id).map(|el| el.html())
    }

    pub fn html(&self) -> String {
        self.html.html()
    }

    /// True when the node is an injected badge or sits inside one.
    pub fn is_overlay_node(&self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        std::iter::once(node)
            .chain(node.ancestors())
            .filter_map(ElementRef::wrap)
            .any(|el| el.value().classes().any(|c| c == BADGE_CLASS))
    }

    /// A record caused by the overlay's own badge bookkeeping.
    pub fn is_overlay_record(&self, record: &MutationRecord) -> bool {
        if self.is_overlay_node(record.target) {
            return true;
        }
        let touched: Vec<NodeId> = record
            .added
            .iter()
            .chain(record.removed.iter())
            .copied()
            .collect();
        !touched.is_empty() && touched.iter().all(|id| self.is_overlay_node(*id))
    }

    /// Every node id in document order, starting at the root.
    pub fn nodes_in_order(&self) -> Vec<NodeId> {
        self.html.tree.root().descendants().map(|n| n.id()).collect()
    }

    // ----- Writes -----

    fn record(
        &mut self,
        kind: MutationKind,
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    ) {
        self.seq += 1;
        self.log.push_back(MutationRecord {
            seq: self.seq,
            kind,
            target,
            added,
            removed,
        });
        while self.log.len() > LOG_CAPACITY {
            self.log.pop_front();
        }
        self.changes.send_replace(self.seq);
    }

    /// Parses `markup` and copies its top-level nodes into the tree as orphans.
    fn graft(&mut self, markup: &str) -> Vec<NodeId> {
        let fragment = Html::parse_fragment(markup);
        let top = fragment.root_element();
        top.children()
            .map(|child| copy_subtree(&mut self.html.tree, child))
            .collect()
    }

    fn missing(id: NodeId) -> OverlayError {
        OverlayError::Dom(format!("node {id:?} does not exist"))
    }

    fn detach_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let children: Vec<NodeId> = self
            .node(id)
            .map(|n| n.children().map(|c| c.id()).collect())
            .unwrap_or_default();
        for child in &children {
            if let Some(mut node) = self.html.tree.get_mut(*child) {
                node.detach();
            }
        }
        children
    }

    pub fn append_html(&mut self, parent: NodeId, markup: &str) -> Result<Vec<NodeId>, OverlayError> {
        if self.node(parent).is_none() {
            return Err(Self::missing(parent));
        }
        let ids = self.graft(markup);
        for id in &ids {
            if let Some(mut node) = self.html.tree.get_mut(parent) {
                node.append_id(*id);
            }
        }
        self.record(MutationKind::ChildList, parent, ids.clone(), Vec::new());
        Ok(ids)
    }

    /// Inserts the nodes of `markup` right after `anchor`, in order.
    pub fn insert_html_after(&mut self, anchor: NodeId, markup: &str) -> Result<Vec<NodeId>, OverlayError> {
        let parent = self
            .node(anchor)
            .ok_or_else(|| Self::missing(anchor))?
            .parent()
            .map(|p| p.id())
            .ok_or_else(|| OverlayError::Dom("cannot insert after a detached node".into()))?;
        let ids = self.graft(markup);
        let mut after = anchor;
        for id in &ids {
            if let Some(mut node) = self.html.tree.get_mut(after) {
                node.insert_id_after(*id);
            }
            after = *id;
        }
        self.record(MutationKind::ChildList, parent, ids.clone(), Vec::new());
        Ok(ids)
    }

    /// Swaps out everything inside `id`. The node itself keeps its identity.
    pub fn replace_children_html(&mut self, id: NodeId, markup: &str) -> Result<Vec<NodeId>, OverlayError> {
        if self.node(id).is_none() {
            return Err(Self::missing(id));
        }
        let removed = self.detach_children(id);
        let added = self.graft(markup);
        for child in &added {
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.append_id(*child);
            }
        }
        self.record(MutationKind::ChildList, id, added.clone(), removed);
        Ok(added)
    }

    /// Replaces the text inside `id`, reported as character data only.
    /// Mirrors frameworks that patch text nodes without node-level records.
    pub fn replace_text(&mut self, id: NodeId, text: &str) -> Result<(), OverlayError> {
        if self.node(id).is_none() {
            return Err(Self::missing(id));
        }
        let escaped = maud::html! { (text) }.into_string();
        self.detach_children(id);
        let added = self.graft(&escaped);
        for child in &added {
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.append_id(*child);
            }
        }
        self.record(MutationKind::CharacterData, id, Vec::new(), Vec::new());
        Ok(())
    }

    /// Replaces the attributes of element `id` with those of the single
    /// element in `markup`. Children are left alone.
    pub fn replace_attributes(&mut self, id: NodeId, markup: &str) -> Result<(), OverlayError> {
        let fragment = Html::parse_fragment(markup);
        let source = first_element(&fragment)
            .ok_or_else(|| OverlayError::Dom("markup holds no element".into()))?;
        let mut node = self.html.tree.get_mut(id).ok_or_else(|| Self::missing(id))?;
        *node.value() = Node::Element(source.value().clone());
        self.record(MutationKind::Attributes, id, Vec::new(), Vec::new());
        Ok(())
    }

    /// Re-renders element `id` in place from `markup` (one root element).
    /// Returns false and records nothing when the result would be identical.
    pub fn render_in_place(&mut self, id: NodeId, markup: &str) -> Result<bool, OverlayError> {
        let fragment = Html::parse_fragment(markup);
        let source = first_element(&fragment)
            .ok_or_else(|| OverlayError::Dom("markup holds no element".into()))?;
        let current = self.node(id).ok_or_else(|| Self::missing(id))?;
        if same_subtree(current, *source) {
            return Ok(false);
        }

        let removed = self.detach_children(id);
        if let Some(mut node) = self.html.tree.get_mut(id) {
            *node.value() = Node::Element(source.value().clone());
        }
        let mut added = Vec::new();
        for child in source.children() {
            let child_id = copy_subtree(&mut self.html.tree, child);
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.append_id(child_id);
            }
            added.push(child_id);
        }
        self.record(MutationKind::ChildList, id, added, removed);
        Ok(true)
    }

    /// Detaches `id` from its parent. The node keeps its id and subtree.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.node(id).and_then(|n| n.parent()).map(|p| p.id()) else {
            return false;
        };
        if let Some(mut node) = self.html.tree.get_mut(id) {
            node.detach();
        }
        self.record(MutationKind::ChildList, parent, Vec::new(), vec![id]);
        true
    }

    /// Moves an existing node (attached or not) to sit right after `anchor`.
    pub fn move_after(&mut self, id: NodeId, anchor: NodeId) -> Result<(), OverlayError> {
        let parent = self
            .node(anchor)
            .ok_or_else(|| Self::missing(anchor))?
            .parent()
            .map(|p| p.id())
            .ok_or_else(|| OverlayError::Dom("cannot move next to a detached node".into()))?;
        if self.node(id).is_none() {
            return Err(Self::missing(id));
        }
        if self.contains(id, anchor) {
            return Err(OverlayError::Dom("cannot move a node inside itself".into()));
        }
        self.detach(id);
        if let Some(mut node) = self.html.tree.get_mut(anchor) {
            node.insert_id_after(id);
        }
        self.record(MutationKind::ChildList, parent, vec![id], Vec::new());
        Ok(())
    }

    /// Appends an existing node (attached or not) as the last child of `parent`.
    pub fn append_existing(&mut self, parent: NodeId, id: NodeId) -> Result<(), OverlayError> {
        if self.node(parent).is_none() {
            return Err(Self::missing(parent));
        }
        if self.node(id).is_none() {
            return Err(Self::missing(id));
        }
        if self.contains(id, parent) {
            return Err(OverlayError::Dom("cannot move a node inside itself".into()));
        }
        self.detach(id);
        if let Some(mut node) = self.html.tree.get_mut(parent) {
            node.append_id(id);
        }
        self.record(MutationKind::ChildList, parent, vec![id], Vec::new());
        Ok(())
    }
}

fn copy_subtree(tree: &mut Tree<Node>, src: NodeRef<'_, Node>) -> NodeId {
    let id = tree.orphan(src.value().clone()).id();
    for child in src.children() {
        let child_id = copy_subtree(tree, child);
        if let Some(mut parent) = tree.get_mut(id) {
            parent.append_id(child_id);
        }
    }
    id
}

/// Structural equality; attribute order is ignored.
fn same_subtree(a: NodeRef<'_, Node>, b: NodeRef<'_, Node>) -> bool {
    let same_value = match (a.value(), b.value()) {
        (Node::Element(x), Node::Element(y)) => {
            x.name() == y.name() && sorted_attrs(x) == sorted_attrs(y)
        }
        (Node::Text(x), Node::Text(y)) => x.text == y.text,
        (Node::Comment(x), Node::Comment(y)) => x.comment == y.comment,
        _ => false,
    };
    same_value
        && a.children().count() == b.children().count()
        && a.children().zip(b.children()).all(|(x, y)| same_subtree(x, y))
}

fn sorted_attrs(el: &Element) -> Vec<(&str, &str)> {
    let mut attrs: Vec<(&str, &str)> = el.attrs().collect();
    attrs.sort_unstable();
    attrs
}

fn first_element(fragment: &Html) -> Option<ElementRef<'_>> {
    fragment.root_element().children().find_map(ElementRef::wrap)
}

fn is_hidden(el: &Element) -> bool {
    if el.attr("hidden").is_some() || el.attr("aria-hidden") == Some("true") {
        return true;
    }
    el.attr("style")
        .map(|s| {
            s.chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase()
                .contains("display:none")
        })
        .unwrap_or(false)
}
