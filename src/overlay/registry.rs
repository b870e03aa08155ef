// src/overlay/registry.rs
use crate::badge::BadgeVisualState;
use crate::db::{DisplayMode, RentSource};
use crate::domain::listing::ListingFingerprint;
use crate::dom::NodeId;
use crate::extractor::View;
use std::collections::HashMap;
use tokio::task::AbortHandle;

/// Everything a rendered value depends on besides the listing itself.
/// `revision` moves on every settings or auth change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderMode {
    pub display: DisplayMode,
    pub rent_source: RentSource,
    pub revision: u64,
}

impl RenderMode {
    /// Value of the badge's `data-rc-mode` attribute.
    pub fn tag(&self) -> String {
        let display = match self.display {
            DisplayMode::CashFlow => "cash-flow",
            DisplayMode::Rent => "rent",
        };
        let source = match self.rent_source {
            RentSource::Fmr => "fmr",
            RentSource::Market => "market",
        };
        format!("{display}.{source}.{}", self.revision)
    }
}

/// Ownership of one badge by one host card node.
#[derive(Debug)]
pub struct CardBinding {
    pub card: NodeId,
    pub view: View,
    pub badge: NodeId,
    pub fingerprint: ListingFingerprint,
    pub mode: RenderMode,
    pub state: BadgeVisualState,
    /// Sequence number of the latest job started for this card.
    pub seq: u64,
    pub task: Option<AbortHandle>,
}

impl CardBinding {
    pub fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Card node → binding. Keyed by node id, so the tag survives the host
/// detaching, re-attaching or re-filling the node.
#[derive(Debug, Default)]
pub struct CardRegistry {
    bindings: HashMap<NodeId, CardBinding>,
    seq: u64,
}

impl CardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic across every card.
    pub fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn get(&self, card: NodeId) -> Option<&CardBinding> {
        self.bindings.get(&card)
    }

    pub fn get_mut(&mut self, card: NodeId) -> Option<&mut CardBinding> {
        self.bindings.get_mut(&card)
    }

    pub fn insert(&mut self, binding: CardBinding) -> Option<CardBinding> {
        let previous = self.bindings.insert(binding.card, binding);
        previous.map(|mut old| {
            old.abort_task();
            old
        })
    }

    /// Drops the binding and cancels its in-flight job.
    pub fn remove(&mut self, card: NodeId) -> Option<CardBinding> {
        let mut binding = self.bindings.remove(&card)?;
        binding.abort_task();
        Some(binding)
    }

    pub fn cards(&self) -> Vec<NodeId> {
        self.bindings.keys().copied().collect()
    }

    pub fn by_badge(&self, badge: NodeId) -> Option<NodeId> {
        self.bindings
            .values()
            .find(|b| b.badge == badge)
            .map(|b| b.card)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CardBinding> {
        self.bindings.values()
    }

    /// Bindings still waiting on a job.
    pub fn in_flight(&self) -> usize {
        self.bindings
            .values()
            .filter(|b| b.state == BadgeVisualState::Loading)
            .count()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
