// src/overlay/reconciler.rs
//
// One reconciliation pass: compare every card on the page with what the
// registry says it shows, and do the least work that makes them agree.

use super::process::{badge_view, resolve_now};
use super::registry::{CardBinding, RenderMode};
use super::runtime::{Overlay, OverlayState};
use crate::badge::{BadgeController, BadgeVisualState};
use crate::domain::listing::ListingFingerprint;
use crate::dom::NodeId;
use crate::errors::OverlayError;
use crate::extractor::View;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReprocessReason {
    FingerprintChanged,
    ModeChanged,
    BadgeOrphaned,
    FeeAwareAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Inject,
    Skip,
    AwaitInFlight,
    Reprocess(ReprocessReason),
    /// The card no longer identifies a listing.
    Release,
}

/// What a pass sees for one card right now.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub fingerprint: Option<&'a ListingFingerprint>,
    pub mode: RenderMode,
    pub badge_attached: bool,
    /// The cash-flow cache holds a fee-aware result for this listing.
    pub fee_aware_cached: bool,
}

pub fn decide(binding: Option<&CardBinding>, obs: &Observation<'_>) -> Decision {
    let Some(fp) = obs.fingerprint else {
        return match binding {
            Some(_) => Decision::Release,
            None => Decision::Skip,
        };
    };
    let Some(binding) = binding else {
        return Decision::Inject;
    };

    if !obs.badge_attached {
        Decision::Reprocess(ReprocessReason::BadgeOrphaned)
    } else if binding.fingerprint != *fp {
        Decision::Reprocess(ReprocessReason::FingerprintChanged)
    } else if binding.mode != obs.mode {
        Decision::Reprocess(ReprocessReason::ModeChanged)
    } else if binding.state == BadgeVisualState::Loading {
        Decision::AwaitInFlight
    } else if binding.state.is_value_without_fee() && obs.fee_aware_cached {
        Decision::Reprocess(ReprocessReason::FeeAwareAvailable)
    } else {
        Decision::Skip
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub seen: usize,
    pub injected: usize,
    pub reprocessed: usize,
    pub skipped: usize,
    pub awaiting: usize,
    pub released: usize,
    pub swept: usize,
    pub hidden: usize,
}

impl PassStats {
    /// Whether the pass changed anything on the page.
    pub fn touched(&self) -> bool {
        self.injected + self.reprocessed + self.released + self.swept > 0
    }
}

impl fmt::Display for PassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cards, {} injected, {} reprocessed, {} skipped, {} loading, {} released, {} swept, {} hidden",
            self.seen,
            self.injected,
            self.reprocessed,
            self.skipped,
            self.awaiting,
            self.released,
            self.swept,
            self.hidden
        )
    }
}

/// Another card for `fp` still shows a value computed without the fee.
pub(crate) fn has_fee_less_twin(st: &OverlayState, fp: &ListingFingerprint) -> bool {
    st.registry
        .iter()
        .any(|b| b.fingerprint == *fp && b.state.is_value_without_fee())
}

fn remove_strays(st: &mut OverlayState, card: NodeId, keep: Option<NodeId>) {
    for stray in BadgeController::strays(&st.doc, card, keep) {
        debug!("removing stray badge in card {card:?}");
        BadgeController::remove(&mut st.doc, stray);
    }
}

fn release(st: &mut OverlayState, card: NodeId) {
    if let Some(binding) = st.registry.remove(card) {
        BadgeController::remove(&mut st.doc, binding.badge);
    }
    remove_strays(st, card, None);
}

/// Drops bindings whose card left the page, or (on a full pass) is no
/// longer recognised as a card.
fn sweep(st: &mut OverlayState, found: Option<&HashSet<NodeId>>) -> usize {
    let gone: Vec<NodeId> = st
        .registry
        .iter()
        .filter(|b| !st.doc.is_connected(b.card) || found.is_some_and(|f| !f.contains(&b.card)))
        .map(|b| b.card)
        .collect();
    for card in &gone {
        if let Some(binding) = st.registry.remove(*card) {
            BadgeController::remove(&mut st.doc, binding.badge);
        }
    }
    gone.len()
}

impl Overlay {
    /// Full pass over every view.
    pub fn reconcile(&self) -> PassStats {
        if !self.site_enabled() {
            let removed = self.remove_all_badges();
            return PassStats {
                released: removed,
                ..PassStats::default()
            };
        }
        let cards = {
            let st = self.inner.state.borrow();
            self.inner.extractor.find_cards(&st.doc)
        };
        let found: HashSet<NodeId> = cards.iter().map(|(id, _)| *id).collect();
        let mut stats = self.reconcile_cards(&cards);
        stats.swept = sweep(&mut self.inner.state.borrow_mut(), Some(&found));
        if stats.touched() {
            debug!("{} pass: {stats}", self.inner.site);
        }
        stats
    }

    /// Pass over the cards of a single view.
    pub fn reconcile_view(&self, view: View) -> PassStats {
        if !self.site_enabled() {
            return PassStats::default();
        }
        let cards: Vec<(NodeId, View)> = {
            let st = self.inner.state.borrow();
            self.inner
                .extractor
                .find_cards(&st.doc)
                .into_iter()
                .filter(|(_, v)| *v == view)
                .collect()
        };
        let mut stats = self.reconcile_cards(&cards);
        stats.swept = sweep(&mut self.inner.state.borrow_mut(), None);
        stats
    }

    pub(crate) fn reconcile_cards(&self, cards: &[(NodeId, View)]) -> PassStats {
        let mut stats = PassStats::default();
        for &(card, view) in cards {
            if let Err(e) = self.reconcile_card(card, view, &mut stats) {
                warn!("{} card {card:?}: {e}", self.inner.site);
            }
        }
        stats
    }

    fn reconcile_card(
        &self,
        card: NodeId,
        view: View,
        stats: &mut PassStats,
    ) -> Result<(), OverlayError> {
        let extractor = &self.inner.extractor;
        let mut guard = self.inner.state.borrow_mut();
        let st = &mut *guard;

        if !st.doc.is_connected(card) {
            return Ok(());
        }
        stats.seen += 1;
        if !st.doc.is_visible(card) {
            stats.hidden += 1;
            return Ok(());
        }

        let data = extractor.extract(&st.doc, card, view);
        let fingerprint = ListingFingerprint::from_property(&data);
        let binding = st.registry.get(card);
        let obs = Observation {
            fingerprint: fingerprint.as_ref(),
            mode: st.mode,
            badge_attached: binding
                .is_some_and(|b| BadgeController::is_attached(&st.doc, b.badge, card)),
            fee_aware_cached: fingerprint
                .as_ref()
                .is_some_and(|fp| st.cash_flow.has_fee_aware(fp)),
        };
        let decision = decide(binding, &obs);
        let kept = binding.map(|b| b.badge);

        let (fp, reason) = match (decision, fingerprint) {
            (Decision::Skip, _) => {
                stats.skipped += 1;
                remove_strays(st, card, kept);
                return Ok(());
            }
            (Decision::AwaitInFlight, _) => {
                stats.awaiting += 1;
                remove_strays(st, card, kept);
                return Ok(());
            }
            (Decision::Release, _) => {
                stats.released += 1;
                debug!("card {card:?} no longer shows a listing");
                release(st, card);
                return Ok(());
            }
            (Decision::Inject, Some(fp)) => (fp, None),
            (Decision::Reprocess(reason), Some(fp)) => (fp, Some(reason)),
            (_, None) => return Ok(()),
        };

        release(st, card);
        let anchor = extractor.anchor(&st.doc, card, view);
        let resolved = resolve_now(st, &fp, &data);
        let state = resolved.clone().unwrap_or(BadgeVisualState::Loading);
        let refresh_twins = matches!(state, BadgeVisualState::Value { fee_aware: true, .. })
            && has_fee_less_twin(st, &fp);
        let mode = st.mode;
        let seq = st.registry.next_seq();
        let badge =
            BadgeController::inject(&mut st.doc, card, anchor, &badge_view(&fp, mode, view, &state))?;

        match reason {
            Some(reason) => {
                stats.reprocessed += 1;
                debug!("{fp}: reprocessing ({reason:?})");
            }
            None => stats.injected += 1,
        }

        let task = match resolved {
            Some(_) => None,
            None => Some(self.spawn_job(card, seq, fp.clone(), data, mode)),
        };
        st.registry.insert(CardBinding {
            card,
            view,
            badge,
            fingerprint: fp,
            mode,
            state,
            seq,
            task,
        });
        if refresh_twins {
            self.inner.wake.notify_one();
        }
        Ok(())
    }

    /// Removes every badge and binding. Returns how many bindings there were.
    pub fn remove_all_badges(&self) -> usize {
        let st = &mut *self.inner.state.borrow_mut();
        let cards = st.registry.cards();
        for card in &cards {
            if let Some(binding) = st.registry.remove(*card) {
                BadgeController::remove(&mut st.doc, binding.badge);
            }
        }
        for badge in BadgeController::all(&st.doc) {
            BadgeController::remove(&mut st.doc, badge);
        }
        if !cards.is_empty() {
            info!("{}: removed {} badges", self.inner.site, cards.len());
        }
        cards.len()
    }

    pub(crate) fn site_enabled(&self) -> bool {
        self.inner.state.borrow().prefs.site_enabled(self.inner.site)
    }
}
