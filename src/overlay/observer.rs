// src/overlay/observer.rs
use super::runtime::Overlay;
use crate::dom::{MutationKind, NodeId};
use crate::extractor::View;
use log::debug;
use std::collections::HashSet;
use tokio::sync::watch;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

/// Which regions a batch of host mutations touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Touched {
    pub listings: bool,
    pub detail: bool,
}

impl Touched {
    const ALL: Touched = Touched {
        listings: true,
        detail: true,
    };
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Overlay {
    /// Node-level mutation observer. Bursts are debounced into one pass;
    /// changes to a detail panel get the shorter debounce and a detail-only
    /// pass. `cursor` is the mutation count `changes` was subscribed at.
    pub(crate) async fn observe(self, mut changes: watch::Receiver<u64>, mut cursor: u64) {
        let listings_debounce = self.inner.config.listings_debounce;
        let detail_debounce = self.inner.config.detail_debounce;
        let mut listings_at: Option<Instant> = None;
        let mut detail_at: Option<Instant> = None;

        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let (touched, seq) = self.classify_since(cursor);
                    cursor = seq;
                    let now = Instant::now();
                    if touched.listings {
                        listings_at = Some(now + listings_debounce);
                    }
                    if touched.detail {
                        detail_at = Some(now + detail_debounce);
                    }
                }
                _ = self.inner.wake.notified() => {
                    listings_at.get_or_insert_with(|| Instant::now() + listings_debounce);
                }
                _ = sleep_until_opt(listings_at) => {
                    listings_at = None;
                    self.reconcile();
                }
                _ = sleep_until_opt(detail_at) => {
                    detail_at = None;
                    self.reconcile_view(View::Detail);
                }
            }
        }
    }

    /// Classifies host records after `cursor`. Text and attribute changes
    /// and the overlay's own badge writes are ignored.
    pub(crate) fn classify_since(&self, cursor: u64) -> (Touched, u64) {
        let st = self.inner.state.borrow();
        let doc = &st.doc;
        let seq = doc.mutation_count();
        let Some(records) = doc.records_since(cursor) else {
            debug!("mutation log overflowed, assuming everything changed");
            return (Touched::ALL, seq);
        };

        let extractor = &self.inner.extractor;
        let listings = extractor.listings_regions(doc);
        let details = extractor.detail_regions(doc);
        let bound: HashSet<NodeId> = st.registry.cards().into_iter().collect();
        let inside = |roots: &[NodeId], node: NodeId| {
            roots.iter().any(|root| doc.contains(*root, node))
        };
        // An added subtree may also bring a whole region with it.
        let brings = |roots: &[NodeId], node: NodeId| {
            roots
                .iter()
                .any(|root| doc.contains(*root, node) || doc.contains(node, *root))
        };

        let mut touched = Touched::default();
        for record in records
            .iter()
            .filter(|r| r.kind == MutationKind::ChildList && !doc.is_overlay_record(r))
        {
            touched.detail |= inside(&details, record.target)
                || record.added.iter().any(|n| brings(&details, *n));
            touched.listings |= listings.is_empty()
                || inside(&listings, record.target)
                || record.added.iter().any(|n| brings(&listings, *n));
            // A removed subtree that held a bound card needs a sweep.
            if record
                .removed
                .iter()
                .any(|removed| bound.iter().any(|card| doc.contains(*removed, *card)))
            {
                touched.listings = true;
            }
            if touched == Touched::ALL {
                break;
            }
        }
        (touched, seq)
    }

    /// Backstop for hosts that rewrite card text or attributes in place,
    /// which the observer never hears about.
    pub(crate) async fn poll(self) {
        let mut ticks = interval(self.inner.config.poll_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticks.tick().await;
        loop {
            ticks.tick().await;
            self.poll_tick();
        }
    }

    /// Re-checks up to `poll_max_cards` visible bound cards, rotating so
    /// every card is eventually visited.
    pub(crate) fn poll_tick(&self) {
        if !self.site_enabled() {
            return;
        }
        let batch = {
            let st = &mut *self.inner.state.borrow_mut();
            let order = st.doc.nodes_in_order();
            let candidates: Vec<_> = order
                .into_iter()
                .filter_map(|id| st.registry.get(id).map(|b| (id, b.view)))
                .filter(|(id, _)| st.doc.is_visible(*id))
                .collect();
            if candidates.is_empty() {
                return;
            }
            let take = self.inner.config.poll_max_cards.min(candidates.len());
            let start = st.poll_cursor % candidates.len();
            st.poll_cursor = start + take;
            candidates
                .iter()
                .cycle()
                .skip(start)
                .take(take)
                .copied()
                .collect::<Vec<_>>()
        };

        let stats = self.reconcile_cards(&batch);
        if stats.touched() {
            debug!("poll caught in-place changes: {stats}");
        }
    }
}
