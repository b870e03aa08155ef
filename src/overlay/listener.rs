// src/overlay/listener.rs
use super::reconciler::PassStats;
use super::runtime::Overlay;
use crate::db::{keys, PrefChange};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// Notifications arriving this close together are handled as one change.
const COALESCE: Duration = Duration::from_millis(50);

/// What a burst of preference notifications invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Display mode, rent source or a financial setting.
    pub values: bool,
    /// Session keys.
    pub auth: bool,
    /// A `site_enabled.*` flag.
    pub sites: bool,
}

impl ChangeSet {
    pub fn everything() -> Self {
        Self {
            values: true,
            auth: true,
            sites: true,
        }
    }

    pub fn classify(key: &str) -> Self {
        let mut set = Self::default();
        if key == keys::SESSION_TOKEN || key == keys::SESSION_EXPIRES_AT {
            set.auth = true;
        } else if key.starts_with(keys::SITE_ENABLED_PREFIX) {
            set.sites = true;
        } else {
            set.values = true;
        }
        set
    }

    pub fn merge(&mut self, other: ChangeSet) {
        self.values |= other.values;
        self.auth |= other.auth;
        self.sites |= other.sites;
    }

    pub fn is_empty(&self) -> bool {
        !(self.values || self.auth || self.sites)
    }
}

impl Overlay {
    pub(crate) async fn listen(self, mut rx: broadcast::Receiver<PrefChange>) {
        loop {
            let mut changes = match rx.recv().await {
                Ok(change) => ChangeSet::classify(&change.key),
                Err(RecvError::Lagged(n)) => {
                    debug!("missed {n} preference notifications");
                    ChangeSet::everything()
                }
                Err(RecvError::Closed) => break,
            };

            tokio::time::sleep(COALESCE).await;
            loop {
                match rx.try_recv() {
                    Ok(change) => changes.merge(ChangeSet::classify(&change.key)),
                    Err(TryRecvError::Lagged(_)) => changes = ChangeSet::everything(),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }

            self.apply_changes(changes).await;
        }
    }

    /// Re-reads preferences and auth, invalidates what `changes` covers and
    /// runs a pass.
    pub async fn apply_changes(&self, changes: ChangeSet) -> PassStats {
        if changes.is_empty() {
            return PassStats::default();
        }

        let prefs = match &self.inner.prefs_store {
            Some(store) => match store.load().await {
                Ok(prefs) => Some(prefs),
                Err(e) => {
                    warn!("could not reload preferences: {e}");
                    None
                }
            },
            None => None,
        };
        let logged_in = self.inner.auth.is_logged_in().await;

        {
            let st = &mut *self.inner.state.borrow_mut();
            if let Some(prefs) = prefs {
                st.mode.display = prefs.display_mode;
                st.mode.rent_source = prefs.rent_source;
                st.prefs = prefs;
            }
            st.logged_in = logged_in;
            if changes.auth {
                // Requests sent with the old credentials must not be joined.
                st.zip_fetches.clear();
            }
            if changes.values || changes.auth {
                let dropped = st.cash_flow.len();
                st.cash_flow.clear();
                st.mode.revision += 1;
                info!(
                    "settings changed, cleared {dropped} cached results (mode {})",
                    st.mode.tag()
                );
            }
        }

        if self.site_enabled() {
            self.reconcile()
        } else {
            let released = self.remove_all_badges();
            PassStats {
                released,
                ..PassStats::default()
            }
        }
    }
}
