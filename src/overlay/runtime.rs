// src/overlay/runtime.rs
use super::process::ZipFetch;
use super::registry::{CardRegistry, RenderMode};
use crate::api::DataApi;
use crate::auth::AuthBoundary;
use crate::badge::{BadgeController, SIGN_IN_ACTION};
use crate::cache::{CashFlowCache, ZipCache};
use crate::config::OverlayConfig;
use crate::db::{Preferences, PrefsStore};
use crate::dom::{Document, NodeId};
use crate::errors::OverlayError;
use crate::extractor::{Extractor, Site};
use log::{debug, info, warn};
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{spawn_local, AbortHandle};

/// Mutable state shared by every overlay task. Only touched between awaits.
pub struct OverlayState {
    pub doc: Document,
    pub registry: CardRegistry,
    pub zip_cache: ZipCache,
    pub cash_flow: CashFlowCache,
    pub prefs: Preferences,
    pub mode: RenderMode,
    pub logged_in: bool,
    pub(crate) zip_fetches: HashMap<String, ZipFetch>,
    pub(crate) poll_cursor: usize,
}

/// External collaborators.
pub struct OverlayDeps {
    pub api: Rc<dyn DataApi>,
    pub auth: Rc<dyn AuthBoundary>,
    /// Without a store, preferences are the defaults and never change.
    pub prefs: Option<Rc<PrefsStore>>,
}

pub(crate) struct Inner {
    pub(crate) state: RefCell<OverlayState>,
    pub(crate) site: Site,
    pub(crate) extractor: Extractor,
    pub(crate) config: OverlayConfig,
    pub(crate) api: Rc<dyn DataApi>,
    pub(crate) auth: Rc<dyn AuthBoundary>,
    pub(crate) prefs_store: Option<Rc<PrefsStore>>,
    /// Asks the observer for a listings pass.
    pub(crate) wake: Notify,
    /// A preference listener is running.
    pub(crate) listening: Cell<bool>,
}

/// The overlay for one host page. Cheap to clone; clones share state.
/// Must be driven from inside a `tokio::task::LocalSet`.
#[derive(Clone)]
pub struct Overlay {
    pub(crate) inner: Rc<Inner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Not ours; the host handles it.
    PassThrough,
    /// Inside a badge; swallowed so the card link never sees it.
    Consumed,
    /// The sign-in affordance was used.
    SignIn,
}

/// Background tasks started by [`Overlay::start`]. Dropping it stops them.
pub struct OverlayHandle {
    overlay: Overlay,
    tasks: Vec<AbortHandle>,
}

impl OverlayHandle {
    /// Stops the observers, the poller and the listener now.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for OverlayHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.overlay.inner.listening.set(false);
    }
}

impl Overlay {
    pub async fn new(
        doc: Document,
        site: Site,
        config: OverlayConfig,
        deps: OverlayDeps,
    ) -> Result<Self, OverlayError> {
        config.validate()?;
        let prefs = match &deps.prefs {
            Some(store) => store.load().await?,
            None => Preferences::default(),
        };
        let logged_in = deps.auth.is_logged_in().await;
        let mode = RenderMode {
            display: prefs.display_mode,
            rent_source: prefs.rent_source,
            revision: 0,
        };

        let state = OverlayState {
            doc,
            registry: CardRegistry::new(),
            zip_cache: ZipCache::new(config.zip_cache_capacity),
            cash_flow: CashFlowCache::new(config.cash_flow_cache_capacity),
            prefs,
            mode,
            logged_in,
            zip_fetches: HashMap::new(),
            poll_cursor: 0,
        };

        Ok(Self {
            inner: Rc::new(Inner {
                state: RefCell::new(state),
                site,
                extractor: Extractor::for_site(site),
                config,
                api: deps.api,
                auth: deps.auth,
                prefs_store: deps.prefs,
                wake: Notify::new(),
                listening: Cell::new(false),
            }),
        })
    }

    pub fn site(&self) -> Site {
        self.inner.site
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.inner.config
    }

    /// Read access for inspection. Do not hold across an await.
    pub fn state(&self) -> Ref<'_, OverlayState> {
        self.inner.state.borrow()
    }

    /// Runs a host-side change against the page.
    pub fn host<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        f(&mut self.inner.state.borrow_mut().doc)
    }

    pub fn html(&self) -> String {
        self.inner.state.borrow().doc.html()
    }

    /// First pass, then the observers, the polling backstop and (with a
    /// preferences store) the preference listener.
    pub fn start(&self) -> OverlayHandle {
        let stats = self.reconcile();
        info!("{} overlay started: {stats}", self.inner.site);

        let (changes, cursor) = {
            let st = self.inner.state.borrow();
            (st.doc.subscribe(), st.doc.mutation_count())
        };
        let mut tasks = vec![
            spawn_local(self.clone().observe(changes, cursor)).abort_handle(),
            spawn_local(self.clone().poll()).abort_handle(),
        ];
        if let Some(store) = &self.inner.prefs_store {
            let rx = store.subscribe();
            tasks.push(spawn_local(self.clone().listen(rx)).abort_handle());
            self.inner.listening.set(true);
        }
        OverlayHandle {
            overlay: self.clone(),
            tasks,
        }
    }

    /// Waits until no badge is loading, up to `limit`. Returns whether it
    /// settled.
    pub async fn settle(&self, limit: Duration) -> bool {
        let wait = async {
            while self.inner.state.borrow().registry.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(limit, wait).await.is_ok()
    }

    /// Capture-phase click handling for badge elements.
    pub async fn handle_click(&self, target: NodeId) -> ClickOutcome {
        let sign_in = {
            let st = self.inner.state.borrow();
            let Some(badge) = BadgeController::enclosing(&st.doc, target) else {
                return ClickOutcome::PassThrough;
            };
            st.doc
                .closest_tag(target, "button", badge)
                .and_then(|button| st.doc.attr(button, "data-rc-action"))
                == Some(SIGN_IN_ACTION)
        };
        if !sign_in {
            return ClickOutcome::Consumed;
        }

        if let Err(e) = self.inner.auth.login().await {
            warn!("sign-in failed: {e}");
            return ClickOutcome::Consumed;
        }
        if self.inner.listening.get() && self.inner.auth.announces_changes() {
            debug!("sign-in left to the preference listener");
        } else {
            self.apply_changes(super::listener::ChangeSet {
                auth: true,
                ..Default::default()
            })
            .await;
        }
        ClickOutcome::SignIn
    }
}
