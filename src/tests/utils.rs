use crate::api::{ApiOutcome, DataApi, ReferenceData};
use crate::auth::AuthBoundary;
use crate::cache::AreaParams;
use crate::config::OverlayConfig;
use crate::db::PrefsStore;
use crate::dom::{Document, NodeId};
use crate::domain::finance::RentTable;
use crate::errors::OverlayError;
use crate::extractor::Site;
use crate::overlay::{CardBinding, Overlay, OverlayDeps};
use async_trait::async_trait;
use scraper::Selector;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

/// Deletes the test database when dropped.
pub struct TempDb {
    path: PathBuf,
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A preferences store on a fresh file of its own.
pub fn temp_prefs() -> (PrefsStore, TempDb) {
    let n = NEXT_DB.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!(
        "cashflow_prefs_test_{}_{n}.sqlite3",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    let store = PrefsStore::open(path.to_string_lossy().to_string())
        .unwrap_or_else(|e| panic!("Preferences store initialization failed: {e}"));
    (store, TempDb { path })
}

pub fn table(studio: f64, one: f64, two: f64, three: f64, four: f64) -> RentTable {
    RentTable {
        studio,
        one,
        two,
        three,
        four,
    }
}

/// Reference data for ZIP 12345: 3BR rent $1,500.
pub fn springfield_rents() -> RentTable {
    table(900.0, 1_100.0, 1_300.0, 1_500.0, 1_999.0)
}

pub fn springfield_area() -> AreaParams {
    AreaParams {
        tax_rate_annual_pct: 1.2,
        mortgage_rate_annual_pct: 6.5,
    }
}

/// Scripted data API with call counters and per-ZIP latency.
pub struct FakeApi {
    rents: HashMap<String, ReferenceData>,
    area: AreaParams,
    delays: HashMap<String, Duration>,
    pub rate_limited: Cell<bool>,
    pub reference_calls: Cell<usize>,
    pub area_calls: Cell<usize>,
    /// ZIPs requested, in call order.
    pub requested: RefCell<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            rents: HashMap::new(),
            area: springfield_area(),
            delays: HashMap::new(),
            rate_limited: Cell::new(false),
            reference_calls: Cell::new(0),
            area_calls: Cell::new(0),
            requested: RefCell::new(Vec::new()),
        }
    }

    /// The default fixture: ZIP 12345 with FMR rents only.
    pub fn springfield() -> Self {
        Self::new().with_zip("12345", springfield_rents())
    }

    pub fn with_zip(mut self, zip: &str, fmr: RentTable) -> Self {
        self.rents
            .insert(zip.to_string(), ReferenceData { fmr, market: None });
        self
    }

    pub fn with_market(mut self, zip: &str, fmr: RentTable, market: RentTable) -> Self {
        self.rents.insert(
            zip.to_string(),
            ReferenceData {
                fmr,
                market: Some(market),
            },
        );
        self
    }

    pub fn with_delay(mut self, zip: &str, delay: Duration) -> Self {
        self.delays.insert(zip.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.reference_calls.get()
    }

    async fn latency(&self, zip: &str) {
        if let Some(delay) = self.delays.get(zip) {
            tokio::time::sleep(*delay).await;
        }
    }
}

#[async_trait(?Send)]
impl DataApi for FakeApi {
    async fn fetch_reference_data(&self, zip: &str) -> ApiOutcome<ReferenceData> {
        self.reference_calls.set(self.reference_calls.get() + 1);
        self.requested.borrow_mut().push(zip.to_string());
        // The limit applies to the request as it arrives, not as it answers.
        let limited = self.rate_limited.get();
        self.latency(zip).await;
        if limited {
            return ApiOutcome::RateLimited;
        }
        match self.rents.get(zip) {
            Some(data) => ApiOutcome::Data(data.clone()),
            None => ApiOutcome::Error(format!("no reference data for {zip}")),
        }
    }

    async fn fetch_area_params(&self, zip: &str) -> ApiOutcome<AreaParams> {
        self.area_calls.set(self.area_calls.get() + 1);
        let limited = self.rate_limited.get();
        self.latency(zip).await;
        if limited {
            return ApiOutcome::RateLimited;
        }
        ApiOutcome::Data(self.area)
    }
}

/// Auth stub whose `login` always succeeds.
pub struct StaticAuth {
    pub logged_in: Cell<bool>,
    pub logins: Cell<usize>,
}

impl StaticAuth {
    pub fn signed_in() -> Self {
        Self {
            logged_in: Cell::new(true),
            logins: Cell::new(0),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            logged_in: Cell::new(false),
            logins: Cell::new(0),
        }
    }
}

#[async_trait(?Send)]
impl AuthBoundary for StaticAuth {
    async fn is_logged_in(&self) -> bool {
        self.logged_in.get()
    }

    async fn login(&self) -> Result<(), OverlayError> {
        self.logins.set(self.logins.get() + 1);
        self.logged_in.set(true);
        Ok(())
    }

    async fn bearer_token(&self) -> Option<String> {
        self.logged_in.get().then(|| "test-token".to_string())
    }
}

/// One Zillow search-result card.
pub fn zillow_card(id: &str, address: &str, price: &str, beds: &str) -> String {
    format!(
        r#"<li><article data-test="property-card" id="{id}">
          <a class="property-card-link" href="/homedetails/{id}">
            <address data-test="property-card-addr">{address}</address>
          </a>
          <span data-test="property-card-price">{price}</span>
          <ul class="property-card-details"><li>{beds}</li><li>2 ba</li></ul>
        </article></li>"#
    )
}

/// A Zillow search page holding `cards` in its results grid.
pub fn zillow_page(cards: &[String]) -> String {
    format!(
        r#"<html><body>
        <header><a href="/">Zillow</a></header>
        <div id="grid-search-results"><ul id="results">{}</ul></div>
        </body></html>"#,
        cards.concat()
    )
}

/// Expanded listing panel with an HOA fee.
pub fn zillow_detail(address: &str, price: &str, beds: &str, hoa: &str) -> String {
    format!(
        r#"<div data-testid="home-details-summary" id="detail">
          <h1 data-testid="home-details-address">{address}</h1>
          <span data-testid="price">{price}</span>
          <span data-testid="bed-bath-item">{beds}</span>
          <span data-testid="hoa-fee">{hoa}</span>
        </div>"#
    )
}

/// The reference scenario: one card, 100 Main St, $300,000, 3 beds.
pub fn main_street_page() -> String {
    zillow_page(&[zillow_card(
        "main",
        "100 Main St, 12345",
        "$300,000",
        "3 bds",
    )])
}

pub async fn overlay_for(
    page: &str,
    api: Rc<dyn DataApi>,
    auth: Rc<dyn AuthBoundary>,
    prefs: Option<Rc<PrefsStore>>,
) -> Overlay {
    Overlay::new(
        Document::parse(page),
        Site::Zillow,
        OverlayConfig::default(),
        OverlayDeps { api, auth, prefs },
    )
    .await
    .unwrap_or_else(|e| panic!("Overlay setup failed: {e}"))
}

/// Node ids matching `css`, in document order.
pub fn find(overlay: &Overlay, css: &str) -> Vec<NodeId> {
    let sel = Selector::parse(css).unwrap_or_else(|e| panic!("bad selector {css}: {e:?}"));
    overlay.state().doc.select(&sel)
}

pub fn one(overlay: &Overlay, css: &str) -> NodeId {
    let ids = find(overlay, css);
    assert_eq!(ids.len(), 1, "expected exactly one {css}");
    ids[0]
}

/// Runs `f` against the binding of the card matching `css`.
pub fn with_binding<R>(overlay: &Overlay, css: &str, f: impl FnOnce(&CardBinding) -> R) -> R {
    let card = one(overlay, css);
    let st = overlay.state();
    let binding = st
        .registry
        .get(card)
        .unwrap_or_else(|| panic!("no binding for {css}"));
    f(binding)
}

pub fn badge_count(overlay: &Overlay) -> usize {
    find(overlay, ".rc-badge").len()
}

pub fn settle_limit() -> Duration {
    Duration::from_secs(5)
}
