// src/overlay/process.rs
//
// Turning one card's extracted facts into a badge state: synchronously when
// the answer is already known, otherwise through an async job whose result
// is only applied if it is still the card's latest.

use super::reconciler::has_fee_less_twin;
use super::registry::RenderMode;
use super::runtime::{Overlay, OverlayState};
use crate::api::{ApiOutcome, DataApi, ReferenceData};
use crate::badge::{BadgeController, BadgeView, BadgeVisualState};
use crate::cache::{AreaParams, CashFlowCacheEntry, CashFlowValue, DataTier, ZipCacheEntry};
use crate::db::{DisplayMode, Preferences, RentSource};
use crate::domain::finance::{project, FinanceInputs};
use crate::domain::listing::ListingFingerprint;
use crate::dom::NodeId;
use crate::errors::ProcessError;
use crate::extractor::{PropertyData, View};
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use log::{debug, warn};
use std::rc::Rc;
use tokio::task::{spawn_local, AbortHandle};

const FEE_ADVISORY: &str = "HOA fee not listed; not included";

pub(crate) type ZipFetch =
    Shared<LocalBoxFuture<'static, Result<(ReferenceData, AreaParams), ProcessError>>>;

pub(crate) fn tier_for(source: RentSource) -> DataTier {
    match source {
        RentSource::Fmr => DataTier::FmrOnly,
        RentSource::Market => DataTier::Complete,
    }
}

/// Association fee to use: the user's override, else what the page shows.
fn known_fee(data: &PropertyData, prefs: &Preferences) -> Option<f64> {
    prefs.hoa_override.or(data.association_fee_monthly)
}

fn check_inputs(
    fp: &ListingFingerprint,
    data: &PropertyData,
    display: DisplayMode,
) -> Result<(), ProcessError> {
    if fp.zip().is_none() {
        return Err(ProcessError::MissingInput("zip"));
    }
    if data.bedrooms.is_none() {
        return Err(ProcessError::MissingInput("bedrooms"));
    }
    if display == DisplayMode::CashFlow && fp.price.is_none() {
        return Err(ProcessError::MissingInput("price"));
    }
    Ok(())
}

/// Runs the engine for one listing. Returns the value and whether it was
/// computed with a known association fee.
pub(crate) fn compute_value(
    entry: &ZipCacheEntry,
    data: &PropertyData,
    prefs: &Preferences,
    display: DisplayMode,
) -> (CashFlowValue, bool) {
    let Some(bedrooms) = data.bedrooms else {
        return (CashFlowValue::Unavailable, false);
    };
    let rent = entry.rents.for_bedrooms(bedrooms);

    match display {
        // Rent does not depend on fees, so it is always complete.
        DisplayMode::Rent => (CashFlowValue::RentOnly(rent), true),
        DisplayMode::CashFlow => {
            let fee = known_fee(data, prefs);
            let Some(price) = data.price else {
                return (CashFlowValue::Unavailable, fee.is_some());
            };
            let inputs = FinanceInputs {
                price,
                monthly_rent: rent,
                bedrooms,
                mortgage_rate_annual_pct: entry.area.mortgage_rate_annual_pct,
                tax_rate_annual_pct: entry.area.tax_rate_annual_pct,
                insurance_monthly: prefs.insurance_monthly,
                association_fee_monthly: fee.unwrap_or(0.0),
                management_monthly: prefs.management_monthly,
                down_payment: prefs.down_payment,
                loan_term_months: prefs.loan_term_months,
                custom_items: prefs.custom_items.clone(),
            };
            let value = match project(&inputs) {
                Some(p) => CashFlowValue::Computed(p),
                None => {
                    debug!("{}", ProcessError::ComputationInvalid);
                    CashFlowValue::Unavailable
                }
            };
            (value, fee.is_some())
        }
    }
}

pub(crate) fn value_state(entry: &CashFlowCacheEntry) -> BadgeVisualState {
    match &entry.value {
        CashFlowValue::Computed(p) => BadgeVisualState::Value {
            amount: p.monthly_cash_flow,
            fee_aware: entry.has_fee,
        },
        CashFlowValue::RentOnly(rent) => BadgeVisualState::Value {
            amount: *rent,
            fee_aware: true,
        },
        CashFlowValue::Unavailable => BadgeVisualState::InsufficientData,
        CashFlowValue::RateLimited => BadgeVisualState::RateLimited,
    }
}

/// Writes through the cache and reports what the cache now holds, which
/// can be an older fee-aware entry that the write was not allowed to replace.
fn store_and_read(
    st: &mut OverlayState,
    fp: &ListingFingerprint,
    value: CashFlowValue,
    has_fee: bool,
) -> BadgeVisualState {
    st.cash_flow.set_cash_flow(fp, value.clone(), has_fee);
    match st.cash_flow.get_cash_flow(fp, false) {
        Some(entry) => value_state(&entry),
        None => value_state(&CashFlowCacheEntry {
            value,
            has_fee,
            inserted_at: chrono::Utc::now(),
        }),
    }
}

/// The badge state if it can be known without waiting, else `None`.
pub(crate) fn resolve_now(
    st: &mut OverlayState,
    fp: &ListingFingerprint,
    data: &PropertyData,
) -> Option<BadgeVisualState> {
    if !st.logged_in {
        return Some(BadgeVisualState::SignInRequired);
    }
    let display = st.mode.display;
    if let Err(e) = check_inputs(fp, data, display) {
        debug!("{fp}: {e}");
        return Some(e.badge_state());
    }

    let require_fee = display == DisplayMode::CashFlow && known_fee(data, &st.prefs).is_some();
    if let Some(entry) = st.cash_flow.get_cash_flow(fp, require_fee) {
        return Some(value_state(&entry));
    }

    let zip = fp.zip()?;
    let entry = st.zip_cache.get_zip(zip, tier_for(st.mode.rent_source))?;
    let (value, has_fee) = compute_value(&entry, data, &st.prefs, display);
    Some(store_and_read(st, fp, value, has_fee))
}

pub(crate) fn badge_view(
    fp: &ListingFingerprint,
    mode: RenderMode,
    view: View,
    state: &BadgeVisualState,
) -> BadgeView {
    let advisory = (view == View::Detail
        && mode.display == DisplayMode::CashFlow
        && state.is_value_without_fee())
    .then_some(FEE_ADVISORY);
    BadgeView {
        key: fp.digest(),
        mode: mode.tag(),
        display: mode.display,
        state: state.clone(),
        advisory,
    }
}

fn into_result<T>(outcome: ApiOutcome<T>) -> Result<T, ProcessError> {
    match outcome {
        ApiOutcome::Data(v) => Ok(v),
        ApiOutcome::Error(e) => Err(ProcessError::NetworkFailure(e)),
        ApiOutcome::RateLimited => Err(ProcessError::RateLimited),
    }
}

fn new_zip_fetch(api: Rc<dyn DataApi>, zip: String) -> ZipFetch {
    async move {
        let (reference, area) = futures::join!(
            api.fetch_reference_data(&zip),
            api.fetch_area_params(&zip)
        );
        if matches!(reference, ApiOutcome::RateLimited) || matches!(area, ApiOutcome::RateLimited) {
            return Err(ProcessError::RateLimited);
        }
        Ok((into_result(reference)?, into_result(area)?))
    }
    .boxed_local()
    .shared()
}

/// A job that finished for one card.
pub(crate) struct JobResult<'a> {
    pub card: NodeId,
    pub seq: u64,
    pub fingerprint: &'a ListingFingerprint,
    pub mode: RenderMode,
    pub state: BadgeVisualState,
}

impl Overlay {
    pub(crate) fn spawn_job(
        &self,
        card: NodeId,
        seq: u64,
        fp: ListingFingerprint,
        data: PropertyData,
        mode: RenderMode,
    ) -> AbortHandle {
        let this = self.clone();
        spawn_local(async move { this.process_card(card, seq, fp, data, mode).await })
            .abort_handle()
    }

    async fn process_card(
        &self,
        card: NodeId,
        seq: u64,
        fp: ListingFingerprint,
        data: PropertyData,
        mode: RenderMode,
    ) {
        let Some(zip) = fp.zip().map(str::to_string) else {
            return;
        };
        let fetched = self.fetch_zip(&zip, tier_for(mode.rent_source)).await;

        let (state, refresh_twins) = {
            let st = &mut *self.inner.state.borrow_mut();
            if st.mode != mode {
                debug!("{fp}: mode changed while fetching, result dropped");
                return;
            }
            let state = match fetched {
                Ok(entry) => {
                    let (value, has_fee) = compute_value(&entry, &data, &st.prefs, mode.display);
                    store_and_read(st, &fp, value, has_fee)
                }
                Err(e) => {
                    warn!("{fp}: {e}");
                    let value = match e {
                        ProcessError::RateLimited => CashFlowValue::RateLimited,
                        _ => CashFlowValue::Unavailable,
                    };
                    st.cash_flow.set_cash_flow(&fp, value, false);
                    e.badge_state()
                }
            };
            let refresh_twins = matches!(state, BadgeVisualState::Value { fee_aware: true, .. })
                && has_fee_less_twin(st, &fp);
            (state, refresh_twins)
        };

        self.apply_outcome(JobResult {
            card,
            seq,
            fingerprint: &fp,
            mode,
            state,
        });
        if refresh_twins {
            self.inner.wake.notify_one();
        }
    }

    /// Area data for `zip`, from cache or one shared request per ZIP.
    async fn fetch_zip(&self, zip: &str, tier: DataTier) -> Result<ZipCacheEntry, ProcessError> {
        let fetch = {
            let mut st = self.inner.state.borrow_mut();
            if let Some(entry) = st.zip_cache.get_zip(zip, tier) {
                return Ok(entry);
            }
            let api = self.inner.api.clone();
            st.zip_fetches
                .entry(zip.to_string())
                .or_insert_with(|| new_zip_fetch(api, zip.to_string()))
                .clone()
        };

        let result = fetch.await;

        let mut st = self.inner.state.borrow_mut();
        let finished = st
            .zip_fetches
            .get(zip)
            .map(|f| f.peek().is_some())
            .unwrap_or(false);
        if finished {
            st.zip_fetches.remove(zip);
        }

        let (reference, area) = result?;
        st.zip_cache
            .set_zip(zip, DataTier::FmrOnly, ZipCacheEntry::new(area, reference.fmr));
        if let Some(market) = reference.market {
            st.zip_cache
                .set_zip(zip, DataTier::Complete, ZipCacheEntry::new(area, market));
        }
        st.zip_cache
            .get_zip(zip, tier)
            .ok_or(ProcessError::MissingInput("market rents"))
    }

    /// Applies a job's result if it is still the card's latest job for the
    /// same listing and mode. Returns whether it was applied.
    pub(crate) fn apply_outcome(&self, result: JobResult<'_>) -> bool {
        let st = &mut *self.inner.state.borrow_mut();
        let Some(binding) = st.registry.get_mut(result.card) else {
            debug!("{}: card released before its result arrived", result.fingerprint);
            return false;
        };
        if binding.seq != result.seq
            || binding.fingerprint != *result.fingerprint
            || binding.mode != result.mode
        {
            debug!(
                "{}: stale result (job {} vs current {})",
                result.fingerprint, result.seq, binding.seq
            );
            return false;
        }

        binding.task = None;
        binding.state = result.state.clone();
        let view = badge_view(result.fingerprint, result.mode, binding.view, &result.state);
        let badge = binding.badge;
        match BadgeController::render(&mut st.doc, badge, &view) {
            Ok(_) => true,
            Err(e) => {
                warn!("{}: badge render failed: {e}", result.fingerprint);
                false
            }
        }
    }
}
