// src/domain/finance.rs
//
// Monthly cash-flow projection for one listing. Pure: same inputs, same
// output, no I/O.

use serde::{Deserialize, Serialize};

pub const MAX_BEDROOMS: u32 = 8;
/// Each bedroom beyond four adds 15% to the previous bedroom's rent.
pub const LARGE_UNIT_STEP: f64 = 1.15;

/// Reference rents by bedroom count, studio through four bedrooms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RentTable {
    pub studio: f64,
    pub one: f64,
    pub two: f64,
    pub three: f64,
    pub four: f64,
}

impl RentTable {
    /// Rent for `bedrooms`, clamped to 0..=8. Above four, the four-bedroom
    /// rent compounds by 15% per extra bedroom and is rounded to whole dollars.
    pub fn for_bedrooms(&self, bedrooms: u32) -> f64 {
        let n = bedrooms.min(MAX_BEDROOMS);
        match n {
            0 => self.studio,
            1 => self.one,
            2 => self.two,
            3 => self.three,
            4 => self.four,
            _ => (self.four * LARGE_UNIT_STEP.powi(n as i32 - 4)).round(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownPayment {
    Percent { pct: f64 },
    Amount { amount: f64 },
}

impl Default for DownPayment {
    fn default() -> Self {
        DownPayment::Percent { pct: 20.0 }
    }
}

impl DownPayment {
    pub fn amount_for(&self, price: f64) -> f64 {
        match *self {
            DownPayment::Percent { pct } => price * pct / 100.0,
            DownPayment::Amount { amount } => amount,
        }
    }
}

/// User-defined monthly expense: a share of rent or a flat amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineItem {
    Percent { label: String, pct: f64 },
    Fixed { label: String, amount: f64 },
}

impl LineItem {
    fn monthly(&self, rent: f64) -> f64 {
        match self {
            LineItem::Percent { pct, .. } => rent * pct / 100.0,
            LineItem::Fixed { amount, .. } => *amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinanceInputs {
    pub price: f64,
    pub monthly_rent: f64,
    pub bedrooms: u32,
    pub mortgage_rate_annual_pct: f64,
    pub tax_rate_annual_pct: f64,
    pub insurance_monthly: f64,
    pub association_fee_monthly: f64,
    pub management_monthly: f64,
    pub down_payment: DownPayment,
    pub loan_term_months: u32,
    pub custom_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub monthly_rent: f64,
    pub loan_amount: f64,
    pub monthly_payment: f64,
    pub monthly_tax: f64,
    pub total_expenses: f64,
    pub monthly_cash_flow: f64,
}

/// Fixed-rate annuity payment; zero interest is straight-line.
pub fn amortized_payment(principal: f64, annual_rate_pct: f64, months: u32) -> f64 {
    let n = months as f64;
    let r = annual_rate_pct / 100.0 / 12.0;
    if r == 0.0 {
        return principal / n;
    }
    let growth = (1.0 + r).powf(n);
    principal * r * growth / (growth - 1.0)
}

/// `None` when any input is non-finite or out of domain.
pub fn project(inputs: &FinanceInputs) -> Option<Projection> {
    let FinanceInputs {
        price,
        monthly_rent,
        mortgage_rate_annual_pct,
        tax_rate_annual_pct,
        insurance_monthly,
        association_fee_monthly,
        management_monthly,
        ..
    } = *inputs;

    let scalars = [
        price,
        monthly_rent,
        mortgage_rate_annual_pct,
        tax_rate_annual_pct,
        insurance_monthly,
        association_fee_monthly,
        management_monthly,
    ];
    if scalars.iter().any(|v| !v.is_finite()) {
        return None;
    }
    if price <= 0.0 || monthly_rent <= 0.0 || inputs.loan_term_months == 0 {
        return None;
    }
    if mortgage_rate_annual_pct < 0.0 || tax_rate_annual_pct < 0.0 {
        return None;
    }

    let down = inputs.down_payment.amount_for(price);
    if !down.is_finite() || down < 0.0 || down >= price {
        return None;
    }

    let loan_amount = price - down;
    let monthly_payment =
        amortized_payment(loan_amount, mortgage_rate_annual_pct, inputs.loan_term_months);
    let monthly_tax = price * tax_rate_annual_pct / 100.0 / 12.0;
    let custom: f64 = inputs
        .custom_items
        .iter()
        .map(|item| item.monthly(monthly_rent))
        .sum();

    let total_expenses = monthly_payment
        + monthly_tax
        + insurance_monthly
        + association_fee_monthly
        + management_monthly
        + custom;
    let monthly_cash_flow = monthly_rent - total_expenses;

    monthly_cash_flow.is_finite().then_some(Projection {
        monthly_rent,
        loan_amount,
        monthly_payment,
        monthly_tax,
        total_expenses,
        monthly_cash_flow,
    })
}
