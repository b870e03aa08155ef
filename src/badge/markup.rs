// src/badge/markup.rs
use super::state::BadgeVisualState;
use crate::db::DisplayMode;
use crate::dom::BADGE_CLASS;
use maud::{html, Markup};

pub const SIGN_IN_ACTION: &str = "sign-in";

/// Everything needed to draw one badge.
#[derive(Debug, Clone, PartialEq)]
pub struct BadgeView {
    /// Fingerprint digest of the listing the badge speaks for.
    pub key: String,
    /// Render-mode tag the badge was drawn in.
    pub mode: String,
    pub display: DisplayMode,
    pub state: BadgeVisualState,
    /// Shown under the value, e.g. when the panel lacks fee data.
    pub advisory: Option<&'static str>,
}

/// `$1,234`, `-$317`. Whole dollars.
pub fn format_currency(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{}", rounded.abs() as u64);
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

fn sign_in_button(label: &str) -> Markup {
    html! {
        button type="button" class="rc-badge__action" data-rc-action=(SIGN_IN_ACTION) {
            (label)
        }
    }
}

pub fn badge(view: &BadgeView) -> Markup {
    let tone = match (&view.state, view.display) {
        (BadgeVisualState::Value { amount, .. }, DisplayMode::CashFlow) if *amount < 0.0 => {
            " rc-badge--negative"
        }
        (BadgeVisualState::Value { .. }, DisplayMode::CashFlow) => " rc-badge--positive",
        _ => "",
    };
    let class = format!("{BADGE_CLASS}{tone}");

    html! {
        span class=(class)
            data-rc-key=(view.key)
            data-rc-mode=(view.mode)
            data-rc-state=(view.state.as_str())
            role="status"
        {
            @match &view.state {
                BadgeVisualState::Loading => {
                    span class="rc-badge__spinner" aria-hidden="true" {}
                    span class="rc-badge__label" { "Calculating…" }
                }
                BadgeVisualState::InsufficientData => {
                    span class="rc-badge__label" { "Not enough data" }
                }
                BadgeVisualState::RateLimited => {
                    span class="rc-badge__label" { "Lookup limit reached" }
                    (sign_in_button("Sign in for more"))
                }
                BadgeVisualState::SignInRequired => {
                    (sign_in_button("Sign in to see cash flow"))
                }
                BadgeVisualState::Value { amount, .. } => {
                    @match view.display {
                        DisplayMode::CashFlow => {
                            span class="rc-badge__value" { (format_currency(*amount)) "/mo" }
                            span class="rc-badge__label" { " cash flow" }
                        }
                        DisplayMode::Rent => {
                            span class="rc-badge__value" { (format_currency(*amount)) "/mo" }
                            span class="rc-badge__label" { " est. rent" }
                        }
                    }
                }
            }
            @if let Some(note) = view.advisory {
                small class="rc-badge__advisory" { (note) }
            }
        }
    }
}
