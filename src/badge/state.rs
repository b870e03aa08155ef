// src/badge/state.rs

/// What a badge currently shows. Carried as structured state on the card
/// binding; never recovered by reading the rendered markup back.
#[derive(Debug, Clone, PartialEq)]
pub enum BadgeVisualState {
    Loading,
    InsufficientData,
    /// The API refused more lookups. Offers sign-in.
    RateLimited,
    SignInRequired,
    /// Cash flow or rent, depending on the display mode it was rendered in.
    Value { amount: f64, fee_aware: bool },
}

impl BadgeVisualState {
    /// Everything except `Loading` is settled for its fingerprint and mode.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BadgeVisualState::Loading)
    }

    /// Value of the `data-rc-state` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeVisualState::Loading => "loading",
            BadgeVisualState::InsufficientData => "insufficient",
            BadgeVisualState::RateLimited => "rate-limited",
            BadgeVisualState::SignInRequired => "sign-in",
            BadgeVisualState::Value { .. } => "value",
        }
    }

    pub fn is_value_without_fee(&self) -> bool {
        matches!(
            self,
            BadgeVisualState::Value {
                fee_aware: false,
                ..
            }
        )
    }
}
