// src/errors.rs
use crate::badge::BadgeVisualState;

/// Errors from the fallible edges of the overlay: setup, storage,
/// network plumbing and host-page access.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Db(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid selector `{0}`")]
    Selector(String),

    #[error("Host page error: {0}")]
    Dom(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why one card could not show a value. Local to that card: a pass
/// logs these and moves on to the next sibling.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessError {
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("rate limited")]
    RateLimited,

    #[error("financial inputs out of domain")]
    ComputationInvalid,
}

impl ProcessError {
    /// The terminal badge state this failure settles into.
    pub fn badge_state(&self) -> BadgeVisualState {
        match self {
            ProcessError::RateLimited => BadgeVisualState::RateLimited,
            ProcessError::MissingInput(_)
            | ProcessError::NetworkFailure(_)
            | ProcessError::ComputationInvalid => BadgeVisualState::InsufficientData,
        }
    }
}
