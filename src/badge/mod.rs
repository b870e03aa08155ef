mod controller;
mod markup;
mod state;

pub use controller::BadgeController;
pub use markup::{badge, format_currency, BadgeView, SIGN_IN_ACTION};
pub use state::BadgeVisualState;
