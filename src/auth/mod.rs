mod session;
pub mod token;

pub use session::{AuthBoundary, SessionAuth};
