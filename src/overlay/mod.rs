//! The overlay runtime: card registry, reconciliation, observation and
//! the preference listener for one host page.

mod listener;
mod observer;
mod process;
mod reconciler;
mod registry;
mod runtime;

pub use listener::ChangeSet;
pub(crate) use process::JobResult;
pub use reconciler::{decide, Decision, Observation, PassStats, ReprocessReason};
pub use registry::{CardBinding, CardRegistry, RenderMode};
pub use runtime::{ClickOutcome, Overlay, OverlayDeps, OverlayHandle, OverlayState};
