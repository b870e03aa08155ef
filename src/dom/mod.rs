mod document;

pub use document::{Document, MutationKind, MutationRecord, BADGE_CLASS};
pub use ego_tree::NodeId;
