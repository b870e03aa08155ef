pub mod finance;
pub mod listing;
