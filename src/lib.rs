//! Rental cash-flow badges for real-estate listing pages.
//!
//! A host page is loaded into a [`dom::Document`]; an [`overlay::Overlay`]
//! finds the listing cards on it, keeps one badge per card in sync with the
//! listing the card currently shows, and fills the badges from area
//! reference data through a [`api::DataApi`].

pub mod api;
pub mod auth;
pub mod badge;
pub mod cache;
pub mod config;
pub mod db;
pub mod dom;
pub mod domain;
pub mod errors;
pub mod extractor;
pub mod overlay;

#[cfg(test)]
mod tests;
