mod extractor;
mod models;
mod parse;
mod sites;

pub use extractor::Extractor;
pub use models::{PropertyData, Site, View};
pub use parse::extract_zip;
