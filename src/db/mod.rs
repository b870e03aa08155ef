pub mod connection;
pub mod prefs;

pub use prefs::{keys, DisplayMode, PrefChange, Preferences, PrefsStore, RentSource};
