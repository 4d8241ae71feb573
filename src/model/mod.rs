//! Data model shared across the crate.

pub mod types;

pub use types::{EventKind, SearchFilters, Session, SessionEvent, SessionSource};
