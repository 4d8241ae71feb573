//! Search core for local coding agent session transcripts.
//!
//! - [`corpus`] turns a session into bounded, sanitized text for the full-text index.
//! - [`search`] runs cancelable, tiered searches over those sessions and the index,
//!   publishing incremental [`search::SearchState`] snapshots.

pub mod config;
pub mod corpus;
pub mod logging;
pub mod model;
pub mod search;

pub use config::{CancelFlushPolicy, CorpusLimits, SearchConfig};
pub use model::{EventKind, SearchFilters, Session, SessionEvent, SessionSource};
pub use search::{SearchOrchestrator, SearchRequest, SearchState};
