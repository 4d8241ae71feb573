//! Search layer facade.
//!
//! - **[`orchestrator`]**: [`SearchOrchestrator`], the multi-phase search run driver.
//! - **[`collaborators`]**: traits for the record store, full-text index, matcher and transcript cache.
//! - **[`query`]**: prefix rewriting of free text for the full-text index.
//! - **[`cancel`]**: generation tokens and cancellation checkpoints.
//! - **[`promotion`]**: single-slot promotion cell for large-tier reordering.
//! - **[`tiers`]**: size partitioning of scan candidates.
//! - **[`staging`]**: dedup and throttled result staging.
//! - **[`state`]**: published snapshots and the publication point.

pub mod cancel;
pub mod collaborators;
pub mod orchestrator;
pub mod promotion;
pub mod query;
pub mod staging;
pub mod state;
pub mod tiers;

pub use collaborators::{
    Collaborators, IndexError, IndexQuery, ParsedOperators, SearchIndex, SessionMatcher,
    SessionStore, StoreError, TextScope, TextSource, TranscriptCache,
};
pub use orchestrator::{SearchOrchestrator, SearchRequest};
pub use state::{SearchPhase, SearchProgress, SearchState};
