//! Interfaces to the collaborators the orchestrator drives.
//!
//! Record parsing, the full-text engine and the metadata matcher live outside
//! this crate. Implementations must be `Send + Sync`; calls may block and are
//! only ever made from a run's background thread.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::model::{SearchFilters, Session, SessionSource};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("full-text index unavailable: {0}")]
    Unavailable(String),

    #[error("index query failed: {0}")]
    Query(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session file missing: {0}")]
    Missing(String),

    #[error("failed to parse session {id}: {reason}")]
    Parse { id: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parsing and persistence of session files.
pub trait SessionStore: Send + Sync {
    /// Fully parse a session, returning a copy with `events` populated. Idempotent.
    fn parse_full(&self, session: &Session) -> Result<Session, StoreError>;

    /// Persist a hydrated session. Best effort; failures are the store's concern.
    fn update_session(&self, session: &Session);
}

/// One query against the full-text index.
#[derive(Debug, Clone)]
pub struct IndexQuery<'a> {
    pub sources: &'a [SessionSource],
    pub filters: &'a SearchFilters,
    /// Free text already rewritten for the engine.
    pub query: &'a str,
    pub include_system: bool,
    pub limit: usize,
}

/// The pre-built full-text index.
pub trait SearchIndex: Send + Sync {
    /// Whether any session of the given sources has been indexed.
    fn has_data(&self, sources: &[SessionSource]) -> bool;

    fn indexed_ids(&self, sources: &[SessionSource]) -> Result<FxHashSet<String>, IndexError>;

    /// Ids whose general corpus matches, best first.
    fn search_ids(&self, query: &IndexQuery<'_>) -> Result<Vec<String>, IndexError>;

    /// Ids whose tool-I/O corpus matches, best first.
    fn search_tool_io_ids(&self, query: &IndexQuery<'_>) -> Result<Vec<String>, IndexError>;

    /// Metadata-only lookup, no free text.
    fn prefilter_ids(
        &self,
        sources: &[SessionSource],
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<String>, IndexError>;
}

/// Query text split into free text and structured operators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOperators {
    pub free_text: String,
    pub repo: Option<String>,
    pub path: Option<String>,
}

impl ParsedOperators {
    pub fn has_operators(&self) -> bool {
        self.repo.is_some() || self.path.is_some()
    }
}

/// Where the matcher takes transcript text from.
#[derive(Clone)]
pub enum TextSource {
    /// Derive text from the session's events.
    Events,
    /// Previously generated transcript text.
    Cached(Arc<str>),
}

impl std::fmt::Debug for TextSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextSource::Events => f.write_str("Events"),
            TextSource::Cached(text) => write!(f, "Cached({} chars)", text.len()),
        }
    }
}

/// Which fields a text match may consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextScope {
    All,
    ToolIoOnly,
}

/// In-memory metadata/text matcher.
pub trait SessionMatcher: Send + Sync {
    fn parse_operators(&self, query: &str) -> ParsedOperators;

    fn matches(
        &self,
        session: &Session,
        filters: &SearchFilters,
        text: &TextSource,
        allow_on_demand: bool,
        scope: TextScope,
    ) -> bool;

    /// Metadata-only filtering, used when there is no free text.
    fn filter_metadata(&self, sessions: &[Session], filters: &SearchFilters) -> Vec<Session>;
}

/// Source-keyed cache of generated transcript text.
pub trait TranscriptCache: Send + Sync {
    fn transcript(&self, source: SessionSource, session_id: &str) -> Option<Arc<str>>;
}

/// Everything a [`SearchOrchestrator`](super::SearchOrchestrator) needs from the outside.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn SessionStore>,
    pub index: Option<Arc<dyn SearchIndex>>,
    pub matcher: Arc<dyn SessionMatcher>,
    pub transcripts: Option<Arc<dyn TranscriptCache>>,
}
