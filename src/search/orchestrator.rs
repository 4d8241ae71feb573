//! Query orchestration: one cancelable, tiered search run at a time.
//!
//! # Strategy
//!
//! ```text
//! start(request)
//!     │
//!     ├── index has data? ──no──────────────────────────────┐
//!     │        │ yes                                         │
//!     │        ▼                                             ▼
//!     │   [Indexed] free text? ──no──→ metadata filter   legacy scan of
//!     │        │ yes                                     all candidates
//!     │        ▼                                         (LegacySmall → LegacyLarge)
//!     │   index ids + tool-I/O ids → initial snapshot
//!     │        │
//!     │        ├── unindexed sessions → UnindexedSmall → UnindexedLarge
//!     │        └── deep mode → ToolOutputsSmall → ToolOutputsLarge
//!     ▼
//!   Idle (done) / canceled
//! ```
//!
//! A legacy scan splits sessions into a small and a large tier by file size.
//! Small sessions are matched in batches; large sessions are hydrated and
//! matched strictly one at a time, honoring at most one promoted id before
//! each item. Hits are staged and published at a bounded rate.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error, info, warn};

use super::cancel::{Generation, Interrupted, RunControl, RunToken};
use super::collaborators::{
    Collaborators, IndexQuery, ParsedOperators, SearchIndex, TextScope, TextSource,
};
use super::promotion::{PromotionCell, apply_promotion};
use super::query::rewrite_for_prefix;
use super::staging::ResultStager;
use super::state::{SearchPhase, SearchProgress, SearchState, StatePublisher};
use super::tiers::partition;
use crate::config::{CancelFlushPolicy, SearchConfig};
use crate::model::{SearchFilters, Session, SessionSource};

/// Input for one search run.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub filters: SearchFilters,
    /// Allowed sources. Empty allows every source.
    pub sources: Vec<SessionSource>,
    pub candidates: Vec<Session>,
    /// Also scan tool output of already indexed sessions.
    pub deep: bool,
}

impl SearchRequest {
    pub fn new(filters: SearchFilters, candidates: Vec<Session>) -> Self {
        Self {
            filters,
            candidates,
            ..Default::default()
        }
    }

    pub fn with_sources(mut self, sources: Vec<SessionSource>) -> Self {
        self.sources = sources;
        self
    }

    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }
}

/// The pair of phases a legacy scan reports through.
#[derive(Debug, Clone, Copy)]
enum ScanKind {
    Legacy,
    Unindexed,
    ToolOutputs,
}

impl ScanKind {
    fn phases(self) -> (SearchPhase, SearchPhase) {
        match self {
            ScanKind::Legacy => (SearchPhase::LegacySmall, SearchPhase::LegacyLarge),
            ScanKind::Unindexed => (SearchPhase::UnindexedSmall, SearchPhase::UnindexedLarge),
            ScanKind::ToolOutputs => (SearchPhase::ToolOutputsSmall, SearchPhase::ToolOutputsLarge),
        }
    }

    fn scope(self) -> TextScope {
        match self {
            ScanKind::ToolOutputs => TextScope::ToolIoOnly,
            _ => TextScope::All,
        }
    }
}

struct Shared {
    generation: Arc<Generation>,
    publisher: StatePublisher,
    promotion: PromotionCell,
}

/// Drives search runs in the background and publishes [`SearchState`] snapshots.
pub struct SearchOrchestrator {
    shared: Arc<Shared>,
    collaborators: Collaborators,
    config: Arc<SearchConfig>,
    active: Mutex<Option<Arc<RunControl>>>,
}

impl SearchOrchestrator {
    /// Out-of-range knobs in `config` are clamped rather than rejected.
    pub fn new(collaborators: Collaborators, config: SearchConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                generation: Arc::new(Generation::default()),
                publisher: StatePublisher::default(),
                promotion: PromotionCell::default(),
            }),
            collaborators,
            config: Arc::new(config.sanitized()),
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Begin a new run, superseding any run in flight. Never blocks on scan work.
    pub fn start(&self, request: SearchRequest) {
        let control = Arc::new(RunControl::default());
        let mut active = self.active.lock();
        let generation = self.shared.publisher.reset_with(|_| {
            let generation = self.shared.generation.advance();
            (SearchState::running(generation), generation)
        });
        *active = Some(control.clone());
        drop(active);

        info!(
            generation,
            candidates = request.candidates.len(),
            sources = request.sources.len(),
            deep = request.deep,
            "starting search run"
        );

        let token = RunToken::new(generation, self.shared.generation.clone(), control);
        let run = Run {
            stager: ResultStager::new(self.config.flush_interval()),
            token,
            shared: self.shared.clone(),
            collaborators: self.collaborators.clone(),
            config: self.config.clone(),
            request,
            progress: SearchProgress::idle(),
        };

        let spawned = std::thread::Builder::new()
            .name(format!("search-run-{generation}"))
            .spawn(move || run.execute());
        if let Err(e) = spawned {
            error!(generation, error = %e, "failed to spawn search worker");
            self.shared.publisher.update_at(
                &self.shared.generation,
                generation,
                |state| state.is_running = false,
            );
        }
    }

    /// Cancel the current run. The canceled snapshot is published before this returns.
    pub fn cancel(&self) {
        let mut active = self.active.lock();
        let control = active.take();
        let keep_results = self.config.cancel_flush == CancelFlushPolicy::Flush;
        let generation = self.shared.publisher.reset_with(|prev| {
            let generation = self.shared.generation.advance();
            if let Some(control) = &control {
                control.cancel(generation);
            }
            let results = if keep_results {
                prev.results.clone()
            } else {
                Vec::new()
            };
            (SearchState::canceled(generation, results), generation)
        });
        drop(active);
        info!(generation, "search canceled");
    }

    /// Ask the current run to scan `id` next among its remaining large-tier work.
    pub fn promote(&self, id: impl Into<String>) {
        let id = id.into();
        let generation = self.shared.generation.current();
        debug!(generation, session_id = %id, "promotion requested");
        self.shared.promotion.promote(generation, id);
    }

    pub fn snapshot(&self) -> SearchState {
        self.shared.publisher.snapshot()
    }

    /// Channel of snapshots, starting with the current one.
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<SearchState> {
        self.shared.publisher.subscribe()
    }

    pub fn current_generation(&self) -> u64 {
        self.shared.generation.current()
    }
}

impl Drop for SearchOrchestrator {
    fn drop(&mut self) {
        // Orphaned workers stop at their next checkpoint.
        self.shared.generation.advance();
    }
}

/// State owned by one run's background thread.
struct Run {
    token: RunToken,
    shared: Arc<Shared>,
    collaborators: Collaborators,
    config: Arc<SearchConfig>,
    request: SearchRequest,
    stager: ResultStager,
    progress: SearchProgress,
}

impl Run {
    fn execute(mut self) {
        let started = Instant::now();
        let generation = self.token.generation();
        match self.drive() {
            Ok(()) => match self.finish() {
                Ok(()) => info!(
                    generation,
                    results = self.stager.seen_len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "search run finished"
                ),
                Err(interrupted) => self.interrupted(interrupted),
            },
            Err(interrupted) => self.interrupted(interrupted),
        }
    }

    fn interrupted(&mut self, reason: Interrupted) {
        let generation = self.token.generation();
        match reason {
            Interrupted::Superseded => {
                let dropped = self.stager.discard();
                debug!(generation, dropped, "search run superseded");
            }
            Interrupted::Canceled => {
                if self.config.cancel_flush == CancelFlushPolicy::Flush
                    && let Some(at) = self.token.control().canceled_at()
                {
                    let (hits, _) = self.stager.take(Instant::now());
                    let flushed = hits.len();
                    // Only lands while no newer run has started since the cancel.
                    let applied =
                        self.shared
                            .publisher
                            .update_at(&self.shared.generation, at, |state| {
                                state.results.extend(hits);
                            });
                    debug!(generation, flushed, applied, "canceled run flushed staged hits");
                } else {
                    let dropped = self.stager.discard();
                    debug!(generation, dropped, "canceled run discarded staged hits");
                }
            }
        }
    }

    fn drive(&mut self) -> Result<(), Interrupted> {
        self.token.checkpoint()?;

        let parsed = self
            .collaborators
            .matcher
            .parse_operators(&self.request.filters.query);
        let filters = effective_filters(&self.request.filters, &parsed);
        let candidates = self.allowed_candidates();
        debug!(
            generation = self.token.generation(),
            operators = parsed.has_operators(),
            structured = filters.has_structured(),
            free_text = !filters.query.is_empty(),
            candidates = candidates.len(),
            "resolved query"
        );

        if let Some(index) = self.collaborators.index.clone() {
            if index.has_data(&self.request.sources) {
                if self.run_indexed(index.as_ref(), &filters, &candidates)? {
                    return Ok(());
                }
                info!(
                    generation = self.token.generation(),
                    "index yielded nothing usable, falling back to legacy scan"
                );
            } else {
                debug!(
                    generation = self.token.generation(),
                    "index has no data for requested sources"
                );
            }
        }

        self.scan(candidates, &filters, ScanKind::Legacy)
    }

    fn allowed_candidates(&mut self) -> Vec<Session> {
        let sources = &self.request.sources;
        let include_system = self.config.include_system_sessions;
        std::mem::take(&mut self.request.candidates)
            .into_iter()
            .filter(|s| sources.is_empty() || sources.contains(&s.source))
            .filter(|s| include_system || !s.is_system)
            .collect()
    }

    /// Fast path. Returns Ok(false) when the caller should fall back to a full legacy scan.
    fn run_indexed(
        &mut self,
        index: &dyn SearchIndex,
        filters: &SearchFilters,
        candidates: &[Session],
    ) -> Result<bool, Interrupted> {
        self.set_phase(SearchPhase::Indexed, 0, 0)?;

        let sources = self.request.sources.clone();
        let indexed = match index.indexed_ids(&sources) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(generation = self.token.generation(), error = %e, "indexed id lookup failed");
                return Ok(false);
            }
        };
        self.token.checkpoint()?;

        let by_id: FxHashMap<&str, &Session> =
            candidates.iter().map(|s| (s.id.as_str(), s)).collect();
        let free_text = filters.query.trim();

        if free_text.is_empty() {
            let hits = self.metadata_hits(index, filters, candidates, &indexed, &by_id)?;
            for session in hits {
                self.stager.stage(Arc::new(session));
            }
            self.flush()?;
            return Ok(true);
        }

        let rewritten = rewrite_for_prefix(free_text);
        let query = IndexQuery {
            sources: &sources,
            filters,
            query: &rewritten,
            include_system: self.config.include_system_sessions,
            limit: self.config.result_limit,
        };
        let content_ids = match index.search_ids(&query) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(generation = self.token.generation(), error = %e, "index query failed");
                return Ok(false);
            }
        };
        self.token.checkpoint()?;
        let tool_ids = index.search_tool_io_ids(&query).unwrap_or_else(|e| {
            warn!(generation = self.token.generation(), error = %e, "tool-io index query failed");
            Vec::new()
        });
        self.token.checkpoint()?;

        if indexed.is_empty() {
            return Ok(false);
        }

        let merged = merge_ids(content_ids, tool_ids, self.config.result_limit);
        debug!(
            generation = self.token.generation(),
            hits = merged.len(),
            query = %rewritten,
            "initial index results"
        );
        for id in &merged {
            if let Some(session) = by_id.get(id.as_str()) {
                self.stager.stage(Arc::new((*session).clone()));
            }
        }
        self.flush()?;

        let unindexed: Vec<Session> = candidates
            .iter()
            .filter(|s| !indexed.contains(&s.id))
            .cloned()
            .collect();
        if !unindexed.is_empty() {
            debug!(
                generation = self.token.generation(),
                unindexed = unindexed.len(),
                "scanning sessions missing from the index"
            );
            self.scan(unindexed, filters, ScanKind::Unindexed)?;
        }

        // Deep scan runs after the unindexed scan; ordering is policy only.
        if self.request.deep {
            let eligible: Vec<Session> = candidates
                .iter()
                .filter(|s| indexed.contains(&s.id) && s.estimated_tool_calls > 0)
                .filter(|s| !self.stager.has_seen(&s.id))
                .cloned()
                .collect();
            if !eligible.is_empty() {
                debug!(
                    generation = self.token.generation(),
                    eligible = eligible.len(),
                    "deep scanning tool output"
                );
                self.scan(eligible, filters, ScanKind::ToolOutputs)?;
            }
        }
        Ok(true)
    }

    /// No free text: use the index's metadata prefilter when it covers every
    /// candidate, otherwise filter the candidates directly.
    fn metadata_hits(
        &self,
        index: &dyn SearchIndex,
        filters: &SearchFilters,
        candidates: &[Session],
        indexed: &FxHashSet<String>,
        by_id: &FxHashMap<&str, &Session>,
    ) -> Result<Vec<Session>, Interrupted> {
        let fully_indexed = candidates.iter().all(|s| indexed.contains(&s.id));
        if fully_indexed {
            match index.prefilter_ids(&self.request.sources, filters, self.config.result_limit) {
                Ok(ids) => {
                    self.token.checkpoint()?;
                    return Ok(ids
                        .iter()
                        .filter_map(|id| by_id.get(id.as_str()).map(|s| (*s).clone()))
                        .collect());
                }
                Err(e) => {
                    warn!(generation = self.token.generation(), error = %e, "metadata prefilter failed");
                }
            }
        }
        self.token.checkpoint()?;
        Ok(self
            .collaborators
            .matcher
            .filter_metadata(candidates, filters))
    }

    /// Tiered scan over `sessions`.
    fn scan(
        &mut self,
        sessions: Vec<Session>,
        filters: &SearchFilters,
        kind: ScanKind,
    ) -> Result<(), Interrupted> {
        let (small_phase, large_phase) = kind.phases();
        let scope = kind.scope();
        let threshold = self.config.large_file_threshold_bytes;
        let tiers = partition(sessions, threshold);
        self.set_phase(small_phase, tiers.small.len(), tiers.large.len())?;

        for batch in tiers.small.chunks(self.config.small_batch_size.max(1)) {
            self.token.checkpoint()?;
            for session in batch {
                if self.stager.has_seen(&session.id) {
                    continue;
                }
                let hydrated;
                let target = if !session.is_hydrated() && session.file_size_bytes < threshold {
                    match self.hydrate(session)? {
                        Some(full) => {
                            hydrated = full;
                            &hydrated
                        }
                        None => continue,
                    }
                } else {
                    session
                };
                if self.is_match(target, filters, scope) {
                    self.stager.stage(Arc::new(target.clone()));
                }
            }
            self.progress.scanned_small += batch.len();
            self.stager.stage_progress(self.progress);
            self.maybe_flush()?;
        }

        self.set_phase(large_phase, self.progress.total_small, tiers.large.len())?;

        let mut large = tiers.large;
        for cursor in 0..large.len() {
            self.token.checkpoint()?;
            if let Some(id) = self.shared.promotion.consume(self.token.generation()) {
                let promoted = apply_promotion(&mut large, cursor, &id);
                debug!(
                    generation = self.token.generation(),
                    session_id = %id,
                    promoted,
                    "applied promotion"
                );
            }
            let session = &large[cursor];
            if !self.stager.has_seen(&session.id) {
                if session.is_hydrated() {
                    if self.is_match(session, filters, scope) {
                        self.stager.stage(Arc::new(session.clone()));
                    }
                } else if let Some(full) = self.hydrate(session)? {
                    if self.config.write_back_hydrated {
                        self.collaborators.store.update_session(&full);
                    }
                    if self.is_match(&full, filters, scope) {
                        self.stager.stage(Arc::new(full));
                    }
                }
            }
            self.progress.scanned_large += 1;
            self.stager.stage_progress(self.progress);
            self.maybe_flush()?;
        }

        self.flush()
    }

    /// Parse a session fully. Ok(None) means the session is skipped.
    fn hydrate(&self, session: &Session) -> Result<Option<Session>, Interrupted> {
        self.token.checkpoint()?;
        let parsed = self.collaborators.store.parse_full(session);
        self.token.checkpoint()?;
        match parsed {
            Ok(full) => Ok(Some(full)),
            Err(e) => {
                warn!(
                    generation = self.token.generation(),
                    session_id = %session.id,
                    error = %e,
                    "hydration failed, skipping session"
                );
                Ok(None)
            }
        }
    }

    fn is_match(&self, session: &Session, filters: &SearchFilters, scope: TextScope) -> bool {
        let text = self
            .collaborators
            .transcripts
            .as_ref()
            .and_then(|cache| cache.transcript(session.source, &session.id))
            .map_or(TextSource::Events, TextSource::Cached);
        self.collaborators
            .matcher
            .matches(session, filters, &text, true, scope)
    }

    fn set_phase(
        &mut self,
        phase: SearchPhase,
        total_small: usize,
        total_large: usize,
    ) -> Result<(), Interrupted> {
        debug!(
            generation = self.token.generation(),
            ?phase,
            total_small,
            total_large,
            "phase transition"
        );
        // The small tier is complete once a scan reaches its large phase.
        let scanned_small = if phase.is_large() { total_small } else { 0 };
        self.progress = SearchProgress {
            phase,
            scanned_small,
            total_small,
            scanned_large: 0,
            total_large,
        };
        self.stager.stage_progress(self.progress);
        self.flush()
    }

    fn maybe_flush(&mut self) -> Result<(), Interrupted> {
        if self.stager.is_due(Instant::now()) {
            self.flush()
        } else {
            Ok(())
        }
    }

    fn flush(&mut self) -> Result<(), Interrupted> {
        self.token.checkpoint()?;
        if !self.stager.has_pending() {
            return Ok(());
        }
        let (hits, progress) = self.stager.take(Instant::now());
        self.shared.publisher.update_for(&self.token, |state| {
            state.results.extend(hits);
            if let Some(progress) = progress {
                state.progress = progress;
            }
        })
    }

    fn finish(&mut self) -> Result<(), Interrupted> {
        self.flush()?;
        let mut done = self.progress;
        done.phase = SearchPhase::Idle;
        self.shared.publisher.update_for(&self.token, |state| {
            state.is_running = false;
            state.was_canceled = false;
            state.progress = done;
        })
    }
}

/// Fold `repo:` / `path:` operators into the structured filters and keep only
/// the free text as the query.
fn effective_filters(filters: &SearchFilters, parsed: &ParsedOperators) -> SearchFilters {
    SearchFilters {
        query: parsed.free_text.trim().to_string(),
        repo_name: parsed.repo.clone().or_else(|| filters.repo_name.clone()),
        path_contains: parsed.path.clone().or_else(|| filters.path_contains.clone()),
        ..filters.clone()
    }
}

/// Concatenate two ranked id lists, dropping repeats and capping at `limit`.
pub(crate) fn merge_ids(primary: Vec<String>, secondary: Vec<String>, limit: usize) -> Vec<String> {
    let mut seen = FxHashSet::default();
    primary
        .into_iter()
        .chain(secondary)
        .filter(|id| seen.insert(id.clone()))
        .take(limit)
        .collect()
}
