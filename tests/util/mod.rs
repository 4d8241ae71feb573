//! Shared fakes and helpers for orchestrator integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use agent_session_search::model::{SearchFilters, Session, SessionEvent, SessionSource};
use agent_session_search::search::{
    Collaborators, IndexError, IndexQuery, ParsedOperators, SearchIndex, SearchState,
    SessionMatcher, SessionStore, StoreError, TextScope, TextSource, TranscriptCache,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use crossbeam_channel::{Receiver, Sender, bounded};
use rustc_hash::FxHashSet;

pub const WAIT: Duration = Duration::from_secs(10);

/// Session with a fixed, age-derived modification time.
pub fn session(id: &str, age_minutes: i64, size: u64) -> Session {
    let base = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    Session::new(
        id,
        SessionSource::Claude,
        base - ChronoDuration::minutes(age_minutes),
        size,
    )
}

pub fn hydrated(mut s: Session, events: Vec<SessionEvent>) -> Session {
    s.events = Some(events);
    s
}

/// Receive snapshots until `pred` holds; panics after [`WAIT`].
pub fn wait_for(
    rx: &Receiver<SearchState>,
    mut pred: impl FnMut(&SearchState) -> bool,
) -> (SearchState, Vec<SearchState>) {
    let deadline = Instant::now() + WAIT;
    let mut history = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let state = rx
            .recv_timeout(remaining)
            .expect("timed out waiting for search state");
        let done = pred(&state);
        history.push(state.clone());
        if done {
            return (state, history);
        }
    }
}

/// Wait until the run with `generation` reports a terminal state.
pub fn wait_done(rx: &Receiver<SearchState>, generation: u64) -> (SearchState, Vec<SearchState>) {
    wait_for(rx, |s| s.generation == generation && !s.is_running)
}

pub fn ids(state: &SearchState) -> Vec<String> {
    state.results.iter().map(|s| s.id.clone()).collect()
}

// -------------------------------------------------------------------------
// Record store
// -------------------------------------------------------------------------

/// Handle to a parse that blocks until released.
pub struct Gate {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

impl Gate {
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(WAIT)
            .expect("gated parse never started");
    }

    pub fn open(&self) {
        let _ = self.release.send(());
    }
}

#[derive(Default)]
pub struct FakeStore {
    payloads: Mutex<HashMap<String, Vec<SessionEvent>>>,
    failing: Mutex<HashSet<String>>,
    gates: Mutex<HashMap<String, (Sender<()>, Receiver<()>)>>,
    pub parsed: Mutex<Vec<String>>,
    pub updated: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeStore {
    pub fn with_payload(self, id: &str, events: Vec<SessionEvent>) -> Self {
        self.payloads.lock().unwrap().insert(id.to_string(), events);
        self
    }

    pub fn failing(self, id: &str) -> Self {
        self.failing.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn gate(&self, id: &str) -> Gate {
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        self.gates
            .lock()
            .unwrap()
            .insert(id.to_string(), (entered_tx, release_rx));
        Gate {
            entered: entered_rx,
            release: release_tx,
        }
    }

    pub fn parsed(&self) -> Vec<String> {
        self.parsed.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<String> {
        self.updated.lock().unwrap().clone()
    }
}

impl SessionStore for FakeStore {
    fn parse_full(&self, session: &Session) -> Result<Session, StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.parsed.lock().unwrap().push(session.id.clone());

        let gate = self.gates.lock().unwrap().remove(&session.id);
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv_timeout(WAIT);
        }

        let result = if self.failing.lock().unwrap().contains(&session.id) {
            Err(StoreError::Parse {
                id: session.id.clone(),
                reason: "truncated json".into(),
            })
        } else {
            let events = self
                .payloads
                .lock()
                .unwrap()
                .get(&session.id)
                .cloned()
                .unwrap_or_default();
            let mut full = session.clone();
            full.events = Some(events);
            Ok(full)
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn update_session(&self, session: &Session) {
        self.updated.lock().unwrap().push(session.id.clone());
    }
}

// -------------------------------------------------------------------------
// Full-text index
// -------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeIndex {
    pub has_data: bool,
    pub indexed: Vec<String>,
    pub content_hits: Vec<String>,
    pub tool_hits: Vec<String>,
    pub prefilter: Vec<String>,
    pub fail_search: bool,
    pub fail_indexed: bool,
    pub queries: Mutex<Vec<String>>,
    pub prefilter_calls: AtomicUsize,
}

impl FakeIndex {
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl SearchIndex for FakeIndex {
    fn has_data(&self, _sources: &[SessionSource]) -> bool {
        self.has_data
    }

    fn indexed_ids(&self, _sources: &[SessionSource]) -> Result<FxHashSet<String>, IndexError> {
        if self.fail_indexed {
            return Err(IndexError::Unavailable("database locked".into()));
        }
        Ok(self.indexed.iter().cloned().collect())
    }

    fn search_ids(&self, query: &IndexQuery<'_>) -> Result<Vec<String>, IndexError> {
        self.queries.lock().unwrap().push(query.query.to_string());
        if self.fail_search {
            return Err(IndexError::Query("fts5: syntax error".into()));
        }
        Ok(self.content_hits.iter().take(query.limit).cloned().collect())
    }

    fn search_tool_io_ids(&self, query: &IndexQuery<'_>) -> Result<Vec<String>, IndexError> {
        Ok(self.tool_hits.iter().take(query.limit).cloned().collect())
    }

    fn prefilter_ids(
        &self,
        _sources: &[SessionSource],
        _filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<String>, IndexError> {
        self.prefilter_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.prefilter.iter().take(limit).cloned().collect())
    }
}

// -------------------------------------------------------------------------
// Matcher
// -------------------------------------------------------------------------

/// Case-insensitive substring matcher over metadata and event text.
#[derive(Default)]
pub struct SubstringMatcher {
    pub scopes: Mutex<Vec<(String, TextScope)>>,
}

impl SubstringMatcher {
    pub fn scopes_for(&self, id: &str) -> Vec<TextScope> {
        self.scopes
            .lock()
            .unwrap()
            .iter()
            .filter(|(sid, _)| sid == id)
            .map(|(_, scope)| *scope)
            .collect()
    }
}

fn metadata_ok(session: &Session, filters: &SearchFilters) -> bool {
    let eq = |want: &Option<String>, have: &Option<String>| match want.as_deref() {
        Some(w) if !w.trim().is_empty() => have
            .as_deref()
            .is_some_and(|h| h.eq_ignore_ascii_case(w.trim())),
        _ => true,
    };
    let path_ok = match filters.path_contains.as_deref() {
        Some(p) if !p.is_empty() => {
            session.cwd.as_deref().is_some_and(|c| c.contains(p))
                || session.file_path.to_string_lossy().contains(p)
        }
        _ => true,
    };
    eq(&filters.model, &session.model)
        && eq(&filters.repo_name, &session.repo_name)
        && path_ok
        && filters.date_from.is_none_or(|from| session.modified_at >= from)
        && filters.date_to.is_none_or(|to| session.modified_at <= to)
}

impl SessionMatcher for SubstringMatcher {
    fn parse_operators(&self, query: &str) -> ParsedOperators {
        let mut parsed = ParsedOperators::default();
        let mut free = Vec::new();
        for token in query.split_whitespace() {
            if let Some(repo) = token.strip_prefix("repo:") {
                parsed.repo = Some(repo.to_string());
            } else if let Some(path) = token.strip_prefix("path:") {
                parsed.path = Some(path.to_string());
            } else {
                free.push(token);
            }
        }
        parsed.free_text = free.join(" ");
        parsed
    }

    fn matches(
        &self,
        session: &Session,
        filters: &SearchFilters,
        text: &TextSource,
        _allow_on_demand: bool,
        scope: TextScope,
    ) -> bool {
        self.scopes
            .lock()
            .unwrap()
            .push((session.id.clone(), scope));
        if !metadata_ok(session, filters) {
            return false;
        }
        let needle = filters.query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let hay = match (scope, text) {
            (TextScope::All, TextSource::Cached(cached)) => cached.to_string(),
            (TextScope::All, TextSource::Events) => {
                let mut parts: Vec<&str> = session.title.as_deref().into_iter().collect();
                for e in session.events() {
                    parts.extend(e.text.as_deref());
                    parts.extend(e.tool_input.as_deref());
                    parts.extend(e.tool_output.as_deref());
                }
                parts.join("\n")
            }
            (TextScope::ToolIoOnly, _) => session
                .events()
                .iter()
                .filter(|e| e.kind.is_tool())
                .flat_map(|e| [e.tool_input.as_deref(), e.tool_output.as_deref()])
                .flatten()
                .collect::<Vec<_>>()
                .join("\n"),
        };
        hay.to_lowercase().contains(&needle)
    }

    fn filter_metadata(&self, sessions: &[Session], filters: &SearchFilters) -> Vec<Session> {
        sessions
            .iter()
            .filter(|s| metadata_ok(s, filters))
            .cloned()
            .collect()
    }
}

// -------------------------------------------------------------------------
// Transcript cache
// -------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeTranscripts {
    pub entries: HashMap<String, Arc<str>>,
}

impl TranscriptCache for FakeTranscripts {
    fn transcript(&self, _source: SessionSource, session_id: &str) -> Option<Arc<str>> {
        self.entries.get(session_id).cloned()
    }
}

// -------------------------------------------------------------------------
// Wiring
// -------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<FakeStore>,
    pub index: Option<Arc<FakeIndex>>,
    pub matcher: Arc<SubstringMatcher>,
}

impl Harness {
    pub fn new(store: FakeStore, index: Option<FakeIndex>) -> Self {
        Self {
            store: Arc::new(store),
            index: index.map(Arc::new),
            matcher: Arc::new(SubstringMatcher::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        self.collaborators_with(None)
    }

    pub fn collaborators_with(&self, transcripts: Option<FakeTranscripts>) -> Collaborators {
        Collaborators {
            store: self.store.clone(),
            index: self
                .index
                .clone()
                .map(|i| i as Arc<dyn SearchIndex>),
            matcher: self.matcher.clone(),
            transcripts: transcripts.map(|t| Arc::new(t) as Arc<dyn TranscriptCache>),
        }
    }
}

// -------------------------------------------------------------------------
// Log capture
// -------------------------------------------------------------------------

/// Captures tracing output for tests. Scan work runs on worker threads, so the
/// subscriber is installed globally; use at most once per test binary.
pub struct TestTracing {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl TestTracing {
    pub fn install_global() -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_global_default(subscriber).expect("global subscriber");
        Self { buffer }
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Poll until the captured output contains `needle`; worker threads may
    /// still be logging after their last publication.
    pub fn wait_contains(&self, needle: &str) {
        let deadline = Instant::now() + WAIT;
        while !self.output().contains(needle) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        self.assert_contains(needle);
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
