//! Per-run dedup and throttled result staging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

use super::state::SearchProgress;
use crate::model::Session;

/// Buffers new hits and progress between publications.
///
/// The seen set covers every id ever staged in this run, flushed or not, so a
/// session can only enter the result list once.
#[derive(Debug)]
pub struct ResultStager {
    seen: FxHashSet<String>,
    staged: Vec<Arc<Session>>,
    progress: Option<SearchProgress>,
    interval: Duration,
    last_flush: Option<Instant>,
}

impl ResultStager {
    pub fn new(interval: Duration) -> Self {
        Self {
            seen: FxHashSet::default(),
            staged: Vec::new(),
            progress: None,
            interval,
            last_flush: None,
        }
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    /// Stage a hit. Returns false for an id already seen in this run.
    pub fn stage(&mut self, session: Arc<Session>) -> bool {
        if !self.seen.insert(session.id.clone()) {
            return false;
        }
        self.staged.push(session);
        true
    }

    pub fn stage_progress(&mut self, progress: SearchProgress) {
        self.progress = Some(progress);
    }

    pub fn has_pending(&self) -> bool {
        !self.staged.is_empty() || self.progress.is_some()
    }

    /// Whether the throttle window has elapsed since the last flush.
    pub fn is_due(&self, now: Instant) -> bool {
        self.has_pending()
            && self
                .last_flush
                .is_none_or(|last| now.duration_since(last) >= self.interval)
    }

    /// Hand over everything staged and restart the throttle window.
    pub fn take(&mut self, now: Instant) -> (Vec<Arc<Session>>, Option<SearchProgress>) {
        self.last_flush = Some(now);
        (std::mem::take(&mut self.staged), self.progress.take())
    }

    /// Drop staged hits. Their ids stay in the seen set.
    pub fn discard(&mut self) -> usize {
        self.progress = None;
        std::mem::take(&mut self.staged).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionSource;
    use chrono::Utc;

    fn hit(id: &str) -> Arc<Session> {
        Arc::new(Session::new(id, SessionSource::Gemini, Utc::now(), 1))
    }

    #[test]
    fn duplicates_are_rejected_across_flushes() {
        let mut stager = ResultStager::new(Duration::from_millis(100));
        assert!(stager.stage(hit("a")));
        assert!(!stager.stage(hit("a")));
        let (hits, _) = stager.take(Instant::now());
        assert_eq!(hits.len(), 1);
        assert!(!stager.stage(hit("a")));
        assert!(stager.has_seen("a"));
    }

    #[test]
    fn throttle_window_gates_flushes() {
        let mut stager = ResultStager::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(!stager.is_due(t0), "nothing staged");
        stager.stage(hit("a"));
        assert!(stager.is_due(t0), "first flush is immediate");
        stager.take(t0);
        stager.stage(hit("b"));
        assert!(!stager.is_due(t0 + Duration::from_millis(50)));
        assert!(stager.is_due(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn discard_keeps_seen_ids() {
        let mut stager = ResultStager::new(Duration::ZERO);
        stager.stage(hit("a"));
        stager.stage_progress(SearchProgress::idle());
        assert_eq!(stager.discard(), 1);
        assert!(!stager.has_pending());
        assert!(!stager.stage(hit("a")));
    }
}
