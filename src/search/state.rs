//! Published search state and its single publication point.
//!
//! Consumers see immutable [`SearchState`] snapshots, either by polling
//! [`StatePublisher::snapshot`] or through a subscription channel. Every
//! mutation goes through one lock, and stale runs are rejected under that same
//! lock, so a consumer never observes a partially applied update or a write
//! from a superseded run.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::Serialize;

use super::cancel::{Generation, Interrupted, RunToken};
use crate::model::Session;

/// Where a run currently is. `Idle` is both the initial and the finished state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    #[default]
    Idle,
    Indexed,
    LegacySmall,
    LegacyLarge,
    UnindexedSmall,
    UnindexedLarge,
    ToolOutputsSmall,
    ToolOutputsLarge,
}

impl SearchPhase {
    pub fn is_large(self) -> bool {
        matches!(
            self,
            SearchPhase::LegacyLarge | SearchPhase::UnindexedLarge | SearchPhase::ToolOutputsLarge
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchProgress {
    pub phase: SearchPhase,
    pub scanned_small: usize,
    pub total_small: usize,
    pub scanned_large: usize,
    pub total_large: usize,
}

impl SearchProgress {
    pub fn idle() -> Self {
        Self::default()
    }
}

/// One immutable view of the orchestrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchState {
    /// Generation of the run this snapshot describes.
    pub generation: u64,
    pub is_running: bool,
    pub was_canceled: bool,
    /// Matches in discovery order, no duplicate ids.
    #[serde(serialize_with = "serialize_result_ids")]
    pub results: Vec<Arc<Session>>,
    pub progress: SearchProgress,
}

fn serialize_result_ids<S: serde::Serializer>(
    results: &[Arc<Session>],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(results.iter().map(|s| s.id.as_str()))
}

impl SearchState {
    pub fn running(generation: u64) -> Self {
        Self {
            generation,
            is_running: true,
            ..Default::default()
        }
    }

    pub fn canceled(generation: u64, results: Vec<Arc<Session>>) -> Self {
        Self {
            generation,
            is_running: false,
            was_canceled: true,
            results,
            progress: SearchProgress::idle(),
        }
    }

    pub fn result_ids(&self) -> Vec<&str> {
        self.results.iter().map(|s| s.id.as_str()).collect()
    }
}

struct Inner {
    latest: SearchState,
    subscribers: Vec<Sender<SearchState>>,
}

impl Inner {
    fn broadcast(&mut self) {
        let latest = &self.latest;
        self.subscribers.retain(|tx| tx.send(latest.clone()).is_ok());
    }
}

pub struct StatePublisher {
    inner: Mutex<Inner>,
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                latest: SearchState::default(),
                subscribers: Vec::new(),
            }),
        }
    }
}

impl StatePublisher {
    pub fn snapshot(&self) -> SearchState {
        self.inner.lock().latest.clone()
    }

    /// New channel that first receives the current snapshot, then every later one.
    pub fn subscribe(&self) -> Receiver<SearchState> {
        let (tx, rx) = unbounded();
        let mut inner = self.inner.lock();
        // A fresh receiver cannot be disconnected yet.
        let _ = tx.send(inner.latest.clone());
        inner.subscribers.push(tx);
        rx
    }

    /// Replace the state wholesale. `f` runs under the publication lock, so any
    /// generation change it makes is ordered against every [`update_for`](Self::update_for).
    pub fn reset_with<T>(&self, f: impl FnOnce(&SearchState) -> (SearchState, T)) -> T {
        let mut inner = self.inner.lock();
        let (next, out) = f(&inner.latest);
        inner.latest = next;
        inner.broadcast();
        out
    }

    /// Mutate and publish on behalf of `token`'s run. Rejected without any
    /// mutation if the run was canceled or superseded.
    pub fn update_for(
        &self,
        token: &RunToken,
        f: impl FnOnce(&mut SearchState),
    ) -> Result<(), Interrupted> {
        let mut inner = self.inner.lock();
        token.checkpoint()?;
        f(&mut inner.latest);
        inner.broadcast();
        Ok(())
    }

    /// Mutate and publish only while `generation` still equals `expected`.
    pub fn update_at(
        &self,
        generation: &Generation,
        expected: u64,
        f: impl FnOnce(&mut SearchState),
    ) -> bool {
        let mut inner = self.inner.lock();
        if generation.current() != expected {
            return false;
        }
        f(&mut inner.latest);
        inner.broadcast();
        true
    }
}
