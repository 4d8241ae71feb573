//! Generation tokens and cooperative cancellation checkpoints.
//!
//! Every run captures a [`RunToken`] when it starts. Starting another run or
//! calling `cancel()` bumps the shared generation, after which every
//! [`RunToken::checkpoint`] of the old run fails. Background work must pass a
//! checkpoint before touching published state and stop as soon as one fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared generation counter owned by the orchestrator.
#[derive(Debug, Default)]
pub struct Generation {
    current: AtomicU64,
}

impl Generation {
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Invalidate every outstanding token and return the new generation.
    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Per-run cancellation state, shared between the orchestrator and the run.
#[derive(Debug, Default)]
pub struct RunControl {
    canceled: AtomicBool,
    canceled_at: AtomicU64,
}

impl RunControl {
    /// Mark the run canceled. `generation` is the one the cancel published under.
    pub fn cancel(&self, generation: u64) {
        self.canceled_at.store(generation, Ordering::SeqCst);
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    pub fn canceled_at(&self) -> Option<u64> {
        self.is_canceled()
            .then(|| self.canceled_at.load(Ordering::SeqCst))
    }
}

/// Why a checkpoint refused to let work continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// `cancel()` was called for this run.
    Canceled,
    /// A newer run replaced this one.
    Superseded,
}

/// Captured identity of one run.
#[derive(Debug, Clone)]
pub struct RunToken {
    generation: u64,
    shared: Arc<Generation>,
    control: Arc<RunControl>,
}

impl RunToken {
    pub fn new(generation: u64, shared: Arc<Generation>, control: Arc<RunControl>) -> Self {
        Self {
            generation,
            shared,
            control,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    pub fn is_current(&self) -> bool {
        self.shared.current() == self.generation
    }

    /// Ok while this run is still the live one.
    pub fn checkpoint(&self) -> Result<(), Interrupted> {
        if self.control.is_canceled() {
            return Err(Interrupted::Canceled);
        }
        if !self.is_current() {
            return Err(Interrupted::Superseded);
        }
        Ok(())
    }
}
