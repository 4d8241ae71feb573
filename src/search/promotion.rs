//! Single-slot promotion cell for large-tier reordering.

use parking_lot::Mutex;

use crate::model::Session;

/// Holds at most one pending session id, tagged with the generation that was
/// current when it was requested. Last write wins.
#[derive(Debug, Default)]
pub struct PromotionCell {
    pending: Mutex<Option<(u64, String)>>,
}

impl PromotionCell {
    pub fn promote(&self, generation: u64, id: impl Into<String>) {
        *self.pending.lock() = Some((generation, id.into()));
    }

    /// Take the pending id if it was requested for `generation`. Requests from
    /// older generations are dropped; requests for newer ones stay put.
    pub fn consume(&self, generation: u64) -> Option<String> {
        let mut pending = self.pending.lock();
        let tagged = pending.as_ref().map(|(g, _)| *g)?;
        if tagged == generation {
            return pending.take().map(|(_, id)| id);
        }
        if tagged < generation {
            *pending = None;
        }
        None
    }
}

/// Move `id` to `cursor` by swapping, if it sits in the unprocessed slice
/// `queue[cursor..]`. Returns whether a promotion happened.
pub fn apply_promotion(queue: &mut [Session], cursor: usize, id: &str) -> bool {
    if cursor >= queue.len() {
        return false;
    }
    match queue[cursor..].iter().position(|s| s.id == id) {
        Some(0) => true,
        Some(offset) => {
            queue.swap(cursor, cursor + offset);
            true
        }
        None => false,
    }
}
