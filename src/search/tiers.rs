//! Size-based partitioning of scan candidates.

use crate::model::Session;

/// Candidates split by file size, each tier newest first.
#[derive(Debug, Default)]
pub struct Tiers {
    pub small: Vec<Session>,
    pub large: Vec<Session>,
}

/// Sessions below `threshold_bytes` go to `small`, the rest to `large`.
/// Both tiers are sorted by modification time, descending; ties keep input order.
pub fn partition(candidates: Vec<Session>, threshold_bytes: u64) -> Tiers {
    let (mut small, mut large): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|s| s.file_size_bytes < threshold_bytes);
    small.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    large.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    Tiers { small, large }
}
