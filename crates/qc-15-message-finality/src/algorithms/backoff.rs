//! # Finality Backoff
//!
//! Sizes the wait before re-polling a message that is not yet finalized.

use crate::domain::HeightComparison;
use std::time::Duration;

/// Wait before the next poll, or `None` when the message is already finalized.
///
/// Same revision: one average block time per missing block. Across revisions
/// the height delta has no temporal meaning, so a single block time is used.
pub fn finality_wait(comparison: HeightComparison, average_block_time: Duration) -> Option<Duration> {
    match comparison {
        HeightComparison::Finalized => None,
        HeightComparison::Pending { blocks } => Some(scale(average_block_time, blocks)),
        HeightComparison::CrossRevision => Some(average_block_time),
    }
}

fn scale(block_time: Duration, blocks: u64) -> Duration {
    match u32::try_from(blocks) {
        Ok(n) => block_time.saturating_mul(n),
        Err(_) => Duration::MAX,
    }
}
