//! # Domain Invariants
//!
//! Business rules for message finality.

use super::value_objects::{Height, HeightComparison};

/// Invariant: a message is only reported finalized when its inclusion height
/// is not ahead of the latest finalized height fetched in the same attempt.
pub fn invariant_inclusion_finalized(msg_height: &Height, finalized_height: &Height) -> bool {
    msg_height.compare_to_finalized(finalized_height) == HeightComparison::Finalized
}

/// Invariant: the chain answered a batch broadcast with one id per message.
pub fn invariant_one_id_per_msg(sent: usize, returned: usize) -> bool {
    sent == returned
}
