//! # QC-15 Message Finality
//!
//! Submit messages to a ledger and wait until their effects are irreversible.
//!
//! **Subsystem ID:** 15
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Broadcasting a message only tells a relayer that the ledger accepted it.
//! The block that includes it can still be reverted by a reorg, so callers
//! need two checks:
//! - **Submission**: every message of a batch was broadcast and executed
//!   successfully (`send_msgs_and_check_result`)
//! - **Finality**: the block including a message is at or before the latest
//!   finalized height (`get_finalized_msg_result`)
//!
//! ## Finality Polling
//!
//! | Observation | Wait before next poll |
//! |-------------|-----------------------|
//! | inclusion <= finalized | none, result returned |
//! | same revision, `g` blocks ahead | `average_block_time * g` |
//! | inclusion in a later revision | `average_block_time` |
//! | query failed | retry policy delay |
//!
//! The finalized header and the message result are re-queried on every
//! attempt, so finality progress and reorgs are always observed.
//!
//! ## Module Structure
//!
//! ```text
//! qc-15-message-finality/
//! ├── domain/          # Height, MsgResult, FinalizedHeader, errors
//! ├── algorithms/      # Submission check, finality polling, backoff
//! ├── ports/           # MessageFinalityApi, Chain, ProvableChain
//! ├── adapters/        # InMemoryLedger
//! ├── config.rs        # RetryPolicy, FinalityConfig
//! └── service.rs       # MessageFinalityService
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{InMemoryLedger, LedgerMsg};
pub use algorithms::{
    finality_wait, get_finalized_msg_result, get_finalized_msg_result_with_config,
    send_msgs_and_check_result,
};
pub use config::{DelayStrategy, ErrorFilter, FinalityConfig, RetryPolicy, RevisionMismatchPolicy};
pub use domain::{
    invariant_inclusion_finalized, invariant_one_id_per_msg, ChainError, ExecutionStatus,
    FinalizedHeader, Hash, Height, HeightComparison, MessageFinalityError, MessageFinalityResult,
    MsgResult, QueryTarget,
};
pub use ports::{Chain, MessageFinalityApi, MockChain, ProvableChain};
pub use service::MessageFinalityService;
pub use tokio_util::sync::CancellationToken;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    #[allow(clippy::const_is_empty)]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
