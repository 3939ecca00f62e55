//! # Domain Errors
//!
//! Error types for message submission and finality confirmation.

use super::value_objects::Height;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a chain client (outbound port).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Transport or RPC failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Queried object is unknown to the node.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Node refused the request (e.g. broadcast rejected by the mempool).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Request did not complete in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// What a failed query was asking for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryTarget {
    /// Result of the `index`-th message of a submitted batch.
    Msg {
        /// Position in the batch (0-based).
        index: usize,
        /// Debug rendering of the message.
        msg: String,
    },
    /// Result of a message identified only by its id.
    MsgId(String),
    /// Latest finalized header.
    FinalizedHeader,
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Msg { index, msg } => write!(f, "the result of msg[{}]({})", index, msg),
            Self::MsgId(id) => write!(f, "the result of msg_id({})", id),
            Self::FinalizedHeader => write!(f, "the latest finalized header"),
        }
    }
}

/// Message finality error types.
#[derive(Debug, Error)]
pub enum MessageFinalityError {
    /// Broadcasting the batch failed.
    #[error("failed to send messages: {0}")]
    SendFailure(#[source] ChainError),

    /// Chain returned a different number of ids than messages sent.
    #[error("chain returned {returned} message ids for {sent} messages")]
    IdCountMismatch {
        /// Messages in the batch
        sent: usize,
        /// Ids returned by the chain
        returned: usize,
    },

    /// Message was broadcast but its execution failed.
    #[error("msg[{index}]({msg}) was successfully broadcasted, but its execution failed: failure_reason={reason}")]
    ExecutionFailure {
        /// Position in the batch (0-based)
        index: usize,
        /// Debug rendering of the message
        msg: String,
        /// Ledger-reported failure reason
        reason: String,
    },

    /// Querying the chain failed.
    #[error("failed to get {target}: {source}")]
    QueryFailure {
        /// What was being queried
        target: QueryTarget,
        /// Underlying chain error
        #[source]
        source: ChainError,
    },

    /// Inclusion height is ahead of the latest finalized height.
    #[error("message_height({msg_height}) > latest_finalized_height({finalized_height}), waited {wait:?}")]
    NotYetFinalized {
        /// Inclusion height of the message
        msg_height: Height,
        /// Latest finalized height
        finalized_height: Height,
        /// Wait performed before reporting
        wait: Duration,
    },

    /// Inclusion revision stayed ahead of the finalized revision for too long.
    #[error("message_height({msg_height}) is in a later revision than latest_finalized_height({finalized_height}) for {attempts} attempts")]
    RevisionMismatch {
        /// Inclusion height of the message
        msg_height: Height,
        /// Latest finalized height
        finalized_height: Height,
        /// Consecutive cross-revision observations
        attempts: u32,
    },

    /// Attempt budget spent; wraps the error of the final attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        #[source]
        last: Box<MessageFinalityError>,
    },

    /// Cancellation token fired.
    #[error("cancelled while waiting for finality")]
    Cancelled,
}

impl MessageFinalityError {
    /// Default retry classification.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueryFailure { .. } | Self::NotYetFinalized { .. })
    }

    /// Error of the final attempt when retries were exhausted, else `self`.
    pub fn last_attempt(&self) -> &MessageFinalityError {
        match self {
            Self::RetriesExhausted { last, .. } => last,
            other => other,
        }
    }
}

/// Result type for message finality operations.
pub type MessageFinalityResult<T> = Result<T, MessageFinalityError>;
