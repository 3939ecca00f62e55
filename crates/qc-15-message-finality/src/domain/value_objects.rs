//! # Domain Value Objects
//!
//! Immutable value types for message finality: two-dimensional heights,
//! message results and finalized headers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Block hash (32-byte SHA-256).
pub type Hash = [u8; 32];

/// Two-dimensional ledger height.
///
/// `revision_number` is bumped on chain upgrades; `revision_height` counts
/// blocks within one revision. The derived ordering is
/// revision-number-then-revision-height, which is the only ordering that is
/// meaningful across revisions. Subtraction is only defined within a revision.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Height {
    /// Epoch identifier, incremented across upgrades.
    pub revision_number: u64,
    /// Block counter within the revision.
    pub revision_height: u64,
}

impl Height {
    /// Create a new height.
    pub const fn new(revision_number: u64, revision_height: u64) -> Self {
        Self {
            revision_number,
            revision_height,
        }
    }

    /// Compare an inclusion height (`self`) against a finalized height.
    pub fn compare_to_finalized(&self, finalized: &Height) -> HeightComparison {
        if self <= finalized {
            return HeightComparison::Finalized;
        }
        match self.blocks_after(finalized) {
            Some(blocks) => HeightComparison::Pending { blocks },
            None => HeightComparison::CrossRevision,
        }
    }

    /// Same-revision distance from `other` up to `self`.
    ///
    /// `None` across revisions or when `self` is below `other`.
    pub fn blocks_after(&self, other: &Height) -> Option<u64> {
        if self.revision_number != other.revision_number {
            return None;
        }
        self.revision_height.checked_sub(other.revision_height)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.revision_number, self.revision_height)
    }
}

/// Outcome of comparing a message's inclusion height with the latest
/// finalized height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeightComparison {
    /// Inclusion height is at or before the finalized height.
    Finalized,
    /// Same revision, inclusion is `blocks` ahead of the finalized height.
    Pending {
        /// Revision-height gap, always at least 1.
        blocks: u64,
    },
    /// Inclusion revision is ahead of the finalized revision.
    CrossRevision,
}

impl HeightComparison {
    /// Check if the compared message is finalized.
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized)
    }
}

/// Execution status reported by the ledger for a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Message executed successfully.
    #[default]
    Success,
    /// Message was included but its execution failed.
    Failure {
        /// Ledger-reported failure reason.
        reason: String,
    },
}

/// Result of a submitted message.
///
/// Never cached: a reorg can move the message to another block or change its
/// outcome entirely.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgResult {
    /// Execution status.
    pub status: ExecutionStatus,
    /// Height of the block that includes the message.
    pub height: Height,
}

impl MsgResult {
    /// Successful result included at `height`.
    pub fn success(height: Height) -> Self {
        Self {
            status: ExecutionStatus::Success,
            height,
        }
    }

    /// Failed result included at `height`.
    pub fn failure(height: Height, reason: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failure {
                reason: reason.into(),
            },
            height,
        }
    }

    /// `(ok, failure_reason)` pair.
    pub fn status(&self) -> (bool, Option<&str>) {
        match &self.status {
            ExecutionStatus::Success => (true, None),
            ExecutionStatus::Failure { reason } => (false, Some(reason.as_str())),
        }
    }

    /// Check if the message executed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Success)
    }

    /// Inclusion height.
    pub fn block_height(&self) -> Height {
        self.height
    }
}

/// Latest header the ledger reports as finalized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedHeader {
    /// Finalized height.
    pub height: Height,
    /// Block hash, when the ledger exposes it.
    pub hash: Option<Hash>,
}

impl FinalizedHeader {
    /// Header without a known hash.
    pub fn at(height: Height) -> Self {
        Self { height, hash: None }
    }

    /// Finalized height.
    pub fn height(&self) -> Height {
        self.height
    }

    /// Short hex form of the hash for log lines.
    pub fn short_hash(&self) -> String {
        self.hash
            .map(|h| hex::encode(&h[..4]))
            .unwrap_or_else(|| "-".to_string())
    }
}
