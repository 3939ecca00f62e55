//! In-Memory Ledger Adapter
//!
//! Implements `Chain` and `ProvableChain` for a simulated ledger with a fixed
//! finality depth, reorgs and revision upgrades. Used to exercise the finality
//! algorithms without a live network.

use crate::domain::{ChainError, ExecutionStatus, FinalizedHeader, Hash, Height, MsgResult};
use crate::ports::outbound::{Chain, ProvableChain};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Message understood by the in-memory ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerMsg {
    /// Opaque payload.
    pub payload: Vec<u8>,
    /// Execution fails when the payload is longer than this.
    pub gas_limit: u64,
}

impl LedgerMsg {
    /// Create a message.
    pub fn new(payload: impl Into<Vec<u8>>, gas_limit: u64) -> Self {
        Self {
            payload: payload.into(),
            gas_limit,
        }
    }

    fn execute(&self) -> ExecutionStatus {
        let needed = self.payload.len() as u64;
        if needed > self.gas_limit {
            ExecutionStatus::Failure {
                reason: format!("out of gas: needed {}, limit {}", needed, self.gas_limit),
            }
        } else {
            ExecutionStatus::Success
        }
    }
}

struct Block {
    hash: Hash,
    txs: Vec<Hash>,
}

struct TxRecord {
    msg: LedgerMsg,
    inclusion: Option<(Height, ExecutionStatus)>,
}

struct LedgerState {
    revision: u64,
    head: u64,
    /// Bumped on every reorg so replacement blocks get new hashes.
    fork: u64,
    nonce: u64,
    /// Finalized tip of the previous revision, if any.
    previous_revision_tip: Option<Height>,
    blocks: BTreeMap<Height, Block>,
    txs: HashMap<Hash, TxRecord>,
    pending: Vec<Hash>,
    unavailable: bool,
}

impl LedgerState {
    fn head_height(&self) -> Height {
        Height::new(self.revision, self.head)
    }

    fn finalized_height(&self, depth: u64) -> Height {
        if self.head > depth {
            Height::new(self.revision, self.head - depth)
        } else {
            self.previous_revision_tip
                .unwrap_or_else(|| Height::new(self.revision, 0))
        }
    }

    fn produce_block(&mut self) -> Height {
        self.head += 1;
        let height = self.head_height();
        let txs = std::mem::take(&mut self.pending);
        for tx in &txs {
            if let Some(record) = self.txs.get_mut(tx) {
                let status = record.msg.execute();
                record.inclusion = Some((height, status));
            }
        }
        let hash = make_block_hash(height, self.fork);
        self.blocks.insert(height, Block { hash, txs });
        height
    }
}

/// Simulated ledger.
pub struct InMemoryLedger {
    finality_depth: u64,
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    /// Create a ledger at revision `revision` with an empty genesis.
    ///
    /// A block is finalized once `finality_depth` blocks are built on top of it.
    pub fn new(revision: u64, finality_depth: u64) -> Self {
        Self {
            finality_depth,
            state: RwLock::new(LedgerState {
                revision,
                head: 0,
                fork: 0,
                nonce: 0,
                previous_revision_tip: None,
                blocks: BTreeMap::new(),
                txs: HashMap::new(),
                pending: Vec::new(),
                unavailable: false,
            }),
        }
    }

    /// Produce `n` blocks, including any pending messages in the first one.
    pub fn advance(&self, n: u64) -> Height {
        let mut state = self.state.write();
        for _ in 0..n {
            state.produce_block();
        }
        debug!("[qc-15] Ledger advanced to {}", state.head_height());
        state.head_height()
    }

    /// Current head.
    pub fn head(&self) -> Height {
        self.state.read().head_height()
    }

    /// Current finalized height.
    pub fn finalized(&self) -> Height {
        self.state.read().finalized_height(self.finality_depth)
    }

    /// Revert the last `depth` blocks. Their messages go back to pending and
    /// are included again by the next block.
    pub fn reorg(&self, depth: u64) -> Result<Height, ChainError> {
        let mut state = self.state.write();
        let finalized = state.finalized_height(self.finality_depth);
        let new_head = state.head.saturating_sub(depth);
        if Height::new(state.revision, new_head) < finalized {
            return Err(ChainError::Rejected(format!(
                "cannot revert below finalized height {}",
                finalized
            )));
        }

        let mut reverted = Vec::new();
        while state.head > new_head {
            let height = state.head_height();
            if let Some(block) = state.blocks.remove(&height) {
                reverted.extend(block.txs);
            }
            state.head -= 1;
        }
        for tx in &reverted {
            if let Some(record) = state.txs.get_mut(tx) {
                record.inclusion = None;
            }
        }
        reverted.append(&mut state.pending);
        state.pending = reverted;
        state.fork += 1;

        info!(
            "[qc-15] Ledger reorg of {} blocks, head now {}",
            depth,
            state.head_height()
        );
        Ok(state.head_height())
    }

    /// Start a new revision. The old tip is treated as final.
    pub fn upgrade(&self) -> Height {
        let mut state = self.state.write();
        state.previous_revision_tip = Some(state.head_height());
        state.revision += 1;
        state.head = 0;
        info!("[qc-15] Ledger upgraded to revision {}", state.revision);
        state.head_height()
    }

    /// Make every query fail with a network error while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }

    fn check_available(&self) -> Result<(), ChainError> {
        if self.state.read().unavailable {
            return Err(ChainError::Network("ledger unavailable".to_string()));
        }
        Ok(())
    }
}

/// Deterministic block hash for a height on a given fork.
fn make_block_hash(height: Height, fork: u64) -> Hash {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(height.revision_number.to_le_bytes());
    hasher.update(height.revision_height.to_le_bytes());
    hasher.update(fork.to_le_bytes());
    hasher.finalize().into()
}

fn make_tx_hash(msg: &LedgerMsg, nonce: u64) -> Hash {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(&msg.payload);
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

#[async_trait]
impl Chain for InMemoryLedger {
    type Msg = LedgerMsg;
    type MsgId = Hash;

    async fn send_msgs(&self, msgs: &[LedgerMsg]) -> Result<Vec<Hash>, ChainError> {
        self.check_available()?;

        let mut state = self.state.write();
        let mut ids = Vec::with_capacity(msgs.len());
        for msg in msgs {
            state.nonce += 1;
            let id = make_tx_hash(msg, state.nonce);
            state.txs.insert(
                id,
                TxRecord {
                    msg: msg.clone(),
                    inclusion: None,
                },
            );
            state.pending.push(id);
            ids.push(id);
        }
        let height = state.produce_block();
        debug!("[qc-15] Included {} messages at {}", ids.len(), height);
        Ok(ids)
    }

    async fn get_msg_result(&self, id: &Hash) -> Result<MsgResult, ChainError> {
        self.check_available()?;

        let state = self.state.read();
        let record = state
            .txs
            .get(id)
            .ok_or_else(|| ChainError::NotFound(format!("tx {}", hex::encode(id))))?;
        match &record.inclusion {
            Some((height, status)) => Ok(MsgResult {
                status: status.clone(),
                height: *height,
            }),
            None => Err(ChainError::NotFound(format!(
                "tx {} is pending",
                hex::encode(id)
            ))),
        }
    }
}

#[async_trait]
impl ProvableChain for InMemoryLedger {
    async fn get_latest_finalized_header(&self) -> Result<FinalizedHeader, ChainError> {
        self.check_available()?;

        let state = self.state.read();
        let height = state.finalized_height(self.finality_depth);
        Ok(FinalizedHeader {
            height,
            hash: state.blocks.get(&height).map(|b| b.hash),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_includes_in_next_block() {
        let ledger = InMemoryLedger::new(1, 3);
        ledger.advance(5);

        let ids = ledger
            .send_msgs(&[LedgerMsg::new("hello", 100)])
            .await
            .unwrap();
        let res = ledger.get_msg_result(&ids[0]).await.unwrap();

        assert_eq!(res.height, Height::new(1, 6));
        assert!(res.is_success());
    }

    #[tokio::test]
    async fn test_execution_failure_reason() {
        let ledger = InMemoryLedger::new(1, 3);

        let ids = ledger
            .send_msgs(&[LedgerMsg::new("too long", 2)])
            .await
            .unwrap();
        let res = ledger.get_msg_result(&ids[0]).await.unwrap();

        assert_eq!(res.status(), (false, Some("out of gas: needed 8, limit 2")));
    }

    #[tokio::test]
    async fn test_finalized_header_trails_head() {
        let ledger = InMemoryLedger::new(1, 3);
        ledger.advance(10);

        let header = ledger.get_latest_finalized_header().await.unwrap();
        assert_eq!(header.height, Height::new(1, 7));
        assert!(header.hash.is_some());
    }

    #[tokio::test]
    async fn test_reorg_reincludes_message_in_new_block() {
        let ledger = InMemoryLedger::new(1, 3);
        ledger.advance(10);
        let ids = ledger.send_msgs(&[LedgerMsg::new("m", 10)]).await.unwrap();
        let before = ledger.get_msg_result(&ids[0]).await.unwrap();
        assert_eq!(before.height, Height::new(1, 11));

        ledger.reorg(2).unwrap();
        assert!(ledger.get_msg_result(&ids[0]).await.is_err());

        ledger.advance(3);
        let after = ledger.get_msg_result(&ids[0]).await.unwrap();
        assert_eq!(after.height, Height::new(1, 10));
    }

    #[test]
    fn test_reorg_below_finality_rejected() {
        let ledger = InMemoryLedger::new(1, 2);
        ledger.advance(10);
        assert!(ledger.reorg(3).is_err());
        assert_eq!(ledger.head(), Height::new(1, 10));
    }

    #[test]
    fn test_upgrade_keeps_previous_tip_final() {
        let ledger = InMemoryLedger::new(1, 3);
        ledger.advance(500);
        ledger.upgrade();
        ledger.advance(2);
        assert_eq!(ledger.finalized(), Height::new(1, 500));

        ledger.advance(2);
        assert_eq!(ledger.finalized(), Height::new(2, 1));
    }

    #[tokio::test]
    async fn test_unavailable_ledger() {
        let ledger = InMemoryLedger::new(1, 3);
        ledger.set_unavailable(true);
        assert!(matches!(
            ledger.get_latest_finalized_header().await,
            Err(ChainError::Network(_))
        ));
        ledger.set_unavailable(false);
        tokio_test::assert_ok!(ledger.get_latest_finalized_header().await);
    }

    #[test]
    fn test_unknown_tx_not_found() {
        let ledger = InMemoryLedger::new(1, 3);
        let err = tokio_test::assert_err!(tokio_test::block_on(ledger.get_msg_result(&[7u8; 32])));
        assert!(matches!(err, ChainError::NotFound(_)));
    }
}
