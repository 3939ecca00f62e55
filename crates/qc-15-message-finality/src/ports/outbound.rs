//! # Outbound Ports
//!
//! Traits for the chain client the subsystem talks to.

use crate::domain::{ChainError, FinalizedHeader, MsgResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use tokio::time::Instant;

/// Chain client able to broadcast messages and report their results.
#[async_trait]
pub trait Chain: Send + Sync {
    /// Opaque message type.
    type Msg: Debug + Send + Sync;
    /// Opaque handle identifying a submitted message.
    type MsgId: Debug + Clone + Send + Sync;

    /// Broadcast a batch, returning one id per message in the same order.
    async fn send_msgs(&self, msgs: &[Self::Msg]) -> Result<Vec<Self::MsgId>, ChainError>;

    /// Current result of a submitted message.
    async fn get_msg_result(&self, id: &Self::MsgId) -> Result<MsgResult, ChainError>;
}

/// Chain client that also reports its finalized frontier.
#[async_trait]
pub trait ProvableChain: Chain {
    /// Latest header the chain considers finalized.
    async fn get_latest_finalized_header(&self) -> Result<FinalizedHeader, ChainError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// One scripted reply sequence. The last entry repeats once the rest is used.
type Script<T> = VecDeque<Result<T, ChainError>>;

fn next_scripted<T: Clone>(script: &mut Script<T>, missing: &str) -> Result<T, ChainError> {
    match script.len() {
        0 => Err(ChainError::NotFound(missing.to_string())),
        1 => script[0].clone(),
        _ => script
            .pop_front()
            .unwrap_or_else(|| Err(ChainError::NotFound(missing.to_string()))),
    }
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    send_error: Option<ChainError>,
    drop_ids: usize,
    headers: Script<FinalizedHeader>,
    results: HashMap<u64, Script<MsgResult>>,
    sent: Vec<String>,
    header_queries: Vec<Instant>,
    result_queries: Vec<(u64, Instant)>,
}

/// Mock chain driven by scripted header and result sequences.
///
/// Messages are plain strings; ids are assigned sequentially from 0.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the finalized headers returned by successive queries.
    pub fn with_headers(
        self,
        headers: impl IntoIterator<Item = Result<FinalizedHeader, ChainError>>,
    ) -> Self {
        self.state.lock().headers = headers.into_iter().collect();
        self
    }

    /// Script the results returned for `id` by successive queries.
    pub fn with_results(
        self,
        id: u64,
        results: impl IntoIterator<Item = Result<MsgResult, ChainError>>,
    ) -> Self {
        self.state
            .lock()
            .results
            .insert(id, results.into_iter().collect());
        self
    }

    /// Make every broadcast fail with `err`.
    pub fn with_send_error(self, err: ChainError) -> Self {
        self.state.lock().send_error = Some(err);
        self
    }

    /// Return `n` fewer ids than messages on broadcast.
    pub fn dropping_ids(self, n: usize) -> Self {
        self.state.lock().drop_ids = n;
        self
    }

    /// Messages broadcast so far.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Instants at which the finalized header was queried.
    pub fn header_queries(&self) -> Vec<Instant> {
        self.state.lock().header_queries.clone()
    }

    /// Ids queried for results, in order.
    pub fn result_queries(&self) -> Vec<u64> {
        self.state
            .lock()
            .result_queries
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }

    /// Gaps between consecutive header queries.
    pub fn header_query_gaps(&self) -> Vec<std::time::Duration> {
        self.header_queries()
            .windows(2)
            .map(|w| w[1].duration_since(w[0]))
            .collect()
    }
}

#[async_trait]
impl Chain for MockChain {
    type Msg = String;
    type MsgId = u64;

    async fn send_msgs(&self, msgs: &[String]) -> Result<Vec<u64>, ChainError> {
        let mut state = self.state.lock();
        if let Some(err) = state.send_error.clone() {
            return Err(err);
        }
        state.sent.extend(msgs.iter().cloned());
        let count = msgs.len().saturating_sub(state.drop_ids);
        let first = state.next_id;
        state.next_id += msgs.len() as u64;
        Ok((first..first + count as u64).collect())
    }

    async fn get_msg_result(&self, id: &u64) -> Result<MsgResult, ChainError> {
        let mut state = self.state.lock();
        state.result_queries.push((*id, Instant::now()));
        match state.results.get_mut(id) {
            Some(script) => next_scripted(script, "no result scripted"),
            None => Err(ChainError::NotFound(format!("msg_id {}", id))),
        }
    }
}

#[async_trait]
impl ProvableChain for MockChain {
    async fn get_latest_finalized_header(&self) -> Result<FinalizedHeader, ChainError> {
        let mut state = self.state.lock();
        state.header_queries.push(Instant::now());
        next_scripted(&mut state.headers, "no finalized header scripted")
    }
}
