//! # Inbound Ports
//!
//! API trait defining what the Message Finality subsystem can do.

use crate::domain::{MessageFinalityResult, MsgResult};
use crate::ports::outbound::Chain;
use async_trait::async_trait;

/// Message finality API - inbound port.
#[async_trait]
pub trait MessageFinalityApi<C: Chain>: Send + Sync {
    /// Broadcast a batch and check that every message executed successfully.
    async fn submit_and_verify(&self, msgs: &[C::Msg]) -> MessageFinalityResult<Vec<C::MsgId>>;

    /// Wait until the block including `msg_id` is finalized.
    async fn await_finalized(&self, msg_id: &C::MsgId) -> MessageFinalityResult<MsgResult>;

    /// Submit a batch, then wait for the finalization of every message.
    async fn submit_and_await_finalized(
        &self,
        msgs: &[C::Msg],
    ) -> MessageFinalityResult<Vec<MsgResult>>;
}
