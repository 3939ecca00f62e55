//! Message Finality Service - binds a chain client to the finality algorithms
//!
//! The service holds no mutable state. Every call is independent, so one
//! service can confirm many messages concurrently if the chain client allows it.

use crate::algorithms::{get_finalized_msg_result_with_config, send_msgs_and_check_result};
use crate::config::FinalityConfig;
use crate::domain::{MessageFinalityError, MessageFinalityResult, MsgResult};
use crate::ports::inbound::MessageFinalityApi;
use crate::ports::outbound::ProvableChain;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Message finality service.
pub struct MessageFinalityService<C: ProvableChain> {
    chain: Arc<C>,
    config: FinalityConfig,
    /// Root token; every wait runs on a child of it.
    shutdown: CancellationToken,
}

impl<C: ProvableChain> MessageFinalityService<C> {
    /// Create a service over a shared chain client.
    pub fn new(chain: Arc<C>, config: FinalityConfig) -> Self {
        Self {
            chain,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Tie the service to an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &FinalityConfig {
        &self.config
    }

    /// Shared chain client.
    pub fn chain(&self) -> &Arc<C> {
        &self.chain
    }

    /// Abort every in-flight and future wait.
    pub fn shutdown(&self) {
        info!("[qc-15] Shutting down message finality service");
        self.shutdown.cancel();
    }

    /// Check if the service was shut down.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Like `await_finalized`, but gives up with `Cancelled` after `deadline`.
    pub async fn await_finalized_with_deadline(
        &self,
        msg_id: &C::MsgId,
        deadline: Duration,
    ) -> MessageFinalityResult<MsgResult> {
        match tokio::time::timeout(deadline, self.wait(msg_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    ?deadline,
                    "[qc-15] Deadline reached while waiting for finality of msg {:?}", msg_id
                );
                Err(MessageFinalityError::Cancelled)
            }
        }
    }

    async fn wait(&self, msg_id: &C::MsgId) -> MessageFinalityResult<MsgResult> {
        let request_id = Uuid::new_v4();
        info!(
            %request_id,
            average_block_time = ?self.config.average_block_time,
            max_attempts = self.config.retry.attempts(),
            "[qc-15] Waiting for finality of msg {:?}",
            msg_id
        );

        let cancel = self.shutdown.child_token();
        let result =
            get_finalized_msg_result_with_config(self.chain.as_ref(), msg_id, &self.config, &cancel)
                .await;

        if let Err(err) = &result {
            warn!(
                %request_id,
                cause = %err.last_attempt(),
                "[qc-15] Finality wait for msg {:?} failed: {}",
                msg_id,
                err
            );
        }
        result
    }
}

#[async_trait]
impl<C> MessageFinalityApi<C> for MessageFinalityService<C>
where
    C: ProvableChain + 'static,
{
    async fn submit_and_verify(&self, msgs: &[C::Msg]) -> MessageFinalityResult<Vec<C::MsgId>> {
        send_msgs_and_check_result(self.chain.as_ref(), msgs).await
    }

    async fn await_finalized(&self, msg_id: &C::MsgId) -> MessageFinalityResult<MsgResult> {
        self.wait(msg_id).await
    }

    async fn submit_and_await_finalized(
        &self,
        msgs: &[C::Msg],
    ) -> MessageFinalityResult<Vec<MsgResult>> {
        let ids = send_msgs_and_check_result(self.chain.as_ref(), msgs).await?;

        let mut results = Vec::with_capacity(ids.len());
        for id in &ids {
            results.push(self.wait(id).await?);
        }
        Ok(results)
    }
}
