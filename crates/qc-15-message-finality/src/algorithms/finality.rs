//! # Finality Waiting
//!
//! Poll a chain until the block including a message is finalized.
//!
//! ```text
//! [POLLING] ──inclusion <= finalized──→ [FINALIZED]
//!     ↑  │
//!     │  ├── query failed / not yet finalized ──→ [RETRYABLE FAILURE] ──sleep──┐
//!     │  │                                                                    │
//!     └──┼────────────────────────────────────────────────────────────────────┘
//!        │
//!        ├── attempt budget spent ──→ [EXHAUSTED]
//!        └── token cancelled ──→ [CANCELLED]
//! ```
//!
//! Both the finalized header and the message result are queried on every
//! attempt. Finality advances between polls and a reorg can move the message
//! to another block, so neither value is carried over.

use super::backoff::finality_wait;
use crate::config::{FinalityConfig, RetryPolicy, RevisionMismatchPolicy};
use crate::domain::{
    invariant_inclusion_finalized, HeightComparison, MessageFinalityError, MessageFinalityResult,
    MsgResult, QueryTarget,
};
use crate::ports::outbound::ProvableChain;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Wait for the finalization of a message and return its result.
///
/// Cross-revision observations are always retried with a flat wait of
/// `average_block_time`.
pub async fn get_finalized_msg_result<C>(
    chain: &C,
    average_block_time: Duration,
    msg_id: &C::MsgId,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> MessageFinalityResult<MsgResult>
where
    C: ProvableChain,
{
    let config = FinalityConfig {
        average_block_time,
        retry: *policy,
        revision_mismatch: RevisionMismatchPolicy::FlatWait,
    };
    get_finalized_msg_result_with_config(chain, msg_id, &config, cancel).await
}

/// Same as [`get_finalized_msg_result`], driven by a full [`FinalityConfig`].
pub async fn get_finalized_msg_result_with_config<C>(
    chain: &C,
    msg_id: &C::MsgId,
    config: &FinalityConfig,
    cancel: &CancellationToken,
) -> MessageFinalityResult<MsgResult>
where
    C: ProvableChain,
{
    let max_attempts = config.retry.attempts();
    let mut cross_revision_streak = 0u32;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let err = match poll_once(chain, msg_id, config, &mut cross_revision_streak, cancel).await
        {
            Ok(res) => {
                info!(
                    attempt,
                    height = %res.height,
                    "[qc-15] msg {:?} finalized",
                    msg_id
                );
                return Ok(res);
            }
            Err(err) => err,
        };

        if matches!(err, MessageFinalityError::Cancelled) || !config.retry.should_retry(&err) {
            return Err(err);
        }

        if attempt >= max_attempts {
            error!(
                attempts = attempt,
                "[qc-15] Gave up waiting for finality of msg {:?}: {}",
                msg_id,
                err
            );
            return Err(MessageFinalityError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }

        warn!(
            attempt,
            max_attempts, "[qc-15] Finality attempt for msg {:?} failed: {}", msg_id, err
        );

        let delay = config.retry.delay_after(attempt, &err);
        if !delay.is_zero() {
            sleep_or_cancel(delay, cancel).await?;
        }
    }
}

/// One polling attempt: fresh header, fresh result, compare, maybe wait.
async fn poll_once<C>(
    chain: &C,
    msg_id: &C::MsgId,
    config: &FinalityConfig,
    cross_revision_streak: &mut u32,
    cancel: &CancellationToken,
) -> MessageFinalityResult<MsgResult>
where
    C: ProvableChain,
{
    let header = cancellable(cancel, chain.get_latest_finalized_header())
        .await?
        .map_err(|source| MessageFinalityError::QueryFailure {
            target: QueryTarget::FinalizedHeader,
            source,
        })?;

    let res = cancellable(cancel, chain.get_msg_result(msg_id))
        .await?
        .map_err(|source| MessageFinalityError::QueryFailure {
            target: QueryTarget::MsgId(format!("{:?}", msg_id)),
            source,
        })?;

    let msg_height = res.block_height();
    let finalized_height = header.height();
    let comparison = msg_height.compare_to_finalized(&finalized_height);

    debug!(
        msg_height = %msg_height,
        finalized_height = %finalized_height,
        finalized_hash = %header.short_hash(),
        ?comparison,
        "[qc-15] Polled finality of msg {:?}",
        msg_id
    );

    // Only observed attempts touch the streak; a failed query leaves it as is.
    if comparison == HeightComparison::CrossRevision {
        *cross_revision_streak += 1;
        warn!(
            msg_height = %msg_height,
            finalized_height = %finalized_height,
            streak = *cross_revision_streak,
            "[qc-15] msg {:?} included in a later revision than the finalized header",
            msg_id
        );
        if let RevisionMismatchPolicy::FailAfter(limit) = config.revision_mismatch {
            if *cross_revision_streak >= limit {
                return Err(MessageFinalityError::RevisionMismatch {
                    msg_height,
                    finalized_height,
                    attempts: *cross_revision_streak,
                });
            }
        }
    } else {
        *cross_revision_streak = 0;
    }

    if invariant_inclusion_finalized(&msg_height, &finalized_height) {
        return Ok(res);
    }

    let wait = finality_wait(comparison, config.average_block_time)
        .unwrap_or(config.average_block_time);

    sleep_or_cancel(wait, cancel).await?;

    Err(MessageFinalityError::NotYetFinalized {
        msg_height,
        finalized_height,
        wait,
    })
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<F>(cancel: &CancellationToken, fut: F) -> MessageFinalityResult<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MessageFinalityError::Cancelled),
        out = fut => Ok(out),
    }
}

async fn sleep_or_cancel(wait: Duration, cancel: &CancellationToken) -> MessageFinalityResult<()> {
    cancellable(cancel, tokio::time::sleep(wait)).await
}
