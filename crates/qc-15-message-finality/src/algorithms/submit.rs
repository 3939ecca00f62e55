//! # Message Submission
//!
//! Broadcast a batch and verify that every message executed successfully.

use crate::domain::{
    invariant_one_id_per_msg, MessageFinalityError, MessageFinalityResult, QueryTarget,
};
use crate::ports::outbound::Chain;
use tracing::{debug, info, warn};

/// Send `msgs` in one broadcast and check the result of each of them.
///
/// Fails on the first message whose result cannot be queried or whose
/// execution failed; later messages are not checked. Nothing is retried.
/// On success the ids are returned in message order.
pub async fn send_msgs_and_check_result<C>(
    chain: &C,
    msgs: &[C::Msg],
) -> MessageFinalityResult<Vec<C::MsgId>>
where
    C: Chain,
{
    let ids = chain
        .send_msgs(msgs)
        .await
        .map_err(MessageFinalityError::SendFailure)?;

    if !invariant_one_id_per_msg(msgs.len(), ids.len()) {
        return Err(MessageFinalityError::IdCountMismatch {
            sent: msgs.len(),
            returned: ids.len(),
        });
    }

    for (index, (msg, id)) in msgs.iter().zip(&ids).enumerate() {
        let res = chain
            .get_msg_result(id)
            .await
            .map_err(|source| MessageFinalityError::QueryFailure {
                target: QueryTarget::Msg {
                    index,
                    msg: format!("{:?}", msg),
                },
                source,
            })?;

        if let (false, reason) = res.status() {
            warn!(
                index,
                height = %res.height,
                "[qc-15] msg {:?} executed with failure",
                id
            );
            return Err(MessageFinalityError::ExecutionFailure {
                index,
                msg: format!("{:?}", msg),
                reason: reason.unwrap_or_default().to_string(),
            });
        }

        debug!(index, height = %res.height, "[qc-15] msg {:?} executed", id);
    }

    info!("[qc-15] Sent and verified {} messages", ids.len());
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChainError, Height, MsgResult};
    use crate::ports::outbound::MockChain;

    fn msgs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("msg-{}", i)).collect()
    }

    fn ok(h: u64) -> Result<MsgResult, ChainError> {
        Ok(MsgResult::success(Height::new(1, h)))
    }

    #[tokio::test]
    async fn test_all_messages_succeed() {
        let chain = MockChain::new()
            .with_results(0, [ok(10)])
            .with_results(1, [ok(10)])
            .with_results(2, [ok(11)]);

        let ids = send_msgs_and_check_result(&chain, &msgs(3)).await.unwrap();

        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(chain.result_queries(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_send_failure_issues_no_queries() {
        let chain = MockChain::new().with_send_error(ChainError::Rejected("mempool full".into()));

        let err = send_msgs_and_check_result(&chain, &msgs(2)).await.unwrap_err();

        assert!(matches!(
            err,
            MessageFinalityError::SendFailure(ChainError::Rejected(_))
        ));
        assert!(chain.result_queries().is_empty());
    }

    #[tokio::test]
    async fn test_first_execution_failure_stops_checking() {
        let chain = MockChain::new()
            .with_results(0, [ok(10)])
            .with_results(1, [Ok(MsgResult::failure(Height::new(1, 10), "out of gas"))])
            .with_results(2, [ok(10)]);

        let err = send_msgs_and_check_result(&chain, &msgs(3)).await.unwrap_err();

        match err {
            MessageFinalityError::ExecutionFailure { index, msg, reason } => {
                assert_eq!(index, 1);
                assert_eq!(msg, "\"msg-1\"");
                assert_eq!(reason, "out of gas");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(chain.result_queries(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_query_failure_names_message() {
        let chain = MockChain::new()
            .with_results(0, [Err(ChainError::Network("timeout".into()))])
            .with_results(1, [ok(10)]);

        let err = send_msgs_and_check_result(&chain, &msgs(2)).await.unwrap_err();

        match err {
            MessageFinalityError::QueryFailure { target, .. } => {
                assert_eq!(
                    target,
                    QueryTarget::Msg {
                        index: 0,
                        msg: "\"msg-0\"".into()
                    }
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(chain.result_queries(), vec![0]);
    }

    #[tokio::test]
    async fn test_id_count_mismatch() {
        let chain = MockChain::new().dropping_ids(1);

        let err = send_msgs_and_check_result(&chain, &msgs(3)).await.unwrap_err();

        assert!(matches!(
            err,
            MessageFinalityError::IdCountMismatch { sent: 3, returned: 2 }
        ));
        assert!(chain.result_queries().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let chain = MockChain::new();
        let ids = send_msgs_and_check_result(&chain, &msgs(0)).await.unwrap();
        assert!(ids.is_empty());
    }
}
