//! # Finality Scenarios for Message Finality (qc-15)
//!
//! End-to-end runs of submission and finality polling against the in-memory
//! ledger, with block production, reorgs, upgrades and outages driven on a
//! paused tokio clock.

use qc_15_message_finality::{
    CancellationToken, DelayStrategy, FinalityConfig, Height, InMemoryLedger, LedgerMsg,
    MessageFinalityApi, MessageFinalityError, MessageFinalityService, ProvableChain, QueryTarget,
    RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

// =============================================================================
// TEST HELPERS
// =============================================================================

const BLOCK_TIME: Duration = Duration::from_secs(6);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(max_attempts: u32) -> FinalityConfig {
    FinalityConfig {
        average_block_time: BLOCK_TIME,
        retry: RetryPolicy::with_max_attempts(max_attempts)
            .delay(DelayStrategy::Fixed(Duration::from_secs(1))),
        ..FinalityConfig::default()
    }
}

fn make_service(
    ledger: &Arc<InMemoryLedger>,
    max_attempts: u32,
) -> Arc<MessageFinalityService<InMemoryLedger>> {
    Arc::new(MessageFinalityService::new(
        Arc::clone(ledger),
        config(max_attempts),
    ))
}

/// Produce one block per `BLOCK_TIME` until cancelled.
fn spawn_block_producer(ledger: Arc<InMemoryLedger>, stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = sleep(BLOCK_TIME) => {
                    ledger.advance(1);
                }
            }
        }
    })
}

fn msg(payload: &str) -> LedgerMsg {
    LedgerMsg::new(payload, 64)
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_submit_then_wait_for_finality_with_live_blocks() {
    init_tracing();
    let ledger = Arc::new(InMemoryLedger::new(1, 3));
    ledger.advance(10);
    let service = make_service(&ledger, 10);
    let stop = CancellationToken::new();
    let producer = spawn_block_producer(Arc::clone(&ledger), stop.clone());
    let start = Instant::now();

    let results = service
        .submit_and_await_finalized(&[msg("transfer")])
        .await
        .unwrap();

    assert_eq!(results[0].height, Height::new(1, 11));
    assert!(start.elapsed() >= Duration::from_secs(18));
    assert!(ledger.finalized() >= Height::new(1, 11));

    stop.cancel();
    producer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_execution_failure_is_reported_before_waiting() {
    init_tracing();
    let ledger = Arc::new(InMemoryLedger::new(1, 3));
    let service = make_service(&ledger, 10);

    let err = service
        .submit_and_await_finalized(&[msg("ok"), LedgerMsg::new("far too large", 1)])
        .await
        .unwrap_err();

    match err {
        MessageFinalityError::ExecutionFailure { index, reason, .. } => {
            assert_eq!(index, 1);
            assert!(reason.contains("out of gas"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_reorg_moves_message_to_another_block() {
    init_tracing();
    let ledger = Arc::new(InMemoryLedger::new(1, 3));
    ledger.advance(10);
    let service = make_service(&ledger, 10);

    let ids = service.submit_and_verify(&[msg("relay packet")]).await.unwrap();
    let id = ids[0];

    let driver = {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            ledger.reorg(2).unwrap();
            sleep(Duration::from_secs(1)).await;
            ledger.advance(1);
            sleep(Duration::from_secs(1)).await;
            ledger.advance(5);
        })
    };

    let res = service.await_finalized(&id).await.unwrap();

    // Originally included at 1-11; the replacement chain included it at 1-10.
    assert_eq!(res.height, Height::new(1, 10));
    assert!(res.is_success());
    driver.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_confirmations() {
    init_tracing();
    let ledger = Arc::new(InMemoryLedger::new(1, 2));
    ledger.advance(3);
    let service = make_service(&ledger, 20);

    let mut ids = Vec::new();
    for i in 0..3 {
        let batch = service
            .submit_and_verify(&[msg(&format!("packet-{}", i))])
            .await
            .unwrap();
        ids.extend(batch);
    }

    let stop = CancellationToken::new();
    let producer = spawn_block_producer(Arc::clone(&ledger), stop.clone());

    let handles: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.await_finalized(&id).await })
        })
        .collect();

    let mut heights = Vec::new();
    for handle in handles {
        heights.push(handle.await.unwrap().unwrap().height);
    }

    assert_eq!(
        heights,
        vec![Height::new(1, 4), Height::new(1, 5), Height::new(1, 6)]
    );

    stop.cancel();
    producer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_message_in_new_revision_waits_for_finality_to_cross_upgrade() {
    init_tracing();
    let ledger = Arc::new(InMemoryLedger::new(1, 3));
    ledger.advance(500);
    ledger.upgrade();
    let service = make_service(&ledger, 20);

    let ids = service.submit_and_verify(&[msg("after upgrade")]).await.unwrap();
    let header = ledger.get_latest_finalized_header().await.unwrap();
    assert_eq!(header.height, Height::new(1, 500));

    let stop = CancellationToken::new();
    let producer = spawn_block_producer(Arc::clone(&ledger), stop.clone());
    let start = Instant::now();

    let res = service.await_finalized(&ids[0]).await.unwrap();

    assert_eq!(res.height, Height::new(2, 1));
    // Finality of 2-1 needs the head at 2-4, three more blocks.
    assert!(start.elapsed() >= BLOCK_TIME * 3);
    assert!(ledger.finalized().revision_number >= 2);

    stop.cancel();
    producer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_transient_outage_is_retried() {
    init_tracing();
    let ledger = Arc::new(InMemoryLedger::new(1, 3));
    let service = make_service(&ledger, 10);
    let ids = service.submit_and_verify(&[msg("during outage")]).await.unwrap();
    ledger.advance(10);
    ledger.set_unavailable(true);

    let restore = {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            ledger.set_unavailable(false);
        })
    };
    let start = Instant::now();

    let res = service.await_finalized(&ids[0]).await.unwrap();

    assert_eq!(res.height, Height::new(1, 1));
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert!(start.elapsed() <= Duration::from_secs(6));
    restore.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_persistent_outage_exhausts_retries() {
    init_tracing();
    let ledger = Arc::new(InMemoryLedger::new(1, 3));
    let service = make_service(&ledger, 3);
    let ids = service.submit_and_verify(&[msg("lost")]).await.unwrap();
    ledger.set_unavailable(true);

    let err = service.await_finalized(&ids[0]).await.unwrap_err();

    match err {
        MessageFinalityError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(
                *last,
                MessageFinalityError::QueryFailure {
                    target: QueryTarget::FinalizedHeader,
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_in_flight_wait() {
    init_tracing();
    let ledger = Arc::new(InMemoryLedger::new(1, 100));
    let service = make_service(&ledger, 10);
    let ids = service.submit_and_verify(&[msg("slow")]).await.unwrap();

    let waiter = {
        let service = Arc::clone(&service);
        let id = ids[0];
        tokio::spawn(async move { service.await_finalized(&id).await })
    };

    sleep(Duration::from_secs(29)).await;
    service.shutdown();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, MessageFinalityError::Cancelled));
}
