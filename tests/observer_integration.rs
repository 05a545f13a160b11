//! End-to-end observer scenarios against scripted collaborators.
//!
//! Covers the full sync lifecycle: cold start, warm resume, reorg rewind,
//! download backpressure, pipeline fencing, and unresolvable retries.

mod common;

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use anchor_observer::cas::InMemoryCas;
use anchor_observer::chain::{Paginator, PaginatorConfig};
use anchor_observer::observer::{
    HistoricalSync, LiveLoop, LiveLoopConfig, ReorgHandler, SyncPlanner, ThroughputLimiter,
};
use anchor_observer::ports::{
    CasClient, ChainClient, EventSink, FakeClock, OperationStore, RecordingEventSink,
    TransactionProcessor, TransactionStore, UnresolvableTransactionStore,
};
use anchor_observer::processor::CoreProcessor;
use anchor_observer::store::{
    InMemoryOperationStore, InMemoryTransactionStore, InMemoryUnresolvableStore,
};
use anchor_observer::types::{
    AnchorRecord, AnchoredOperation, BlockHeight, OperationKind, SyncPhase, SyncState,
    TransactionNumber,
};
use anchor_observer::versions::{ProtocolVersion, VersionHandle, VersionRegistry};

use common::{MockChainClient, ScriptedProcessor, canonical_hash, make_record, make_record_with_hash};

// ═══════════════════════════════════════════════════════════════════════════════
// HARNESS
// ═══════════════════════════════════════════════════════════════════════════════

struct Harness {
    chain: Arc<MockChainClient>,
    transaction_store: Arc<InMemoryTransactionStore>,
    operation_store: Arc<InMemoryOperationStore>,
    unresolvable_store: Arc<InMemoryUnresolvableStore>,
    events: Arc<RecordingEventSink>,
    versions: Arc<VersionRegistry>,
}

impl Harness {
    fn new(chain: Arc<MockChainClient>, processor: Arc<dyn TransactionProcessor>) -> Self {
        Self::with_unresolvable_store(
            chain,
            processor,
            Arc::new(InMemoryUnresolvableStore::new()),
        )
    }

    fn with_unresolvable_store(
        chain: Arc<MockChainClient>,
        processor: Arc<dyn TransactionProcessor>,
        unresolvable_store: Arc<InMemoryUnresolvableStore>,
    ) -> Self {
        let versions = Arc::new(
            VersionRegistry::new(vec![VersionHandle {
                version: ProtocolVersion {
                    name: "1.0".into(),
                    start_time: BlockHeight::ZERO,
                    max_records_per_block: 100,
                },
                processor,
            }])
            .expect("registry"),
        );

        Self {
            chain,
            transaction_store: Arc::new(InMemoryTransactionStore::new()),
            operation_store: Arc::new(InMemoryOperationStore::new()),
            unresolvable_store,
            events: Arc::new(RecordingEventSink::new()),
            versions,
        }
    }

    fn chain_dyn(&self) -> Arc<dyn ChainClient> {
        Arc::clone(&self.chain) as Arc<dyn ChainClient>
    }

    fn live_loop(&self, max_concurrent: usize) -> LiveLoop {
        let chain = self.chain_dyn();
        let transaction_store: Arc<dyn TransactionStore> = Arc::clone(&self.transaction_store) as _;
        let operation_store: Arc<dyn OperationStore> = Arc::clone(&self.operation_store) as _;
        let unresolvable_store: Arc<dyn UnresolvableTransactionStore> =
            Arc::clone(&self.unresolvable_store) as _;
        let events: Arc<dyn EventSink> = Arc::clone(&self.events) as _;

        let reorg = ReorgHandler::new(
            Arc::clone(&chain),
            Arc::clone(&transaction_store),
            operation_store,
            Arc::clone(&unresolvable_store),
            Arc::clone(&events),
        );

        LiveLoop::new(
            chain,
            transaction_store,
            unresolvable_store,
            Arc::clone(&self.versions),
            ThroughputLimiter::new(Arc::clone(&self.versions)),
            reorg,
            events,
            LiveLoopConfig {
                max_concurrent_downloads: max_concurrent,
                observing_interval: Duration::from_secs(1),
                backpressure_poll_interval: Duration::from_millis(10),
                unresolvable_retry_limit: 100,
            },
            CancellationToken::new(),
        )
    }

    fn historical(&self, batch_size: u64) -> HistoricalSync {
        let transaction_store: Arc<dyn TransactionStore> = Arc::clone(&self.transaction_store) as _;
        let unresolvable_store: Arc<dyn UnresolvableTransactionStore> =
            Arc::clone(&self.unresolvable_store) as _;

        HistoricalSync::new(
            Paginator::new(
                self.chain_dyn(),
                PaginatorConfig {
                    default_batch_size: 1000,
                    max_batch_size: 10000,
                    max_retries: 3,
                    retry_delay: Duration::from_millis(1),
                },
            ),
            transaction_store,
            unresolvable_store,
            Arc::clone(&self.versions),
            batch_size,
            Duration::from_millis(1),
            CancellationToken::new(),
        )
    }

    fn planner(&self, deployment: u64, batch_size: u64) -> SyncPlanner {
        let transaction_store: Arc<dyn TransactionStore> = Arc::clone(&self.transaction_store) as _;
        SyncPlanner::new(
            self.chain_dyn(),
            transaction_store,
            BlockHeight::new(deployment),
            batch_size,
        )
    }

    fn persisted_numbers(&self) -> Vec<u64> {
        self.transaction_store
            .all()
            .iter()
            .map(|r| r.transaction_number.value())
            .collect()
    }
}

fn assert_strictly_increasing(records: &[AnchorRecord]) {
    for pair in records.windows(2) {
        assert!(
            pair[0].transaction_number < pair[1].transaction_number,
            "transaction order violated: {} then {}",
            pair[0].transaction_number,
            pair[1].transaction_number
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIO 1: COLD START
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn cold_start_catches_up_then_goes_live() {
    // Three anchors at heights 100/150/200, tip at 250, deployment at 0.
    let chain = MockChainClient::new(
        vec![make_record(0, 100), make_record(1, 150), make_record(2, 200)],
        250,
    );
    let harness = Harness::new(Arc::clone(&chain), ScriptedProcessor::new());

    // Startup decision: empty store → historical from deployment.
    let planned = harness.planner(0, 1000).plan().await.expect("plan");
    assert_eq!(planned.phase, SyncPhase::Historical);
    assert_eq!(planned.last_synced_block, BlockHeight::ZERO);
    assert_eq!(planned.target_block.value(), 250);

    // One batch covers 0..250.
    let state = Arc::new(RwLock::new(planned));
    harness
        .historical(1000)
        .run(&state)
        .await
        .expect("historical sync");

    assert_eq!(harness.persisted_numbers(), vec![0, 1, 2]);
    assert_strictly_increasing(&harness.transaction_store.all());
    assert!(state.read().is_complete);
    assert_eq!(state.read().last_synced_block.value(), 250);

    // First live read resumes from the last persisted anchor.
    let live = harness.live_loop(4);
    let consolidated = live.run_iteration().await.expect("live iteration");
    assert_eq!(consolidated, 0);

    let cursors = chain.read_cursors.lock().clone();
    let last_cursor = cursors.last().cloned().flatten().expect("cursor used");
    assert_eq!(last_cursor.transaction_number.value(), 2);
    assert_eq!(last_cursor.transaction_time_hash, canonical_hash(200));
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIO 2: WARM START
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn warm_start_resumes_historical_on_large_gap() {
    let chain = MockChainClient::new(vec![make_record(5, 950_000)], 1_000_050);
    let harness = Harness::new(Arc::clone(&chain), ScriptedProcessor::new());

    harness
        .transaction_store
        .add_transaction(make_record(5, 950_000))
        .await
        .expect("seed store");

    let planned = harness.planner(950_000, 1000).plan().await.expect("plan");
    assert_eq!(planned.phase, SyncPhase::Historical);
    assert_eq!(planned.last_synced_block.value(), 950_000);
    assert_eq!(planned.target_block.value(), 1_000_050);

    // Progress crosses the midpoint about 25 batches in (25k of ~50k blocks).
    let midway = SyncState::historical(
        BlockHeight::new(950_000),
        BlockHeight::new(975_000),
        BlockHeight::new(1_000_050),
    );
    let progress = midway.progress_percent();
    assert!((49.0..51.0).contains(&progress), "progress was {progress}");
}

#[tokio::test]
async fn warm_start_goes_live_on_small_gap() {
    let chain = MockChainClient::new(vec![make_record(5, 950_000)], 950_100);
    let harness = Harness::new(Arc::clone(&chain), ScriptedProcessor::new());

    harness
        .transaction_store
        .add_transaction(make_record(5, 950_000))
        .await
        .expect("seed store");

    let planned = harness.planner(0, 1000).plan().await.expect("plan");
    assert_eq!(planned.phase, SyncPhase::Live);
    assert!(planned.is_complete);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIO 3: REORG REWIND
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn reorg_rewinds_all_stores_in_order() {
    // Anchors 0..=10, record n anchored at height n*10.
    let records: Vec<_> = (0..=10).map(|n| make_record(n, n * 10)).collect();
    let chain = MockChainClient::new(records.clone(), 200);
    let harness = Harness::new(Arc::clone(&chain), ScriptedProcessor::new());

    for record in &records {
        harness
            .transaction_store
            .add_transaction(record.clone())
            .await
            .expect("seed transaction");
        harness
            .operation_store
            .insert_or_replace(vec![AnchoredOperation {
                did_suffix: format!("Ei{n}", n = record.transaction_number),
                kind: OperationKind::Create,
                transaction_number: record.transaction_number,
                transaction_time: record.transaction_time,
                operation_index: 0,
                payload: serde_json::Value::Null,
            }])
            .await
            .expect("seed operation");
    }
    for number in [6u64, 9] {
        harness
            .unresolvable_store
            .record_unresolvable_transaction_fetch_attempt(&records[number as usize])
            .await
            .expect("seed unresolvable");
    }

    // The chain reorganizes: everything at height >= 75 is orphaned,
    // invalidating anchors 8, 9, 10 (and the cursor built on anchor 10).
    chain.reorg_from(75);

    let live = harness.live_loop(4);
    live.run_iteration().await.expect("live iteration");

    // The rewind probe finds anchor 7 (height 70) as the deepest valid one.
    assert_eq!(harness.events.reorg_count(), 1);
    assert_eq!(harness.persisted_numbers(), vec![0, 1, 2, 3, 4, 5, 6, 7]);
    assert!(
        harness
            .operation_store
            .max_transaction_number()
            .is_some_and(|n| n <= TransactionNumber::new(7))
    );
    assert!(harness.unresolvable_store.attempts(TransactionNumber::new(9)).is_none());
    assert!(harness.unresolvable_store.attempts(TransactionNumber::new(6)).is_some());

    // After the rewind the loop re-read with the rolled-back cursor.
    let cursors = chain.read_cursors.lock().clone();
    let final_cursor = cursors.last().cloned().flatten().expect("cursor");
    assert_eq!(final_cursor.transaction_number.value(), 7);
    assert_eq!(final_cursor.transaction_time_hash, canonical_hash(70));
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIO 4: DOWNLOAD BACKPRESSURE
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn concurrency_never_exceeds_download_cap() {
    let records: Vec<_> = (1..=10).map(|n| make_record(n, 1000 + n)).collect();
    let chain = MockChainClient::new(records, 2000);

    let processor = ScriptedProcessor::with_delay(Duration::from_millis(30));
    let harness = Harness::new(Arc::clone(&chain), Arc::clone(&processor) as _);

    let live = harness.live_loop(2);
    let consolidated = live.run_iteration().await.expect("live iteration");

    assert_eq!(consolidated, 10);
    assert_eq!(harness.persisted_numbers(), (1..=10).collect::<Vec<_>>());
    assert!(
        processor.max_concurrent() <= 2,
        "observed {} concurrent downloads",
        processor.max_concurrent()
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIO 5: PIPELINE FENCE ON FATAL ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn fatal_processing_error_fences_the_pipeline() {
    let records: Vec<_> = (1..=10).map(|n| make_record(n, 1000 + n)).collect();
    let chain = MockChainClient::new(records, 2000);

    let processor = ScriptedProcessor::new();
    processor.throw_times(4, 1);
    let harness = Harness::new(Arc::clone(&chain), Arc::clone(&processor) as _);

    let live = harness.live_loop(10);

    // First pass: records 1..3 land; 4 errors; 5..10 must not be persisted.
    live.run_iteration().await.expect("first iteration");
    assert_eq!(harness.persisted_numbers(), vec![1, 2, 3]);

    // Self-heal: the fence clears the pipeline, the cursor re-derives from
    // storage (record 3), and the retry succeeds.
    for _ in 0..4 {
        if harness.transaction_store.len() == 10 {
            break;
        }
        live.run_iteration().await.expect("follow-up iteration");
    }

    assert_eq!(harness.persisted_numbers(), (1..=10).collect::<Vec<_>>());
    assert_strictly_increasing(&harness.transaction_store.all());

    // The post-fence read resumed from record 3.
    let cursors = chain.read_cursors.lock().clone();
    assert!(
        cursors
            .iter()
            .flatten()
            .any(|c| c.transaction_number.value() == 3),
        "expected a re-read from the last persisted record"
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIO 6: UNRESOLVABLE RETRY
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn missing_cas_content_is_retried_until_resolved() {
    // Anchor whose core index file is not in the CAS yet.
    let core_file = serde_json::json!({
        "operations": {"create": [{"didSuffix": "EiRetry"}]}
    });
    let core_bytes = serde_json::to_vec(&core_file).expect("serialize");
    let core_hash = B256::from_slice(&Sha256::digest(&core_bytes));

    let record = make_record_with_hash(1, 10, core_hash);
    let chain = MockChainClient::new(vec![record], 50);

    let cas = Arc::new(InMemoryCas::new());
    let clock = Arc::new(FakeClock::epoch());
    let unresolvable_store = Arc::new(InMemoryUnresolvableStore::with_clock(
        Arc::clone(&clock) as _,
    ));

    // Build the harness around a real v1 processor.
    let operation_store = Arc::new(InMemoryOperationStore::new());
    let processor = CoreProcessor::new(
        Arc::clone(&cas) as Arc<dyn CasClient>,
        Arc::clone(&operation_store) as Arc<dyn OperationStore>,
        Duration::from_millis(100),
    );
    let mut harness = Harness::with_unresolvable_store(
        Arc::clone(&chain),
        Arc::new(processor) as Arc<dyn TransactionProcessor>,
        unresolvable_store,
    );
    harness.operation_store = operation_store;

    // First pass: content missing → unresolvable, anchor still recorded.
    let live = harness.live_loop(4);
    live.run_iteration().await.expect("first iteration");

    assert_eq!(
        harness.unresolvable_store.attempts(TransactionNumber::new(1)),
        Some(1)
    );
    assert!(harness.operation_store.is_empty());
    assert_eq!(harness.persisted_numbers(), vec![1]);

    // The content shows up and the backoff elapses.
    cas.write(bytes::Bytes::from(core_bytes))
        .await
        .expect("publish content");
    clock.advance(chrono::Duration::seconds(120));

    // The sweep re-processes and clears the unresolvable entry.
    live.run_iteration().await.expect("retry iteration");

    assert!(harness.unresolvable_store.is_empty());
    let ops = harness.operation_store.operations_for("EiRetry");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].kind, OperationKind::Create);
}
