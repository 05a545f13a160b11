//! Live processing: cursor-driven incremental reads with a concurrent,
//! bounded, order-preserving pipeline.
//!
//! One iteration: consolidate → read → admit → spawn → backpressure →
//! error fence → reorg check, repeated while the chain reports more
//! transactions or a reorg was handled; then the unresolvable retry sweep
//! runs and the next iteration is scheduled.
//!
//! Ordering is preserved by the under-processing queue: entries are appended
//! in `transaction_number` order, tasks complete out of order, and the
//! consolidator persists only the consecutive `Processed` prefix. An `Error`
//! entry fences the pipeline: everything in flight drains, the queue is
//! discarded, and the cursor re-derives from storage — no gap can be
//! introduced by racing past a failed prerequisite.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::reorg::ReorgHandler;
use super::throughput::ThroughputLimiter;
use crate::error::Result;
use crate::ports::{
    ChainClient, EventSink, ObserverEvent, TransactionStore, UnresolvableTransactionStore,
};
use crate::types::{Cursor, ProcessingStatus, TransactionUnderProcessing};
use crate::versions::VersionRegistry;

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Live loop tuning.
#[derive(Debug, Clone)]
pub struct LiveLoopConfig {
    /// Cap on concurrently processing records.
    pub max_concurrent_downloads: usize,
    /// Delay between iterations once the tip is drained.
    pub observing_interval: Duration,
    /// Poll interval while waiting on in-flight work.
    pub backpressure_poll_interval: Duration,
    /// Cap on unresolvable records swept per iteration.
    pub unresolvable_retry_limit: usize,
}

impl Default for LiveLoopConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 4,
            observing_interval: Duration::from_secs(30),
            backpressure_poll_interval: Duration::from_secs(1),
            unresolvable_retry_limit: 100,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIVE LOOP
// ═══════════════════════════════════════════════════════════════════════════════

/// The live processing loop.
pub struct LiveLoop {
    chain: Arc<dyn ChainClient>,
    transaction_store: Arc<dyn TransactionStore>,
    unresolvable_store: Arc<dyn UnresolvableTransactionStore>,
    versions: Arc<VersionRegistry>,
    limiter: ThroughputLimiter,
    reorg: ReorgHandler,
    events: Arc<dyn EventSink>,
    config: LiveLoopConfig,
    /// Bounded task pool: a permit per in-flight processing task.
    download_slots: Arc<Semaphore>,
    /// Appended by the admitter, trimmed by the consolidator.
    under_processing: Mutex<VecDeque<Arc<TransactionUnderProcessing>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for LiveLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveLoop")
            .field("config", &self.config)
            .field("queued", &self.under_processing.lock().len())
            .finish_non_exhaustive()
    }
}

impl LiveLoop {
    /// Create a live loop.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        transaction_store: Arc<dyn TransactionStore>,
        unresolvable_store: Arc<dyn UnresolvableTransactionStore>,
        versions: Arc<VersionRegistry>,
        limiter: ThroughputLimiter,
        reorg: ReorgHandler,
        events: Arc<dyn EventSink>,
        config: LiveLoopConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let download_slots = Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1)));
        Self {
            chain,
            transaction_store,
            unresolvable_store,
            versions,
            limiter,
            reorg,
            events,
            config,
            download_slots,
            under_processing: Mutex::new(VecDeque::new()),
            shutdown,
        }
    }

    /// Run iterations until the stop flag is set.
    ///
    /// A failed iteration emits a loop-failure event and retries on the next
    /// tick without advancing the cursor; no single bad record can abort the
    /// loop permanently.
    ///
    /// # Errors
    ///
    /// Currently never returns an error; the signature leaves room for
    /// unrecoverable conditions.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        info!(
            interval = ?self.config.observing_interval,
            max_concurrent = self.config.max_concurrent_downloads,
            "live loop started"
        );

        loop {
            if self.shutdown.is_cancelled() {
                info!("stop requested, leaving live loop");
                return Ok(());
            }

            match self.run_iteration().await {
                Ok(processed) => {
                    counter!("observer_loop_success_total").increment(1);
                    self.events.emit(ObserverEvent::LoopSuccess { processed });
                }
                Err(e) => {
                    counter!("observer_loop_failure_total").increment(1);
                    warn!(error = %e, "live iteration failed, retrying next tick");
                    self.events.emit(ObserverEvent::LoopFailure {
                        reason: e.to_string(),
                    });
                }
            }

            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("stop requested during idle, leaving live loop");
                    return Ok(());
                }
                () = sleep(self.config.observing_interval) => {}
            }
        }
    }

    /// One full live iteration: loop the read/admit/fence state machine
    /// until the chain is drained, then sweep unresolvables.
    ///
    /// Returns the number of records consolidated into the transaction
    /// store. Public so tests (and the binary's one-shot mode) can drive
    /// iterations without the scheduler.
    ///
    /// # Errors
    ///
    /// Surfaces store outages and unexpected chain failures; an invalid
    /// cursor is handled internally as a reorg.
    pub async fn run_iteration(&self) -> Result<usize> {
        let mut consolidated = 0usize;

        loop {
            consolidated += self.consolidate().await?;

            let cursor = self.current_cursor().await?;
            debug!(?cursor, "live read");

            let mut more = false;
            let mut reorg_detected = false;

            match self.chain.read(cursor).await {
                Ok(result) => {
                    more = result.more_transactions;

                    let admitted = self.limiter.admit(result.transactions);
                    for record in admitted {
                        self.enqueue_and_spawn(TransactionUnderProcessing::new(record))
                            .await;
                    }

                    self.wait_for_capacity().await;

                    if self.any_errored() {
                        warn!("errored entry detected, fencing pipeline");
                        self.drain_in_flight().await;
                        consolidated += self.consolidate().await?;
                        self.discard_pipeline();
                        // Cursor re-derives from storage next pass.
                    }
                }
                Err(e) if e.is_invalid_cursor() => {
                    reorg_detected = self.handle_invalid_cursor(cursor, &mut consolidated).await?;
                }
                Err(e) => return Err(e),
            }

            if !(more || reorg_detected) {
                break;
            }
        }

        // Let the tail of the pipeline finish before sweeping retries.
        self.drain_in_flight().await;
        consolidated += self.consolidate().await?;

        self.sweep_unresolvable().await?;
        self.drain_in_flight().await;
        consolidated += self.consolidate().await?;

        Ok(consolidated)
    }

    /// Persist the consecutive `Processed` prefix of the queue, in order.
    async fn consolidate(&self) -> Result<usize> {
        let ready: Vec<_> = {
            let mut queue = self.under_processing.lock();
            let mut drained = Vec::new();
            while let Some(front) = queue.front() {
                if front.status() == ProcessingStatus::Processed {
                    // Queue is non-empty here, pop cannot fail.
                    if let Some(entry) = queue.pop_front() {
                        drained.push(entry);
                    }
                } else {
                    break;
                }
            }
            drained
        };

        for entry in &ready {
            self.transaction_store
                .add_transaction(entry.record.clone())
                .await?;
        }

        if !ready.is_empty() {
            counter!("observer_transactions_persisted_total").increment(ready.len() as u64);
            debug!(count = ready.len(), "consolidated processed transactions");
        }

        Ok(ready.len())
    }

    /// The cursor for the next read: the last admitted entry if the
    /// pipeline is non-empty, otherwise the last persisted record.
    async fn current_cursor(&self) -> Result<Option<Cursor>> {
        if let Some(entry) = self.under_processing.lock().back() {
            return Ok(Some(entry.record.cursor()));
        }

        Ok(self
            .transaction_store
            .get_last_transaction()
            .await?
            .map(|record| record.cursor()))
    }

    /// Append an entry and spawn its processing task.
    ///
    /// Acquiring a download slot here bounds the number of concurrently
    /// `Processing` entries to `max_concurrent_downloads`.
    async fn enqueue_and_spawn(&self, entry: Arc<TransactionUnderProcessing>) {
        // Closed only on runtime teardown.
        let Ok(permit) = Arc::clone(&self.download_slots).acquire_owned().await else {
            return;
        };

        self.under_processing.lock().push_back(Arc::clone(&entry));
        #[allow(clippy::cast_precision_loss)]
        gauge!("observer_in_flight").set(self.in_flight_count() as f64);

        let versions = Arc::clone(&self.versions);
        let unresolvable_store = Arc::clone(&self.unresolvable_store);

        tokio::spawn(async move {
            let _permit = permit;
            let record = &entry.record;
            let handle = versions.resolve(record.transaction_time);

            match handle.processor.process_transaction(record).await {
                Ok(true) => {
                    // Best-effort cleanup; the record may not be tracked.
                    if let Err(e) = unresolvable_store
                        .remove_unresolvable_transaction(record)
                        .await
                    {
                        warn!(
                            transaction_number = %record.transaction_number,
                            error = %e,
                            "failed to clear unresolvable entry"
                        );
                    }
                    entry.set_status(ProcessingStatus::Processed);
                }
                Ok(false) => {
                    warn!(
                        transaction_number = %record.transaction_number,
                        "record unresolvable, scheduling retry"
                    );
                    match unresolvable_store
                        .record_unresolvable_transaction_fetch_attempt(record)
                        .await
                    {
                        // The anchor was observed; only its data is pending.
                        Ok(()) => entry.set_status(ProcessingStatus::Processed),
                        Err(e) => {
                            error!(
                                transaction_number = %record.transaction_number,
                                error = %e,
                                "unresolvable store outage"
                            );
                            entry.set_status(ProcessingStatus::Error);
                        }
                    }
                }
                Err(e) => {
                    error!(
                        transaction_number = %record.transaction_number,
                        error = %e,
                        "fatal processing error"
                    );
                    entry.set_status(ProcessingStatus::Error);
                }
            }
        });
    }

    /// Entries still in the `Processing` state.
    fn in_flight_count(&self) -> usize {
        self.under_processing
            .lock()
            .iter()
            .filter(|e| e.status() == ProcessingStatus::Processing)
            .count()
    }

    /// Whether any entry ended in the `Error` state.
    fn any_errored(&self) -> bool {
        self.under_processing
            .lock()
            .iter()
            .any(|e| e.status() == ProcessingStatus::Error)
    }

    /// Wait until in-flight work is back at or below the concurrency cap.
    async fn wait_for_capacity(&self) {
        while self.in_flight_count() > self.config.max_concurrent_downloads {
            sleep(self.config.backpressure_poll_interval).await;
        }
    }

    /// Wait until nothing is in flight.
    async fn drain_in_flight(&self) {
        while self.in_flight_count() > 0 {
            sleep(self.config.backpressure_poll_interval).await;
        }
        gauge!("observer_in_flight").set(0.0);
    }

    /// Discard the whole under-processing sequence.
    fn discard_pipeline(&self) {
        let discarded = {
            let mut queue = self.under_processing.lock();
            let len = queue.len();
            queue.clear();
            len
        };
        if discarded > 0 {
            warn!(discarded, "discarded under-processing sequence");
        }
    }

    /// Handle cursor invalidation: rewind if the chain is actually ahead of
    /// the cursor, otherwise just idle (the serving node is behind).
    ///
    /// Returns whether a rewind ran (forcing another iteration).
    async fn handle_invalid_cursor(
        &self,
        cursor: Option<Cursor>,
        consolidated: &mut usize,
    ) -> Result<bool> {
        let Some(cursor) = cursor else {
            // No cursor, nothing to invalidate; treat as an empty read.
            return Ok(false);
        };

        let tip = self.chain.get_latest_time().await?;
        if cursor.transaction_time > tip.height {
            info!(
                cursor_block = %cursor.transaction_time,
                tip = %tip.height,
                "chain client behind cursor, idling until it catches up"
            );
            return Ok(false);
        }

        warn!(
            transaction_number = %cursor.transaction_number,
            "cursor invalidated, rewinding"
        );

        // Quiesce before touching the stores.
        self.drain_in_flight().await;
        *consolidated += self.consolidate().await?;
        self.discard_pipeline();

        self.reorg.revert_to_last_valid().await?;
        Ok(true)
    }

    /// Re-enqueue unresolvable records whose backoff has elapsed.
    async fn sweep_unresolvable(&self) -> Result<()> {
        let due = self
            .unresolvable_store
            .get_unresolvable_transactions_due_for_retry(self.config.unresolvable_retry_limit)
            .await?;

        if due.is_empty() {
            return Ok(());
        }

        info!(count = due.len(), "sweeping unresolvable transactions");
        for record in due {
            self.enqueue_and_spawn(TransactionUnderProcessing::new(record))
                .await;
        }

        Ok(())
    }
}
