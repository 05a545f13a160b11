//! Historical catch-up: batched, rate-limited walk from the resume point to
//! the startup chain tip.
//!
//! Records are processed and persisted strictly in `transaction_number`
//! order. A logical processing failure records an unresolvable-fetch
//! attempt and the walk continues; a fatal processor error aborts the walk,
//! and the next start resumes from the persisted prefix via cursor recovery.

use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use parking_lot::RwLock;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::chain::Paginator;
use crate::error::Result;
use crate::ports::{RangeOptions, TransactionStore, UnresolvableTransactionStore};
use crate::types::{AnchorRecord, BlockHeight, SyncState};
use crate::versions::VersionRegistry;

/// Drives the historical sync phase.
pub struct HistoricalSync {
    paginator: Paginator,
    transaction_store: Arc<dyn TransactionStore>,
    unresolvable_store: Arc<dyn UnresolvableTransactionStore>,
    versions: Arc<VersionRegistry>,
    /// Blocks walked per batch.
    batch_size: u64,
    /// Sleep between batches.
    rate_limit_delay: Duration,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for HistoricalSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoricalSync")
            .field("batch_size", &self.batch_size)
            .field("rate_limit_delay", &self.rate_limit_delay)
            .finish_non_exhaustive()
    }
}

impl HistoricalSync {
    /// Create a historical sync loop.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        paginator: Paginator,
        transaction_store: Arc<dyn TransactionStore>,
        unresolvable_store: Arc<dyn UnresolvableTransactionStore>,
        versions: Arc<VersionRegistry>,
        batch_size: u64,
        rate_limit_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            paginator,
            transaction_store,
            unresolvable_store,
            versions,
            batch_size,
            rate_limit_delay,
            shutdown,
        }
    }

    /// Walk `[last_synced_block, target_block]` in batches.
    ///
    /// The shared state is advanced after each batch so the progress monitor
    /// sees live numbers. Returns early (without error) when the stop flag
    /// is set between batches; the in-flight batch completes first.
    ///
    /// # Errors
    ///
    /// Surfaces paginator failures (after their retry budget) and fatal
    /// processor errors.
    #[instrument(skip(self, state))]
    pub async fn run(&self, state: &Arc<RwLock<SyncState>>) -> Result<()> {
        let (mut current, target) = {
            let s = state.read();
            (s.last_synced_block, s.target_block)
        };

        info!(from = %current, %target, "starting historical sync");

        while current <= target {
            if self.shutdown.is_cancelled() {
                info!(%current, "stop requested, leaving historical sync");
                return Ok(());
            }

            let batch_end = BlockHeight::new(
                current
                    .value()
                    .saturating_add(self.batch_size)
                    .min(target.value()),
            );

            let records = self
                .paginator
                .get_range(current, batch_end, RangeOptions::default())
                .await?;

            for record in records {
                self.process_record(record).await?;
            }

            {
                let mut s = state.write();
                s.last_synced_block = batch_end;
                debug_assert!(s.is_consistent());
            }

            #[allow(clippy::cast_precision_loss)]
            gauge!("observer_last_synced_block").set(batch_end.value() as f64);
            info!(
                synced = %batch_end,
                %target,
                progress = format!(
                    "{:.1}%",
                    state.read().progress_percent()
                ),
                "historical batch complete"
            );

            if batch_end == target {
                break;
            }
            current = batch_end.next();

            sleep(self.rate_limit_delay).await;
        }

        {
            let mut s = state.write();
            s.last_synced_block = target;
            s.is_complete = true;
        }
        info!(%target, "historical sync complete");

        Ok(())
    }

    /// Dispatch one record to its version's processor and persist the
    /// outcome.
    async fn process_record(&self, record: AnchorRecord) -> Result<()> {
        let handle = self.versions.resolve(record.transaction_time);

        // A thrown error is fatal and aborts the walk via `?`.
        let processed = handle.processor.process_transaction(&record).await?;

        if processed {
            // Best-effort: the record may never have been unresolvable.
            if let Err(e) = self
                .unresolvable_store
                .remove_unresolvable_transaction(&record)
                .await
            {
                warn!(
                    transaction_number = %record.transaction_number,
                    error = %e,
                    "failed to clear unresolvable entry"
                );
            }
            self.transaction_store.add_transaction(record).await?;
        } else {
            warn!(
                transaction_number = %record.transaction_number,
                "record unresolvable, scheduling retry"
            );
            self.unresolvable_store
                .record_unresolvable_transaction_fetch_attempt(&record)
                .await?;
        }

        Ok(())
    }
}
