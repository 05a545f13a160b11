//! Range pagination with per-sub-range retry.
//!
//! Any requested span is split into contiguous sub-ranges of at most
//! `default_batch_size` blocks, fetched sequentially. Each sub-range gets up
//! to `max_retries` attempts with linear backoff; a sub-range whose final
//! attempt fails aborts the walk with that error. Records fetched before the
//! failure have already been handed to the caller in order, so a restart
//! resumes from the persisted prefix.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::error::{ObserverError, Result};
use crate::ports::{ChainClient, RangeOptions};
use crate::types::{AnchorRecord, BlockHeight};

/// Paginator configuration.
#[derive(Debug, Clone, Copy)]
pub struct PaginatorConfig {
    /// Blocks per sub-range request. Must be non-zero and at most
    /// `max_batch_size`.
    pub default_batch_size: u64,
    /// Advisory ceiling for a single request.
    pub max_batch_size: u64,
    /// Attempts per sub-range.
    pub max_retries: u32,
    /// Base delay for linear backoff (`retry_delay × attempt`).
    pub retry_delay: Duration,
}

/// Splits large range reads and retries transient failures.
#[derive(Clone)]
pub struct Paginator {
    chain: Arc<dyn ChainClient>,
    config: PaginatorConfig,
}

impl std::fmt::Debug for Paginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Paginator {
    /// Create a new paginator over a chain client.
    #[must_use]
    pub fn new(chain: Arc<dyn ChainClient>, config: PaginatorConfig) -> Self {
        debug_assert!(config.default_batch_size > 0);
        debug_assert!(config.default_batch_size <= config.max_batch_size);
        Self { chain, config }
    }

    /// Fetch all anchor records in `[from, to]`, walking sub-ranges in order.
    ///
    /// # Errors
    ///
    /// Surfaces the last error of the first sub-range that exhausts its
    /// retry budget. Non-transient errors (invalid cursor) are never retried.
    #[instrument(skip(self, options), fields(from = %from, to = %to))]
    pub async fn get_range(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        options: RangeOptions,
    ) -> Result<Vec<AnchorRecord>> {
        let mut records = Vec::new();
        let mut current = from;

        while current <= to {
            let sub_to = BlockHeight::new(
                current
                    .value()
                    .saturating_add(self.config.default_batch_size - 1)
                    .min(to.value()),
            );

            let batch = self
                .fetch_with_retries(current, sub_to, options.clone())
                .await?;
            records.extend(batch);

            current = sub_to.next();
        }

        Ok(records)
    }

    /// Fetch one sub-range, retrying transient failures with linear backoff.
    async fn fetch_with_retries(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        options: RangeOptions,
    ) -> Result<Vec<AnchorRecord>> {
        let attempts = self.config.max_retries.max(1);

        for attempt in 1..=attempts {
            match self.chain.get_range(from, to, options.clone()).await {
                Ok(batch) => {
                    debug!(%from, %to, attempt, count = batch.len(), "sub-range fetched");
                    return Ok(batch);
                }
                Err(err) => {
                    let retryable = match &err {
                        ObserverError::Chain(chain_err) => chain_err.is_transient(),
                        _ => false,
                    };

                    if !retryable || attempt == attempts {
                        warn!(%from, %to, attempt, error = %err, "sub-range failed");
                        return Err(err);
                    }

                    let backoff = self.config.retry_delay * attempt;
                    warn!(%from, %to, attempt, ?backoff, error = %err, "retrying sub-range");
                    sleep(backoff).await;
                }
            }
        }

        unreachable!("retry loop always returns")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
