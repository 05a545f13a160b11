//! The `ChainClient` capability implemented over the alloy chain reader.
//!
//! The adapter adds cursor semantics on top of range reads: a cursor is
//! validated by resolving its block hash against the canonical chain, and an
//! incremental `read` scans one pagination window past it. Stale hashes
//! surface as `InvalidCursor`, the live loop's reorg signal.

use std::sync::Arc;

use alloy::primitives::B256;
use alloy::providers::Provider;
use async_trait::async_trait;
use tracing::debug;

use super::reader::ChainReader;
use crate::error::{ChainError, Result};
use crate::ports::{ChainClient, RangeOptions, ReadResult};
use crate::types::{AnchorRecord, BlockHeight, ChainTime, Cursor};

/// Alloy-backed implementation of the [`ChainClient`] capability.
pub struct EvmChainClient<P> {
    reader: ChainReader<P>,
    deployment_block: BlockHeight,
    /// Blocks scanned per incremental `read`.
    read_window: u64,
}

impl<P> std::fmt::Debug for EvmChainClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmChainClient")
            .field("deployment_block", &self.deployment_block)
            .field("read_window", &self.read_window)
            .finish_non_exhaustive()
    }
}

impl<P> EvmChainClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    /// Create a new chain client.
    ///
    /// `read_window` bounds how many blocks one incremental `read` scans;
    /// the pagination default batch size is the natural choice.
    pub const fn new(
        reader: ChainReader<P>,
        deployment_block: BlockHeight,
        read_window: u64,
    ) -> Self {
        Self {
            reader,
            deployment_block,
            read_window,
        }
    }

    /// The underlying reader.
    pub const fn reader(&self) -> &ChainReader<P> {
        &self.reader
    }

    /// The deployment block reads start from when no cursor is given.
    #[must_use]
    pub const fn deployment_block(&self) -> BlockHeight {
        self.deployment_block
    }

    /// Resolve a cursor to the height its records were anchored at.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::InvalidCursor`] when the cursor's hash is no
    /// longer canonical.
    async fn resolve_cursor(&self, cursor: &Cursor) -> Result<BlockHeight> {
        match self
            .reader
            .get_block_number_by_hash(cursor.transaction_time_hash)
            .await?
        {
            Some(height) => Ok(height),
            None => Err(ChainError::InvalidCursor {
                transaction_number: cursor.transaction_number.value(),
                transaction_time_hash: cursor.transaction_time_hash,
            }
            .into()),
        }
    }
}

#[async_trait]
impl<P> ChainClient for EvmChainClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn get_latest_time(&self) -> Result<ChainTime> {
        self.reader.get_latest_time().await
    }

    async fn read(&self, cursor: Option<Cursor>) -> Result<ReadResult> {
        let tip = self.reader.get_latest_time().await?;

        let mut from = match &cursor {
            None => self.deployment_block,
            Some(c) => self.resolve_cursor(c).await?,
        };

        if from > tip.height {
            // The serving node lags the height the cursor was built against.
            debug!(%from, tip = %tip.height, "chain client behind cursor, idling");
            return Ok(ReadResult::default());
        }

        // Scan forward one window at a time until anchors show up or the tip
        // is reached, so empty regions never stall the cursor.
        loop {
            let to = BlockHeight::new(
                from.value()
                    .saturating_add(self.read_window)
                    .min(tip.height.value()),
            );

            let mut transactions = self
                .reader
                .get_range(from, to, RangeOptions::default())
                .await?;

            if let Some(c) = &cursor {
                transactions.retain(|r| r.transaction_number > c.transaction_number);
            }

            // "More" means the scan stopped short of the tip. Spurious
            // values either way are tolerated by the live loop.
            if !transactions.is_empty() || to == tip.height {
                return Ok(ReadResult {
                    more_transactions: to < tip.height,
                    transactions,
                });
            }

            from = to.next();
        }
    }

    async fn get_range(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        options: RangeOptions,
    ) -> Result<Vec<AnchorRecord>> {
        self.reader.get_range(from, to, options).await
    }

    async fn get_first_valid_transaction(
        &self,
        candidates: &[AnchorRecord],
    ) -> Result<Option<AnchorRecord>> {
        self.reader.get_first_valid_transaction(candidates).await
    }

    async fn get_block_number_by_hash(&self, hash: B256) -> Result<Option<BlockHeight>> {
        self.reader.get_block_number_by_hash(hash).await
    }
}

// Convenience constructor used by the binary.
impl<P> EvmChainClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    /// Build a client, discovering the deployment block when not configured.
    ///
    /// # Errors
    ///
    /// Returns an error if deployment-block discovery fails.
    pub async fn bootstrap(
        provider: Arc<P>,
        contract_address: alloy::primitives::Address,
        configured_deployment: Option<u64>,
        max_batch_size: u64,
        read_window: u64,
        request_timeout: std::time::Duration,
    ) -> Result<Self> {
        let reader = ChainReader::new(provider, contract_address, max_batch_size)
            .with_request_timeout(request_timeout);

        let deployment_block = match configured_deployment {
            Some(block) => BlockHeight::new(block),
            None => reader.find_deployment_block().await?,
        };

        Ok(Self::new(reader, deployment_block, read_window))
    }
}
