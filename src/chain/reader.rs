//! Alloy-backed chain reader for the anchor contract.
//!
//! Translates block ranges into chronologically ordered anchor records:
//! fetches logs, decodes the anchor event, and (unless fast mode is
//! requested) annotates records with header timestamps and receipt-derived
//! fees. Block-header timestamps are cached: they are immutable once a block
//! is canonical, and one anchor-dense block would otherwise trigger a header
//! lookup per record.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::primitives::{Address, B256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use moka::future::Cache as MokaCache;
use tracing::{debug, instrument, warn};

use crate::abi::Anchor;
use crate::error::{ChainError, Result};
use crate::ports::RangeOptions;
use crate::types::{AnchorRecord, AnchorString, BlockHeight, ChainTime, TransactionNumber};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default deadline for individual RPC requests.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of block timestamps to cache.
const BLOCK_CACHE_MAX_CAPACITY: u64 = 10_000;

/// Time-to-live for cached block timestamps.
const BLOCK_CACHE_TTL: Duration = Duration::from_secs(3600);

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN READER
// ═══════════════════════════════════════════════════════════════════════════════

/// Reads and decodes anchor events from the ledger.
///
/// # Type Parameters
///
/// * `P` - The provider type (must implement `Provider`)
pub struct ChainReader<P> {
    /// RPC provider for ledger access (Alloy).
    provider: Arc<P>,
    /// The anchor contract being observed.
    contract_address: Address,
    /// Advisory ceiling for a single range request.
    max_batch_size: u64,
    /// Deadline applied to each RPC request.
    request_timeout: Duration,
    /// Cache of block timestamps, keyed by height.
    block_cache: MokaCache<u64, DateTime<Utc>>,
}

impl<P> std::fmt::Debug for ChainReader<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainReader")
            .field("contract_address", &self.contract_address)
            .field("max_batch_size", &self.max_batch_size)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl<P> ChainReader<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    /// Create a new chain reader for the given anchor contract.
    pub fn new(provider: Arc<P>, contract_address: Address, max_batch_size: u64) -> Self {
        let block_cache = MokaCache::builder()
            .max_capacity(BLOCK_CACHE_MAX_CAPACITY)
            .time_to_live(BLOCK_CACHE_TTL)
            .build();

        Self {
            provider,
            contract_address,
            max_batch_size,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            block_cache,
        }
    }

    /// Override the per-request RPC deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Run one RPC call under the configured deadline.
    ///
    /// Timeouts surface as [`ChainError::Timeout`], which the paginator
    /// treats as transient.
    async fn rpc<T, E, F>(&self, what: &str, call: F) -> Result<T>
    where
        F: IntoFuture<Output = std::result::Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match tokio::time::timeout(self.request_timeout, call.into_future()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ChainError::Rpc(Box::new(e)).into()),
            Err(_) => Err(ChainError::Timeout(what.into()).into()),
        }
    }

    /// The current chain tip.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC provider fails or the tip block vanishes
    /// between the height and header lookups.
    pub async fn get_latest_time(&self) -> Result<ChainTime> {
        let height = self
            .rpc("eth_blockNumber", self.provider.get_block_number())
            .await?;

        let block = self
            .rpc(
                "eth_getBlockByNumber",
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(height)),
            )
            .await?
            .ok_or(ChainError::BlockNotFound(height))?;

        Ok(ChainTime {
            height: BlockHeight::new(height),
            hash: block.header.hash,
        })
    }

    /// Chronologically ordered anchor records in `[from, to]`.
    ///
    /// Ordering is by `transaction_number`, with log position within a block
    /// breaking ties during decoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC provider fails or a log cannot be decoded.
    #[instrument(skip(self, options), fields(from = %from, to = %to))]
    pub async fn get_range(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        options: RangeOptions,
    ) -> Result<Vec<AnchorRecord>> {
        let span = to.value().saturating_sub(from.value());
        if span > self.max_batch_size {
            // Advisory only: the provider may still serve the range.
            warn!(
                span,
                max = self.max_batch_size,
                "range exceeds maximum batch size"
            );
        }

        let filter = options
            .filter
            .clone()
            .unwrap_or_else(|| Filter::new().event_signature(Anchor::SIGNATURE_HASH))
            .address(self.contract_address)
            .from_block(from.value())
            .to_block(to.value());

        let mut logs = self
            .rpc("eth_getLogs", self.provider.get_logs(&filter))
            .await?;

        // Deterministic ordering before decoding
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        let mut records = logs
            .iter()
            .map(decode_anchor_log)
            .collect::<Result<Vec<_>>>()?;

        if !options.omit_timestamp {
            // Annotate concurrently; the header cache absorbs repeats.
            let annotations = join_all(
                records
                    .iter()
                    .zip(logs.iter())
                    .map(|(record, log)| self.annotate(log, record)),
            )
            .await;

            for (record, annotation) in records.iter_mut().zip(annotations) {
                let (timestamp, fee, normalized) = annotation?;
                record.transaction_timestamp = Some(timestamp);
                record.transaction_fee_paid = fee;
                record.normalized_transaction_fee = normalized;
            }
        }

        records.sort_by_key(|r| r.transaction_number);
        debug!(count = records.len(), "decoded anchor records");

        Ok(records)
    }

    /// Canonical hash of the block at `height`, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC provider fails.
    pub async fn get_block_hash(&self, height: BlockHeight) -> Result<Option<B256>> {
        let block = self
            .rpc(
                "eth_getBlockByNumber",
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(height.value())),
            )
            .await?;

        Ok(block.map(|b| b.header.hash))
    }

    /// Resolve a block hash to its height; `None` if the hash is not on the
    /// canonical chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC provider fails.
    pub async fn get_block_number_by_hash(&self, hash: B256) -> Result<Option<BlockHeight>> {
        let block = self
            .rpc("eth_getBlockByHash", self.provider.get_block_by_hash(hash))
            .await?;

        Ok(block.map(|b| BlockHeight::new(b.header.number)))
    }

    /// Reorg probe: the first candidate whose `(height, hash)` pair still
    /// matches the canonical chain.
    ///
    /// Candidates are checked in the order given (the transaction store
    /// supplies them newest-first).
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC provider fails.
    pub async fn get_first_valid_transaction(
        &self,
        candidates: &[AnchorRecord],
    ) -> Result<Option<AnchorRecord>> {
        for candidate in candidates {
            let canonical = self.get_block_hash(candidate.transaction_time).await?;
            if canonical == Some(candidate.transaction_time_hash) {
                return Ok(Some(candidate.clone()));
            }
        }
        Ok(None)
    }

    /// Find the block the anchor contract was deployed at by binary search
    /// over `eth_getCode`.
    ///
    /// This costs O(log N) RPC calls; operator configuration is preferred.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::DeploymentNotFound`] if the contract has no code
    /// even at the tip.
    #[instrument(skip(self))]
    pub async fn find_deployment_block(&self) -> Result<BlockHeight> {
        let tip = self.get_latest_time().await?.height;

        if !self.has_code_at(tip).await? {
            return Err(ChainError::DeploymentNotFound(self.contract_address).into());
        }

        warn!(
            contract = %self.contract_address,
            "deployment block not configured; probing via getCode binary search"
        );

        let mut low = 0u64;
        let mut high = tip.value();
        while low < high {
            let mid = low + (high - low) / 2;
            if self.has_code_at(BlockHeight::new(mid)).await? {
                high = mid;
            } else {
                low = mid + 1;
            }
        }

        debug!(block = low, "deployment block located");
        Ok(BlockHeight::new(low))
    }

    /// Whether the contract has code at the given height.
    async fn has_code_at(&self, height: BlockHeight) -> Result<bool> {
        let code = self
            .rpc(
                "eth_getCode",
                self.provider
                    .get_code_at(self.contract_address)
                    .block_id(BlockId::number(height.value())),
            )
            .await?;

        Ok(!code.is_empty())
    }

    /// Timestamp and fee annotation for one decoded record.
    async fn annotate(
        &self,
        log: &Log,
        record: &AnchorRecord,
    ) -> Result<(DateTime<Utc>, u64, u64)> {
        let timestamp = self.block_timestamp(record.transaction_time).await?;
        let (fee, normalized) = self.transaction_fee(log, record).await?;
        Ok((timestamp, fee, normalized))
    }

    /// Block timestamp for `height`, served from cache when possible.
    async fn block_timestamp(&self, height: BlockHeight) -> Result<DateTime<Utc>> {
        if let Some(cached) = self.block_cache.get(&height.value()).await {
            return Ok(cached);
        }

        let block = self
            .rpc(
                "eth_getBlockByNumber",
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(height.value())),
            )
            .await?
            .ok_or(ChainError::BlockNotFound(height.value()))?;

        // Block timestamps stay within i64 until year 292 billion
        #[allow(clippy::cast_possible_wrap)]
        let timestamp = DateTime::<Utc>::from_timestamp(block.header.timestamp as i64, 0)
            .ok_or_else(|| {
                ChainError::LogDecoding(format!("invalid timestamp {}", block.header.timestamp))
            })?;

        self.block_cache.insert(height.value(), timestamp).await;
        Ok(timestamp)
    }

    /// Fee paid by the anchoring transaction and its per-operation
    /// normalization. Falls back to zero if the receipt is unavailable.
    async fn transaction_fee(&self, log: &Log, record: &AnchorRecord) -> Result<(u64, u64)> {
        let Some(tx_hash) = log.transaction_hash else {
            return Ok((0, 0));
        };

        let receipt = self
            .rpc(
                "eth_getTransactionReceipt",
                self.provider.get_transaction_receipt(tx_hash),
            )
            .await?;

        let Some(receipt) = receipt else {
            debug!(%tx_hash, "receipt not available, fee left at zero");
            return Ok((0, 0));
        };

        let fee_wei = u128::from(receipt.gas_used) * receipt.effective_gas_price;
        let fee = u64::try_from(fee_wei).unwrap_or(u64::MAX);
        let operations = record.anchor_string.number_of_operations().max(1);

        Ok((fee, fee / operations))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOG DECODING
// ═══════════════════════════════════════════════════════════════════════════════

/// Decode one raw anchor log into a record.
///
/// Timestamps and fees are left unset; the reader annotates them separately
/// so fast mode can skip the extra lookups.
///
/// # Errors
///
/// Returns [`ChainError::LogDecoding`] if required log fields are missing or
/// the event payload does not decode.
pub fn decode_anchor_log(log: &Log) -> Result<AnchorRecord> {
    let block_number = log
        .block_number
        .ok_or_else(|| ChainError::LogDecoding("log missing block_number".into()))?;
    let block_hash = log
        .block_hash
        .ok_or_else(|| ChainError::LogDecoding("log missing block_hash".into()))?;

    let event = Anchor::decode_log(&log.inner)
        .map_err(|e| ChainError::LogDecoding(format!("anchor event: {e}")))?;

    let number_of_operations = u64::try_from(event.numberOfOperations)
        .map_err(|_| ChainError::LogDecoding("numberOfOperations exceeds u64".into()))?;
    let transaction_number = u64::try_from(event.transactionNumber)
        .map_err(|_| ChainError::LogDecoding("transactionNumber exceeds u64".into()))?;

    Ok(AnchorRecord {
        transaction_number: TransactionNumber::new(transaction_number),
        transaction_time: BlockHeight::new(block_number),
        transaction_time_hash: block_hash,
        anchor_string: AnchorString::from_hash(number_of_operations, &event.anchorFileHash),
        writer: event.writer,
        transaction_fee_paid: 0,
        normalized_transaction_fee: 0,
        transaction_timestamp: None,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
