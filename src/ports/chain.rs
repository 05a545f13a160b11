//! Chain-client capability consumed by the observer.
//!
//! The observer binds to this behavior, never to a concrete RPC client
//! shape. The alloy-backed adapter lives in [`crate::chain`]; tests use
//! scripted mocks.

use alloy::primitives::B256;
use alloy::rpc::types::Filter;
use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AnchorRecord, BlockHeight, ChainTime, Cursor};

// ═══════════════════════════════════════════════════════════════════════════════
// RANGE OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Options for explicit-range reads.
#[derive(Debug, Clone, Default)]
pub struct RangeOptions {
    /// Skip block-header and receipt lookups; faster, leaves timestamps and
    /// fees unset.
    pub omit_timestamp: bool,
    /// Pass-through topic/indexed-argument filter. The range bounds of the
    /// filter are overridden by the requested range.
    pub filter: Option<Filter>,
}

impl RangeOptions {
    /// Fast-mode options: no header or receipt lookups.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            omit_timestamp: true,
            filter: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// READ RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a cursor-driven incremental read.
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    /// Whether the chain is believed to hold more anchors after the scanned
    /// window. Callers must tolerate spurious values in either direction:
    /// a spurious `true` costs one empty iteration, a spurious `false`
    /// defers to the next scheduled tick.
    pub more_transactions: bool,
    /// Anchor records found after the cursor, in `transaction_number` order.
    pub transactions: Vec<AnchorRecord>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Capability for reading anchor records from the ledger.
///
/// # Errors
///
/// `read` returns [`crate::error::ChainError::InvalidCursor`] when the
/// cursor's `(transaction_number, transaction_time_hash)` no longer matches
/// the canonical chain — the expected reorg signal.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The current chain tip.
    async fn get_latest_time(&self) -> Result<ChainTime>;

    /// Incremental read of anchors strictly after `cursor`.
    ///
    /// `None` starts from genesis / contract deployment.
    async fn read(&self, cursor: Option<Cursor>) -> Result<ReadResult>;

    /// Chronologically ordered anchors in `[from, to]`.
    ///
    /// Implementations log an advisory when the span exceeds their maximum
    /// batch size but may still succeed.
    async fn get_range(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        options: RangeOptions,
    ) -> Result<Vec<AnchorRecord>>;

    /// Reorg probe: the newest candidate whose `(number, hash)` still
    /// matches the chain, or `None` if none do.
    async fn get_first_valid_transaction(
        &self,
        candidates: &[AnchorRecord],
    ) -> Result<Option<AnchorRecord>>;

    /// Resolve a block hash to its height, `None` if not canonical.
    async fn get_block_number_by_hash(&self, hash: B256) -> Result<Option<BlockHeight>>;
}
