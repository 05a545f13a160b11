//! Scriptable mock collaborators for observer integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use parking_lot::Mutex;

use anchor_observer::error::{ChainError, Result};
use anchor_observer::ports::{
    ChainClient, RangeOptions, ReadResult, TransactionProcessor,
};
use anchor_observer::types::{
    AnchorRecord, AnchorString, BlockHeight, ChainTime, Cursor, TransactionNumber,
};

// ═══════════════════════════════════════════════════════════════════════════════
// RECORD FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

/// Deterministic canonical hash for a block height.
pub fn canonical_hash(height: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&height.to_be_bytes());
    bytes[31] = 0xC0;
    B256::from(bytes)
}

/// A hash that is deliberately not canonical for any height.
pub fn orphaned_hash(height: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&height.to_be_bytes());
    bytes[31] = 0xDE;
    B256::from(bytes)
}

/// An anchor record on the canonical chain.
pub fn make_record(number: u64, height: u64) -> AnchorRecord {
    make_record_with_hash(number, height, B256::repeat_byte(0xAA))
}

/// An anchor record whose anchor string points at `core_file_hash`.
pub fn make_record_with_hash(number: u64, height: u64, core_file_hash: B256) -> AnchorRecord {
    AnchorRecord {
        transaction_number: TransactionNumber::new(number),
        transaction_time: BlockHeight::new(height),
        transaction_time_hash: canonical_hash(height),
        anchor_string: AnchorString::from_hash(10, &core_file_hash),
        writer: Address::repeat_byte(0x05),
        transaction_fee_paid: 21_000,
        normalized_transaction_fee: 2_100,
        transaction_timestamp: None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MOCK CHAIN CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct MockChainState {
    /// Canonical anchors, sorted by transaction number.
    records: Vec<AnchorRecord>,
    /// Chain tip height.
    tip: u64,
    /// Heights whose canonical hash diverged from what records carry.
    reorged_from: Option<u64>,
}

/// Scriptable in-memory chain client.
///
/// Canonical block hashes follow [`canonical_hash`]; calling
/// [`MockChainClient::reorg_from`] makes every hash at or above a height
/// non-canonical, which invalidates cursors built on those blocks.
#[derive(Debug, Default)]
pub struct MockChainClient {
    state: Mutex<MockChainState>,
    /// Every cursor `read` was called with, in order.
    pub read_cursors: Mutex<Vec<Option<Cursor>>>,
}

impl MockChainClient {
    /// A chain with the given anchors and tip.
    pub fn new(records: Vec<AnchorRecord>, tip: u64) -> Arc<Self> {
        let mut records = records;
        records.sort_by_key(|r| r.transaction_number);
        Arc::new(Self {
            state: Mutex::new(MockChainState {
                records,
                tip,
                reorged_from: None,
            }),
            read_cursors: Mutex::new(Vec::new()),
        })
    }

    /// Invalidate canonical hashes at and above `height` and drop the
    /// anchors that lived there (they were orphaned by the reorg).
    pub fn reorg_from(&self, height: u64) {
        let mut state = self.state.lock();
        state.reorged_from = Some(height);
        state
            .records
            .retain(|r| r.transaction_time.value() < height);
    }

    /// Append new anchors (e.g. the replacement branch after a reorg).
    pub fn extend_records(&self, records: Vec<AnchorRecord>) {
        let mut state = self.state.lock();
        state.records.extend(records);
        state.records.sort_by_key(|r| r.transaction_number);
    }

    /// Move the tip.
    pub fn set_tip(&self, tip: u64) {
        self.state.lock().tip = tip;
    }

    fn hash_is_canonical(state: &MockChainState, height: u64, hash: B256) -> bool {
        if state.reorged_from.is_some_and(|from| height >= from) {
            return false;
        }
        hash == canonical_hash(height)
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn get_latest_time(&self) -> Result<ChainTime> {
        let state = self.state.lock();
        Ok(ChainTime {
            height: BlockHeight::new(state.tip),
            hash: canonical_hash(state.tip),
        })
    }

    async fn read(&self, cursor: Option<Cursor>) -> Result<ReadResult> {
        self.read_cursors.lock().push(cursor);

        let state = self.state.lock();
        if let Some(c) = &cursor
            && !Self::hash_is_canonical(&state, c.transaction_time.value(), c.transaction_time_hash)
        {
            return Err(ChainError::InvalidCursor {
                transaction_number: c.transaction_number.value(),
                transaction_time_hash: c.transaction_time_hash,
            }
            .into());
        }

        let after = cursor.map_or(0, |c| c.transaction_number.value() + 1);
        let transactions: Vec<_> = state
            .records
            .iter()
            .filter(|r| r.transaction_number.value() >= after)
            .filter(|r| r.transaction_time.value() <= state.tip)
            .cloned()
            .collect();

        Ok(ReadResult {
            more_transactions: false,
            transactions,
        })
    }

    async fn get_range(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        _options: RangeOptions,
    ) -> Result<Vec<AnchorRecord>> {
        let state = self.state.lock();
        Ok(state
            .records
            .iter()
            .filter(|r| r.transaction_time >= from && r.transaction_time <= to)
            .cloned()
            .collect())
    }

    async fn get_first_valid_transaction(
        &self,
        candidates: &[AnchorRecord],
    ) -> Result<Option<AnchorRecord>> {
        let state = self.state.lock();
        for candidate in candidates {
            if Self::hash_is_canonical(
                &state,
                candidate.transaction_time.value(),
                candidate.transaction_time_hash,
            ) {
                return Ok(Some(candidate.clone()));
            }
        }
        Ok(None)
    }

    async fn get_block_number_by_hash(&self, hash: B256) -> Result<Option<BlockHeight>> {
        // Canonical hashes embed their height (see `canonical_hash`).
        let mut height_bytes = [0u8; 8];
        height_bytes.copy_from_slice(&hash.as_slice()[..8]);
        let height = u64::from_be_bytes(height_bytes);

        let state = self.state.lock();
        if height <= state.tip && Self::hash_is_canonical(&state, height, hash) {
            Ok(Some(BlockHeight::new(height)))
        } else {
            Ok(None)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPTED PROCESSOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Processor with per-transaction scripted outcomes and concurrency
/// accounting.
///
/// Default outcome is success. `fail_times` schedules `Ok(false)` outcomes,
/// `throw_times` schedules `Err` outcomes; counts decrement per attempt so a
/// record can fail once and succeed on retry.
#[derive(Debug, Default)]
pub struct ScriptedProcessor {
    delay: Option<Duration>,
    fails: Mutex<HashMap<u64, u32>>,
    throws: Mutex<HashMap<u64, u32>>,
    current: AtomicUsize,
    max_observed: AtomicUsize,
    processed: Mutex<Vec<u64>>,
}

impl ScriptedProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A processor that holds each record for `delay` (for concurrency
    /// observation).
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    /// Script the next `times` attempts on `number` to return `Ok(false)`.
    pub fn fail_times(&self, number: u64, times: u32) {
        self.fails.lock().insert(number, times);
    }

    /// Script the next `times` attempts on `number` to return `Err`.
    pub fn throw_times(&self, number: u64, times: u32) {
        self.throws.lock().insert(number, times);
    }

    /// Highest number of records observed processing at the same instant.
    pub fn max_concurrent(&self) -> usize {
        self.max_observed.load(Ordering::SeqCst)
    }

    /// Transaction numbers processed (attempts, in completion order).
    pub fn processed(&self) -> Vec<u64> {
        self.processed.lock().clone()
    }

    fn take_scripted(&self, map: &Mutex<HashMap<u64, u32>>, number: u64) -> bool {
        let mut map = map.lock();
        match map.get_mut(&number) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl TransactionProcessor for ScriptedProcessor {
    async fn process_transaction(&self, record: &AnchorRecord) -> Result<bool> {
        let number = record.transaction_number.value();

        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.current.fetch_sub(1, Ordering::SeqCst);
        self.processed.lock().push(number);

        if self.take_scripted(&self.throws, number) {
            return Err(anchor_observer::error::StoreError::Backend(format!(
                "scripted fatal failure for {number}"
            ))
            .into());
        }
        if self.take_scripted(&self.fails, number) {
            return Ok(false);
        }
        Ok(true)
    }
}
