//! In-memory implementations of the store capabilities.
//!
//! Used by the binary for ephemeral runs and by the integration tests. The
//! implementations honor the same contracts a database-backed adapter would:
//! concurrency safety, strictly ordered transaction history, and the
//! unresolvable store owning its exponential-backoff retry policy.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::Result;
use crate::ports::{
    Clock, OperationStore, SystemClock, TransactionStore, UnresolvableTransactionStore,
};
use crate::types::{AnchorRecord, AnchoredOperation, OperationKind, TransactionNumber};

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory transaction store, ordered by transaction number.
#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    records: RwLock<Vec<AnchorRecord>>,
}

impl InMemoryTransactionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Snapshot of all records, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<AnchorRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn add_transaction(&self, record: AnchorRecord) -> Result<()> {
        let mut records = self.records.write();
        match records.binary_search_by_key(&record.transaction_number, |r| r.transaction_number) {
            Ok(position) => records[position] = record,
            Err(position) => records.insert(position, record),
        }
        Ok(())
    }

    async fn get_last_transaction(&self) -> Result<Option<AnchorRecord>> {
        Ok(self.records.read().last().cloned())
    }

    async fn remove_transactions_later_than(
        &self,
        number: Option<TransactionNumber>,
    ) -> Result<()> {
        let mut records = self.records.write();
        match number {
            None => records.clear(),
            Some(n) => records.retain(|r| r.transaction_number <= n),
        }
        Ok(())
    }

    async fn get_exponentially_spaced_transactions(&self) -> Result<Vec<AnchorRecord>> {
        let records = self.records.read();
        let len = records.len();

        let mut sample = Vec::new();
        let mut offset = 1usize;
        while offset <= len {
            sample.push(records[len - offset].clone());
            offset = offset.saturating_mul(2);
        }

        Ok(sample)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATION STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory operation store.
#[derive(Debug, Default)]
pub struct InMemoryOperationStore {
    operations: RwLock<Vec<AnchoredOperation>>,
}

impl InMemoryOperationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.read().is_empty()
    }

    /// Operations for one DID, in anchoring order.
    #[must_use]
    pub fn operations_for(&self, did_suffix: &str) -> Vec<AnchoredOperation> {
        let mut ops: Vec<_> = self
            .operations
            .read()
            .iter()
            .filter(|o| o.did_suffix == did_suffix)
            .cloned()
            .collect();
        ops.sort_by_key(|o| (o.transaction_number, o.operation_index));
        ops
    }

    /// Highest source transaction number present, if any.
    #[must_use]
    pub fn max_transaction_number(&self) -> Option<TransactionNumber> {
        self.operations
            .read()
            .iter()
            .map(|o| o.transaction_number)
            .max()
    }
}

#[async_trait]
impl OperationStore for InMemoryOperationStore {
    async fn insert_or_replace(&self, batch: Vec<AnchoredOperation>) -> Result<()> {
        let mut operations = self.operations.write();
        for op in batch {
            operations.retain(|existing| {
                !(existing.did_suffix == op.did_suffix
                    && existing.transaction_number == op.transaction_number
                    && existing.operation_index == op.operation_index)
            });
            operations.push(op);
        }
        Ok(())
    }

    async fn delete(&self, after: Option<TransactionNumber>) -> Result<()> {
        let mut operations = self.operations.write();
        match after {
            None => operations.clear(),
            Some(n) => operations.retain(|o| o.transaction_number <= n),
        }
        Ok(())
    }

    async fn delete_updates_earlier_than(
        &self,
        did_suffix: &str,
        number: TransactionNumber,
    ) -> Result<()> {
        self.operations.write().retain(|o| {
            !(o.did_suffix == did_suffix
                && o.kind == OperationKind::Update
                && o.transaction_number < number)
        });
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNRESOLVABLE TRANSACTION STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Base delay before the first retry of an unresolvable transaction.
const DEFAULT_RETRY_BASE_SECS: i64 = 60;

/// Cap on the backoff exponent to keep the delay arithmetic bounded.
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Debug, Clone)]
struct UnresolvableEntry {
    record: AnchorRecord,
    attempts: u32,
    next_retry: DateTime<Utc>,
}

/// In-memory unresolvable store with exponential-backoff retry scheduling.
pub struct InMemoryUnresolvableStore {
    entries: DashMap<u64, UnresolvableEntry>,
    clock: Arc<dyn Clock>,
    retry_base: ChronoDuration,
}

impl std::fmt::Debug for InMemoryUnresolvableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryUnresolvableStore")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryUnresolvableStore {
    /// Create a store on the system clock with the default backoff base.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store on a custom clock (deterministic tests).
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            retry_base: ChronoDuration::seconds(DEFAULT_RETRY_BASE_SECS),
        }
    }

    /// Override the backoff base.
    #[must_use]
    pub fn with_retry_base(mut self, base: ChronoDuration) -> Self {
        self.retry_base = base;
        self
    }

    /// Number of tracked unresolvable transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no transactions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attempt count for a transaction, if tracked.
    #[must_use]
    pub fn attempts(&self, number: TransactionNumber) -> Option<u32> {
        self.entries.get(&number.value()).map(|e| e.attempts)
    }
}

impl Default for InMemoryUnresolvableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnresolvableTransactionStore for InMemoryUnresolvableStore {
    async fn record_unresolvable_transaction_fetch_attempt(
        &self,
        record: &AnchorRecord,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut entry = self
            .entries
            .entry(record.transaction_number.value())
            .or_insert_with(|| UnresolvableEntry {
                record: record.clone(),
                attempts: 0,
                next_retry: now,
            });

        entry.attempts += 1;
        let exponent = (entry.attempts - 1).min(MAX_BACKOFF_EXPONENT);
        entry.next_retry = now + self.retry_base * 2i32.pow(exponent);

        Ok(())
    }

    async fn remove_unresolvable_transaction(&self, record: &AnchorRecord) -> Result<()> {
        self.entries.remove(&record.transaction_number.value());
        Ok(())
    }

    async fn get_unresolvable_transactions_due_for_retry(
        &self,
        max: usize,
    ) -> Result<Vec<AnchorRecord>> {
        let now = self.clock.now();
        let mut due: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.next_retry <= now)
            .map(|e| e.record.clone())
            .collect();

        due.sort_by_key(|r| r.transaction_number);
        due.truncate(max);
        Ok(due)
    }

    async fn remove_unresolvable_transactions_later_than(
        &self,
        number: Option<TransactionNumber>,
    ) -> Result<()> {
        match number {
            None => self.entries.clear(),
            Some(n) => self.entries.retain(|key, _| *key <= n.value()),
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
