//! Storage capabilities consumed by the observer.
//!
//! All three stores are shared read/write surfaces and must be
//! concurrency-safe. Any failure from these traits is treated as a store
//! outage by the loops (fatal for the current iteration, retried on the next
//! tick without advancing the cursor).
//!
//! Reorg rollback relies on the deletion order operations → unresolvables →
//! transactions: operations without their transaction are recoverable by
//! reprocessing, the converse is not.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AnchorRecord, AnchoredOperation, TransactionNumber};

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Persistence for processed anchor records.
///
/// The observer appends records in strictly increasing `transaction_number`
/// order; the last record doubles as the resume cursor after a restart.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Append a processed record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    async fn add_transaction(&self, record: AnchorRecord) -> Result<()>;

    /// The most recently persisted record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    async fn get_last_transaction(&self) -> Result<Option<AnchorRecord>>;

    /// Remove records with transaction number strictly greater than `number`.
    ///
    /// `None` removes everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    async fn remove_transactions_later_than(
        &self,
        number: Option<TransactionNumber>,
    ) -> Result<()>;

    /// An exponentially spaced sample of past records for the reorg probe:
    /// indices 1, 2, 4, 8, ... from the tail, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    async fn get_exponentially_spaced_transactions(&self) -> Result<Vec<AnchorRecord>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATION STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Persistence for anchored DID operations.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Insert a batch, replacing entries with the same
    /// `(did_suffix, transaction_number, operation_index)` identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    async fn insert_or_replace(&self, operations: Vec<AnchoredOperation>) -> Result<()>;

    /// Delete operations with source transaction number strictly greater
    /// than `after`. `None` deletes everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    async fn delete(&self, after: Option<TransactionNumber>) -> Result<()>;

    /// Delete a DID's update operations anchored strictly before `number`.
    ///
    /// Used by resolvers to compact superseded update chains.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    async fn delete_updates_earlier_than(
        &self,
        did_suffix: &str,
        number: TransactionNumber,
    ) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNRESOLVABLE TRANSACTION STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Persistence for anchors whose off-chain data could not yet be fetched.
///
/// The store owns the due-for-retry policy (exponential backoff with an
/// attempt counter); the observer only drives the sweep.
#[async_trait]
pub trait UnresolvableTransactionStore: Send + Sync {
    /// Record a failed fetch attempt, creating the entry on first failure
    /// and advancing its backoff on subsequent ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    async fn record_unresolvable_transaction_fetch_attempt(
        &self,
        record: &AnchorRecord,
    ) -> Result<()>;

    /// Remove the entry for a now-resolved record. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    async fn remove_unresolvable_transaction(&self, record: &AnchorRecord) -> Result<()>;

    /// Entries whose backoff has elapsed, oldest first, at most `max`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    async fn get_unresolvable_transactions_due_for_retry(
        &self,
        max: usize,
    ) -> Result<Vec<AnchorRecord>>;

    /// Remove entries with transaction number strictly greater than
    /// `number`. `None` removes everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    async fn remove_unresolvable_transactions_later_than(
        &self,
        number: Option<TransactionNumber>,
    ) -> Result<()>;
}
