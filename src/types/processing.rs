//! Under-processing entries for the live pipeline.
//!
//! The live loop appends an entry per admitted anchor record, spawns its
//! processing task, and later consolidates consecutive `Processed` entries
//! into the transaction store in order. Status writes are atomic: the single
//! consumer (the consolidator) and the many producers (processing tasks)
//! never need a lock to exchange status.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use super::anchor::AnchorRecord;

// ═══════════════════════════════════════════════════════════════════════════════
// PROCESSING STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle of one under-processing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessingStatus {
    /// The processing task is running (or queued on the runtime).
    Processing = 0,
    /// The processor finished; the entry is ready for consolidation.
    Processed = 1,
    /// The processor threw; the pipeline must fence (see the live loop).
    Error = 2,
}

impl From<u8> for ProcessingStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Processed,
            2 => Self::Error,
            _ => Self::Processing,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION UNDER PROCESSING
// ═══════════════════════════════════════════════════════════════════════════════

/// One anchor record admitted into the concurrent pipeline.
#[derive(Debug)]
pub struct TransactionUnderProcessing {
    /// The record being processed.
    pub record: AnchorRecord,
    status: AtomicU8,
}

impl TransactionUnderProcessing {
    /// Create a new entry in the `Processing` state.
    #[must_use]
    pub fn new(record: AnchorRecord) -> Arc<Self> {
        Arc::new(Self {
            record,
            status: AtomicU8::new(ProcessingStatus::Processing as u8),
        })
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ProcessingStatus {
        self.status.load(Ordering::Acquire).into()
    }

    /// Update the status. Called exactly once per entry by its task.
    pub fn set_status(&self, status: ProcessingStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use alloy::primitives::{Address, B256};

    use super::*;
    use crate::types::{AnchorString, BlockHeight, TransactionNumber};

    fn record(number: u64) -> AnchorRecord {
        AnchorRecord {
            transaction_number: TransactionNumber::new(number),
            transaction_time: BlockHeight::new(number * 10),
            transaction_time_hash: B256::repeat_byte(0x11),
            anchor_string: AnchorString::from_hash(1, &B256::repeat_byte(0x22)),
            writer: Address::ZERO,
            transaction_fee_paid: 0,
            normalized_transaction_fee: 0,
            transaction_timestamp: None,
        }
    }

    #[test]
    fn new_entries_start_processing() {
        let entry = TransactionUnderProcessing::new(record(1));
        assert_eq!(entry.status(), ProcessingStatus::Processing);
    }

    #[test]
    fn status_transitions_are_visible() {
        let entry = TransactionUnderProcessing::new(record(1));

        entry.set_status(ProcessingStatus::Processed);
        assert_eq!(entry.status(), ProcessingStatus::Processed);

        entry.set_status(ProcessingStatus::Error);
        assert_eq!(entry.status(), ProcessingStatus::Error);
    }

    #[test]
    fn status_round_trips_through_u8() {
        for status in [
            ProcessingStatus::Processing,
            ProcessingStatus::Processed,
            ProcessingStatus::Error,
        ] {
            assert_eq!(ProcessingStatus::from(status as u8), status);
        }
    }

    #[test]
    fn status_is_shared_across_clones_of_the_arc() {
        let entry = TransactionUnderProcessing::new(record(2));
        let task_view = Arc::clone(&entry);

        task_view.set_status(ProcessingStatus::Processed);
        assert_eq!(entry.status(), ProcessingStatus::Processed);
    }
}
