//! Anchored DID operations handed to the operation store.
//!
//! The operation wire format is out of scope here: payloads stay opaque JSON.
//! What the store needs for ordering and reorg rollback is the anchoring
//! coordinates (transaction number/time) plus the position within the batch.

use serde::{Deserialize, Serialize};

use super::primitives::{BlockHeight, TransactionNumber};

/// Kind of DID operation, as declared by the index files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Creates a new DID.
    Create,
    /// Updates an existing DID's state.
    Update,
    /// Recovers a DID with a new key set.
    Recover,
    /// Permanently deactivates a DID.
    Deactivate,
}

/// One operation extracted from a processed anchor batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchoredOperation {
    /// Unique suffix of the DID the operation applies to.
    pub did_suffix: String,
    /// Operation kind.
    pub kind: OperationKind,
    /// Transaction number of the anchoring record.
    pub transaction_number: TransactionNumber,
    /// Block height of the anchoring record.
    pub transaction_time: BlockHeight,
    /// Position of the operation within its anchor batch.
    pub operation_index: u32,
    /// Opaque operation payload (delta, suffix data, proofs).
    pub payload: serde_json::Value,
}
