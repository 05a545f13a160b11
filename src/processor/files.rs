//! CAS file schemas referenced by an anchor.
//!
//! An anchor points at a Core Index File, which may reference a Provisional
//! Index File, which in turn references Chunk Files carrying deltas. Only
//! the structure needed to walk that chain and group operations is modeled;
//! operation payloads themselves stay opaque.

use serde::{Deserialize, Serialize};

/// The file an anchor string points at directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreIndexFile {
    /// URI of the Provisional Index File, when the batch carries deltas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisional_index_file_uri: Option<String>,
    /// URI of the Core Proof File, when the batch carries recoveries or
    /// deactivations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_proof_file_uri: Option<String>,
    /// Operations declared by this batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<CoreOperations>,
}

/// Operation references in the Core Index File.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreOperations {
    /// Create operations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub create: Vec<OperationEntry>,
    /// Recover operations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recover: Vec<OperationEntry>,
    /// Deactivate operations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deactivate: Vec<OperationEntry>,
}

/// One operation reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationEntry {
    /// Unique suffix of the DID the operation applies to.
    pub did_suffix: String,
    /// Remaining fields (suffix data, reveal values) kept opaque.
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Second file in the chain: update operations and chunk references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionalIndexFile {
    /// Chunk files carrying the batch's deltas, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<ChunkEntry>,
    /// URI of the Provisional Proof File.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisional_proof_file_uri: Option<String>,
    /// Update operations declared by this batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<ProvisionalOperations>,
}

/// Operation references in the Provisional Index File.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionalOperations {
    /// Update operations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update: Vec<OperationEntry>,
}

/// Reference to one chunk file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEntry {
    /// CAS URI of the chunk file.
    pub chunk_file_uri: String,
}

/// A chunk file: the deltas for create, recover, and update operations, in
/// that order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkFile {
    /// Opaque operation deltas.
    #[serde(default)]
    pub deltas: Vec<serde_json::Value>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
