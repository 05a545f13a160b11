//! Reference transaction processor for protocol version 1.
//!
//! Walks the CAS file chain declared by an anchor — Core Index File,
//! Provisional Index File, Chunk and Proof files — associates deltas with
//! their operations, groups everything by DID suffix, and persists the batch
//! through the operation store.
//!
//! Outcome contract (see [`TransactionProcessor`]): data problems are
//! `Ok(false)` (the record becomes unresolvable and is retried on the
//! store's schedule); only store outages are `Err`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use super::files::{ChunkFile, CoreIndexFile, OperationEntry, ProvisionalIndexFile};
use crate::error::Result;
use crate::ports::{CasClient, FetchResultCode, OperationStore, TransactionProcessor};
use crate::types::{AnchorRecord, AnchoredOperation, OperationKind};

/// Version-1 transaction processor.
pub struct CoreProcessor {
    cas: Arc<dyn CasClient>,
    operation_store: Arc<dyn OperationStore>,
    /// Deadline for each individual CAS read.
    read_timeout: Duration,
}

impl std::fmt::Debug for CoreProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreProcessor")
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl CoreProcessor {
    /// Create a new processor.
    #[must_use]
    pub fn new(
        cas: Arc<dyn CasClient>,
        operation_store: Arc<dyn OperationStore>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            cas,
            operation_store,
            read_timeout,
        }
    }

    /// Fetch one CAS file, logging the failure reason.
    async fn fetch(&self, uri: &str, what: &str) -> Option<Bytes> {
        let result = self.cas.read(uri, self.read_timeout).await;
        match result.code {
            FetchResultCode::Success => result.content,
            code => {
                warn!(uri, what, ?code, "CAS fetch failed");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl TransactionProcessor for CoreProcessor {
    #[instrument(skip(self, record), fields(transaction_number = %record.transaction_number))]
    async fn process_transaction(&self, record: &AnchorRecord) -> Result<bool> {
        let anchor = &record.anchor_string;

        // Core Index File
        let Some(core_bytes) = self
            .fetch(anchor.core_index_file_uri(), "core index file")
            .await
        else {
            return Ok(false);
        };
        let core: CoreIndexFile = match serde_json::from_slice(&core_bytes) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "malformed core index file");
                return Ok(false);
            }
        };

        // Proof file presence is required when referenced
        if let Some(proof_uri) = &core.core_proof_file_uri
            && self.fetch(proof_uri, "core proof file").await.is_none()
        {
            return Ok(false);
        }

        let mut create = Vec::new();
        let mut recover = Vec::new();
        let mut deactivate = Vec::new();
        if let Some(ops) = &core.operations {
            create.clone_from(&ops.create);
            recover.clone_from(&ops.recover);
            deactivate.clone_from(&ops.deactivate);
        }

        // Provisional Index File, updates, and deltas
        let mut update = Vec::new();
        let mut deltas = Vec::new();
        if let Some(provisional_uri) = &core.provisional_index_file_uri {
            let Some(provisional_bytes) = self
                .fetch(provisional_uri, "provisional index file")
                .await
            else {
                return Ok(false);
            };
            let provisional: ProvisionalIndexFile =
                match serde_json::from_slice(&provisional_bytes) {
                    Ok(file) => file,
                    Err(e) => {
                        warn!(error = %e, "malformed provisional index file");
                        return Ok(false);
                    }
                };

            if let Some(proof_uri) = &provisional.provisional_proof_file_uri
                && self.fetch(proof_uri, "provisional proof file").await.is_none()
            {
                return Ok(false);
            }

            if let Some(ops) = &provisional.operations {
                update.clone_from(&ops.update);
            }

            for chunk_entry in &provisional.chunks {
                let Some(chunk_bytes) =
                    self.fetch(&chunk_entry.chunk_file_uri, "chunk file").await
                else {
                    return Ok(false);
                };
                let chunk: ChunkFile = match serde_json::from_slice(&chunk_bytes) {
                    Ok(file) => file,
                    Err(e) => {
                        warn!(error = %e, "malformed chunk file");
                        return Ok(false);
                    }
                };
                deltas.extend(chunk.deltas);
            }
        }

        let total = create.len() + recover.len() + update.len() + deactivate.len();
        if total as u64 > anchor.number_of_operations() {
            warn!(
                total,
                declared = anchor.number_of_operations(),
                "batch exceeds its anchored operation count"
            );
            return Ok(false);
        }

        // Deltas map to create, recover, update operations in that order.
        let delta_consumers = create.len() + recover.len() + update.len();
        if !deltas.is_empty() && deltas.len() != delta_consumers {
            warn!(
                deltas = deltas.len(),
                expected = delta_consumers,
                "chunk deltas do not match operations"
            );
            return Ok(false);
        }

        let mut operations = Vec::with_capacity(total);
        let mut delta_iter = deltas.into_iter();
        let mut index = 0u32;

        let mut push = |entries: Vec<OperationEntry>,
                        kind: OperationKind,
                        operations: &mut Vec<AnchoredOperation>,
                        delta_iter: &mut dyn Iterator<Item = serde_json::Value>,
                        index: &mut u32| {
            for entry in entries {
                let mut payload = entry.extra;
                if kind != OperationKind::Deactivate
                    && let Some(delta) = delta_iter.next()
                {
                    merge_delta(&mut payload, delta);
                }
                operations.push(AnchoredOperation {
                    did_suffix: entry.did_suffix,
                    kind,
                    transaction_number: record.transaction_number,
                    transaction_time: record.transaction_time,
                    operation_index: *index,
                    payload,
                });
                *index += 1;
            }
        };

        push(create, OperationKind::Create, &mut operations, &mut delta_iter, &mut index);
        push(recover, OperationKind::Recover, &mut operations, &mut delta_iter, &mut index);
        push(update, OperationKind::Update, &mut operations, &mut delta_iter, &mut index);
        push(deactivate, OperationKind::Deactivate, &mut operations, &mut delta_iter, &mut index);

        // Group by DID suffix before handing the batch to the store.
        operations.sort_by(|a, b| {
            a.did_suffix
                .cmp(&b.did_suffix)
                .then(a.operation_index.cmp(&b.operation_index))
        });

        debug!(
            operations = operations.len(),
            "persisting anchored operations"
        );
        self.operation_store.insert_or_replace(operations).await?;

        Ok(true)
    }
}

/// Attach a chunk delta to an operation payload.
fn merge_delta(payload: &mut serde_json::Value, delta: serde_json::Value) {
    match payload {
        serde_json::Value::Object(map) => {
            map.insert("delta".into(), delta);
        }
        other => {
            *other = serde_json::json!({ "delta": delta });
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
