//! Per-version admission cap for the live pipeline.
//!
//! One anchor-dense block must not monopolize the download manager. Each
//! protocol version declares how many records from the same block may enter
//! processing in one admission call; records beyond the cap are dropped from
//! the admission and picked up again on a later live iteration, because the
//! cursor does not advance past a record until it is persisted.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::types::{AnchorRecord, BlockHeight};
use crate::versions::VersionRegistry;

/// Applies per-version, per-block admission caps.
#[derive(Debug, Clone)]
pub struct ThroughputLimiter {
    registry: Arc<VersionRegistry>,
}

impl ThroughputLimiter {
    /// Create a limiter over the version registry.
    #[must_use]
    pub const fn new(registry: Arc<VersionRegistry>) -> Self {
        Self { registry }
    }

    /// Admit at most the per-block cap from each block, preserving
    /// `transaction_number` order across the admitted set.
    #[must_use]
    pub fn admit(&self, records: Vec<AnchorRecord>) -> Vec<AnchorRecord> {
        if records.is_empty() {
            return records;
        }

        let mut by_block: BTreeMap<BlockHeight, Vec<AnchorRecord>> = BTreeMap::new();
        for record in records {
            by_block.entry(record.transaction_time).or_default().push(record);
        }

        let mut admitted = Vec::new();
        for (height, mut group) in by_block {
            group.sort_by_key(|r| r.transaction_number);

            let cap = self
                .registry
                .resolve(height)
                .version
                .max_records_per_block;

            if group.len() > cap {
                debug!(
                    block = %height,
                    total = group.len(),
                    cap,
                    "block over admission cap, deferring excess records"
                );
            }
            admitted.extend(group.into_iter().take(cap));
        }

        admitted.sort_by_key(|r| r.transaction_number);
        admitted
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
