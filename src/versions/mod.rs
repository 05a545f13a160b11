//! Protocol-version registry.
//!
//! A protocol revision is selected by the block height (`transaction_time`)
//! band it covers: each version declares its starting height, and a record
//! is handled by the newest version whose band has begun. The registry also
//! carries the per-version admission cap consumed by the throughput limiter.

use std::sync::Arc;

use crate::error::{ObserverError, Result};
use crate::ports::TransactionProcessor;
use crate::types::BlockHeight;

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL VERSION
// ═══════════════════════════════════════════════════════════════════════════════

/// Static description of one protocol revision.
#[derive(Debug, Clone)]
pub struct ProtocolVersion {
    /// Version label, e.g. `"1.0"`.
    pub name: String,
    /// First block height this version covers.
    pub start_time: BlockHeight,
    /// Cap on records admitted from a single block in one admission call.
    pub max_records_per_block: usize,
}

/// A version plus its processor.
#[derive(Clone)]
pub struct VersionHandle {
    /// Version description.
    pub version: ProtocolVersion,
    /// Processor handling records in this version's band.
    pub processor: Arc<dyn TransactionProcessor>,
}

impl std::fmt::Debug for VersionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionHandle")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VERSION REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Maps `transaction_time` bands to protocol versions.
#[derive(Debug)]
pub struct VersionRegistry {
    /// Handles sorted ascending by `start_time`.
    handles: Vec<VersionHandle>,
}

impl VersionRegistry {
    /// Create a registry from version handles.
    ///
    /// # Errors
    ///
    /// Returns an error if no versions are given or two versions share a
    /// starting height.
    pub fn new(mut handles: Vec<VersionHandle>) -> Result<Self> {
        if handles.is_empty() {
            return Err(ObserverError::Initialization(
                "version registry requires at least one version".into(),
            ));
        }

        handles.sort_by_key(|h| h.version.start_time);

        let duplicated = handles
            .windows(2)
            .any(|pair| pair[0].version.start_time == pair[1].version.start_time);
        if duplicated {
            return Err(ObserverError::Initialization(
                "version start times must be unique".into(),
            ));
        }

        Ok(Self { handles })
    }

    /// The version covering `time`: the newest whose band has begun.
    ///
    /// Heights before the first band resolve to the first version; anchors
    /// cannot predate the contract, so this only matters for synthetic data.
    #[must_use]
    pub fn resolve(&self, time: BlockHeight) -> &VersionHandle {
        self.handles
            .iter()
            .rev()
            .find(|h| h.version.start_time <= time)
            .unwrap_or(&self.handles[0])
    }

    /// All registered versions, oldest first.
    #[must_use]
    pub fn versions(&self) -> impl Iterator<Item = &ProtocolVersion> {
        self.handles.iter().map(|h| &h.version)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
