//! Startup sync planning: historical catch-up or straight to live.
//!
//! The resume point is always derived from the already-persisted transaction
//! log, never from process state — that is what makes crash recovery free.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::Result;
use crate::ports::{ChainClient, TransactionStore};
use crate::types::{BlockHeight, SyncState};

/// Decides the initial [`SyncState`] for a run.
#[derive(Clone)]
pub struct SyncPlanner {
    chain: Arc<dyn ChainClient>,
    transaction_store: Arc<dyn TransactionStore>,
    deployment_block: BlockHeight,
    /// Historical batch size: the cheapest probe for "is one live iteration
    /// enough to catch up".
    batch_size: u64,
}

impl std::fmt::Debug for SyncPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPlanner")
            .field("deployment_block", &self.deployment_block)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl SyncPlanner {
    /// Create a planner.
    #[must_use]
    pub const fn new(
        chain: Arc<dyn ChainClient>,
        transaction_store: Arc<dyn TransactionStore>,
        deployment_block: BlockHeight,
        batch_size: u64,
    ) -> Self {
        Self {
            chain,
            transaction_store,
            deployment_block,
            batch_size,
        }
    }

    /// Determine the starting state.
    ///
    /// - No persisted anchors: historical from the deployment block.
    /// - Persisted anchors with a gap to the tip larger than one batch:
    ///   historical, resuming at the last record's height.
    /// - Otherwise: live (a single live iteration covers the gap).
    ///
    /// # Errors
    ///
    /// Returns an error if the chain tip or the transaction store cannot be
    /// read.
    #[instrument(skip(self))]
    pub async fn plan(&self) -> Result<SyncState> {
        let tip = self.chain.get_latest_time().await?;
        let last = self.transaction_store.get_last_transaction().await?;

        let state = match last {
            None => {
                info!(
                    deployment = %self.deployment_block,
                    target = %tip.height,
                    "no persisted anchors, starting historical sync from deployment"
                );
                SyncState::historical(self.deployment_block, self.deployment_block, tip.height)
            }
            Some(record) => {
                // Resolve the record's height through its hash; a reorged
                // hash falls back to the recorded height and the live loop's
                // cursor check sorts it out.
                let resume = self
                    .chain
                    .get_block_number_by_hash(record.transaction_time_hash)
                    .await?
                    .unwrap_or(record.transaction_time);

                let gap = tip.height.value().saturating_sub(resume.value());
                if gap > self.batch_size {
                    info!(
                        resume = %resume,
                        target = %tip.height,
                        gap,
                        "resuming historical sync"
                    );
                    SyncState::historical(self.deployment_block, resume, tip.height)
                } else {
                    info!(gap, "within one live iteration of the tip, going live");
                    SyncState::live(self.deployment_block, tip.height)
                }
            }
        };

        debug_assert!(state.is_consistent());
        Ok(state)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
