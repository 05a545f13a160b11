//! Reorg rewind: find the deepest still-valid anchor and roll derived
//! state back to it.
//!
//! The live loop quiesces in-flight work before invoking the rewind, so the
//! three deletions run against a stable view. Deletion order matters for
//! crash recovery: operations first, then unresolvables, then transactions —
//! orphaned operations whose transaction survives are re-derived by
//! reprocessing, but a transaction whose operations vanished would never be
//! revisited.

use std::sync::Arc;

use metrics::counter;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::ports::{
    ChainClient, EventSink, ObserverEvent, OperationStore, TransactionStore,
    UnresolvableTransactionStore,
};
use crate::types::AnchorRecord;

/// Handles rollback of derived state after cursor invalidation.
#[derive(Clone)]
pub struct ReorgHandler {
    chain: Arc<dyn ChainClient>,
    transaction_store: Arc<dyn TransactionStore>,
    operation_store: Arc<dyn OperationStore>,
    unresolvable_store: Arc<dyn UnresolvableTransactionStore>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ReorgHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReorgHandler").finish_non_exhaustive()
    }
}

impl ReorgHandler {
    /// Create a new reorg handler.
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        transaction_store: Arc<dyn TransactionStore>,
        operation_store: Arc<dyn OperationStore>,
        unresolvable_store: Arc<dyn UnresolvableTransactionStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            chain,
            transaction_store,
            operation_store,
            unresolvable_store,
            events,
        }
    }

    /// Probe for the deepest still-valid anchor and prune everything later.
    ///
    /// Returns the record the stores were rewound to, or `None` when the
    /// whole observed history was invalidated.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain probe or any store deletion fails; an
    /// interrupted rewind leaves a recoverable state thanks to the deletion
    /// order.
    #[instrument(skip(self))]
    pub async fn revert_to_last_valid(&self) -> Result<Option<AnchorRecord>> {
        let sample = self
            .transaction_store
            .get_exponentially_spaced_transactions()
            .await?;

        let valid = self.chain.get_first_valid_transaction(&sample).await?;
        let revert_point = valid.as_ref().map(|r| r.transaction_number);

        match &valid {
            Some(record) => info!(
                transaction_number = %record.transaction_number,
                block = %record.transaction_time,
                "rewinding to last valid anchor"
            ),
            None => warn!("no valid anchor found in sample, rewinding to genesis"),
        }

        // Strict order: operations, unresolvables, transactions.
        self.operation_store.delete(revert_point).await?;
        self.unresolvable_store
            .remove_unresolvable_transactions_later_than(revert_point)
            .await?;
        self.transaction_store
            .remove_transactions_later_than(revert_point)
            .await?;

        counter!("observer_reorgs_total").increment(1);
        self.events.emit(ObserverEvent::BlockReorganization {
            reverted_to: revert_point,
        });

        Ok(valid)
    }
}
