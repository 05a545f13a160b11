//! Transaction-processor capability.
//!
//! A processor owns the version-specific interpretation of one anchor
//! record: anchor-string decoding, CAS file retrieval, and operation
//! persistence. The observer dispatches to the processor whose version
//! covers the record's `transaction_time` (see [`crate::versions`]).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::AnchorRecord;

/// Capability for processing a single anchor record.
#[async_trait]
pub trait TransactionProcessor: Send + Sync {
    /// Process one record.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` - full success; the record may be persisted.
    /// - `Ok(false)` - logical failure (missing CAS content, size cap
    ///   exceeded, malformed payload); the record is recorded as
    ///   unresolvable and retried on the store's schedule.
    /// - `Err(_)` - fatal failure (store outage, wiring fault); fences the
    ///   live pipeline.
    ///
    /// # Errors
    ///
    /// Only for fatal conditions; expected data problems are `Ok(false)`.
    async fn process_transaction(&self, record: &AnchorRecord) -> Result<bool>;
}
