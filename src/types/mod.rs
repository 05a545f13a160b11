//! Domain types for the anchor observer.
//!
//! - [`primitives`] - validated newtypes ([`BlockHeight`], [`TransactionNumber`])
//! - [`anchor`] - anchor records, the anchor-string codec, cursors
//! - [`operation`] - anchored DID operations
//! - [`sync`] - process-local sync state
//! - [`processing`] - under-processing pipeline entries

pub mod anchor;
pub mod operation;
pub mod primitives;
pub mod processing;
pub mod sync;

pub use anchor::{AnchorRecord, AnchorString, AnchorStringError, ChainTime, Cursor, valid_cas_uri};
pub use operation::{AnchoredOperation, OperationKind};
pub use primitives::{BlockHeight, TransactionNumber};
pub use processing::{ProcessingStatus, TransactionUnderProcessing};
pub use sync::{SyncPhase, SyncState};
