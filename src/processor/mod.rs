//! Version-specific transaction processing.
//!
//! The observer dispatches each record to the processor registered for its
//! `transaction_time` band (see [`crate::versions`]). This module provides
//! the CAS file schemas and the version-1 reference processor.

mod files;
mod v1;

pub use v1::CoreProcessor;
pub use files::{
    ChunkEntry, ChunkFile, CoreIndexFile, CoreOperations, OperationEntry, ProvisionalIndexFile,
    ProvisionalOperations,
};
