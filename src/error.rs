//! Layered error types for the anchor observer.
//!
//! This module provides a hierarchical error system:
//!
//! - [`ChainError`] - Ledger-read errors (stale cursors, RPC transport, decoding)
//! - [`StoreError`] - Persistence-surface errors (always treated as fatal)
//! - [`ObserverError`] - Application-level errors combining the above
//!
//! # Error Philosophy
//!
//! - `InvalidCursor` is an expected signal, not a failure: the live loop
//!   answers it with a reorg rewind.
//! - Transient chain errors are retried by the paginator; they escalate only
//!   after the configured retry budget is exhausted.
//! - Store errors surface to the driving loop, which emits a loop-failure
//!   event and retries on the next tick without advancing its cursor.

use alloy::primitives::{Address, B256};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors surfaced while reading anchor records from the ledger.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChainError {
    /// The cursor's block hash no longer matches the canonical chain.
    ///
    /// Expected after a chain reorganization; the live loop reacts by
    /// rewinding derived state rather than treating this as a failure.
    #[error("invalid cursor: transaction {transaction_number} anchored at {transaction_time_hash} is no longer canonical")]
    InvalidCursor {
        /// Transaction number of the stale cursor.
        transaction_number: u64,
        /// Block hash that failed the canary check.
        transaction_time_hash: B256,
    },

    /// A block expected to exist could not be fetched.
    #[error("block {0} not found")]
    BlockNotFound(u64),

    /// An anchor log could not be decoded into a record.
    #[error("anchor log decoding failed: {0}")]
    LogDecoding(String),

    /// RPC transport error (node communication).
    #[error("RPC error: {0}")]
    Rpc(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// RPC request exceeded its deadline.
    #[error("RPC request timed out: {0}")]
    Timeout(String),

    /// Deployment-block discovery failed: no code found at any height.
    #[error("no contract code found for {0} at any block")]
    DeploymentNotFound(Address),
}

impl ChainError {
    /// Whether the paginator should retry a request that failed with this error.
    ///
    /// `InvalidCursor` is a protocol signal and never retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Timeout(_) | Self::BlockNotFound(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors from the transaction, operation, and unresolvable stores.
///
/// Store contracts promise concurrency safety; any failure here is an outage
/// and is treated as fatal by the loop that observes it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backing store rejected or failed the operation.
    #[error("store operation failed: {0}")]
    Backend(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// OBSERVER ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Application-level errors for the observer core.
///
/// This is the primary error type used throughout the crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ObserverError {
    /// Ledger-read error.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Persistence error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Anchor string could not be parsed.
    #[error(transparent)]
    AnchorString(#[from] crate::types::AnchorStringError),

    /// CAS transport could not be constructed or misbehaved structurally.
    ///
    /// Note: per-read CAS outcomes (not found, size exceeded) are result
    /// codes, not errors; see [`crate::ports::FetchResult`].
    #[error("CAS error: {0}")]
    Cas(String),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Startup wiring error.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// Graceful shutdown requested while work was pending.
    #[error("shutdown requested")]
    ShutdownRequested,
}

impl ObserverError {
    /// Whether this error is an invalid-cursor signal.
    #[must_use]
    pub const fn is_invalid_cursor(&self) -> bool {
        matches!(self, Self::Chain(ChainError::InvalidCursor { .. }))
    }
}

/// Type alias for observer Results.
pub type Result<T> = std::result::Result<T, ObserverError>;

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn invalid_cursor_display_names_transaction() {
        let err = ChainError::InvalidCursor {
            transaction_number: 42,
            transaction_time_hash: B256::ZERO,
        };
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn transient_classification() {
        assert!(ChainError::Timeout("t".into()).is_transient());
        assert!(
            !ChainError::InvalidCursor {
                transaction_number: 0,
                transaction_time_hash: B256::ZERO,
            }
            .is_transient()
        );
    }

    #[test]
    fn observer_error_from_chain() {
        let err: ObserverError = ChainError::BlockNotFound(7).into();
        assert!(matches!(
            err,
            ObserverError::Chain(ChainError::BlockNotFound(7))
        ));
    }

    #[test]
    fn invalid_cursor_detection_through_wrapper() {
        let err: ObserverError = ChainError::InvalidCursor {
            transaction_number: 1,
            transaction_time_hash: B256::ZERO,
        }
        .into();
        assert!(err.is_invalid_cursor());
        assert!(!ObserverError::ShutdownRequested.is_invalid_cursor());
    }
}
