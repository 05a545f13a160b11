//! Anchor Observer & Historical Sync Engine
//!
//! Discovers every anchor event emitted by a known anchor contract on a
//! smart-contract ledger, fetches the associated off-chain operation data
//! from a content-addressable store, hands each operation batch to a
//! version-specific processor, and keeps doing this forever against a moving
//! chain tip — tolerating RPC rate limits, timeouts, partial failures,
//! reorgs, and restarts.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                          OBSERVER CORE                             │
//! │  ┌────────────┐   ┌───────────┐   ┌───────────────┐               │
//! │  │   Chain    │──▶│ Paginator │──▶│ Historical ∥  │               │
//! │  │   Reader   │   └───────────┘   │ Live Loop     │               │
//! │  └────────────┘                   └───────┬───────┘               │
//! │                                           │                        │
//! │                   ┌───────────────────────┼───────────────┐       │
//! │                   ▼                       ▼               ▼       │
//! │          ┌──────────────┐        ┌──────────────┐   ┌──────────┐ │
//! │          │  Throughput  │        │  Processor   │   │  Reorg   │ │
//! │          │  Limiter     │        │  Dispatch    │   │  Handler │ │
//! │          └──────────────┘        └──────┬───────┘   └──────────┘ │
//! │                                         ▼                         │
//! │               {Transaction, Operation, Unresolvable} stores       │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`types`] - Domain types (anchor records, cursors, sync state)
//! - [`error`] - Layered error types
//! - [`config`] - Configuration loading, validation, and presets
//! - [`abi`] - ABI binding for the anchor contract event
//! - [`ports`] - Capability traits the core binds to
//! - [`chain`] - Alloy-backed ledger adapters
//! - [`cas`] - Content-addressable store adapters
//! - [`observer`] - The sync engine (historical + live loops)
//! - [`versions`] - Protocol-version registry and dispatch
//! - [`processor`] - Reference v1 transaction processor
//! - [`store`] - In-memory store adapters
//! - [`telemetry`] - Tracing and metrics setup
//!
//! # Getting Started
//!
//! ```bash
//! # Point the observer at a node and an anchor contract
//! export OBSERVER_RPC__URL=https://rpc.example.org
//! export OBSERVER_CONTRACT__ANCHOR_ADDRESS=0x...
//!
//! # Start observing
//! cargo run -- run
//! ```

pub mod abi;
pub mod cas;
pub mod chain;
pub mod config;
pub mod error;
pub mod observer;
pub mod ports;
pub mod processor;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod versions;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version string
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
        assert!(version().starts_with("0."));
    }
}
