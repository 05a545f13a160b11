//! ABI binding for the anchor contract event.
//!
//! The anchor contract emits a single event per anchored operation batch.
//! The `anchorFileHash` field carries the raw 32-byte SHA-256 digest of the
//! Core Index File; prepending the multihash prefix and base58-encoding it
//! yields the CAS URI (see [`crate::types::AnchorString`]).
//!
//! # Solidity Contract
//!
//! ```solidity
//! contract Anchoring {
//!     event Anchor(
//!         bytes32 anchorFileHash,
//!         uint256 numberOfOperations,
//!         uint256 transactionNumber,
//!         address writer
//!     );
//! }
//! ```

use alloy::sol;

sol! {
    /// Emitted once per anchored operation batch.
    ///
    /// # Data Fields
    /// - `anchorFileHash`: raw SHA-256 digest of the Core Index File
    /// - `numberOfOperations`: operations declared in the batch
    /// - `transactionNumber`: monotonically increasing batch identifier
    /// - `writer`: address that submitted the anchor
    #[derive(Debug, PartialEq, Eq)]
    event Anchor(
        bytes32 anchorFileHash,
        uint256 numberOfOperations,
        uint256 transactionNumber,
        address writer
    );
}

#[cfg(test)]
mod tests {
    use alloy::sol_types::SolEvent;

    use super::*;

    #[test]
    fn anchor_signature() {
        assert_eq!(
            Anchor::SIGNATURE,
            "Anchor(bytes32,uint256,uint256,address)"
        );
    }

    #[test]
    fn anchor_signature_hash_is_stable() {
        // topic0 must match what deployed contracts emit
        assert_eq!(Anchor::SIGNATURE_HASH.len(), 32);
    }
}
