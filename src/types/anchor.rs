//! Anchor records and the anchor-string codec.
//!
//! An anchor record is one log entry from the anchor contract, wrapping a
//! pointer to off-chain operation data in the CAS. The anchor string is the
//! bit-exact on-chain encoding `"<numberOfOperations>.<coreIndexFileUri>"`,
//! where the URI is a base58-encoded multihash (`0x12 0x20` prefix for a
//! 32-byte SHA-256 digest).

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::primitives::{BlockHeight, TransactionNumber};

/// Multihash prefix for a 32-byte SHA-256 digest.
const MULTIHASH_SHA256_PREFIX: [u8; 2] = [0x12, 0x20];

/// Length of a multihash-wrapped SHA-256 digest.
const MULTIHASH_SHA256_LEN: usize = 34;

// ═══════════════════════════════════════════════════════════════════════════════
// ANCHOR STRING
// ═══════════════════════════════════════════════════════════════════════════════

/// The canonical anchor-string encoding shared with on-chain consumers.
///
/// Serialization is lossless in both directions:
/// `AnchorString::from_str(s)?.to_string() == s` for every valid `s`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnchorString {
    number_of_operations: u64,
    core_index_file_uri: String,
}

impl AnchorString {
    /// Build an anchor string from an operation count and a raw 32-byte
    /// digest read from the anchor log's `anchorFileHash` field.
    #[must_use]
    pub fn from_hash(number_of_operations: u64, hash: &B256) -> Self {
        let mut multihash = [0u8; MULTIHASH_SHA256_LEN];
        multihash[..2].copy_from_slice(&MULTIHASH_SHA256_PREFIX);
        multihash[2..].copy_from_slice(hash.as_slice());

        Self {
            number_of_operations,
            core_index_file_uri: bs58::encode(multihash).into_string(),
        }
    }

    /// Number of operations declared by the anchor.
    #[must_use]
    pub const fn number_of_operations(&self) -> u64 {
        self.number_of_operations
    }

    /// CAS URI of the Core Index File.
    #[must_use]
    pub fn core_index_file_uri(&self) -> &str {
        &self.core_index_file_uri
    }

    /// Recover the raw 32-byte digest from the URI.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is not a base58-encoded SHA-256 multihash.
    pub fn core_index_file_hash(&self) -> Result<B256, AnchorStringError> {
        let bytes = decode_multihash_uri(&self.core_index_file_uri)?;
        Ok(B256::from_slice(&bytes[2..]))
    }
}

impl fmt::Display for AnchorString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.number_of_operations, self.core_index_file_uri)
    }
}

impl FromStr for AnchorString {
    type Err = AnchorStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, uri) = s
            .split_once('.')
            .ok_or(AnchorStringError::MissingSeparator)?;

        // Reject anything a plain decimal re-encode would not reproduce:
        // signs, empty strings, leading zeros.
        if count.is_empty()
            || !count.bytes().all(|b| b.is_ascii_digit())
            || (count.len() > 1 && count.starts_with('0'))
        {
            return Err(AnchorStringError::InvalidOperationCount(count.into()));
        }
        let number_of_operations: u64 = count
            .parse()
            .map_err(|_| AnchorStringError::InvalidOperationCount(count.into()))?;

        decode_multihash_uri(uri)?;

        Ok(Self {
            number_of_operations,
            core_index_file_uri: uri.into(),
        })
    }
}

impl From<AnchorString> for String {
    fn from(anchor: AnchorString) -> Self {
        anchor.to_string()
    }
}

impl TryFrom<String> for AnchorString {
    type Error = AnchorStringError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Whether `uri` is a well-formed base58 SHA-256 multihash CAS URI.
#[must_use]
pub fn valid_cas_uri(uri: &str) -> bool {
    decode_multihash_uri(uri).is_ok()
}

/// Decode and validate a base58 SHA-256 multihash URI.
fn decode_multihash_uri(uri: &str) -> Result<Vec<u8>, AnchorStringError> {
    let bytes = bs58::decode(uri)
        .into_vec()
        .map_err(|_| AnchorStringError::InvalidUri(uri.into()))?;

    if bytes.len() != MULTIHASH_SHA256_LEN || bytes[..2] != MULTIHASH_SHA256_PREFIX {
        return Err(AnchorStringError::InvalidUri(uri.into()));
    }

    Ok(bytes)
}

/// Errors for invalid anchor strings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnchorStringError {
    /// No `.` separator between count and URI.
    #[error("anchor string missing '.' separator")]
    MissingSeparator,

    /// Operation count is not a canonical decimal integer.
    #[error("invalid operation count: {0:?}")]
    InvalidOperationCount(String),

    /// URI is not a base58-encoded SHA-256 multihash.
    #[error("invalid core index file URI: {0:?}")]
    InvalidUri(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANCHOR RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// One decoded log entry from the anchor contract.
///
/// Immutable once produced by the chain reader. Records are persisted exactly
/// once after successful processing and removed only by the reorg handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    /// Monotonically increasing identifier issued by the contract.
    pub transaction_number: TransactionNumber,
    /// Block height of the emitting log.
    pub transaction_time: BlockHeight,
    /// Block hash of that height; the reorg canary.
    pub transaction_time_hash: B256,
    /// The anchor string carried by the log.
    pub anchor_string: AnchorString,
    /// Issuer address.
    pub writer: Address,
    /// Fee paid by the anchoring transaction, in wei. May be zero.
    pub transaction_fee_paid: u64,
    /// Fee normalized per anchored operation. May be zero.
    pub normalized_transaction_fee: u64,
    /// Optional wall-clock annotation from the block header.
    pub transaction_timestamp: Option<DateTime<Utc>>,
}

impl AnchorRecord {
    /// The cursor identifying this record.
    #[must_use]
    pub const fn cursor(&self) -> Cursor {
        Cursor {
            transaction_number: self.transaction_number,
            transaction_time: self.transaction_time,
            transaction_time_hash: self.transaction_time_hash,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CURSOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Identity of the most recently processed anchor record.
///
/// `None` at the call sites that take `Option<Cursor>` means "start from
/// genesis / contract deployment".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Transaction number of the last processed record.
    pub transaction_number: TransactionNumber,
    /// Block height the record was anchored at.
    pub transaction_time: BlockHeight,
    /// Block hash at that height, checked against the chain on every read.
    pub transaction_time_hash: B256,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN TIME
// ═══════════════════════════════════════════════════════════════════════════════

/// The ledger tip as reported by the chain client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTime {
    /// Latest block height.
    pub height: BlockHeight,
    /// Hash of the latest block.
    pub hash: B256,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn sample_hash(byte: u8) -> B256 {
        B256::repeat_byte(byte)
    }

    #[test]
    fn from_hash_produces_parseable_string() {
        let anchor = AnchorString::from_hash(17, &sample_hash(0xAB));
        let encoded = anchor.to_string();

        let parsed: AnchorString = encoded.parse().unwrap();
        assert_eq!(parsed, anchor);
        assert_eq!(parsed.number_of_operations(), 17);
        assert_eq!(parsed.core_index_file_hash().unwrap(), sample_hash(0xAB));
    }

    #[test]
    fn round_trip_is_byte_exact() {
        let anchor = AnchorString::from_hash(0, &sample_hash(0x01));
        let encoded = anchor.to_string();
        let reencoded = AnchorString::from_str(&encoded).unwrap().to_string();
        assert_eq!(encoded, reencoded);
    }

    #[test]
    fn rejects_missing_separator() {
        assert_eq!(
            AnchorString::from_str("12345").unwrap_err(),
            AnchorStringError::MissingSeparator
        );
    }

    #[rstest]
    #[case("")]
    #[case("+1")]
    #[case("-1")]
    #[case("01")]
    #[case("1x")]
    fn rejects_non_canonical_counts(#[case] count: &str) {
        let uri = AnchorString::from_hash(1, &sample_hash(0x02))
            .core_index_file_uri()
            .to_string();

        let input = format!("{count}.{uri}");
        assert!(
            AnchorString::from_str(&input).is_err(),
            "count {count:?} should be rejected"
        );
    }

    #[test]
    fn rejects_bad_uris() {
        for uri in ["", "not-base58-0OIl", "3yZe7d"] {
            let input = format!("5.{uri}");
            assert!(
                AnchorString::from_str(&input).is_err(),
                "uri {uri:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_wrong_multihash_prefix() {
        // Valid base58, valid length, wrong prefix bytes.
        let mut bytes = [0u8; 34];
        bytes[0] = 0x11;
        bytes[1] = 0x20;
        let uri = bs58::encode(bytes).into_string();
        assert!(AnchorString::from_str(&format!("1.{uri}")).is_err());
    }

    #[test]
    fn record_cursor_copies_identity() {
        let record = AnchorRecord {
            transaction_number: TransactionNumber::new(9),
            transaction_time: BlockHeight::new(100),
            transaction_time_hash: sample_hash(0x42),
            anchor_string: AnchorString::from_hash(3, &sample_hash(0x43)),
            writer: Address::ZERO,
            transaction_fee_paid: 0,
            normalized_transaction_fee: 0,
            transaction_timestamp: None,
        };

        let cursor = record.cursor();
        assert_eq!(cursor.transaction_number.value(), 9);
        assert_eq!(cursor.transaction_time_hash, sample_hash(0x42));
    }

    proptest! {
        #[test]
        fn round_trips_for_arbitrary_inputs(count in any::<u64>(), hash in any::<[u8; 32]>()) {
            let anchor = AnchorString::from_hash(count, &B256::from(hash));
            let encoded = anchor.to_string();
            let parsed = AnchorString::from_str(&encoded).unwrap();

            prop_assert_eq!(parsed.number_of_operations(), count);
            prop_assert_eq!(parsed.core_index_file_hash().unwrap(), B256::from(hash));
            prop_assert_eq!(parsed.to_string(), encoded);
        }
    }
}
