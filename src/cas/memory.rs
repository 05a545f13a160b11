//! In-memory CAS for tests and local development.
//!
//! Content is addressed exactly like the production store: a SHA-256 digest
//! wrapped in a multihash prefix and base58-encoded, so anchor strings built
//! against this store round-trip through the real codec.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::ports::{CasClient, FetchResult, FetchResultCode};
use crate::types::valid_cas_uri;

/// In-memory content-addressable store.
#[derive(Debug, Default)]
pub struct InMemoryCas {
    content: DashMap<String, Bytes>,
    max_file_size_bytes: Option<u64>,
}

impl InMemoryCas {
    /// Create an empty store without a size cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store enforcing a read size cap.
    #[must_use]
    pub fn with_max_size(max_file_size_bytes: u64) -> Self {
        Self {
            content: DashMap::new(),
            max_file_size_bytes: Some(max_file_size_bytes),
        }
    }

    /// The multihash URI for `content`.
    #[must_use]
    pub fn uri_for(content: &[u8]) -> String {
        let digest = Sha256::digest(content);
        let mut multihash = Vec::with_capacity(34);
        multihash.extend_from_slice(&[0x12, 0x20]);
        multihash.extend_from_slice(&digest);
        bs58::encode(multihash).into_string()
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Drop the content at `uri`, simulating unavailable data.
    pub fn remove(&self, uri: &str) {
        self.content.remove(uri);
    }
}

#[async_trait]
impl CasClient for InMemoryCas {
    async fn read(&self, uri: &str, _timeout: Duration) -> FetchResult {
        if !valid_cas_uri(uri) {
            return FetchResult::failure(FetchResultCode::InvalidHash);
        }

        match self.content.get(uri) {
            Some(content) => {
                if let Some(cap) = self.max_file_size_bytes
                    && content.len() as u64 > cap
                {
                    return FetchResult::failure(FetchResultCode::MaxSizeExceeded);
                }
                FetchResult::success(content.clone())
            }
            None => FetchResult::failure(FetchResultCode::NotFound),
        }
    }

    async fn write(&self, content: Bytes) -> Result<String> {
        let uri = Self::uri_for(&content);
        self.content.insert(uri.clone(), content);
        Ok(uri)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
