//! Content-addressable store capability.
//!
//! CAS reads are expressed as result codes rather than errors: a missing or
//! oversized file is a normal processing outcome (the record becomes
//! unresolvable), not a pipeline fault. Transport timeouts map to
//! [`FetchResultCode::NotFound`] so a slow gateway and an absent file are
//! handled identically by retry policy.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

// ═══════════════════════════════════════════════════════════════════════════════
// FETCH RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of a CAS read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchResultCode {
    /// Content fetched in full.
    Success,
    /// Content not found (or not retrievable before the deadline).
    NotFound,
    /// Content exceeds the configured size cap.
    MaxSizeExceeded,
    /// URI is not a valid content hash.
    InvalidHash,
}

/// A CAS read result: code plus content on success.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Outcome code.
    pub code: FetchResultCode,
    /// Fetched bytes; present iff `code == Success`.
    pub content: Option<Bytes>,
}

impl FetchResult {
    /// A successful fetch.
    #[must_use]
    pub const fn success(content: Bytes) -> Self {
        Self {
            code: FetchResultCode::Success,
            content: Some(content),
        }
    }

    /// A non-success outcome.
    #[must_use]
    pub const fn failure(code: FetchResultCode) -> Self {
        Self {
            code,
            content: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CAS CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Capability for reading and writing CAS content.
#[async_trait]
pub trait CasClient: Send + Sync {
    /// Read the content at `uri`, giving up after `timeout`.
    ///
    /// Never fails: all transport problems collapse into a result code.
    async fn read(&self, uri: &str, timeout: Duration) -> FetchResult;

    /// Write content, returning its CAS URI.
    ///
    /// Used by the anchoring (write) side; the observer core only reads.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the write.
    async fn write(&self, content: Bytes) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_carries_content() {
        let result = FetchResult::success(Bytes::from_static(b"x"));
        assert_eq!(result.code, FetchResultCode::Success);
        assert!(result.content.is_some());
    }

    #[test]
    fn failure_has_no_content() {
        let result = FetchResult::failure(FetchResultCode::NotFound);
        assert!(result.content.is_none());
    }
}
