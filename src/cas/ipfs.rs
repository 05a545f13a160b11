//! IPFS HTTP gateway adapter for the CAS capability.
//!
//! Reads go through the gateway's path endpoint (`/ipfs/{uri}`), writes
//! through the node API (`/api/v0/add`). Per the CAS contract, every
//! transport problem on the read path collapses into a result code: timeouts
//! and HTTP failures become `NotFound`, and the response body is streamed
//! against the configured size cap so an oversized file is cut off as
//! `MaxSizeExceeded` without buffering it whole.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::{ObserverError, Result};
use crate::ports::{CasClient, FetchResult, FetchResultCode};
use crate::types::valid_cas_uri;

/// Timeout for write requests; reads carry their own per-call deadline.
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Response shape of the gateway's `add` endpoint.
#[derive(Debug, Deserialize)]
struct AddResponse {
    /// Content hash of the stored file.
    #[serde(rename = "Hash")]
    hash: String,
}

/// CAS client backed by an IPFS HTTP gateway.
#[derive(Debug, Clone)]
pub struct IpfsCasClient {
    client: reqwest::Client,
    gateway_url: String,
    max_file_size_bytes: u64,
}

impl IpfsCasClient {
    /// Create a new gateway client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(gateway_url: impl Into<String>, max_file_size_bytes: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ObserverError::Cas(format!("failed to create HTTP client: {e}")))?;

        let gateway_url = gateway_url.into();
        let gateway_url = gateway_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            gateway_url,
            max_file_size_bytes,
        })
    }

    /// Stream the response body, enforcing the size cap.
    async fn read_body_capped(&self, response: reqwest::Response) -> FetchResult {
        // The gateway may announce the size up front.
        if let Some(len) = response.content_length()
            && len > self.max_file_size_bytes
        {
            return FetchResult::failure(FetchResultCode::MaxSizeExceeded);
        }

        let mut body = BytesMut::new();
        let mut response = response;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if (body.len() + chunk.len()) as u64 > self.max_file_size_bytes {
                        return FetchResult::failure(FetchResultCode::MaxSizeExceeded);
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "CAS body read failed mid-stream");
                    return FetchResult::failure(FetchResultCode::NotFound);
                }
            }
        }

        FetchResult::success(body.freeze())
    }
}

#[async_trait]
impl CasClient for IpfsCasClient {
    #[instrument(skip(self, timeout))]
    async fn read(&self, uri: &str, timeout: Duration) -> FetchResult {
        if !valid_cas_uri(uri) {
            return FetchResult::failure(FetchResultCode::InvalidHash);
        }

        let url = format!("{}/ipfs/{uri}", self.gateway_url);
        let response = match self.client.get(&url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                // A timeout and a missing file are the same to retry policy.
                debug!(error = %e, "CAS read failed");
                return FetchResult::failure(FetchResultCode::NotFound);
            }
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return FetchResult::failure(FetchResultCode::NotFound);
        }
        if !response.status().is_success() {
            warn!(status = %response.status(), "unexpected CAS gateway status");
            return FetchResult::failure(FetchResultCode::NotFound);
        }

        self.read_body_capped(response).await
    }

    async fn write(&self, content: Bytes) -> Result<String> {
        let url = format!("{}/api/v0/add", self.gateway_url);
        let part = reqwest::multipart::Part::bytes(content.to_vec()).file_name("blob");
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(WRITE_TIMEOUT)
            .send()
            .await
            .map_err(|e| ObserverError::Cas(format!("CAS write failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ObserverError::Cas(format!(
                "CAS write rejected with status {}",
                response.status()
            )));
        }

        let parsed: AddResponse = response
            .json()
            .await
            .map_err(|e| ObserverError::Cas(format!("malformed add response: {e}")))?;

        Ok(parsed.hash)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use alloy::primitives::B256;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::types::AnchorString;

    fn sample_uri() -> String {
        AnchorString::from_hash(1, &B256::repeat_byte(0x42))
            .core_index_file_uri()
            .to_string()
    }

    #[tokio::test]
    async fn read_returns_content_on_success() {
        let server = MockServer::start().await;
        let uri = sample_uri();

        Mock::given(method("GET"))
            .and(path(format!("/ipfs/{uri}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;

        let client = IpfsCasClient::new(server.uri(), 1024).unwrap();
        let result = client.read(&uri, Duration::from_secs(1)).await;

        assert_eq!(result.code, FetchResultCode::Success);
        assert_eq!(result.content.unwrap().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn read_maps_404_to_not_found() {
        let server = MockServer::start().await;
        let uri = sample_uri();

        Mock::given(method("GET"))
            .and(path(format!("/ipfs/{uri}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = IpfsCasClient::new(server.uri(), 1024).unwrap();
        let result = client.read(&uri, Duration::from_secs(1)).await;

        assert_eq!(result.code, FetchResultCode::NotFound);
    }

    #[tokio::test]
    async fn read_maps_timeout_to_not_found() {
        let server = MockServer::start().await;
        let uri = sample_uri();

        Mock::given(method("GET"))
            .and(path(format!("/ipfs/{uri}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = IpfsCasClient::new(server.uri(), 1024).unwrap();
        let result = client.read(&uri, Duration::from_millis(50)).await;

        assert_eq!(result.code, FetchResultCode::NotFound);
    }

    #[tokio::test]
    async fn read_rejects_oversized_content() {
        let server = MockServer::start().await;
        let uri = sample_uri();

        Mock::given(method("GET"))
            .and(path(format!("/ipfs/{uri}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 100]))
            .mount(&server)
            .await;

        let client = IpfsCasClient::new(server.uri(), 10).unwrap();
        let result = client.read(&uri, Duration::from_secs(1)).await;

        assert_eq!(result.code, FetchResultCode::MaxSizeExceeded);
    }

    #[tokio::test]
    async fn read_rejects_malformed_uris_without_network() {
        let client = IpfsCasClient::new("http://127.0.0.1:1", 1024).unwrap();
        let result = client.read("not-a-hash", Duration::from_secs(1)).await;

        assert_eq!(result.code, FetchResultCode::InvalidHash);
    }

    #[tokio::test]
    async fn write_returns_gateway_hash() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v0/add"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"Hash": "QmTest"})),
            )
            .mount(&server)
            .await;

        let client = IpfsCasClient::new(server.uri(), 1024).unwrap();
        let uri = client.write(Bytes::from_static(b"data")).await.unwrap();

        assert_eq!(uri, "QmTest");
    }
}
