//! Remote Lookup API Client
//!
//! HTTP client for the indicator-lookup service:
//! - `GET  /v1/hash/{hash}`   -> verdict for one content hash
//! - `POST /v1/ioc/lookup`    -> reputations for a list of IOCs
//!
//! Every call carries its own short client-side timeout, independent of the
//! circuit breaker guarding it. The `RemoteLookup` trait is the seam the
//! service (and tests) program against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;
use crate::error::{ScanError, ScanResult};
use crate::model::Verdict;

// ============================================================================
// WIRE TYPES
// ============================================================================

/// `GET /v1/hash/{hash}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashLookupResponse {
    pub verdict: Verdict,
    pub confidence: f32,
    /// Malware family, when the backend attributes one.
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Server-suggested cache TTL (secs).
    pub ttl: u64,
}

#[derive(Debug, Serialize)]
pub struct IocLookupRequest<'a> {
    pub iocs: &'a [String],
}

/// One element of the `POST /v1/ioc/lookup` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IocVerdict {
    pub ioc: String,
    pub verdict: Verdict,
    /// Server-suggested cache TTL (secs).
    pub ttl: u64,
}

#[derive(Debug, Deserialize)]
struct IocLookupResponse {
    results: Vec<IocVerdict>,
}

// ============================================================================
// TRAIT + HTTP IMPLEMENTATION
// ============================================================================

/// Network boundary for indicator lookups.
#[async_trait]
pub trait RemoteLookup: Send + Sync {
    async fn lookup_hash(&self, hash: &str) -> ScanResult<HashLookupResponse>;

    async fn lookup_iocs(&self, iocs: &[String]) -> ScanResult<Vec<IocVerdict>>;
}

pub struct HttpRemoteClient {
    config: RemoteConfig,
    http: reqwest::Client,
}

impl HttpRemoteClient {
    pub fn new(config: RemoteConfig) -> ScanResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ScanError::Network(format!("http client init: {e}")))?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl RemoteLookup for HttpRemoteClient {
    async fn lookup_hash(&self, hash: &str) -> ScanResult<HashLookupResponse> {
        let resp = self
            .http
            .get(self.url(&format!("/v1/hash/{hash}")))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ScanError::Network(format!(
                "hash lookup returned {}",
                resp.status()
            )));
        }
        Ok(resp.json::<HashLookupResponse>().await?)
    }

    async fn lookup_iocs(&self, iocs: &[String]) -> ScanResult<Vec<IocVerdict>> {
        let resp = self
            .http
            .post(self.url("/v1/ioc/lookup"))
            .json(&IocLookupRequest { iocs })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ScanError::Network(format!(
                "ioc lookup returned {}",
                resp.status()
            )));
        }
        Ok(resp.json::<IocLookupResponse>().await?.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_response_deserializes_with_optional_fields() {
        let body = r#"{"verdict":"malicious","confidence":0.97,"ttl":3600}"#;
        let parsed: HashLookupResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.verdict, Verdict::Malicious);
        assert!(parsed.family.is_none());
        assert!(parsed.tags.is_empty());
        assert_eq!(parsed.ttl, 3600);
    }

    #[test]
    fn url_joining_tolerates_trailing_slash() {
        let client = HttpRemoteClient::new(RemoteConfig {
            base_url: "https://intel.example/".to_string(),
            timeout: std::time::Duration::from_millis(50),
        })
        .unwrap();
        assert_eq!(client.url("/v1/hash/ab"), "https://intel.example/v1/hash/ab");
    }
}
