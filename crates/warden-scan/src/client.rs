//! HTTP client for the remote scan service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use warden_core::credentials::CredentialStore;
use warden_core::verdict::Verdict;

use crate::backend::ScanBackend;
use crate::error::{Result, ScanError};
use crate::models::{DownloadScanRequest, LogEntry, LogKind, PageScanRequest, ScanResponse};

/// Timeout for the liveness probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect timeout for all requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the scan service REST API.
#[derive(Debug, Clone)]
pub struct ScanClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: CredentialStore,
}

impl ScanClient {
    /// Creates a client against the given service base URL.
    pub fn new(base_url: &str, credentials: CredentialStore) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| ScanError::InvalidBaseUrl(e.to_string()))?;
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ScanError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ScanError::InvalidBaseUrl(e.to_string()))
    }

    fn bearer(&self) -> Result<String> {
        self.credentials.token().ok_or(ScanError::AuthRequired)
    }

    async fn submit<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<Verdict> {
        let token = self.bearer()?;
        let url = self.endpoint(path)?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(map_transport)?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ScanError::AuthRequired),
            status if status.is_success() => {
                let parsed: ScanResponse = resp
                    .json()
                    .await
                    .map_err(|e| ScanError::Protocol(e.to_string()))?;
                Ok(parsed.into())
            }
            status => Err(ScanError::Protocol(format!("HTTP {status}"))),
        }
    }
}

fn map_transport(e: reqwest::Error) -> ScanError {
    if e.is_timeout() {
        ScanError::Timeout
    } else {
        ScanError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl ScanBackend for ScanClient {
    async fn probe(&self) -> bool {
        let url = match self.endpoint("health") {
            Ok(url) => url,
            Err(_) => return false,
        };
        match self.http.get(url).timeout(PROBE_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Scan service probe failed");
                false
            }
        }
    }

    async fn scan_download(&self, file_url: &str, file_name: &str) -> Result<Verdict> {
        let body = DownloadScanRequest {
            file_url: file_url.to_string(),
            file_name: file_name.to_string(),
        };
        self.submit("scan/download", &body).await
    }

    async fn scan_page(&self, url: &str) -> Result<Verdict> {
        let body = PageScanRequest {
            url: url.to_string(),
        };
        self.submit("scan/page", &body).await
    }

    async fn fetch_logs(&self, kind: LogKind, limit: usize) -> Result<Vec<LogEntry>> {
        let token = self.bearer()?;
        let mut url = self.endpoint("logs")?;
        url.query_pairs_mut()
            .append_pair("type", kind.as_str())
            .append_pair("limit", &limit.to_string());

        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_transport)?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ScanError::AuthRequired),
            status if status.is_success() => resp
                .json()
                .await
                .map_err(|e| ScanError::Protocol(e.to_string())),
            status => Err(ScanError::Protocol(format!("HTTP {status}"))),
        }
    }

    fn origin(&self) -> String {
        self.base_url.origin().ascii_serialization()
    }
}
