//! Shared test doubles for agent tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use warden_core::credentials::CredentialStore;
use warden_core::verdict::Verdict;
use warden_scan::error::{Result, ScanError};
use warden_scan::{LogEntry, LogKind, ScanBackend};

/// A scan backend with scripted behavior.
pub struct ScriptedBackend {
    pub probe_ok: Mutex<bool>,
    pub download_response: Mutex<Result<Verdict>>,
    pub page_response: Mutex<Result<Verdict>>,
    pub response_delay: Mutex<Duration>,
    pub log_batches: Mutex<Vec<Vec<LogEntry>>>,
    pub download_calls: Mutex<usize>,
    pub page_calls: Mutex<usize>,
    pub origin: String,
}

impl ScriptedBackend {
    pub fn clean() -> Self {
        Self::with_download(Ok(Verdict::clean()))
    }

    pub fn with_download(response: Result<Verdict>) -> Self {
        Self {
            probe_ok: Mutex::new(true),
            download_response: Mutex::new(response),
            page_response: Mutex::new(Ok(Verdict::clean())),
            response_delay: Mutex::new(Duration::ZERO),
            log_batches: Mutex::new(Vec::new()),
            download_calls: Mutex::new(0),
            page_calls: Mutex::new(0),
            origin: "https://scan.example.com".to_string(),
        }
    }

    pub fn unreachable() -> Self {
        let backend = Self::clean();
        *backend.probe_ok.lock().unwrap() = false;
        backend
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

fn clone_result(result: &Result<Verdict>) -> Result<Verdict> {
    match result {
        Ok(v) => Ok(v.clone()),
        Err(ScanError::AuthRequired) => Err(ScanError::AuthRequired),
        Err(ScanError::Timeout) => Err(ScanError::Timeout),
        Err(ScanError::Unavailable(s)) => Err(ScanError::Unavailable(s.clone())),
        Err(ScanError::Protocol(s)) => Err(ScanError::Protocol(s.clone())),
        Err(ScanError::InvalidBaseUrl(s)) => Err(ScanError::InvalidBaseUrl(s.clone())),
    }
}

#[async_trait]
impl ScanBackend for ScriptedBackend {
    async fn probe(&self) -> bool {
        *self.probe_ok.lock().unwrap()
    }

    async fn scan_download(&self, _file_url: &str, _file_name: &str) -> Result<Verdict> {
        *self.download_calls.lock().unwrap() += 1;
        let delay = *self.response_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        clone_result(&self.download_response.lock().unwrap())
    }

    async fn scan_page(&self, _url: &str) -> Result<Verdict> {
        *self.page_calls.lock().unwrap() += 1;
        let delay = *self.response_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        clone_result(&self.page_response.lock().unwrap())
    }

    async fn fetch_logs(&self, _kind: LogKind, _limit: usize) -> Result<Vec<LogEntry>> {
        let mut batches = self.log_batches.lock().unwrap();
        if batches.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(batches.remove(0))
        }
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }
}

/// A credential store that is signed in.
pub fn signed_in_credentials() -> CredentialStore {
    CredentialStore::with_credential("tok", "alex")
}
