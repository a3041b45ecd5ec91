//! namerd delegation table client
//!
//! Reads and replaces whole delegation tables through the namerd HTTP API
//! (`/api/1/dtabs/{dtab}`). The client keeps no state of its own.

use async_trait::async_trait;
use needle_api::DtabEntry;
use needle_core::{CoreError, NamingService, Result};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Where namerd listens and how long a request may take
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NamerdConfig {
    pub scheme: String,
    /// `host:port`
    pub host: String,
    pub timeout_secs: u64,
}

impl Default for NamerdConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "127.0.0.1:4180".to_string(),
            timeout_secs: 5,
        }
    }
}

impl NamerdConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// NamerdClient talks to the namerd dtab API
#[derive(Clone, Debug)]
pub struct NamerdClient {
    http: Client,
    base: Url,
}

impl NamerdClient {
    pub fn new(config: &NamerdConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url())
            .map_err(|e| CoreError::InvalidArgument(format!("namerd address: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(CoreError::InvalidArgument(format!(
                "namerd address is not a base url: {}",
                base
            )));
        }
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(transport)?;
        Ok(Self { http, base })
    }

    /// `{base}/api/1/dtabs/{dtab}` with `dtab` percent-encoded as one segment
    fn dtab_url(&self, dtab: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["api", "1", "dtabs", dtab]);
        }
        url
    }

    /// Current rules of `dtab`
    pub async fn dentries(&self, dtab: &str) -> Result<Vec<DtabEntry>> {
        let url = self.dtab_url(dtab);
        debug!(%url, "fetching dtab");
        let response = self.http.get(url).send().await.map_err(transport)?;
        let response = check_status(response)?;
        response.json().await.map_err(transport)
    }

    /// Replace every rule of `dtab` with `entries`
    pub async fn update_dentries(&self, dtab: &str, entries: &[DtabEntry]) -> Result<()> {
        let url = self.dtab_url(dtab);
        debug!(%url, entries = entries.len(), "replacing dtab");
        let response = self
            .http
            .put(url)
            .json(entries)
            .send()
            .await
            .map_err(transport)?;
        check_status(response)?;
        Ok(())
    }
}

#[async_trait]
impl NamingService for NamerdClient {
    async fn fetch_dentries(&self, dtab: &str) -> Result<Vec<DtabEntry>> {
        self.dentries(dtab).await
    }

    async fn replace_dentries(&self, dtab: &str, entries: &[DtabEntry]) -> Result<()> {
        self.update_dentries(dtab, entries).await
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(remote(status))
    }
}

fn remote(status: StatusCode) -> CoreError {
    CoreError::Remote {
        status: status.as_u16(),
    }
}

fn transport(e: reqwest::Error) -> CoreError {
    CoreError::Transport(e.to_string())
}
