use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::FetcherConfig;
use crate::error::{ConfigError, FetchError, SaveError, TransportError};

/// Performs one GET and hands back the whole body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Option<Duration>) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(ConfigError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(body.to_vec())
    }
}

/// Fetches pages and assets and writes them to disk.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    config: Arc<FetcherConfig>,
}

impl PageFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// One GET through the configured transport, abandoned when `cancel` fires.
    ///
    /// The body is buffered in memory without a size cap.
    pub async fn fetch_page(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let request = async {
            let transport = self.config.transport();
            let response = match self.config.request_timeout() {
                Some(timeout) => tokio::time::timeout(timeout, transport.get(url))
                    .await
                    .map_err(|_| FetchError::TimedOut {
                        url: url.to_owned(),
                        timeout,
                    })?,
                None => transport.get(url).await,
            };
            response.map_err(|source| FetchError::Transport {
                url: url.to_owned(),
                source,
            })
        };

        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(FetchError::Cancelled { url: url.to_owned() });
            }
            body = request => body?,
        };

        tracing::debug!(url, bytes = body.len(), "fetched");
        Ok(body)
    }

    pub async fn save_page(&self, path: &Path, body: &[u8]) -> Result<(), SaveError> {
        tokio::fs::write(path, body)
            .await
            .map_err(|source| SaveError {
                path: path.to_path_buf(),
                source,
            })
    }
}
