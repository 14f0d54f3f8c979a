use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::fetch::{HttpTransport, Transport};

pub const DEFAULT_USER_AGENT: &str = concat!("pagefetch/", env!("CARGO_PKG_VERSION"));

/// Settings shared by every fetch of one run.
///
/// Built once through [`FetcherConfig::builder`] and handed to
/// [`crate::fetch::PageFetcher::new`]; cloning only bumps the transport's
/// reference count.
#[derive(Clone)]
pub struct FetcherConfig {
    transport: Arc<dyn Transport>,
    user_agent: String,
    request_timeout: Option<Duration>,
    max_concurrent_assets: Option<usize>,
}

impl fmt::Debug for FetcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetcherConfig")
            .field("user_agent", &self.user_agent)
            .field("request_timeout", &self.request_timeout)
            .field("max_concurrent_assets", &self.max_concurrent_assets)
            .finish_non_exhaustive()
    }
}

impl FetcherConfig {
    pub fn builder() -> FetcherConfigBuilder {
        FetcherConfigBuilder::default()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// `None` lets every asset of a page fetch at once.
    pub fn max_concurrent_assets(&self) -> Option<usize> {
        self.max_concurrent_assets
    }
}

#[derive(Default)]
pub struct FetcherConfigBuilder {
    transport: Option<Arc<dyn Transport>>,
    user_agent: Option<String>,
    request_timeout: Option<Duration>,
    max_concurrent_assets: Option<usize>,
}

impl FetcherConfigBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use the reqwest-backed [`HttpTransport`], built from the user agent
    /// and timeout set so far.
    pub fn with_default_transport(self) -> Result<Self, ConfigError> {
        let user_agent = self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let transport = HttpTransport::new(user_agent, self.request_timeout)?;
        Ok(self.transport(Arc::new(transport)))
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn max_concurrent_assets(mut self, limit: usize) -> Self {
        self.max_concurrent_assets = Some(limit);
        self
    }

    pub fn build(self) -> Result<FetcherConfig, ConfigError> {
        let transport = self.transport.ok_or(ConfigError::MissingTransport)?;
        if self.request_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_concurrent_assets == Some(0) {
            return Err(ConfigError::ZeroConcurrency);
        }

        Ok(FetcherConfig {
            transport,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
            request_timeout: self.request_timeout,
            max_concurrent_assets: self.max_concurrent_assets,
        })
    }
}
