use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure reported by a [`crate::fetch::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed")]
    Request(#[from] reqwest::Error),

    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("GET {url}: timed out after {timeout:?}")]
    TimedOut { url: String, timeout: Duration },

    #[error("GET {url}: cancelled")]
    Cancelled { url: String },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("decode html as utf-8")]
    Decode(#[source] std::str::Utf8Error),

    #[error("read metadata: {}", path.display())]
    ReadMetadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse metadata: {}", path.display())]
    ParseMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialize metadata")]
    SerializeMetadata(#[source] serde_json::Error),

    #[error("write metadata: {}", path.display())]
    WriteMetadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
#[error("write file: {}", path.display())]
pub struct SaveError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
#[error("create directory: {}", path.display())]
pub struct DirectoryError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("create archive: {}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read archive source: {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("list archive directory: {}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("start archive entry: {name}")]
    Entry {
        name: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("write archive entry: {name}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("finish archive: {}", path.display())]
    Finish {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive writer lock poisoned")]
    Poisoned,

    #[error("join archive task")]
    Join(#[source] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("fetch asset: {url}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("save asset: {url}")]
    Save {
        url: String,
        #[source]
        source: SaveError,
    },

    #[error("asset task aborted")]
    Aborted(#[source] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("a transport is required")]
    MissingTransport,

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("max concurrent assets must be greater than zero")]
    ZeroConcurrency,

    #[error("build http client")]
    Client(#[source] reqwest::Error),
}

/// The step of a page task that failed.
#[derive(Debug, Error)]
pub enum PageFailure {
    #[error("invalid url")]
    InvalidUrl(#[source] url::ParseError),

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("url does not map to a safe file name: {0}")]
    UnsafeName(String),

    #[error("failed to fetch page")]
    Fetch(#[source] FetchError),

    #[error("failed to create dir")]
    Directory(#[source] DirectoryError),

    #[error("failed to extract metadata")]
    Extract(#[source] ExtractError),

    #[error("failed to fetch assets")]
    Assets(#[source] AssetError),

    #[error("failed to save page")]
    Save(#[source] SaveError),

    #[error("failed to zip page")]
    Archive(#[source] ArchiveError),

    #[error("cancelled")]
    Cancelled,

    #[error("page task aborted")]
    Aborted,
}

/// A page task failure, scoped to the input URL that produced it.
#[derive(Debug, Error)]
#[error("{url}")]
pub struct PageError {
    pub url: String,
    #[source]
    pub failure: PageFailure,
}

impl PageError {
    pub fn new(url: impl Into<String>, failure: PageFailure) -> Self {
        Self {
            url: url.into(),
            failure,
        }
    }
}
