use std::path::{Component, Path, PathBuf};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;
use url::Url;

use crate::archive::{ArchiveSpec, write_archive};
use crate::assets::{AssetTarget, fetch_assets};
use crate::config::FetcherConfig;
use crate::error::{DirectoryError, ExtractError, PageError, PageFailure};
use crate::fetch::PageFetcher;
use crate::metadata::{Metadata, extract_metadata};
use crate::naming::url_to_filename;

/// One input URL and the output paths derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTask {
    pub url: String,
    /// Base name shared by `{name}.html`, `{name}/` and `{name}.zip`.
    pub name: String,
    pub out_dir: PathBuf,
}

impl PageTask {
    pub fn new(out_dir: &Path, url: &str) -> Result<Self, PageFailure> {
        let parsed = Url::parse(url).map_err(PageFailure::InvalidUrl)?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(PageFailure::UnsupportedScheme(parsed.scheme().to_owned()));
        }

        // `Url` accepts any scheme case; fetches and names use the lower-case form.
        let url = match url.split_once(':') {
            Some((scheme, rest)) => format!("{}:{rest}", scheme.to_ascii_lowercase()),
            None => url.to_owned(),
        };
        let name = url_to_filename(&url);
        let unsafe_name = name.is_empty()
            || Path::new(&name)
                .components()
                .any(|component| !matches!(component, Component::Normal(_)));
        if unsafe_name {
            return Err(PageFailure::UnsafeName(name));
        }

        Ok(Self {
            url,
            name,
            out_dir: out_dir.to_path_buf(),
        })
    }

    pub fn html_file(&self) -> PathBuf {
        PathBuf::from(format!("{}.html", self.name))
    }

    pub fn html_path(&self) -> PathBuf {
        self.out_dir.join(self.html_file())
    }

    pub fn asset_dir(&self) -> PathBuf {
        self.out_dir.join(&self.name)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.asset_dir().join(format!("{}.json", self.name))
    }

    pub fn archive_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.zip", self.name))
    }

    pub fn archive_spec(&self) -> ArchiveSpec {
        ArchiveSpec {
            archive_path: self.archive_path(),
            root: self.out_dir.clone(),
            files: vec![self.html_file()],
            dirs: vec![PathBuf::from(&self.name)],
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub urls: Vec<String>,
    /// Also fetch assets, record metadata and build the archive.
    pub metadata: bool,
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub task: PageTask,
    /// Present in metadata mode; `last_fetch` is the previous run's time.
    pub metadata: Option<Metadata>,
}

/// Per-URL results, in the order the URLs were given.
#[derive(Debug, Default)]
pub struct RunReport {
    pages: Vec<Result<PageOutcome, PageError>>,
}

impl RunReport {
    pub fn pages(&self) -> &[Result<PageOutcome, PageError>] {
        &self.pages
    }

    pub fn into_pages(self) -> Vec<Result<PageOutcome, PageError>> {
        self.pages
    }

    pub fn has_failures(&self) -> bool {
        self.pages.iter().any(Result::is_err)
    }
}

/// Process every URL concurrently and wait for all of them.
///
/// A failing URL never affects its siblings; its error ends up in the report.
pub async fn run(config: FetcherConfig, options: RunOptions, cancel: CancellationToken) -> RunReport {
    let fetcher = PageFetcher::new(config);
    let mut tasks = JoinSet::new();

    for (index, url) in options.urls.iter().enumerate() {
        let fetcher = fetcher.clone();
        let cancel = cancel.clone();
        let out_dir = options.out_dir.clone();
        let metadata = options.metadata;
        let url = url.clone();
        let span = tracing::info_span!("page", url = %url);
        tasks.spawn(
            async move {
                let result = archive_page(&fetcher, &cancel, &out_dir, &url, metadata).await;
                match &result {
                    Ok(_) => tracing::info!("page done"),
                    Err(err) => tracing::error!(err = %err.failure, "page failed"),
                }
                (index, result)
            }
            .instrument(span),
        );
    }

    let mut slots = options.urls.iter().map(|_| None).collect::<Vec<_>>();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(err) => tracing::error!(?err, "page task aborted"),
        }
    }

    let pages = slots
        .into_iter()
        .zip(options.urls)
        .map(|(slot, url)| slot.unwrap_or_else(|| Err(PageError::new(url, PageFailure::Aborted))))
        .collect();
    RunReport { pages }
}

/// Run the whole pipeline for one URL.
pub async fn archive_page(
    fetcher: &PageFetcher,
    cancel: &CancellationToken,
    out_dir: &Path,
    url: &str,
    metadata: bool,
) -> Result<PageOutcome, PageError> {
    let task = PageTask::new(out_dir, url).map_err(|failure| PageError::new(url, failure))?;
    let metadata = process(fetcher, cancel, &task, metadata)
        .await
        .map_err(|failure| PageError::new(url, failure))?;
    Ok(PageOutcome { task, metadata })
}

async fn process(
    fetcher: &PageFetcher,
    cancel: &CancellationToken,
    task: &PageTask,
    with_metadata: bool,
) -> Result<Option<Metadata>, PageFailure> {
    let body = fetcher
        .fetch_page(cancel, &task.url)
        .await
        .map_err(PageFailure::Fetch)?;

    let html_path = task.html_path();
    if let Some(parent) = html_path.parent() {
        create_dir(parent).await?;
    }

    if !with_metadata {
        fetcher
            .save_page(&html_path, &body)
            .await
            .map_err(PageFailure::Save)?;
        tracing::info!(path = %html_path.display(), "saved page");
        return Ok(None);
    }

    create_dir(&task.asset_dir()).await?;

    let metadata = extract_metadata(&task.url, &task.metadata_path(), &body)
        .await
        .map_err(PageFailure::Extract)?;
    let page = String::from_utf8(body)
        .map_err(|err| PageFailure::Extract(ExtractError::Decode(err.utf8_error())))?;
    ensure_not_cancelled(cancel)?;

    let target = AssetTarget::new(task.asset_dir(), task.name.clone());
    let page = fetch_assets(fetcher, cancel, &metadata.site, &metadata.assets, &target, page)
        .await
        .map_err(PageFailure::Assets)?;

    fetcher
        .save_page(&html_path, page.as_bytes())
        .await
        .map_err(PageFailure::Save)?;
    ensure_not_cancelled(cancel)?;

    write_archive(task.archive_spec())
        .await
        .map_err(PageFailure::Archive)?;
    tracing::info!(path = %task.archive_path().display(), "archived page");

    Ok(Some(metadata))
}

async fn create_dir(path: &Path) -> Result<(), PageFailure> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(path).await.map_err(|source| {
        PageFailure::Directory(DirectoryError {
            path: path.to_path_buf(),
            source,
        })
    })
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), PageFailure> {
    if cancel.is_cancelled() {
        return Err(PageFailure::Cancelled);
    }
    Ok(())
}
