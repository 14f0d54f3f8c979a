use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::AssetError;
use crate::fetch::PageFetcher;
use crate::naming::{asset_url_to_filename, dot_prefix, wrap_asset_dir, wrap_url};

const UNFETCHABLE_PREFIXES: [&str; 4] = ["data:", "javascript:", "mailto:", "about:"];

/// Where a page's assets are written and how the page refers to them.
#[derive(Debug, Clone)]
pub struct AssetTarget {
    /// Directory the asset files are written into.
    pub dir: PathBuf,
    /// Directory name used inside rewritten references.
    pub link_dir: String,
}

impl AssetTarget {
    pub fn new(dir: impl Into<PathBuf>, link_dir: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            link_dir: link_dir.into(),
        }
    }
}

/// One discovered reference and everything derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    /// Reference exactly as it appears in the markup.
    pub reference: String,
    pub url: String,
    pub local_path: PathBuf,
    /// Replacement written into the page body.
    pub rewritten: String,
}

impl AssetRecord {
    pub fn resolve(site_url: &str, reference: &str, target: &AssetTarget) -> Self {
        let url = wrap_url(site_url, reference);
        let file_name = asset_url_to_filename(&url);
        let rewritten = wrap_asset_dir(dot_prefix(reference), &target.link_dir, &file_name);

        Self {
            reference: reference.to_owned(),
            local_path: target.dir.join(&file_name),
            url,
            rewritten,
        }
    }
}

/// Whether a reference points at something that can be downloaded.
pub fn is_fetchable(reference: &str) -> bool {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') {
        return false;
    }

    let lower = reference.to_ascii_lowercase();
    !UNFETCHABLE_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Download every asset of a page and point `body` at the local copies.
///
/// All assets are attempted even when some fail; the first failure that
/// reached the error queue is returned once every task has finished, and the
/// assets that did succeed stay on disk.
pub async fn fetch_assets(
    fetcher: &PageFetcher,
    cancel: &CancellationToken,
    site_url: &str,
    references: &[String],
    target: &AssetTarget,
    body: String,
) -> Result<String, AssetError> {
    let mut seen = HashSet::new();
    let records = references
        .iter()
        .filter(|reference| is_fetchable(reference) && seen.insert(reference.as_str()))
        .map(|reference| AssetRecord::resolve(site_url, reference, target))
        .collect::<Vec<_>>();
    if records.is_empty() {
        return Ok(body);
    }

    let body = Arc::new(Mutex::new(body));
    let limiter = fetcher
        .config()
        .max_concurrent_assets()
        .map(|permits| Arc::new(Semaphore::new(permits)));
    let (failures_tx, mut failures_rx) = mpsc::channel::<AssetError>(records.len());

    tracing::debug!(assets = records.len(), "fetching assets");

    let mut tasks = JoinSet::new();
    for record in records {
        let fetcher = fetcher.clone();
        let cancel = cancel.clone();
        let body = Arc::clone(&body);
        let limiter = limiter.clone();
        let failures_tx = failures_tx.clone();
        tasks.spawn(async move {
            let _permit = match limiter {
                Some(limiter) => limiter.acquire_owned().await.ok(),
                None => None,
            };
            if let Err(err) = fetch_asset(&fetcher, &cancel, &record, &body).await {
                tracing::warn!(url = %record.url, err = %err, "asset failed");
                let _ = failures_tx.try_send(err);
            }
        });
    }
    drop(failures_tx);

    let mut aborted = None;
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined
            && aborted.is_none()
        {
            aborted = Some(AssetError::Aborted(err));
        }
    }

    if let Ok(err) = failures_rx.try_recv() {
        return Err(err);
    }
    if let Some(err) = aborted {
        return Err(err);
    }

    let mut body = body.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(std::mem::take(&mut *body))
}

async fn fetch_asset(
    fetcher: &PageFetcher,
    cancel: &CancellationToken,
    record: &AssetRecord,
    body: &Mutex<String>,
) -> Result<(), AssetError> {
    let bytes = fetcher
        .fetch_page(cancel, &record.url)
        .await
        .map_err(|source| AssetError::Fetch {
            url: record.url.clone(),
            source,
        })?;

    {
        let mut body = body.lock().unwrap_or_else(PoisonError::into_inner);
        *body = body.replace(&record.reference, &record.rewritten);
    }

    fetcher
        .save_page(&record.local_path, &bytes)
        .await
        .map_err(|source| AssetError::Save {
            url: record.url.clone(),
            source,
        })?;

    tracing::debug!(
        url = %record.url,
        path = %record.local_path.display(),
        bytes = bytes.len(),
        "saved asset"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::config::FetcherConfig;
    use crate::fetch::test_support::{StaticTransport, fetcher};

    fn target(dir: &Path) -> AssetTarget {
        AssetTarget::new(dir, "example.com")
    }

    #[test]
    fn resolve_keeps_root_relative_marker() {
        let target = AssetTarget::new("/tmp/out/example.com", "example.com");

        let record = AssetRecord::resolve("https://example.com/", "/img/a.png", &target);
        assert_eq!(record.url, "https://example.com/img/a.png");
        assert_eq!(record.rewritten, "/example.com/example.com_img_a.png");
        assert_eq!(
            record.local_path,
            Path::new("/tmp/out/example.com/example.com_img_a.png")
        );

        let record = AssetRecord::resolve("https://example.com", "img/a.png", &target);
        assert_eq!(record.rewritten, "./example.com/example.com_img_a.png");

        let record =
            AssetRecord::resolve("https://example.com", "https://cdn.example.org/a.js", &target);
        assert_eq!(record.url, "https://cdn.example.org/a.js");
        assert_eq!(record.rewritten, "./example.com/cdn.example.org_a.js");
    }

    #[test]
    fn is_fetchable_skips_inline_and_fragment_references() {
        assert!(is_fetchable("/img/a.png"));
        assert!(is_fetchable("https://cdn.example.org/a.js"));
        assert!(!is_fetchable(""));
        assert!(!is_fetchable("  "));
        assert!(!is_fetchable("#top"));
        assert!(!is_fetchable("data:image/png;base64,AAAA"));
        assert!(!is_fetchable("JavaScript:void(0)"));
        assert!(!is_fetchable("mailto:me@example.com"));
    }

    #[tokio::test]
    async fn rewrites_every_occurrence_of_a_reference() {
        let temp = tempfile::TempDir::new().unwrap();
        let (fetcher, transport) = fetcher(
            StaticTransport::default().with_route("https://example.com/img/a.png", vec![1, 2, 3]),
        );
        let body = r#"<img src="/img/a.png"><a href="/img/a.png">full</a>"#.to_owned();

        let rewritten = fetch_assets(
            &fetcher,
            &CancellationToken::new(),
            "https://example.com",
            &["/img/a.png".to_owned(), "/img/a.png".to_owned()],
            &target(temp.path()),
            body,
        )
        .await
        .unwrap();

        assert_eq!(
            rewritten,
            r#"<img src="/example.com/example.com_img_a.png"><a href="/example.com/example.com_img_a.png">full</a>"#
        );
        assert!(!rewritten.contains("\"/img/a.png\""));
        assert_eq!(
            std::fs::read(temp.path().join("example.com_img_a.png")).unwrap(),
            vec![1, 2, 3]
        );
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn one_failed_asset_fails_the_page_but_keeps_the_rest() {
        let temp = tempfile::TempDir::new().unwrap();
        let (fetcher, _) = fetcher(
            StaticTransport::default()
                .with_route("https://example.com/a.css", "a")
                .with_route("https://example.com/c.js", "c"),
        );
        let references = vec!["a.css".to_owned(), "b.png".to_owned(), "c.js".to_owned()];

        let err = fetch_assets(
            &fetcher,
            &CancellationToken::new(),
            "https://example.com",
            &references,
            &target(temp.path()),
            "<html></html>".to_owned(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AssetError::Fetch { ref url, .. } if url == "https://example.com/b.png"));
        assert_eq!(
            std::fs::read_to_string(temp.path().join("example.com_a.css")).unwrap(),
            "a"
        );
        assert_eq!(
            std::fs::read_to_string(temp.path().join("example.com_c.js")).unwrap(),
            "c"
        );
        assert!(!temp.path().join("example.com_b.png").exists());
    }

    #[tokio::test]
    async fn save_failure_is_reported() {
        let temp = tempfile::TempDir::new().unwrap();
        let (fetcher, _) =
            fetcher(StaticTransport::default().with_route("https://example.com/a.css", "a"));

        let err = fetch_assets(
            &fetcher,
            &CancellationToken::new(),
            "https://example.com",
            &["a.css".to_owned()],
            &target(&temp.path().join("missing")),
            String::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AssetError::Save { .. }));
    }

    #[tokio::test]
    async fn unfetchable_references_are_left_alone() {
        let temp = tempfile::TempDir::new().unwrap();
        let (fetcher, transport) = fetcher(StaticTransport::default());
        let body = r##"<img src="data:image/png;base64,AAAA"><link href="#x">"##.to_owned();

        let rewritten = fetch_assets(
            &fetcher,
            &CancellationToken::new(),
            "https://example.com",
            &["data:image/png;base64,AAAA".to_owned(), "#x".to_owned()],
            &target(temp.path()),
            body.clone(),
        )
        .await
        .unwrap();

        assert_eq!(rewritten, body);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn limiter_still_fetches_every_asset() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut transport = StaticTransport::default();
        let mut references = Vec::new();
        for i in 0..6 {
            transport = transport.with_route(&format!("https://example.com/{i}.png"), "x");
            references.push(format!("{i}.png"));
        }
        let transport = Arc::new(transport);
        let config = FetcherConfig::builder()
            .transport(transport.clone())
            .max_concurrent_assets(2)
            .build()
            .unwrap();

        fetch_assets(
            &PageFetcher::new(config),
            &CancellationToken::new(),
            "https://example.com",
            &references,
            &target(temp.path()),
            String::new(),
        )
        .await
        .unwrap();

        assert_eq!(transport.requests().len(), 6);
        for i in 0..6 {
            assert!(temp.path().join(format!("example.com_{i}.png")).exists());
        }
    }
}
