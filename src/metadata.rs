use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::fs;

use crate::error::ExtractError;

const LAST_FETCH_FORMAT: &str = "%a %b %d %Y %H:%M UTC";

/// Persisted summary of one fetched page, stored as `{name}/{name}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub site: String,
    pub num_links: u64,
    pub images: u64,
    /// `src`/`href` values in document order, duplicates kept.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub assets: Vec<String>,
    /// When returned from [`extract_metadata`] this is the fetch *before*
    /// the current one; `None` on a first fetch.
    #[serde(default)]
    pub last_fetch: Option<DateTime<Utc>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Scan `html` for asset tags and persist a fresh record at `metadata_path`.
///
/// The file on disk gets the current time as `last_fetch`, the returned
/// record carries the timestamp read from the previous file (if any).
pub async fn extract_metadata(
    site_url: &str,
    metadata_path: &Path,
    html: &[u8],
) -> Result<Metadata, ExtractError> {
    let html = std::str::from_utf8(html).map_err(ExtractError::Decode)?;
    let scan = scan_assets(html);

    let mut metadata = Metadata {
        site: site_url.to_owned(),
        num_links: scan.num_links,
        images: scan.images,
        assets: scan.assets,
        last_fetch: None,
    };

    let previous_fetch = read_previous_fetch(metadata_path).await?;

    metadata.last_fetch = Some(Utc::now());
    write_metadata_atomic(metadata_path, &metadata).await?;

    metadata.last_fetch = previous_fetch;
    Ok(metadata)
}

/// Console block printed after a page has been archived.
#[must_use]
pub fn render_summary(metadata: &Metadata) -> String {
    let last_fetch = metadata.last_fetch.map_or_else(
        || "-".to_owned(),
        |at| at.format(LAST_FETCH_FORMAT).to_string(),
    );
    format!(
        "site: {}\nnum_links: {}\nimages: {}\nlast_fetch: {last_fetch}\n\n",
        metadata.site, metadata.num_links, metadata.images
    )
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct AssetScan {
    pub(crate) num_links: u64,
    pub(crate) images: u64,
    pub(crate) assets: Vec<String>,
}

impl AssetScan {
    fn record(&mut self, tag: &Tag) {
        match &*tag.name {
            "img" => self.images += 1,
            "script" | "link" => self.num_links += 1,
            _ => return,
        }

        for attr in &tag.attrs {
            if matches!(&*attr.name.local, "src" | "href") {
                self.assets.push(attr.value.to_string());
            }
        }
    }
}

impl TokenSink for AssetScan {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let Token::TagToken(tag) = token else {
            return TokenSinkResult::Continue;
        };
        if tag.kind != TagKind::StartTag {
            return TokenSinkResult::Continue;
        }

        self.record(&tag);
        raw_text_state(&tag)
    }
}

// The bare tokenizer has no tree builder to tell it which elements hold raw
// text, so script and style bodies would otherwise be scanned as markup.
fn raw_text_state(tag: &Tag) -> TokenSinkResult<()> {
    match &*tag.name {
        "script" => TokenSinkResult::RawData(RawKind::ScriptData),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" | "noscript" => {
            TokenSinkResult::RawData(RawKind::Rawtext)
        }
        "title" | "textarea" => TokenSinkResult::RawData(RawKind::Rcdata),
        "plaintext" => TokenSinkResult::Plaintext,
        _ => TokenSinkResult::Continue,
    }
}

pub(crate) fn scan_assets(html: &str) -> AssetScan {
    let mut input = BufferQueue::new();
    input.push_back(StrTendril::from_slice(html));

    let mut tokenizer = Tokenizer::new(AssetScan::default(), TokenizerOpts::default());
    let _ = tokenizer.feed(&mut input);
    tokenizer.end();

    tokenizer.sink
}

async fn read_previous_fetch(path: &Path) -> Result<Option<DateTime<Utc>>, ExtractError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ExtractError::ReadMetadata {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let previous: Metadata =
        serde_json::from_slice(&bytes).map_err(|source| ExtractError::ParseMetadata {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(previous.last_fetch)
}

async fn write_metadata_atomic(path: &Path, metadata: &Metadata) -> Result<(), ExtractError> {
    let write_err = |source| ExtractError::WriteMetadata {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(metadata).map_err(ExtractError::SerializeMetadata)?;
    fs::write(&tmp_path, &data).await.map_err(write_err)?;
    if let Err(err) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(write_err(err));
    }

    Ok(())
}
