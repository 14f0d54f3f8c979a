//! String transforms between page URLs, on-disk names and rewritten references.
//!
//! Nothing here touches the filesystem or parses URLs; every function is a
//! plain substring operation so that the output mirrors the input markup.

const SCHEMES: [&str; 2] = ["https://", "http://"];

fn strip_scheme_and_www(url: &str) -> &str {
    match SCHEMES.iter().find_map(|scheme| url.strip_prefix(scheme)) {
        Some(rest) => rest.strip_prefix("www.").unwrap_or(rest),
        None => url,
    }
}

/// Page URL to the base name used for `{name}.html`, `{name}/` and `{name}.zip`.
///
/// Strips an `http://`/`https://` scheme with an optional `www.` host prefix
/// and at most one trailing `/`. Inner path segments are kept as they are.
#[must_use]
pub fn url_to_filename(url: &str) -> String {
    let name = strip_scheme_and_www(url);
    name.strip_suffix('/').unwrap_or(name).to_owned()
}

/// Absolute asset URL to a flat file name: `/` becomes `_`.
///
/// Two URLs that flatten to the same name overwrite each other on disk.
#[must_use]
pub fn asset_url_to_filename(url: &str) -> String {
    strip_scheme_and_www(url).replace('/', "_")
}

/// Resolve an asset reference against the page URL it was found on.
///
/// References that mention `http` are taken as absolute. Anything else is
/// appended to `base` with exactly one `/` between them.
#[must_use]
pub fn wrap_url(base: &str, reference: &str) -> String {
    if reference.contains("http") {
        return reference.to_owned();
    }

    let base = base.strip_suffix('/').unwrap_or(base);
    let reference = reference.strip_prefix('/').unwrap_or(reference);
    format!("{base}/{reference}")
}

/// `""` for root-relative references, `"."` for everything else.
#[must_use]
pub fn dot_prefix(reference: &str) -> &'static str {
    if reference.starts_with('/') { "" } else { "." }
}

/// Local reference written into the page: `{dot}/{dir}/{file_name}`.
#[must_use]
pub fn wrap_asset_dir(dot: &str, dir: &str, file_name: &str) -> String {
    format!("{dot}/{dir}/{file_name}")
}
