use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Page URLs to fetch (must be http/https).
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Also download assets, record metadata and write a zip archive per page.
    #[arg(long)]
    pub metadata: bool,

    /// Output directory for pages, asset directories and archives.
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Per-request timeout.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Maximum concurrent asset downloads per page.
    #[arg(long, default_value_t = 16)]
    pub max_concurrent_assets: usize,

    /// Raise log verbosity (-v info, -vv debug). `RUST_LOG` wins when set.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_apply() {
        let cli = Cli::try_parse_from(["pagefetch", "https://example.com"]).unwrap();
        assert_eq!(cli.urls, vec!["https://example.com"]);
        assert!(!cli.metadata);
        assert_eq!(cli.out, PathBuf::from("."));
        assert_eq!(cli.timeout_secs, 30);
        assert_eq!(cli.max_concurrent_assets, 16);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn flags_and_multiple_urls() {
        let cli = Cli::try_parse_from([
            "pagefetch",
            "--metadata",
            "-vv",
            "--out",
            "site",
            "https://a.test",
            "https://b.test",
        ])
        .unwrap();
        assert!(cli.metadata);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.out, PathBuf::from("site"));
        assert_eq!(cli.urls.len(), 2);
    }

    #[test]
    fn at_least_one_url_is_required() {
        assert!(Cli::try_parse_from(["pagefetch", "--metadata"]).is_err());
    }
}
