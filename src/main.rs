use std::io::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser as _;
use tokio_util::sync::CancellationToken;

use pagefetch::config::FetcherConfig;
use pagefetch::metadata::render_summary;
use pagefetch::pipeline::{RunOptions, run};

#[tokio::main]
async fn main() -> ExitCode {
    match try_main().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn try_main() -> anyhow::Result<ExitCode> {
    let cli = pagefetch::cli::Cli::parse();
    pagefetch::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    let config = FetcherConfig::builder()
        .request_timeout(Duration::from_secs(cli.timeout_secs))
        .max_concurrent_assets(cli.max_concurrent_assets)
        .with_default_transport()
        .context("build http transport")?
        .build()
        .context("build fetcher config")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling in-flight pages");
                cancel.cancel();
            }
        }
    });

    let options = RunOptions {
        urls: cli.urls,
        metadata: cli.metadata,
        out_dir: cli.out,
    };
    let report = run(config, options, cancel).await;
    let failed = report.has_failures();

    let mut stdout = std::io::stdout().lock();
    for page in report.into_pages() {
        match page {
            Ok(outcome) => {
                if let Some(metadata) = outcome.metadata {
                    stdout
                        .write_all(render_summary(&metadata).as_bytes())
                        .context("write summary")?;
                }
            }
            Err(err) => eprintln!("{:#}\n", anyhow::Error::new(err)),
        }
    }
    stdout.flush().context("flush stdout")?;

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
