//! CLI entry point for the media resolver.

use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use media_resolver::{
    ExtractorConfig, FetchConfig, HttpFetcher, MediaItem, PersistedItem, ReferenceRegistry,
    ResolutionPool, RetryPolicy, build_default_extractor_registry,
};
use serde::Serialize;
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command};

/// One resolved item as printed to stdout.
#[derive(Debug, Serialize)]
struct ResolvedLine<'a> {
    ordinal: u32,
    url: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let retry_policy = RetryPolicy::with_max_attempts(u32::from(args.max_attempts));
    let pool = ResolutionPool::new(usize::from(args.concurrency), retry_policy.clone())?;

    match &args.command {
        Command::Extract { input, resolve } => {
            let fetcher = HttpFetcher::with_config(&FetchConfig {
                connect_timeout_secs: args.connect_timeout,
                read_timeout_secs: args.read_timeout,
                ..FetchConfig::default()
            })?;
            let config = ExtractorConfig::default().with_retry_policy(retry_policy);
            let registry = build_default_extractor_registry(Arc::new(fetcher), config);

            let extraction = registry.extract(input).await?;
            info!(
                title = extraction.record.title(),
                items = extraction.items.len(),
                "Extraction complete"
            );

            if *resolve {
                resolve_and_print(&pool, &extraction.items).await
            } else {
                let mut out = BufWriter::new(io::stdout().lock());
                serde_json::to_writer(&mut out, &extraction.record)?;
                writeln!(out)?;
                for item in &extraction.items {
                    serde_json::to_writer(&mut out, &item.dump())?;
                    writeln!(out)?;
                }
                out.flush()?;
                Ok(())
            }
        }
        Command::Resolve { file } => {
            let items = load_items(file)?;
            info!(items = items.len(), file = %file.display(), "Loaded items");
            resolve_and_print(&pool, &items).await
        }
    }
}

/// Reads persisted items, one JSON object per non-blank line.
fn load_items(path: &Path) -> Result<Vec<MediaItem>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let registry = ReferenceRegistry::global();

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let persisted: PersistedItem = serde_json::from_str(line)
                .with_context(|| format!("{}:{}: not a persisted item", path.display(), index + 1))?;
            MediaItem::load(&persisted, registry)
                .with_context(|| format!("{}:{}: cannot load item", path.display(), index + 1))
        })
        .collect()
}

async fn resolve_and_print(pool: &ResolutionPool, items: &[MediaItem]) -> Result<()> {
    let report = pool.resolve_all(items).await?;

    let mut out = BufWriter::new(io::stdout().lock());
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(url) => {
                serde_json::to_writer(
                    &mut out,
                    &ResolvedLine {
                        ordinal: outcome.ordinal,
                        url,
                    },
                )?;
                writeln!(out)?;
            }
            Err(e) => warn!(ordinal = outcome.ordinal, page = %outcome.referring_page, error = %e, "Unresolved item"),
        }
    }
    out.flush()?;

    info!(
        resolved = report.stats.resolved(),
        failed = report.stats.failed(),
        retried = report.stats.retried(),
        "Resolution complete"
    );

    if !report.is_complete() {
        bail!(
            "{} of {} item(s) failed to resolve",
            report.stats.failed(),
            report.outcomes.len()
        );
    }
    Ok(())
}
