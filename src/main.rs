//! Main entry point for the sigfetch CLI

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use reqwest::Client;
use sigfetch::cipher::{fetch_script, CipherCache, CipherResolver, CipherTask};
use sigfetch::cli::{Args, Command, DecipherArgs, DownloadArgs, OutputFormatter};
use sigfetch::download::{random_user_agent, AbortSignal, HttpRangeFetcher, RangeDownloader};
use sigfetch::utils::url::{player_script_path, player_script_url, script_id_from_url};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.log_filter())?;
    debug!("Starting sigfetch with args: {:?}", args);

    let formatter = OutputFormatter::new(args.verbosity_level());

    match args.command {
        Command::Download(download) => handle_download(download, formatter).await,
        Command::Decipher(decipher) => handle_decipher(decipher, formatter).await,
    }
}

/// Handle `sigfetch download`
async fn handle_download(args: DownloadArgs, mut formatter: OutputFormatter) -> Result<()> {
    let config = args.downloader_config();
    let downloader = RangeDownloader::with_config(config.clone())?;

    let total_length = match args.length {
        Some(length) => length,
        None => {
            formatter.info("Probing content length...");
            HttpRangeFetcher::new(config.request_timeout, config.method)?
                .content_length(&args.url)
                .await
                .context("Could not determine content length, pass --length")?
        }
    };

    formatter.print_download_start(&args.url, &args.output, total_length);
    if !args.no_progress {
        formatter.create_progress_bar(total_length);
    }

    let abort = AbortSignal::new();
    let interrupt = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, aborting download");
            interrupt.trigger();
        }
    });

    let start_time = Instant::now();
    let result = downloader
        .download_with_abort(
            &args.url,
            &args.output,
            total_length,
            |snapshot| formatter.update_progress(&snapshot),
            abort,
        )
        .await;

    match result {
        Ok(path) => {
            formatter.finish_progress("Done");
            formatter.print_download_complete(&path, total_length, start_time.elapsed());
            info!("Saved {}", path.display());
            Ok(())
        }
        Err(e) => {
            formatter.abandon_progress();
            Err(e).with_context(|| format!("Download of {} failed", args.url))
        }
    }
}

/// Handle `sigfetch decipher`
async fn handle_decipher(args: DecipherArgs, formatter: OutputFormatter) -> Result<()> {
    let (script_id, script_url) = match (&args.page, &args.player_url) {
        (Some(page), _) => {
            let html = tokio::fs::read_to_string(page)
                .await
                .with_context(|| format!("Failed to read {}", page.display()))?;
            let path = player_script_path(&html)
                .ok_or_else(|| anyhow!("No player script referenced in {}", page.display()))?;
            let url = player_script_url(&path);
            (path, url)
        }
        (None, Some(url)) => (script_id_from_url(url)?, url.clone()),
        (None, None) => bail!("Either --page or --player-url is required"),
    };
    formatter.print_script(&script_id);

    let cache = match args.cache_location() {
        Some(dir) => {
            debug!("Using cipher cache in {}", dir.display());
            CipherCache::on_disk(dir).with_freshness(args.cache_freshness()?)
        }
        None => CipherCache::disabled(),
    };
    let resolver = CipherResolver::with_config(cache, args.resolver_config());

    let client = Client::builder()
        .timeout(args.timeout_duration())
        .user_agent(random_user_agent())
        .build()?;

    let mut tasks = Vec::with_capacity(args.ciphers.len());
    let mut receivers = Vec::with_capacity(args.ciphers.len());
    for raw in &args.ciphers {
        let (tx, rx) = oneshot::channel();
        let task = CipherTask::from_signature_cipher(raw, move |resolved| {
            let _ = tx.send(resolved);
        });
        match task {
            Some(task) => {
                tasks.push(task);
                receivers.push(Some(rx));
            }
            None => {
                formatter.warning(&format!("Skipping malformed signatureCipher: {}", raw));
                receivers.push(None);
            }
        }
    }

    resolver
        .resolve(&script_id, || fetch_script(&client, &script_url), tasks)
        .await;

    let mut resolved = 0;
    for rx in receivers.into_iter().flatten() {
        if let Ok(url) = rx.await {
            formatter.print_resolved(&url);
            resolved += 1;
        }
    }

    let total = args.ciphers.len();
    formatter.print_resolve_summary(resolved, total);
    if resolved == 0 {
        bail!("No signatures could be resolved");
    }
    Ok(())
}

/// Initialize logging system
fn init_logging(default_filter: &str) -> Result<()> {
    // RUST_LOG wins over the verbosity flags
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();

    Ok(())
}
