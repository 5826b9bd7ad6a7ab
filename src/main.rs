//! CLI entry point for the web-downloads tool.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info, warn};
use web_downloads::{
    Database, DownloadCoordinator, DownloadObserver, DownloadRecord, DownloadStore, EngineConfig,
    LoggingObserver,
};

mod cli;
mod progress;

use cli::{Args, Command};
use progress::ProgressObserver;

/// Download list used when `--db` is not given, relative to the working
/// directory so it never lands among downloaded files.
const DEFAULT_DB_FILE: &str = "web-downloads.db";

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
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = build_config(&args)?;
    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE));
    debug!(db = %db_path.display(), dir = %config.downloads_dir.display(), "opening download list");

    let db = Database::new(&db_path)
        .await
        .with_context(|| format!("cannot open download list at {}", db_path.display()))?;
    let store = Arc::new(DownloadStore::new(db));

    match args.command {
        Command::Get {
            urls,
            user_agent,
            content_disposition,
            mime_type,
        } => {
            let observer = Arc::new(ProgressObserver::new(args.quiet));
            let progress: Arc<dyn DownloadObserver> = Arc::clone(&observer) as _;
            let coordinator = DownloadCoordinator::new(config, store, progress).await?;
            run_get(
                &coordinator,
                &observer,
                &urls,
                user_agent.as_deref(),
                content_disposition.as_deref(),
                mime_type.as_deref(),
            )
            .await
        }
        Command::List { json } => {
            let records = store.list().await?;
            print_records(&records, json)
        }
        Command::Remove { id, delete_file } => {
            let coordinator = idle_coordinator(config, store).await?;
            let removed = coordinator.remove_download(id, delete_file).await?;
            coordinator.cleanup().await;
            if !removed {
                bail!("no download with id {id}");
            }
            info!(id, delete_file, "download removed");
            Ok(())
        }
        Command::Clear => {
            let coordinator = idle_coordinator(config, store).await?;
            let cleared = coordinator.clear_downloads().await?;
            coordinator.cleanup().await;
            info!(cleared, "download list cleared");
            Ok(())
        }
    }
}

/// Config file first, then command-line overrides, then validation.
fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &args.downloads_dir {
        config.downloads_dir.clone_from(dir);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = usize::from(concurrency);
    }
    if let Some(interval) = args.progress_interval_ms {
        config.progress_interval_ms = interval;
    }
    config.validate()?;
    Ok(config)
}

/// Coordinator for list maintenance; nothing observes its events.
async fn idle_coordinator(
    config: EngineConfig,
    store: Arc<DownloadStore>,
) -> Result<DownloadCoordinator> {
    let observer = Arc::new(LoggingObserver);
    Ok(DownloadCoordinator::new(config, store, observer).await?)
}

async fn run_get(
    coordinator: &DownloadCoordinator,
    observer: &ProgressObserver,
    urls: &[String],
    user_agent: Option<&str>,
    content_disposition: Option<&str>,
    mime_type: Option<&str>,
) -> Result<()> {
    let mut started = 0usize;
    let mut rejected = 0usize;
    for url in urls {
        match coordinator
            .start_download(url, user_agent, content_disposition, mime_type)
            .await
        {
            Ok(id) => {
                debug!(id, url = %url, "download queued");
                started += 1;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "download not started");
                rejected += 1;
            }
        }
    }

    let interrupted = tokio::select! {
        () = observer.wait_for(started) => false,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "cannot listen for Ctrl-C");
            }
            warn!(active = coordinator.active_count(), "interrupted; cancelling downloads");
            true
        }
    };
    coordinator.cleanup().await;

    let failed = observer.failed() + rejected;
    info!(
        completed = observer.finished().saturating_sub(observer.failed()),
        failed,
        "downloads finished"
    );
    if interrupted {
        bail!("interrupted");
    }
    if failed > 0 {
        bail!("{failed} of {} downloads failed", urls.len());
    }
    Ok(())
}

fn print_records(records: &[DownloadRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No downloads");
        return Ok(());
    }
    for record in records {
        let size = if record.has_known_size() {
            format!("{}%", record.progress_percent())
        } else {
            format!("{} bytes", record.transferred_bytes)
        };
        let note = record
            .error_message
            .as_deref()
            .map(|error| format!("  ({error})"))
            .unwrap_or_default();
        println!(
            "{:>5}  {:<11}  {:>12}  {}{note}",
            record.id,
            record.status.label(),
            size,
            record.file_name
        );
    }
    Ok(())
}
