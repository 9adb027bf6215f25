//! CLI entry point for blogcrawl.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use blogcrawl_core::{CrawlService, CrawlSettings, Database, EnqueueMode, ProgressUpdate};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

mod app_config;
mod cli;
mod progress_view;

use cli::{Args, Command};

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

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let file_config = app_config::load_config(args.config.as_deref())?;
    let settings = apply_overrides(file_config.crawl.clone(), &args);
    settings.validate().context("Invalid settings")?;

    let db_path = file_config.database_path(&settings);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    let db = Database::new(&db_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", db_path.display()))?;

    let (progress_tx, progress_rx) = mpsc::unbounded_channel::<ProgressUpdate>();
    let show_progress = !args.quiet && matches!(args.command, Command::Crawl { .. });
    let view = progress_view::spawn_progress_view(show_progress, progress_rx);

    let service = CrawlService::open(db, settings, Arc::new(progress_tx)).await?;
    let outcome = run_command(&service, args.command).await;

    drop(service);
    if let Err(e) = view.await {
        warn!(error = %e, "progress view panicked");
    }
    outcome
}

fn apply_overrides(mut settings: CrawlSettings, args: &Args) -> CrawlSettings {
    if let Some(root) = &args.root {
        settings.download_root.clone_from(root);
    }
    if let Some(blogs) = args.parallel_blogs {
        settings.parallel_blogs = usize::from(blogs);
    }
    if let Some(images) = args.parallel_images {
        settings.parallel_images = usize::from(images);
    }
    if let Some(bandwidth) = args.bandwidth {
        settings.bandwidth_kbps = bandwidth;
    }
    settings
}

async fn run_command(service: &CrawlService, command: Command) -> Result<()> {
    match command {
        Command::Add { urls } => {
            let mut failed = 0;
            for url in urls {
                match service.add_blog(&url).await {
                    Ok(blog) => info!(blog = %blog.name(), "Added blog"),
                    Err(e) => {
                        warn!(url = %url, error = %e, "Could not add blog");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} blog(s) could not be added");
            }
            Ok(())
        }
        Command::List => {
            for blog in service.library().blogs() {
                let line = blog.read(|b| {
                    let last = b.last_complete_crawl.map_or_else(
                        || "never".to_string(),
                        |t| t.format("%Y-%m-%d %H:%M").to_string(),
                    );
                    format!(
                        "{:<24} {:>4}%  {:>6} posts  {:>6}/{:<6} items  last crawl: {}{}",
                        b.name,
                        b.progress,
                        b.stats.posts,
                        b.stats.downloaded.total,
                        b.stats.total_count,
                        last,
                        if b.online { "" } else { "  (offline)" },
                    )
                });
                println!("{line}");
            }
            Ok(())
        }
        Command::Remove { name, keep_files } => {
            service.remove_blog(&name, !keep_files).await?;
            info!(blog = %name, "Removed blog");
            Ok(())
        }
        Command::Crawl { names, all, auto } => {
            crawl(service, &names, all, auto.map(Into::into)).await
        }
    }
}

async fn crawl(
    service: &CrawlService,
    names: &[String],
    all: bool,
    auto: Option<EnqueueMode>,
) -> Result<()> {
    let mode = if all { Some(EnqueueMode::All) } else { auto };
    let mut queued = mode.map_or(0, |mode| service.enqueue_auto(mode));
    for name in names {
        if service.enqueue(name)? {
            queued += 1;
        }
    }
    if queued == 0 {
        info!("Nothing to crawl. Pass blog names, --all or --auto.");
        return Ok(());
    }

    info!(queued, "Crawling");
    service.start()?;

    tokio::select! {
        () = service.wait_until_drained() => {
            info!("All queued blogs crawled");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Stopping after in-flight transfers finish");
        }
    }

    service.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_overrides_replaces_only_given_values() {
        let args = Args::try_parse_from(["blogcrawl", "list", "-i", "8", "--bandwidth", "100"])
            .unwrap();
        let settings = apply_overrides(CrawlSettings::default(), &args);
        assert_eq!(settings.parallel_images, 8);
        assert_eq!(settings.bandwidth_kbps, 100);
        assert_eq!(settings.parallel_blogs, 2);
    }
}
