//! # Noticias Pipeline
//!
//! A news aggregation pipeline for Argentine outlets: it reads RSS feeds,
//! optionally rewrites articles through an LLM, vets each article's
//! candidate photos with computer-vision heuristics, and stores the results
//! in Supabase (or a local directory).
//!
//! ## Usage
//!
//! ```sh
//! noticias_pipeline --local-store ./data --report-dir ./reports
//! ```
//!
//! ## Architecture
//!
//! 1. **Sources**: collect raw articles from the configured feeds
//! 2. **Rewrite** (optional): LLM rewrite of the article text
//! 3. **Images**: filter, download, normalize, score and pick the best
//!    candidate photo, falling back to a placeholder
//! 4. **Persistence**: deduplicate by source URL and insert the article
//! 5. **Report**: per-run summary, optionally written as JSON

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod acquisition;
mod cli;
mod config;
mod error;
mod models;
mod outputs;
mod pipeline;
mod quality;
mod retry;
mod rewrite;
mod sources;
mod storage;
mod utils;

use acquisition::AcquisitionWorkflow;
use acquisition::fetch::{HttpImageFetcher, RetryFetch, build_client};
use acquisition::rate_limit::RateLimiter;
use cli::Cli;
use config::{Destination, PipelineConfig};
use outputs::json;
use pipeline::{Pipeline, RunOptions};
use quality::QualityScorer;
use retry::Backoff;
use rewrite::ConfiguredRewriter;
use sources::RssSource;
use storage::{Backend, FsStore, SupabaseStore};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    let dotenv = dotenvy::dotenv();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Ignoring unreadable .env"),
    }

    info!("noticias_pipeline starting up");

    let args = Cli::parse();
    debug!(?args.local_store, ?args.report_dir, ?args.interval_minutes, "Parsed CLI arguments");

    let config = PipelineConfig::from_cli(&args).map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;
    info!(
        floor = config.quality.acceptance_floor,
        min_width = config.quality.min_width,
        min_height = config.quality.min_height,
        strict = config.quality.strict,
        download_concurrency = config.download_concurrency,
        rewrite = config.enable_rewrite,
        "Configuration loaded"
    );

    if let Some(dir) = &config.report_dir {
        if let Err(e) = utils::ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "Report directory is not writable");
            return Err(e.into());
        }
    }

    // ---- Shared collaborators ----
    let client = build_client(&config.acquisition)?;
    let limiter = Arc::new(RateLimiter::per_minute(config.acquisition.requests_per_minute));

    let backend = match &config.destination {
        Destination::Supabase(supabase) => {
            info!(url = %supabase.url, bucket = %supabase.bucket, table = %supabase.table, "Using Supabase backend");
            Backend::Supabase(SupabaseStore::new(client.clone(), supabase))
        }
        Destination::Local(dir) => {
            info!(path = %dir.display(), "Using local store");
            Backend::Local(FsStore::new(dir.clone()).await?)
        }
    };
    let store = Arc::new(backend);

    let feeds = sources::load_feeds(config.sources_file.as_deref()).await?;
    let source = RssSource::new(
        client.clone(),
        Arc::clone(&limiter),
        feeds,
        config.max_articles_per_source,
    );

    let fetcher = RetryFetch::new(
        HttpImageFetcher::new(client.clone(), Arc::clone(&limiter), &config.acquisition),
        Backoff::new(config.acquisition.download_attempts, Duration::from_secs(1)),
    );
    let scorer = Arc::new(QualityScorer::new(config.quality.clone()));
    let workflow = AcquisitionWorkflow::new(
        fetcher,
        Arc::clone(&store),
        scorer,
        config.acquisition.clone(),
    );
    let rewriter = ConfiguredRewriter::from_config(&config).await;

    let pipeline = Pipeline::new(source, workflow, store, rewriter, RunOptions::from(&config));

    // ---- Run (once, or every interval until interrupted) ----
    let mut pass = 0usize;
    loop {
        pass += 1;
        info!(pass, "Starting pass");

        let report = pipeline.run_once().await.map_err(|e| {
            error!(pass, error = %e, "Run aborted");
            e
        })?;

        if let Some(dir) = &config.report_dir {
            if let Err(e) = json::write_report(&report, dir).await {
                error!(error = %e, "Failed to write run report");
            }
        }

        let Some(interval) = config.run_interval else {
            break;
        };
        info!(minutes = interval.as_secs() / 60, "Sleeping until next pass (Ctrl-C to exit)");
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; exiting");
                break;
            }
        }
    }

    info!(passes = pass, "noticias_pipeline finished");
    Ok(())
}
