//! # pak_jobs
//!
//! Scrapes job listings from a configurable list of Pakistani job boards and
//! company career pages, normalizes them into one record shape, and keeps a
//! freshness-based cache of the result.
//!
//! ## Usage
//!
//! ```sh
//! pak_jobs scrape
//! pak_jobs watch
//! pak_jobs search accountant --location Karachi
//! ```
//!
//! ## Architecture
//!
//! 1. **Sources**: load the source list (file or URL), falling back to the
//!    built-in boards
//! 2. **Scraping**: each source is fetched once and run through the
//!    structured, heuristic and rendered extractors in that order
//!    (bounded concurrency, failures isolated per source)
//! 3. **Normalization**: raw listings become canonical records, then are
//!    deduplicated by title and organization
//! 4. **Cache**: the record set replaces the previous generation and is
//!    written to a CSV file

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod assistant;
mod cache;
mod cli;
mod config;
mod errors;
mod models;
mod normalize;
mod orchestrator;
mod refresh;
mod scrapers;
mod utils;

use cache::ScrapeCache;
use cli::{Cli, Command};
use config::{RenderFallback, Settings, load_settings};
use models::{JobFilter, JobRecord};
use orchestrator::ScrapeContext;
use refresh::Refresher;
use scrapers::browser::launch_renderer;
use scrapers::fetch::HttpFetcher;
use utils::{ensure_writable_parent, truncate_chars};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(command = ?args.command, config = ?args.config, "Parsed CLI arguments");

    let mut settings = load_settings(args.config.as_deref()).await?;
    apply_overrides(&mut settings, &args);

    let result = match &args.command {
        Command::Scrape => run_scrape(&settings).await,
        Command::Watch => run_watch(&settings).await,
        Command::Search {
            query,
            category,
            location,
            limit,
        } => {
            let filter = JobFilter {
                query: query.clone(),
                category: category.clone(),
                location: location.clone(),
            };
            run_search(&settings, &filter, *limit)
        }
        Command::Ask { prompt } => run_ask(&settings, args.llm_api_key.clone(), prompt).await,
        Command::Sources => run_sources(&settings).await,
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(?elapsed, "Execution complete"),
        Err(e) => error!(?elapsed, error = %e, "Execution failed"),
    }
    result
}

fn apply_overrides(settings: &mut Settings, args: &Cli) {
    if let Some(sources) = &args.sources {
        settings.sources = Some(sources.clone());
    }
    if let Some(cache) = &args.cache {
        settings.cache.path = cache.clone();
    }
    if let Some(concurrency) = args.concurrency {
        settings.scrape.concurrency = concurrency;
    }
    if args.render {
        settings.render.enabled = true;
        if settings.scrape.render_fallback == RenderFallback::Never {
            settings.scrape.render_fallback = RenderFallback::WhenDynamic;
        }
    }
}

async fn build_context(settings: &Settings) -> Result<ScrapeContext, Box<dyn Error>> {
    let fetcher = HttpFetcher::new(&settings.fetch)?;
    let renderer = match launch_renderer(&settings.render).await {
        Ok(renderer) => Some(renderer),
        Err(e) if settings.render.enabled => {
            warn!(error = %e, "Headless browser unavailable; client-rendered sources will fail");
            None
        }
        Err(e) => {
            debug!(error = %e, "Rendering disabled");
            None
        }
    };
    Ok(ScrapeContext::new(settings, Arc::new(fetcher), renderer))
}

/// Cache seeded from the cache file, if there is one.
fn open_cache(settings: &Settings) -> ScrapeCache {
    let cache = ScrapeCache::from_settings(&settings.cache);
    match cache::load(Path::new(&settings.cache.path), &settings.normalize) {
        Ok(Some(generation)) => cache.restore(generation),
        Ok(None) => {}
        Err(e) => warn!(path = %settings.cache.path, error = %e, "Ignoring unreadable cache file"),
    }
    cache
}

#[instrument(level = "info", skip_all)]
async fn run_scrape(settings: &Settings) -> Result<(), Box<dyn Error>> {
    ensure_writable_parent(Path::new(&settings.cache.path)).await?;
    let refresher = Refresher::new(settings, build_context(settings).await?);
    let cache = open_cache(settings);

    let Some(summary) = refresher.run(&cache).await else {
        return Ok(());
    };
    if summary.no_sources {
        return Err("no sources to scrape".into());
    }
    println!(
        "{} sources: {} succeeded ({} empty), {} failed; {} listings, {} unique; cache {}",
        summary.outcomes.len(),
        summary.succeeded(),
        summary.empty_successes(),
        summary.failed(),
        summary.records_found,
        summary.unique_records,
        cache.status(),
    );
    for outcome in summary.outcomes.iter().filter(|o| !o.is_success()) {
        println!(
            "  failed: {} ({})",
            outcome.url,
            outcome.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn run_watch(settings: &Settings) -> Result<(), Box<dyn Error>> {
    ensure_writable_parent(Path::new(&settings.cache.path)).await?;
    let refresher = Refresher::new(settings, build_context(settings).await?);
    let cache = open_cache(settings);
    info!(
        records = cache.get().records.len(),
        status = %cache.status(),
        stale_after_hours = cache.stale_after().num_hours(),
        every_secs = settings.cache.check_interval_secs,
        "Watching cache freshness"
    );

    let mut ticker = tokio::time::interval(settings.cache.check_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; stopping watch loop");
                return Ok(());
            }
        }
        if !cache.is_stale() {
            continue;
        }
        info!(status = %cache.status(), "Cache is stale; refreshing");
        tokio::select! {
            summary = refresher.run(&cache) => {
                if let Some(summary) = summary {
                    info!(
                        unique = summary.unique_records,
                        organizations = summary.unique_organizations,
                        locations = summary.unique_locations,
                        failed = summary.failed(),
                        status = %cache.status(),
                        "Refresh cycle finished"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted during refresh; previous results kept");
                return Ok(());
            }
        }
    }
}

fn run_search(settings: &Settings, filter: &JobFilter, limit: usize) -> Result<(), Box<dyn Error>> {
    let cache = open_cache(settings);
    let generation = cache.get();
    let refreshed = generation
        .last_refreshed
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    println!("Cache: {} (last refreshed {refreshed})", cache.status());
    if generation.records.is_empty() {
        println!("No cached listings yet; run `pak_jobs scrape` first.");
        return Ok(());
    }

    let hits = filter.apply(&generation.records);
    println!("{} of {} listings match", hits.len(), generation.records.len());
    for record in hits.into_iter().take(limit) {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &JobRecord) {
    println!(
        "- {} | {} | {} | {}",
        record.title, record.organization, record.location, record.category
    );
    println!("  {} ({}, posted {})", record.url, record.source, record.posted_date);
    if record.salary != normalize::PLACEHOLDER {
        println!("  salary: {}", truncate_chars(&record.salary, 80));
    }
}

async fn run_ask(settings: &Settings, api_key: Option<String>, prompt: &str) -> Result<(), Box<dyn Error>> {
    let cache = open_cache(settings);
    let generation = cache.get();
    if generation.records.is_empty() {
        return Err("no cached listings to ask about; run `pak_jobs scrape` first".into());
    }
    let api_key = api_key.or_else(|| std::env::var(&settings.llm.api_key_env).ok());
    let answer = assistant::ask_about_jobs(&settings.llm, api_key, &generation.records, prompt).await?;
    println!("{answer}");
    Ok(())
}

async fn run_sources(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let fetcher = HttpFetcher::new(&settings.fetch)?;
    let ctx = ScrapeContext::new(settings, Arc::new(fetcher), None);
    let sources = Refresher::new(settings, ctx).sources().await;
    for source in &sources {
        println!("{source}");
    }
    info!(count = sources.len(), "Listed sources");
    Ok(())
}
