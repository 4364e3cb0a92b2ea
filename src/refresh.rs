//! One refresh cycle: resolve sources, scrape them, swap the cache, persist.

use crate::cache::{self, ScrapeCache};
use crate::config::Settings;
use crate::errors::CacheError;
use crate::models::RunSummary;
use crate::orchestrator::{ScrapeContext, scrape_all};
use crate::scrapers::sources::resolve_sources;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

pub struct Refresher {
    ctx: ScrapeContext,
    source_location: Option<String>,
    default_sources: Vec<String>,
    cache_path: PathBuf,
    backup_dir: Option<PathBuf>,
}

impl Refresher {
    pub fn new(settings: &Settings, ctx: ScrapeContext) -> Self {
        Self {
            ctx,
            source_location: settings.sources.clone(),
            default_sources: settings.default_sources.0.clone(),
            cache_path: PathBuf::from(&settings.cache.path),
            backup_dir: settings.cache.backup_dir.as_ref().map(PathBuf::from),
        }
    }

    /// The source list this refresher would scrape right now.
    pub async fn sources(&self) -> Vec<String> {
        resolve_sources(
            self.source_location.as_deref(),
            &self.default_sources,
            self.ctx.fetcher.as_ref(),
        )
        .await
    }

    /// Run one cycle against `cache`.
    ///
    /// Returns `None` without doing anything when another refresh holds the
    /// slot. A run where no source succeeded, or that found nothing while
    /// some sources failed, leaves the previous generation (and the cache
    /// file) in place and flags the cache as failed.
    #[instrument(level = "info", skip_all, fields(cache = %self.cache_path.display()))]
    pub async fn run(&self, cache: &ScrapeCache) -> Option<RunSummary> {
        let Some(_slot) = cache.try_begin_refresh() else {
            info!("Refresh already in progress; skipping");
            return None;
        };

        let urls = self.sources().await;
        let (records, summary) = scrape_all(&urls, &self.ctx).await;

        if summary.no_sources {
            error!("No sources available, nothing to refresh");
            cache.mark_refresh_failed("no sources available");
            return Some(summary);
        }

        if summary.succeeded() == 0 || (records.is_empty() && summary.failed() > 0) {
            error!(
                succeeded = summary.succeeded(),
                failed = summary.failed(),
                "Refresh found nothing usable; keeping previous results"
            );
            cache.mark_refresh_failed(format!(
                "{} of {} sources failed and no listings were found",
                summary.failed(),
                summary.outcomes.len()
            ));
            return Some(summary);
        }

        if !cache.refresh(records) {
            warn!(failed = summary.failed(), "Keeping previous results");
            return Some(summary);
        }

        let generation = cache.get();
        let path = self.cache_path.clone();
        let backup_dir = self.backup_dir.clone();
        let saved = tokio::task::spawn_blocking(move || -> Result<Option<PathBuf>, CacheError> {
            cache::save(&path, &generation.records)?;
            match (backup_dir, generation.last_refreshed) {
                (Some(dir), Some(at)) => cache::save_backup(&dir, &generation.records, at).map(Some),
                _ => Ok(None),
            }
        })
        .await;
        match saved {
            Ok(Ok(Some(backup))) => info!(backup = %backup.display(), "Backup written"),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to write cache file"),
            Err(e) => warn!(error = %e, "Cache writer task failed"),
        }
        Some(summary)
    }
}
