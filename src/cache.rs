//! In-memory job cache with generation swap, plus its CSV file.
//!
//! A generation (`records` + `last_refreshed`) is immutable once built and is
//! handed out behind an `Arc`. `refresh` builds the next generation off to
//! the side and swaps the pointer, so readers either see the old set or the
//! new one, never a mix, and never wait for a scrape to finish.

use crate::config::{CacheSettings, NormalizeSettings};
use crate::errors::CacheError;
use crate::models::{JobRecord, RawJob};
use crate::normalize::normalize_all;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

/// One complete, immutable record set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheGeneration {
    pub records: Vec<JobRecord>,
    /// `None` until the first successful refresh or cache-file load.
    pub last_refreshed: Option<DateTime<Utc>>,
}

/// What a consumer should tell the user about the data it is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// No generation yet; the first scrape is still running.
    Warming,
    Fresh,
    /// Older than the staleness threshold, still served.
    Stale,
    /// The latest refresh failed; the last good generation is served.
    RefreshFailed,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheStatus::Warming => "warming up, first scrape in progress",
            CacheStatus::Fresh => "fresh",
            CacheStatus::Stale => "stale, refresh due",
            CacheStatus::RefreshFailed => "last refresh failed, serving previous results",
        })
    }
}

pub struct ScrapeCache {
    current: RwLock<Arc<CacheGeneration>>,
    last_error: RwLock<Option<String>>,
    stale_after: Duration,
    refreshing: Mutex<()>,
}

impl ScrapeCache {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            current: RwLock::new(Arc::new(CacheGeneration::default())),
            last_error: RwLock::new(None),
            stale_after,
            refreshing: Mutex::new(()),
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.stale_after())
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Snapshot of the current generation.
    pub fn get(&self) -> Arc<CacheGeneration> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the stored generation with `records`, stamped now.
    ///
    /// Returns `false` (and keeps the old generation) when `records` is empty
    /// while a previous good generation exists.
    pub fn refresh(&self, records: Vec<JobRecord>) -> bool {
        self.refresh_at(records, Utc::now())
    }

    pub fn refresh_at(&self, records: Vec<JobRecord>, at: DateTime<Utc>) -> bool {
        if records.is_empty() && self.get().last_refreshed.is_some() {
            warn!("Refresh produced no records; keeping previous generation");
            self.mark_refresh_failed("refresh produced no records");
            return false;
        }
        let count = records.len();
        self.install(CacheGeneration {
            records,
            last_refreshed: Some(at),
        });
        self.set_error(None);
        info!(records = count, refreshed_at = %at.to_rfc3339(), "Cache generation replaced");
        true
    }

    /// Install a generation loaded from disk. The failure flag is left alone.
    pub fn restore(&self, generation: CacheGeneration) {
        self.install(generation);
    }

    fn install(&self, generation: CacheGeneration) {
        let next = Arc::new(generation);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    pub fn mark_refresh_failed(&self, reason: impl Into<String>) {
        self.set_error(Some(reason.into()));
    }

    pub fn last_error(&self) -> Option<String> {
        match self.last_error.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_error(&self, error: Option<String>) {
        match self.last_error.write() {
            Ok(mut guard) => *guard = error,
            Err(poisoned) => *poisoned.into_inner() = error,
        }
    }

    /// True when nothing has been loaded yet or the generation is older
    /// than the threshold.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        match self.get().last_refreshed {
            Some(at) => now - at > self.stale_after,
            None => true,
        }
    }

    pub fn status(&self) -> CacheStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> CacheStatus {
        if self.get().last_refreshed.is_none() {
            CacheStatus::Warming
        } else if self.last_error().is_some() {
            CacheStatus::RefreshFailed
        } else if self.is_stale_at(now) {
            CacheStatus::Stale
        } else {
            CacheStatus::Fresh
        }
    }

    /// Claim the single refresh slot, or `None` if a refresh is in flight.
    pub fn try_begin_refresh(&self) -> Option<MutexGuard<'_, ()>> {
        self.refreshing.try_lock().ok()
    }
}

/// One row of the cache file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    title: String,
    #[serde(default)]
    company: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    source: String,
    link: String,
    #[serde(default)]
    salary: String,
    #[serde(rename = "postedDate", default)]
    posted_date: String,
    #[serde(default)]
    description: String,
}

impl From<&JobRecord> for CacheRow {
    fn from(r: &JobRecord) -> Self {
        Self {
            title: r.title.clone(),
            company: r.organization.clone(),
            location: r.location.clone(),
            category: r.category.clone(),
            source: r.source.clone(),
            link: r.url.clone(),
            salary: r.salary.clone(),
            posted_date: r.posted_date.clone(),
            description: r.description.clone(),
        }
    }
}

impl CacheRow {
    fn into_raw(self) -> RawJob {
        RawJob::new()
            .with("title", self.title)
            .with("organization", self.company)
            .with("location", self.location)
            .with("category", self.category)
            .with("source", self.source)
            .with("url", self.link)
            .with("salary", self.salary)
            .with("posted_date", self.posted_date)
            .with("description", self.description)
    }
}

/// Write `records` to `path`, replacing it only once the new file is complete.
#[instrument(level = "info", skip_all, fields(path = %path.display(), records = records.len()))]
pub fn save(path: &Path, records: &[JobRecord]) -> Result<(), CacheError> {
    let tmp = temp_path(path);
    let written = write_rows(&tmp, records);
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    info!("Cache file written");
    Ok(())
}

/// Write a timestamped copy of `records` into `dir`, creating it if needed.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub fn save_backup(dir: &Path, records: &[JobRecord], at: DateTime<Utc>) -> Result<PathBuf, CacheError> {
    fs::create_dir_all(dir)?;
    let path = backup_path(dir, at);
    save(&path, records)?;
    Ok(path)
}

pub fn backup_path(dir: &Path, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!("jobs_backup_{}.csv", at.format("%Y%m%d_%H%M%S")))
}

fn write_rows(path: &Path, records: &[JobRecord]) -> Result<(), CacheError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(CacheRow::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read a cache file. `Ok(None)` when it does not exist.
///
/// Rows go back through the normalizer; the generation's timestamp is the
/// file's modification time.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load(path: &Path, settings: &NormalizeSettings) -> Result<Option<CacheGeneration>, CacheError> {
    let modified = match fs::metadata(path) {
        Ok(meta) => meta.modified()?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No cache file yet");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let mut reader = csv::Reader::from_path(path)?;
    let raws = reader
        .deserialize::<CacheRow>()
        .map(|row| row.map(CacheRow::into_raw))
        .collect::<Result<Vec<_>, _>>()?;
    let records = normalize_all(&raws, settings);
    let last_refreshed = DateTime::<Utc>::from(modified);
    info!(records = records.len(), %last_refreshed, "Loaded cache file");
    Ok(Some(CacheGeneration {
        records,
        last_refreshed: Some(last_refreshed),
    }))
}
