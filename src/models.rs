//! Data models for scraped job listings and scrape-run bookkeeping.
//!
//! - [`RawJob`]: loosely keyed record as an extractor produced it
//! - [`JobRecord`]: canonical, normalized listing
//! - [`SourceOutcome`] / [`RunSummary`]: per-site and per-run observability
//! - [`JobContext`]: reduced projection handed to the LLM collaborator

use crate::scrapers::Strategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A job listing as an extractor produced it.
///
/// Keys are extractor specific (`company` vs `organization`, `link` vs
/// `url`); the normalizer resolves them through alias tables. Blank values
/// are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawJob {
    fields: BTreeMap<String, String>,
}

impl RawJob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`RawJob::set`].
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.fields.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// First present value among `keys`, in the order given.
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }
}

impl From<&JobRecord> for RawJob {
    fn from(r: &JobRecord) -> Self {
        RawJob::new()
            .with("id", r.id.clone())
            .with("title", r.title.clone())
            .with("organization", r.organization.clone())
            .with("location", r.location.clone())
            .with("category", r.category.clone())
            .with("source", r.source.clone())
            .with("url", r.url.clone())
            .with("posted_date", r.posted_date.clone())
            .with("salary", r.salary.clone())
            .with("description", r.description.clone())
    }
}

/// Canonical job listing.
///
/// `title` and `url` are never empty; records that would violate this are
/// dropped by the normalizer. Immutable once built: a refresh replaces the
/// whole set rather than editing records in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Opaque identifier, unique within one scrape.
    pub id: String,
    pub title: String,
    pub organization: String,
    pub location: String,
    /// Coarse label derived from the title (e.g. "IT & Software").
    pub category: String,
    /// Site identifier, usually the host of the source URL.
    pub source: String,
    /// Apply/detail link, always absolute.
    pub url: String,
    pub posted_date: String,
    pub salary: String,
    /// Raw HTML or plain text.
    pub description: String,
    /// Lower-cased title + organization + description.
    pub search_text: String,
}

impl JobRecord {
    /// Case-normalized `(title, organization)` pair used for deduplication.
    pub fn dedup_key(&self) -> (String, String) {
        (
            self.title.trim().to_lowercase(),
            self.organization.trim().to_lowercase(),
        )
    }

    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty() || self.search_text.contains(&query)
    }
}

/// Search over cached records. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub query: Option<String>,
    /// Exact category label, case-insensitive.
    pub category: Option<String>,
    /// Substring of the location, case-insensitive.
    pub location: Option<String>,
}

impl JobFilter {
    pub fn accepts(&self, record: &JobRecord) -> bool {
        let query_ok = self.query.as_deref().is_none_or(|q| record.matches(q));
        let category_ok = self
            .category
            .as_deref()
            .is_none_or(|c| record.category.eq_ignore_ascii_case(c.trim()));
        let location_ok = self.location.as_deref().is_none_or(|l| {
            record
                .location
                .to_lowercase()
                .contains(&l.trim().to_lowercase())
        });
        query_ok && category_ok && location_ok
    }

    pub fn apply<'a>(&self, records: &'a [JobRecord]) -> Vec<&'a JobRecord> {
        records.iter().filter(|r| self.accepts(r)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// What happened to one source URL during one run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOutcome {
    pub url: String,
    pub status: OutcomeStatus,
    pub record_count: usize,
    pub error_message: Option<String>,
    /// The extractor that produced the records, if any did.
    pub strategy: Option<Strategy>,
    pub elapsed_ms: u64,
}

impl SourceOutcome {
    pub fn success(url: &str, record_count: usize, strategy: Option<Strategy>) -> Self {
        Self {
            url: url.to_string(),
            status: OutcomeStatus::Success,
            record_count,
            error_message: None,
            strategy,
            elapsed_ms: 0,
        }
    }

    pub fn failure(url: &str, error: impl ToString) -> Self {
        Self {
            url: url.to_string(),
            status: OutcomeStatus::Failure,
            record_count: 0,
            error_message: Some(error.to_string()),
            strategy: None,
            elapsed_ms: 0,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = elapsed.as_millis() as u64;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Aggregate view of one multi-source run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub outcomes: Vec<SourceOutcome>,
    /// Records extracted across all sources, before deduplication.
    pub records_found: usize,
    /// Records left after deduplication.
    pub unique_records: usize,
    /// Distinct organizations among the unique records, case-insensitive.
    pub unique_organizations: usize,
    pub unique_locations: usize,
    /// Set when there was nothing to scrape, even after the default fallback.
    pub no_sources: bool,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn no_sources() -> Self {
        Self {
            no_sources: true,
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Successful sources that nonetheless produced no listings.
    pub fn empty_successes(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.is_success() && o.record_count == 0)
            .count()
    }
}

/// The only shape of job data that may be sent to the LLM collaborator.
///
/// Descriptions are deliberately absent to bound prompt size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub id: String,
    pub title: String,
    pub organization: String,
    pub location: String,
    pub category: String,
    pub source: String,
}

impl From<&JobRecord> for JobContext {
    fn from(r: &JobRecord) -> Self {
        Self {
            id: r.id.clone(),
            title: r.title.clone(),
            organization: r.organization.clone(),
            location: r.location.clone(),
            category: r.category.clone(),
            source: r.source.clone(),
        }
    }
}
