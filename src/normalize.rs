//! Normalizer: maps any extractor's [`RawJob`] onto the canonical
//! [`JobRecord`] shape.
//!
//! Pure and infallible. Missing optional fields become [`PLACEHOLDER`];
//! missing titles or links leave the record incomplete, and
//! [`normalize_all`] drops it. Feeding a normalized record back through
//! [`normalize`] returns it unchanged.

use crate::config::NormalizeSettings;
use crate::models::{JobRecord, RawJob};
use crate::utils::{collapse_whitespace, site_id, truncate_chars};
use tracing::debug;
use uuid::Uuid;

/// Value for absent optional fields.
pub const PLACEHOLDER: &str = "N/A";
pub const NO_DESCRIPTION: &str = "No description available";

const TITLE_KEYS: &[&str] = &["title", "job_title", "position", "name"];
const ORGANIZATION_KEYS: &[&str] = &["organization", "company", "hiring_organization", "employer"];
const LOCATION_KEYS: &[&str] = &["location", "job_location", "city"];
const URL_KEYS: &[&str] = &["url", "link", "apply_url", "href"];
const SOURCE_KEYS: &[&str] = &["source", "site"];
const DATE_KEYS: &[&str] = &["posted_date", "date_posted", "date"];
const SALARY_KEYS: &[&str] = &["salary", "base_salary"];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary", "details"];

/// Build the canonical record for `raw`.
pub fn normalize(raw: &RawJob, settings: &NormalizeSettings) -> JobRecord {
    let title = truncate_chars(
        &collapse_whitespace(raw.first_of(TITLE_KEYS).unwrap_or_default()),
        settings.max_title_chars,
    );
    let url = raw.first_of(URL_KEYS).unwrap_or_default().trim().to_string();
    let organization = text_or_placeholder(raw.first_of(ORGANIZATION_KEYS));
    let location = text_or_placeholder(raw.first_of(LOCATION_KEYS));
    let posted_date = text_or_placeholder(raw.first_of(DATE_KEYS));
    let salary = text_or_placeholder(raw.first_of(SALARY_KEYS));

    let source = match raw.first_of(SOURCE_KEYS) {
        Some(s) => collapse_whitespace(s),
        None if !url.is_empty() => site_id(&url),
        None => PLACEHOLDER.to_string(),
    };

    let description = truncate_chars(
        &collapse_whitespace(raw.first_of(DESCRIPTION_KEYS).unwrap_or_default()),
        settings.max_description_chars,
    );
    let description = if description.is_empty() {
        NO_DESCRIPTION.to_string()
    } else {
        description
    };

    let id = raw
        .get("id")
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    JobRecord {
        category: categorize(&title, settings),
        search_text: search_text(&title, &organization, &description),
        id,
        title,
        organization,
        location,
        source,
        url,
        posted_date,
        salary,
        description,
    }
}

/// Normalize a batch, dropping records without a title or link.
pub fn normalize_all<'a, I>(raws: I, settings: &NormalizeSettings) -> Vec<JobRecord>
where
    I: IntoIterator<Item = &'a RawJob>,
{
    raws.into_iter()
        .map(|raw| normalize(raw, settings))
        .filter(|record| {
            let complete = is_complete(record);
            if !complete {
                debug!(title = %record.title, url = %record.url, "Dropping incomplete record");
            }
            complete
        })
        .collect()
}

pub fn is_complete(record: &JobRecord) -> bool {
    !record.title.is_empty() && !record.url.is_empty()
}

/// First rule whose keyword occurs in the lower-cased title, else the
/// default category.
pub fn categorize(title: &str, settings: &NormalizeSettings) -> String {
    let title = title.to_lowercase();
    settings
        .categories
        .iter()
        .find(|rule| {
            rule.keywords
                .iter()
                .any(|k| !k.is_empty() && title.contains(&k.to_lowercase()))
        })
        .map(|rule| rule.label.clone())
        .unwrap_or_else(|| settings.default_category.clone())
}

pub fn search_text(title: &str, organization: &str, description: &str) -> String {
    format!("{} {} {}", title, organization, description).to_lowercase()
}

fn text_or_placeholder(value: Option<&str>) -> String {
    match value.map(collapse_whitespace) {
        Some(v) if !v.is_empty() => v,
        _ => PLACEHOLDER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> NormalizeSettings {
        NormalizeSettings::default()
    }

    #[test]
    fn test_aliases_and_placeholders() {
        let raw = RawJob::new()
            .with("title", "  Senior   Accountant ")
            .with("company", "Habib Bank")
            .with("link", "https://jobs.test/1");
        let record = normalize(&raw, &settings());
        assert_eq!(record.title, "Senior Accountant");
        assert_eq!(record.organization, "Habib Bank");
        assert_eq!(record.url, "https://jobs.test/1");
        assert_eq!(record.location, PLACEHOLDER);
        assert_eq!(record.salary, PLACEHOLDER);
        assert_eq!(record.description, NO_DESCRIPTION);
        assert_eq!(record.source, "jobs.test");
        assert_eq!(record.category, "Finance & Accounting");
        assert!(!record.id.is_empty());
    }

    #[test]
    fn test_category_first_match_wins() {
        let s = settings();
        assert_eq!(categorize("Backend Engineer", &s), "IT & Software");
        assert_eq!(categorize("Sales Engineer", &s), "IT & Software");
        assert_eq!(categorize("Staff Nurse (ICU)", &s), "Healthcare");
        assert_eq!(categorize("Driver", &s), "Other");
    }

    #[test]
    fn test_truncates_long_fields() {
        let mut s = settings();
        s.max_title_chars = 10;
        s.max_description_chars = 20;
        let raw = RawJob::new()
            .with("title", "Assistant Director Operations")
            .with("url", "https://jobs.test/2")
            .with("description", "x".repeat(100));
        let record = normalize(&raw, &s);
        assert_eq!(record.title, "Assistant");
        assert_eq!(record.description.chars().count(), 20);
    }

    #[test]
    fn test_search_text_is_lowercase_concat() {
        let raw = RawJob::new()
            .with("title", "Web Developer")
            .with("organization", "Arbisoft")
            .with("url", "https://jobs.test/3")
            .with("description", "React and Django");
        let record = normalize(&raw, &settings());
        assert_eq!(record.search_text, "web developer arbisoft react and django");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = RawJob::new()
            .with("title", "  Lecturer\nComputer Science ")
            .with("company", "  NUST ")
            .with("location", "Islamabad")
            .with("link", "https://nust.test/careers/9")
            .with("salary", "PKR 150,000")
            .with("description", "<p>Teach   algorithms</p>");
        let once = normalize(&raw, &settings());
        let twice = normalize(&RawJob::from(&once), &settings());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_all_drops_incomplete() {
        let raws = vec![
            RawJob::new().with("title", "Clerk").with("url", "https://a.test/1"),
            RawJob::new().with("title", "No Link"),
            RawJob::new().with("url", "https://a.test/2"),
        ];
        let records = normalize_all(&raws, &settings());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Clerk");
    }
}
