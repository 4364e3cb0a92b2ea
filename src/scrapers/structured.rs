//! Structured-data extractor: schema.org `JobPosting` blocks in JSON-LD.
//!
//! Postings may appear as a single object, inside an array, under `@graph`,
//! or wrapped in an `ItemList`. Fields are read straight from the
//! structured data, nothing is guessed. A page without a parseable posting
//! yields an empty vector, which sends the orchestrator on to the heuristic
//! pass.

use crate::models::RawJob;
use crate::utils::{resolve_link, site_id};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

static LD_JSON: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector"));

/// How deep to follow nested containers looking for postings.
const MAX_DEPTH: usize = 6;

#[cfg(test)]
pub(crate) fn extract(html: &str, page_url: &str) -> Vec<RawJob> {
    let document = Html::parse_document(html);
    extract_from_document(&document, page_url)
}

/// All job postings embedded in the document's JSON-LD blocks.
pub(crate) fn extract_from_document(document: &Html, page_url: &str) -> Vec<RawJob> {
    let blocks: Vec<Value> = document
        .select(&LD_JSON)
        .filter_map(|script| {
            let parsed = parse_block(&script.text().collect::<String>());
            if parsed.is_none() {
                debug!(page_url, "Skipping unparseable JSON-LD block");
            }
            parsed
        })
        .collect();

    let mut postings = Vec::new();
    for value in &blocks {
        collect_postings(value, 0, &mut postings);
    }

    let source = site_id(page_url);
    let jobs: Vec<RawJob> = postings
        .into_iter()
        .map(|posting| posting_to_raw(posting, page_url, &source))
        .filter(|job| job.get("title").is_some())
        .collect();
    debug!(page_url, count = jobs.len(), "Structured extraction finished");
    jobs
}

fn parse_block(text: &str) -> Option<Value> {
    let trimmed = text
        .trim()
        .trim_start_matches("<!--")
        .trim_end_matches("-->")
        .trim()
        .trim_start_matches("//<![CDATA[")
        .trim_end_matches("//]]>")
        .trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

fn collect_postings<'a>(value: &'a Value, depth: usize, out: &mut Vec<&'a Value>) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                collect_postings(item, depth + 1, out);
            }
        }
        Value::Object(map) => {
            if map.get("@type").is_some_and(is_job_posting_type) {
                out.push(value);
                return;
            }
            for key in ["@graph", "itemListElement", "item", "mainEntity"] {
                if let Some(nested) = map.get(key) {
                    collect_postings(nested, depth + 1, out);
                }
            }
        }
        _ => {}
    }
}

fn is_job_posting_type(t: &Value) -> bool {
    match t {
        Value::String(s) => s.eq_ignore_ascii_case("JobPosting") || s.ends_with("/JobPosting"),
        Value::Array(items) => items.iter().any(is_job_posting_type),
        _ => false,
    }
}

fn posting_to_raw(posting: &Value, page_url: &str, source: &str) -> RawJob {
    let mut job = RawJob::new().with("source", source);

    if let Some(title) = posting.get("title").or_else(|| posting.get("name")).and_then(as_text) {
        job.set("title", title);
    }
    if let Some(description) = posting.get("description").and_then(as_text) {
        job.set("description", description);
    }
    if let Some(org) = posting.get("hiringOrganization").and_then(as_text) {
        job.set("organization", org);
    }
    if let Some(location) = posting.get("jobLocation").and_then(locality) {
        job.set("location", location);
    } else if posting
        .get("jobLocationType")
        .and_then(as_text)
        .is_some_and(|t| t.eq_ignore_ascii_case("TELECOMMUTE"))
    {
        job.set("location", "Remote");
    }
    if let Some(date) = posting.get("datePosted").and_then(as_text) {
        job.set("posted_date", date);
    }
    if let Some(salary) = posting.get("baseSalary").and_then(salary_text) {
        job.set("salary", salary);
    }

    let link = posting
        .get("url")
        .and_then(as_text)
        .and_then(|href| resolve_link(page_url, &href))
        .unwrap_or_else(|| page_url.to_string());
    job.set("url", link);
    job
}

/// Plain text of a JSON-LD value: strings and numbers as-is, objects by
/// their `name`, arrays by their first usable element.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("name").and_then(as_text),
        Value::Array(items) => items.iter().find_map(as_text),
        _ => None,
    }
}

fn locality(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(locality),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => match map.get("address") {
            Some(Value::Object(address)) => ["addressLocality", "addressRegion", "addressCountry"]
                .iter()
                .find_map(|key| address.get(*key).and_then(as_text)),
            Some(other) => as_text(other),
            None => map.get("name").and_then(as_text),
        },
        _ => None,
    }
}

fn salary_text(value: &Value) -> Option<String> {
    let Value::Object(map) = value else {
        return as_text(value);
    };
    let currency = map.get("currency").and_then(as_text);
    let amount = match map.get("value") {
        Some(Value::Object(v)) => {
            let min = v.get("minValue").and_then(as_text);
            let max = v.get("maxValue").and_then(as_text);
            let exact = v.get("value").and_then(as_text);
            let range = match (min, max, exact) {
                (Some(min), Some(max), _) => Some(format!("{min}-{max}")),
                (_, _, Some(exact)) => Some(exact),
                (Some(one), None, None) | (None, Some(one), None) => Some(one),
                (None, None, None) => None,
            };
            let unit = v.get("unitText").and_then(as_text);
            match (range, unit) {
                (Some(r), Some(u)) => Some(format!("{r} / {}", u.to_lowercase())),
                (r, _) => r,
            }
        }
        Some(other) => as_text(other),
        None => None,
    }?;
    Some(match currency {
        Some(c) => format!("{c} {amount}"),
        None => amount,
    })
}
