//! Heuristic HTML extractor for pages without structured data.
//!
//! # Finding containers
//!
//! 1. Try each configured container selector in order and adopt the first
//!    one matching at least `min_containers` elements.
//! 2. Otherwise sample up to `sample_limit` classed block elements that
//!    contain a link, group them by `tag.class.class` signature, and adopt
//!    the most frequent signature if it clears the same threshold.
//!
//! # Reading fields
//!
//! Inside each container the title is the first heading/anchor text of
//! plausible length, the link comes from the title anchor (or the first
//! usable anchor), and organization, location, date and salary come from
//! descendants whose class names contain configured keywords. Fields that
//! cannot be found are left for the normalizer to fill with placeholders.
//!
//! Pages where nothing clears the threshold produce an empty vector.

use crate::config::ScrapeSettings;
use crate::models::RawJob;
use crate::utils::{collapse_whitespace, resolve_link, site_id};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::{debug, warn};

static TITLE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["h1", "h2", "h3", "h4", "h5", "h6", "a", "strong", "b"]
        .iter()
        .map(|tag| Selector::parse(tag).expect("valid selector"))
        .collect()
});
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static CLASSED: Lazy<Selector> = Lazy::new(|| Selector::parse("[class]").expect("valid selector"));
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").expect("valid selector"));
static BLOCKS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div[class], li[class], article[class], tr[class], section[class]")
        .expect("valid selector")
});

/// Link texts that are never job titles.
const NON_TITLES: &[&str] = &["apply", "apply now", "read more", "view details", "details", "more", "view job"];

#[cfg(test)]
pub(crate) fn extract(html: &str, base_url: &str, settings: &ScrapeSettings) -> Vec<RawJob> {
    let document = Html::parse_document(html);
    extract_from_document(&document, base_url, settings)
}

/// Guess job listings from arbitrary markup.
pub(crate) fn extract_from_document(
    document: &Html,
    base_url: &str,
    settings: &ScrapeSettings,
) -> Vec<RawJob> {
    let Some((signature, containers)) = find_containers(document, settings) else {
        debug!(base_url, "No container pattern cleared the threshold");
        return Vec::new();
    };

    let source = site_id(base_url);
    let jobs: Vec<RawJob> = containers
        .into_iter()
        .filter_map(|container| read_container(container, base_url, &source, settings))
        .take(settings.max_per_source)
        .collect();
    debug!(base_url, %signature, count = jobs.len(), "Heuristic extraction finished");
    jobs
}

/// The container set and a label for how it was found.
fn find_containers<'a>(
    document: &'a Html,
    settings: &ScrapeSettings,
) -> Option<(String, Vec<ElementRef<'a>>)> {
    for pattern in &settings.container_selectors {
        let selector = match Selector::parse(pattern) {
            Ok(s) => s,
            Err(e) => {
                warn!(%pattern, error = ?e, "Ignoring invalid container selector");
                continue;
            }
        };
        let matches: Vec<ElementRef<'a>> = document.select(&selector).collect();
        if matches.len() >= settings.min_containers {
            return Some((pattern.clone(), matches));
        }
    }
    most_frequent_signature(document, settings)
}

fn most_frequent_signature<'a>(
    document: &'a Html,
    settings: &ScrapeSettings,
) -> Option<(String, Vec<ElementRef<'a>>)> {
    let sample: Vec<(String, ElementRef<'a>)> = document
        .select(&BLOCKS)
        .take(settings.sample_limit)
        .filter(|el| el.select(&ANCHOR).next().is_some())
        .filter_map(|el| class_signature(el).map(|sig| (sig, el)))
        .collect();

    // signature -> (count, first position)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (idx, (sig, _)) in sample.iter().enumerate() {
        counts.entry(sig.as_str()).or_insert((0, idx)).0 += 1;
    }
    let (best, (count, _)) = counts
        .into_iter()
        .max_by(|(_, (ca, fa)), (_, (cb, fb))| ca.cmp(cb).then(fb.cmp(fa)))?;
    if count < settings.min_containers {
        return None;
    }
    let best = best.to_string();
    let containers = sample
        .into_iter()
        .filter(|(sig, _)| *sig == best)
        .map(|(_, el)| el)
        .collect();
    Some((best, containers))
}

/// `tag.classA.classB` with classes sorted, or `None` for unclassed elements.
fn class_signature(el: ElementRef<'_>) -> Option<String> {
    let mut classes: Vec<&str> = el.value().classes().collect();
    if classes.is_empty() {
        return None;
    }
    classes.sort_unstable();
    classes.dedup();
    Some(format!("{}.{}", el.value().name(), classes.join(".")))
}

fn read_container(
    container: ElementRef<'_>,
    base_url: &str,
    source: &str,
    settings: &ScrapeSettings,
) -> Option<RawJob> {
    let (title, title_el) = find_title(container, settings.min_title_len)?;
    let link = find_link(container, title_el, base_url).unwrap_or_else(|| base_url.to_string());

    let mut job = RawJob::new()
        .with("title", title)
        .with("url", link)
        .with("source", source);
    if let Some(org) = text_by_class_keyword(container, &settings.organization_keywords) {
        job.set("organization", org);
    }
    if let Some(location) = text_by_class_keyword(container, &settings.location_keywords) {
        job.set("location", location);
    }
    if let Some(date) = posted_date(container, &settings.date_keywords) {
        job.set("posted_date", date);
    }
    if let Some(salary) = text_by_class_keyword(container, &settings.salary_keywords) {
        job.set("salary", salary);
    }
    job.set("description", element_text(container));
    Some(job)
}

fn find_title<'a>(container: ElementRef<'a>, min_len: usize) -> Option<(String, ElementRef<'a>)> {
    TITLE_SELECTORS.iter().find_map(|selector| {
        container.select(selector).find_map(|el| {
            let text = element_text(el);
            let plausible = text.chars().count() >= min_len
                && !NON_TITLES.contains(&text.to_lowercase().as_str());
            plausible.then_some((text, el))
        })
    })
}

fn find_link(container: ElementRef<'_>, title_el: ElementRef<'_>, base_url: &str) -> Option<String> {
    let own_href = |el: ElementRef<'_>| {
        (el.value().name() == "a")
            .then(|| el.value().attr("href"))
            .flatten()
            .and_then(|href| resolve_link(base_url, href))
    };
    let first_anchor = |el: ElementRef<'_>| {
        el.select(&ANCHOR)
            .find_map(|a| a.value().attr("href").and_then(|href| resolve_link(base_url, href)))
    };
    own_href(title_el)
        .or_else(|| first_anchor(title_el))
        .or_else(|| first_anchor(container))
        .or_else(|| own_href(container))
}

fn text_by_class_keyword(container: ElementRef<'_>, keywords: &[String]) -> Option<String> {
    container
        .select(&CLASSED)
        .filter(|el| el.id() != container.id())
        .filter(|el| {
            let class = el.value().attr("class").unwrap_or_default().to_lowercase();
            keywords.iter().any(|k| class.contains(&k.to_lowercase()))
        })
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn posted_date(container: ElementRef<'_>, keywords: &[String]) -> Option<String> {
    container
        .select(&TIME)
        .find_map(|t| {
            t.value()
                .attr("datetime")
                .map(str::to_string)
                .or_else(|| Some(element_text(t)).filter(|s| !s.is_empty()))
        })
        .or_else(|| text_by_class_keyword(container, keywords))
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ScrapeSettings {
        ScrapeSettings::default()
    }

    fn job_boxes(n: usize) -> String {
        let items: String = (1..=n)
            .map(|i| {
                format!(
                    r#"<div class="job-box">
  <h3><a href="/jobs/{i}">Software Engineer {i}</a></h3>
  <span class="job-company">Systems Ltd</span>
  <span class="job-location">Karachi</span>
  <span class="posted-date">2 days ago</span>
  <a href="/jobs/{i}/apply">Apply</a>
</div>"#
                )
            })
            .collect();
        format!("<html><body><h1>Latest jobs</h1>{items}</body></html>")
    }

    #[test]
    fn test_configured_selector_extracts_fields() {
        let jobs = extract(&job_boxes(5), "https://jobsbirds.test/latest", &settings());
        assert_eq!(jobs.len(), 5);
        let first = &jobs[0];
        assert_eq!(first.get("title"), Some("Software Engineer 1"));
        assert_eq!(first.get("url"), Some("https://jobsbirds.test/jobs/1"));
        assert_eq!(first.get("organization"), Some("Systems Ltd"));
        assert_eq!(first.get("location"), Some("Karachi"));
        assert_eq!(first.get("posted_date"), Some("2 days ago"));
        assert_eq!(first.get("source"), Some("jobsbirds.test"));
    }

    #[test]
    fn test_below_threshold_is_empty() {
        let jobs = extract(&job_boxes(3), "https://jobsbirds.test/latest", &settings());
        assert!(jobs.is_empty());
        assert!(extract("", "https://x.test", &settings()).is_empty());
        assert!(extract("<p>not html at all", "https://x.test", &settings()).is_empty());
    }

    #[test]
    fn test_frequency_fallback_on_unknown_markup() {
        let rows: String = (1..=6)
            .map(|i| {
                format!(
                    r#"<li class="css-1x9zq row"><h4>Medical Officer Grade {i}</h4><a href="https://hospital.test/v/{i}">Details</a><p class="org">City Hospital</p></li>"#
                )
            })
            .collect();
        let html = format!(
            r#"<ul class="nav"><li class="menu"><a href="/">Home</a></li></ul><ul>{rows}</ul>"#
        );
        let jobs = extract(&html, "https://hospital.test/", &settings());
        assert_eq!(jobs.len(), 6);
        assert!(jobs.iter().all(|j| j.get("title").is_some_and(|t| !t.is_empty())));
        assert_eq!(jobs[2].get("title"), Some("Medical Officer Grade 3"));
        assert_eq!(jobs[2].get("url"), Some("https://hospital.test/v/3"));
    }

    #[test]
    fn test_per_source_cap() {
        let mut s = settings();
        s.max_per_source = 10;
        let jobs = extract(&job_boxes(40), "https://jobsbirds.test/", &s);
        assert_eq!(jobs.len(), 10);
    }

    #[test]
    fn test_relative_link_resolution() {
        let rows: String = (0..4)
            .map(|_| r#"<div class="job-card"><h2><a href="/jobs/42">Civil Engineer</a></h2></div>"#)
            .collect();
        let jobs = extract(&rows, "https://example.pk/list", &settings());
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[0].get("url"), Some("https://example.pk/jobs/42"));
    }

    #[test]
    fn test_table_rows_and_skipped_link_texts() {
        let rows: String = (1..=4)
            .map(|i| format!(r#"<tr><td><a href="job.php?id={i}">Apply now</a></td><td><a href="job.php?id={i}">Branch Manager {i}</a></td></tr>"#))
            .collect();
        let html = format!(r#"<table class="job_list"><tbody>{rows}</tbody></table>"#);
        let jobs = extract(&html, "https://brightspyre.test/", &settings());
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[3].get("title"), Some("Branch Manager 4"));
        assert_eq!(jobs[3].get("url"), Some("https://brightspyre.test/job.php?id=4"));
    }

    #[test]
    fn test_missing_link_falls_back_to_page() {
        let rows: String = (0..4)
            .map(|i| format!(r#"<div class="vacancy"><h3>Data Entry Operator {i}</h3></div>"#))
            .collect();
        let jobs = extract(&rows, "https://ppsc.test/ads", &settings());
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[0].get("url"), Some("https://ppsc.test/ads"));
        assert_eq!(jobs[0].get("organization"), None);
    }

    #[test]
    fn test_class_signature_is_order_insensitive() {
        let html = Html::parse_fragment(r#"<div class="b a b"></div>"#);
        let sel = Selector::parse("div").unwrap();
        let el = html.select(&sel).next().unwrap();
        assert_eq!(class_signature(el).as_deref(), Some("div.a.b"));
    }
}
