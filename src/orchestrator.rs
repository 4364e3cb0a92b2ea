//! Per-source and multi-source scrape orchestration.
//!
//! For one URL: fetch once, then walk [`Strategy::ORDER`]. The static
//! strategies share one parsed document; the rendered strategy runs only
//! when the static ones came back empty and the render policy allows it.
//! The first strategy producing normalized records wins.
//!
//! Across URLs: sources run on a bounded number of concurrent workers with
//! no cross-source cancellation. Results are put back into source-list order
//! before deduplication, so the output does not depend on which site
//! answered first.

use crate::config::{
    ClassifierSettings, NormalizeSettings, RenderFallback, RenderSettings, ScrapeSettings, Settings,
};
use crate::errors::RenderError;
use crate::models::{JobRecord, RunSummary, SourceOutcome};
use crate::normalize::normalize_all;
use crate::scrapers::fetch::PageFetch;
use crate::scrapers::rendered::{self, PageKind, PageRenderer};
use crate::scrapers::{Strategy, heuristic, structured};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use scraper::Html;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Everything a scrape run needs, shared read-only by all workers.
#[derive(Clone)]
pub struct ScrapeContext {
    pub fetcher: Arc<dyn PageFetch>,
    /// `None` when no headless browser could be started.
    pub renderer: Option<Arc<dyn PageRenderer>>,
    pub scrape: ScrapeSettings,
    pub render: RenderSettings,
    pub classifier: ClassifierSettings,
    pub normalize: NormalizeSettings,
}

impl ScrapeContext {
    pub fn new(
        settings: &Settings,
        fetcher: Arc<dyn PageFetch>,
        renderer: Option<Arc<dyn PageRenderer>>,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            scrape: settings.scrape.clone(),
            render: settings.render.clone(),
            classifier: settings.classifier.clone(),
            normalize: settings.normalize.clone(),
        }
    }
}

/// Outcome and records of one source.
#[derive(Debug)]
pub struct SourceReport {
    pub outcome: SourceOutcome,
    pub records: Vec<JobRecord>,
}

/// Scrape one URL. Never fails: every problem ends up in the outcome.
#[instrument(level = "info", skip(ctx))]
pub async fn scrape_source(url: &str, ctx: &ScrapeContext) -> SourceReport {
    let t0 = Instant::now();

    let html = match ctx.fetcher.fetch(url).await {
        Ok(html) => html,
        Err(e) => {
            return SourceReport {
                outcome: SourceOutcome::failure(url, e).with_elapsed(t0.elapsed()),
                records: Vec::new(),
            };
        }
    };

    let (kind, found) = static_pass(&html, url, ctx);
    if let Some((strategy, records)) = found {
        return SourceReport {
            outcome: SourceOutcome::success(url, records.len(), Some(strategy))
                .with_elapsed(t0.elapsed()),
            records,
        };
    }

    let wants_render = match ctx.scrape.render_fallback {
        RenderFallback::Never => false,
        RenderFallback::WhenDynamic => kind.is_dynamic(),
        RenderFallback::Always => true,
    };
    if !wants_render {
        return SourceReport {
            outcome: SourceOutcome::success(url, 0, None).with_elapsed(t0.elapsed()),
            records: Vec::new(),
        };
    }

    let Some(renderer) = ctx.renderer.as_deref() else {
        let e = RenderError::EngineUnavailable("no headless browser available".to_string());
        return SourceReport {
            outcome: SourceOutcome::failure(url, e).with_elapsed(t0.elapsed()),
            records: Vec::new(),
        };
    };

    match rendered::extract(renderer, url, &ctx.render, &ctx.scrape).await {
        Ok(raws) => {
            let records = normalize_all(&raws, &ctx.normalize);
            let strategy = (!records.is_empty()).then_some(Strategy::Rendered);
            SourceReport {
                outcome: SourceOutcome::success(url, records.len(), strategy)
                    .with_elapsed(t0.elapsed()),
                records,
            }
        }
        Err(e) => SourceReport {
            outcome: SourceOutcome::failure(url, e).with_elapsed(t0.elapsed()),
            records: Vec::new(),
        },
    }
}

/// Classify the static page and run the strategies that work on it.
fn static_pass(
    html: &str,
    url: &str,
    ctx: &ScrapeContext,
) -> (PageKind, Option<(Strategy, Vec<JobRecord>)>) {
    let document = Html::parse_document(html);
    let kind = rendered::classify_document(&document, html, &ctx.classifier);

    let found = Strategy::ORDER
        .into_iter()
        .filter(|s| !s.needs_browser())
        .find_map(|strategy| {
            let raws = match strategy {
                Strategy::Structured => structured::extract_from_document(&document, url),
                Strategy::Heuristic => heuristic::extract_from_document(&document, url, &ctx.scrape),
                Strategy::Rendered => Vec::new(),
            };
            let records = normalize_all(&raws, &ctx.normalize);
            (!records.is_empty()).then_some((strategy, records))
        });
    (kind, found)
}

/// Scrape every URL with bounded parallelism and deduplicate the union.
///
/// An empty `urls` list returns no records and a summary flagged
/// `no_sources`.
#[instrument(level = "info", skip_all, fields(sources = urls.len()))]
pub async fn scrape_all(urls: &[String], ctx: &ScrapeContext) -> (Vec<JobRecord>, RunSummary) {
    let t0 = Instant::now();
    if urls.is_empty() {
        warn!("No sources to scrape");
        return (Vec::new(), RunSummary::no_sources());
    }

    let selected = match ctx.scrape.max_sites {
        Some(max) if max < urls.len() => {
            info!(max, total = urls.len(), "Capping run to the first sources in list order");
            &urls[..max]
        }
        _ => urls,
    };
    let concurrency = ctx.scrape.concurrency.max(1);
    info!(sources = selected.len(), concurrency, "Starting scrape run");

    let mut reports: Vec<(usize, SourceReport)> = stream::iter(selected.iter().enumerate())
        .map(|(idx, url)| async move { (idx, scrape_source(url, ctx).await) })
        .buffer_unordered(concurrency)
        .collect()
        .await;
    reports.sort_by_key(|(idx, _)| *idx);

    let mut outcomes = Vec::with_capacity(reports.len());
    let mut combined = Vec::new();
    for (_, report) in reports {
        log_outcome(&report.outcome);
        outcomes.push(report.outcome);
        combined.extend(report.records);
    }

    let records_found = combined.len();
    let records = dedupe(combined);
    let summary = RunSummary {
        outcomes,
        records_found,
        unique_records: records.len(),
        unique_organizations: distinct(&records, |r| &r.organization),
        unique_locations: distinct(&records, |r| &r.location),
        no_sources: false,
        elapsed_ms: t0.elapsed().as_millis() as u64,
    };
    info!(
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        empty = summary.empty_successes(),
        records_found,
        unique = summary.unique_records,
        organizations = summary.unique_organizations,
        locations = summary.unique_locations,
        elapsed_ms = summary.elapsed_ms,
        "Scrape run finished"
    );
    (records, summary)
}

/// Keep the first record for each case-insensitive `(title, organization)`.
pub fn dedupe(records: Vec<JobRecord>) -> Vec<JobRecord> {
    records.into_iter().unique_by(JobRecord::dedup_key).collect()
}

fn distinct(records: &[JobRecord], field: impl Fn(&JobRecord) -> &String) -> usize {
    records.iter().map(|r| field(r).trim().to_lowercase()).unique().count()
}

fn log_outcome(outcome: &SourceOutcome) {
    match &outcome.error_message {
        None => info!(
            url = %outcome.url,
            records = outcome.record_count,
            strategy = outcome.strategy.map(|s| s.as_str()).unwrap_or("none"),
            elapsed_ms = outcome.elapsed_ms,
            "Source scraped"
        ),
        Some(error) => warn!(
            url = %outcome.url,
            %error,
            elapsed_ms = outcome.elapsed_ms,
            "Source failed"
        ),
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::errors::FetchError;
    use crate::models::OutcomeStatus;
    use crate::scrapers::rendered::fakes::FakeRenderer;
    use std::time::Duration;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_structured_short_circuits_other_strategies() {
        // Page carries JSON-LD, heuristic-friendly cards and an SPA marker.
        let html = json_ld_page(&[("Backend Engineer", "Acme Ltd", "Lahore"), ("QA Lead", "Acme Ltd", "Lahore")])
            .replace("<div id=\"root\"></div>", &format!("<div id=\"root\"></div>{}", cards(5)));
        let renderer = Arc::new(FakeRenderer::serving(card_page(5)));
        let ctx = context(
            FakeFetcher::default().page("https://a.test/jobs", html),
            Some(renderer.clone()),
        );
        let report = scrape_source("https://a.test/jobs", &ctx).await;
        assert_eq!(report.outcome.strategy, Some(Strategy::Structured));
        assert_eq!(report.records.len(), 2);
        assert_eq!(renderer.opened(), 0);
    }

    #[tokio::test]
    async fn test_heuristic_used_without_structured_data() {
        let renderer = Arc::new(FakeRenderer::serving(card_page(5)));
        let ctx = context(
            FakeFetcher::default().page("https://b.test/", card_page(6)),
            Some(renderer.clone()),
        );
        let report = scrape_source("https://b.test/", &ctx).await;
        assert_eq!(report.outcome.strategy, Some(Strategy::Heuristic));
        assert_eq!(report.outcome.record_count, 6);
        assert_eq!(report.records[0].url, "https://b.test/jobs/1");
        assert_eq!(report.records[0].organization, "Govt of Punjab");
        assert_eq!(report.records[0].category, "Administration");
        assert_eq!(renderer.opened(), 0);
    }

    #[tokio::test]
    async fn test_client_rendered_page_goes_to_browser() {
        let renderer = Arc::new(FakeRenderer::serving(card_page(4)));
        let ctx = context(
            FakeFetcher::default().page("https://spa.test/", SPA_SHELL),
            Some(renderer.clone()),
        );
        let report = scrape_source("https://spa.test/", &ctx).await;
        assert_eq!(renderer.opened(), 1);
        assert_eq!(report.outcome.strategy, Some(Strategy::Rendered));
        assert_eq!(report.records.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_browser_fails_dynamic_source() {
        let ctx = context(FakeFetcher::default().page("https://spa.test/", SPA_SHELL), None);
        let report = scrape_source("https://spa.test/", &ctx).await;
        assert_eq!(report.outcome.status, OutcomeStatus::Failure);
        assert!(
            report
                .outcome
                .error_message
                .as_deref()
                .unwrap()
                .contains("render engine unavailable")
        );
    }

    #[tokio::test]
    async fn test_static_page_without_listings_is_empty_success() {
        let html = format!("<html><body><p>{}</p></body></html>", "About our company. ".repeat(20));
        let renderer = Arc::new(FakeRenderer::serving(card_page(5)));
        let ctx = context(
            FakeFetcher::default().page("https://c.test/", html.clone()),
            Some(renderer.clone()),
        );
        let report = scrape_source("https://c.test/", &ctx).await;
        assert_eq!(report.outcome.status, OutcomeStatus::Success);
        assert_eq!(report.outcome.record_count, 0);
        assert_eq!(report.outcome.strategy, None);
        assert_eq!(renderer.opened(), 0);

        let mut always = context(FakeFetcher::default().page("https://c.test/", html), Some(renderer.clone()));
        always.scrape.render_fallback = RenderFallback::Always;
        let report = scrape_source("https://c.test/", &always).await;
        assert_eq!(renderer.opened(), 1);
        assert_eq!(report.outcome.strategy, Some(Strategy::Rendered));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_recorded() {
        let ctx = context(
            FakeFetcher::default().error("https://d.test/", FetchError::HttpError { status: 403 }),
            None,
        );
        let report = scrape_source("https://d.test/", &ctx).await;
        assert_eq!(report.outcome.status, OutcomeStatus::Failure);
        assert_eq!(report.outcome.error_message.as_deref(), Some("HTTP 403"));
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_batch() {
        let fetcher = FakeFetcher::default()
            .page(
                "https://a.test/",
                json_ld_page(&[
                    ("Accountant", "Engro", "Karachi"),
                    ("Auditor", "Engro", "Karachi"),
                    ("Tax Manager", "Engro", "Karachi"),
                ]),
            )
            .error("https://b.test/", FetchError::Timeout)
            .page(
                "https://c.test/",
                format!("<html><body><p>{}</p></body></html>", "No vacancies at the moment. ".repeat(20)),
            );
        let ctx = context(fetcher, None);
        let (records, summary) =
            scrape_all(&urls(&["https://a.test/", "https://b.test/", "https://c.test/"]), &ctx).await;

        assert_eq!(records.len(), 3);
        assert_eq!(summary.outcomes.len(), 3);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.empty_successes(), 1);
        assert_eq!(summary.outcomes[1].error_message.as_deref(), Some("request timed out"));
        assert!(!summary.no_sources);
    }

    #[tokio::test]
    async fn test_dedupe_across_sources_keeps_list_order() {
        // The first source answers last; its record must still win.
        let fetcher = FakeFetcher::default()
            .page("https://first.test/", json_ld_page(&[("Backend Engineer", "Acme Ltd", "Lahore")]))
            .delay("https://first.test/", Duration::from_millis(50))
            .page("https://second.test/", json_ld_page(&[("BACKEND ENGINEER", "acme ltd", "Karachi")]));
        let ctx = context(fetcher, None);
        let (records, summary) =
            scrape_all(&urls(&["https://first.test/", "https://second.test/"]), &ctx).await;

        assert_eq!(summary.records_found, 2);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].location, "Lahore");
        assert_eq!(summary.outcomes[0].url, "https://first.test/");
    }

    #[tokio::test]
    async fn test_end_to_end_single_json_ld_source() {
        let ctx = context(
            FakeFetcher::default().page(
                "https://a.test/jobs",
                json_ld_page(&[("Backend Engineer", "Acme Ltd", "Lahore")]),
            ),
            None,
        );
        let (records, summary) = scrape_all(&urls(&["https://a.test/jobs"]), &ctx).await;
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(records.len(), 1);
        let job = &records[0];
        assert_eq!(job.title, "Backend Engineer");
        assert_eq!(job.organization, "Acme Ltd");
        assert_eq!(job.location, "Lahore");
        assert_eq!(job.category, "IT & Software");
        assert_eq!(job.source, "a.test");
        assert_eq!(job.url, "https://a.test/jobs");
    }

    #[tokio::test]
    async fn test_no_sources_signal() {
        let ctx = context(FakeFetcher::default(), None);
        let (records, summary) = scrape_all(&[], &ctx).await;
        assert!(records.is_empty());
        assert!(summary.no_sources);
    }

    #[tokio::test]
    async fn test_max_sites_respects_list_order() {
        let fetcher = FakeFetcher::default()
            .page("https://1.test/", card_page(4))
            .page("https://2.test/", card_page(4))
            .page("https://3.test/", card_page(4));
        let mut ctx = context(fetcher, None);
        ctx.scrape.max_sites = Some(2);
        ctx.scrape.concurrency = 1;
        let (_, summary) =
            scrape_all(&urls(&["https://1.test/", "https://2.test/", "https://3.test/"]), &ctx).await;
        let visited: Vec<_> = summary.outcomes.iter().map(|o| o.url.as_str()).collect();
        assert_eq!(visited, vec!["https://1.test/", "https://2.test/"]);
    }

    #[tokio::test]
    async fn test_worker_pool_is_bounded_and_slow_source_does_not_block() {
        let sources: Vec<String> = (1..=5).map(|i| format!("https://board{i}.test/")).collect();
        let mut fetcher = FakeFetcher::default().delay(&sources[0], Duration::from_millis(150));
        for (i, url) in sources.iter().enumerate() {
            let title = format!("Clerk {i}");
            fetcher = fetcher.page(url, json_ld_page(&[(title.as_str(), "WAPDA", "Multan")]));
            if i > 0 {
                fetcher = fetcher.delay(url, Duration::from_millis(10));
            }
        }
        let log = fetcher.log.clone();
        let mut ctx = context(fetcher, None);
        ctx.scrape.concurrency = 2;

        let (records, summary) = scrape_all(&sources, &ctx).await;

        assert_eq!(log.peak(), 2);
        assert_eq!(summary.succeeded(), 5);
        assert_eq!(records.len(), 5);
        let finished = log.finished();
        assert_eq!(finished.len(), 5);
        assert_eq!(finished.last(), Some(&sources[0]));
        assert_eq!(summary.outcomes[0].url, sources[0]);
        assert_eq!(summary.unique_organizations, 1);
        assert_eq!(summary.unique_locations, 1);
    }

    #[tokio::test]
    async fn test_unreachable_source_does_not_block_others() {
        let fetcher = FakeFetcher::default().page("https://ok.test/", card_page(5));
        let ctx = context(fetcher, None);
        let (records, summary) =
            scrape_all(&urls(&["not a url", "https://ok.test/"]), &ctx).await;
        assert_eq!(records.len(), 5);
        assert_eq!(summary.failed(), 1);
    }
}
