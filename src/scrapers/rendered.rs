//! Rendered-DOM extractor and the "is this page client-rendered" classifier.
//!
//! The browser is reached only through [`PageRenderer`] / [`RenderedPage`]
//! (navigate, wait, read DOM), so the extraction logic can be exercised
//! against a fake. The concrete Chromium implementation lives in
//! [`super::browser`].

use crate::config::{ClassifierSettings, RenderSettings, ScrapeSettings};
use crate::errors::RenderError;
use crate::models::RawJob;
use crate::scrapers::{heuristic, structured};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Node, Selector};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("valid selector"));

/// Elements whose text is not visible content.
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template"];

/// Verdict of the static-page classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Enough server-rendered text to trust the static HTML.
    Static,
    /// Almost no visible text and no recognizable framework.
    Sparse,
    /// Little visible text plus a client-side framework root marker.
    ClientRendered,
}

impl PageKind {
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, PageKind::Static)
    }
}

#[cfg(test)]
pub(crate) fn classify_page(html: &str, settings: &ClassifierSettings) -> PageKind {
    let document = Html::parse_document(html);
    classify_document(&document, html, settings)
}

/// Decide whether static HTML is likely a client-rendered shell.
pub(crate) fn classify_document(document: &Html, html: &str, settings: &ClassifierSettings) -> PageKind {
    let text_len = visible_text_len(document);
    let has_marker = settings
        .framework_markers
        .iter()
        .any(|marker| html.contains(marker.as_str()));

    let kind = if has_marker && text_len < settings.min_body_text {
        PageKind::ClientRendered
    } else if text_len < settings.sparse_body_text {
        PageKind::Sparse
    } else {
        PageKind::Static
    };
    debug!(text_len, has_marker, ?kind, "Classified page");
    kind
}

fn visible_text_len(document: &Html) -> usize {
    let root = document.select(&BODY).next().unwrap_or_else(|| document.root_element());
    root.descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node
                    .ancestors()
                    .filter_map(|a| a.value().as_element())
                    .any(|e| INVISIBLE.contains(&e.name()));
                (!hidden).then(|| text.trim().chars().count())
            }
            _ => None,
        })
        .sum()
}

/// A headless browser able to open pages.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Navigate a fresh page to `url`.
    async fn open(&self, url: &str) -> Result<Box<dyn RenderedPage>, RenderError>;
}

/// One open browser page.
#[async_trait]
pub trait RenderedPage: Send + Sync {
    /// Give client-side scripts time to render. The default is a fixed sleep.
    async fn settle(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    /// Serialized current DOM.
    async fn content(&self) -> Result<String, RenderError>;

    async fn close(&self);
}

/// Render `url` in the browser and extract listings from the live DOM.
///
/// Structured data injected by scripts is preferred; otherwise the heuristic
/// container logic runs on the rendered markup. Navigation and DOM reads are
/// each bounded by the navigation timeout, the settle wait by `settle_ms`.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn extract(
    renderer: &dyn PageRenderer,
    url: &str,
    render: &RenderSettings,
    scrape: &ScrapeSettings,
) -> Result<Vec<RawJob>, RenderError> {
    let limit = render.navigation_timeout();
    let page = timeout(limit, renderer.open(url))
        .await
        .map_err(|_| RenderError::Timeout)??;

    page.settle(render.settle()).await;
    let html = timeout(limit, page.content()).await;
    page.close().await;
    let html = html.map_err(|_| RenderError::Timeout)??;
    debug!(bytes = html.len(), "Read rendered DOM");

    let document = Html::parse_document(&html);
    let jobs = structured::extract_from_document(&document, url);
    if !jobs.is_empty() {
        return Ok(jobs);
    }
    Ok(heuristic::extract_from_document(&document, url, scrape))
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves fixed HTML for every URL and counts navigations.
    #[derive(Default)]
    pub struct FakeRenderer {
        pub html: String,
        pub delay: Option<Duration>,
        pub opened: Arc<AtomicUsize>,
    }

    impl FakeRenderer {
        pub fn serving(html: impl Into<String>) -> Self {
            Self {
                html: html.into(),
                ..Self::default()
            }
        }

        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }
    }

    struct FakePage(String);

    #[async_trait]
    impl RenderedPage for FakePage {
        async fn content(&self) -> Result<String, RenderError> {
            Ok(self.0.clone())
        }

        async fn close(&self) {}
    }

    #[async_trait]
    impl PageRenderer for FakeRenderer {
        async fn open(&self, _url: &str) -> Result<Box<dyn RenderedPage>, RenderError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(Box::new(FakePage(self.html.clone())))
        }
    }
}
