//! Page fetcher: one HTTP GET per source, browser identity, hard timeout.
//!
//! Failures are classified into [`FetchError`] kinds and returned, never
//! retried here. A failed fetch is terminal for that source in that run.

use crate::config::FetchSettings;
use crate::errors::FetchError;
use async_trait::async_trait;
use rand::rng;
use rand::seq::IndexedRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, redirect};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use url::Url;

/// Anything that can turn a URL into page HTML.
///
/// The production implementation is [`HttpFetcher`]; tests substitute
/// canned pages.
#[async_trait]
pub trait PageFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher shared by every source in a run.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    user_agents: Vec<String>,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9,ur;q=0.8"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout())
            .connect_timeout(settings.timeout())
            .redirect(redirect::Policy::limited(settings.max_redirects))
            .build()
            .map_err(|e| FetchError::Other(e.to_string()))?;

        Ok(Self {
            client,
            user_agents: settings.user_agents.clone(),
            timeout: settings.timeout(),
        })
    }

    async fn get_page(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.pick_user_agent())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpError {
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENT)
    }
}

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[async_trait]
impl PageFetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        Url::parse(url).map_err(|e| FetchError::Other(format!("invalid url: {e}")))?;

        let t0 = Instant::now();
        let result = self.get_page(url).await;

        let elapsed_ms = t0.elapsed().as_millis() as u64;
        match &result {
            Ok(body) => debug!(bytes = body.len(), elapsed_ms, "Fetched page"),
            Err(e) => warn!(
                error = %e,
                elapsed_ms,
                timeout_ms = self.timeout.as_millis() as u64,
                "Fetch failed"
            ),
        }
        result
    }
}
