//! Job assistant: asks an OpenAI-compatible chat endpoint about the cached
//! listings.
//!
//! The model only ever sees the [`JobContext`] projection of each record
//! (no descriptions), capped at `max_context_jobs` entries. Transient API
//! failures are retried by [`RetryAsk`] with exponential backoff and jitter;
//! a request the endpoint rejects outright ([`ChatError::Rejected`]) is not:
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use crate::config::LlmSettings;
use crate::errors::ChatError;
use crate::models::{JobContext, JobRecord};
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

const SYSTEM_PROMPT: &str = "You are a helpful assistant for people looking for jobs in Pakistan. \
Answer using only the job listings provided as JSON. Cite listings by title and organization. \
If nothing matches, say so.";

/// Async text completion.
pub trait AskAsync {
    type Response;

    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Adds retry with exponential backoff to any [`AskAsync`].
pub struct RetryAsk<T> {
    inner: T,
    max_retries: usize,
    /// Doubles with each attempt.
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if e.downcast_ref::<ChatError>().is_some_and(|c| !c.is_retryable()) {
                        error!(attempt, error = %e, "ask() rejected by the endpoint; not retrying");
                        return Err(e);
                    }

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let shift = (attempt - 1).min(16) as u32;
                    let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Option<String> {
        self.choices.into_iter().find_map(|c| c.message.content)
    }
}

/// Minimal client for `POST {base_url}/chat/completions`.
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ChatClient {
    pub fn new(settings: &LlmSettings, api_key: Option<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key,
        })
    }
}

impl AskAsync for ChatClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };
        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(ChatError::from)?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Chat endpoint returned an error status");
            return Err(ChatError::from_status(status.as_u16()).into());
        }
        let parsed: ChatResponse = response.json().await.map_err(ChatError::from)?;
        let dt = t0.elapsed();
        match parsed.into_text() {
            Some(text) => {
                info!(elapsed_ms = dt.as_millis() as u64, chars = text.len(), "Chat completion received");
                debug!(preview = %truncate_for_log(&text, 200), "Chat completion text");
                Ok(text)
            }
            None => Err(ChatError::EmptyReply.into()),
        }
    }
}

/// JSON array of the first `max` records, reduced to [`JobContext`].
pub fn job_context_json(records: &[JobRecord], max: usize) -> Result<String, serde_json::Error> {
    let context: Vec<JobContext> = records.iter().take(max).map(JobContext::from).collect();
    serde_json::to_string(&context)
}

pub fn build_prompt(question: &str, context_json: &str) -> String {
    format!("Job listings:\n{context_json}\n\nQuestion: {}", question.trim())
}

/// Ask `question` about `records` with retry and backoff.
#[instrument(level = "info", skip_all, fields(records = records.len()))]
pub async fn ask_about_jobs(
    settings: &LlmSettings,
    api_key: Option<String>,
    records: &[JobRecord],
    question: &str,
) -> Result<String, Box<dyn Error>> {
    let t0 = Instant::now();
    let context = job_context_json(records, settings.max_context_jobs)?;
    let prompt = build_prompt(question, &context);
    let client = RetryAsk::new(ChatClient::new(settings, api_key)?, settings.max_retries, StdDuration::from_secs(1));
    let res = client.ask(&prompt).await;
    let dt = t0.elapsed();

    match &res {
        Ok(_) => info!(elapsed_ms_total = dt.as_millis() as u64, "ask_about_jobs succeeded"),
        Err(e) => error!(elapsed_ms_total = dt.as_millis() as u64, error = %e, "ask_about_jobs failed"),
    }
    res
}
