//! Runtime settings, loaded from an optional YAML file.
//!
//! Every field has a default, so an empty (or absent) file yields a working
//! configuration. The selector lists, keyword lists and category table are
//! tuning data for brittle heuristics and live here rather than in code.
//!
//! ```yaml
//! sources: https://example.com/job_links.txt
//! scrape:
//!   concurrency: 12
//!   max_sites: 100
//! cache:
//!   path: /var/lib/pak_jobs/jobs_cache.csv
//!   stale_after_hours: 24
//! ```

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Path or URL of the newline-delimited source list. `None` means the
    /// built-in defaults.
    pub sources: Option<String>,
    /// Fallback list used when `sources` is unset or unreadable.
    pub default_sources: DefaultSources,
    pub fetch: FetchSettings,
    pub scrape: ScrapeSettings,
    pub render: RenderSettings,
    pub classifier: ClassifierSettings,
    pub normalize: NormalizeSettings,
    pub cache: CacheSettings,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DefaultSources(pub Vec<String>);

impl Default for DefaultSources {
    fn default() -> Self {
        Self(
            [
                "https://www.9cv9.com",
                "https://www.brightspyre.com",
                "https://www.careerokay.com",
                "https://www.jobomas.com/en/jobs",
                "https://www.jobsbirds.com",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub max_redirects: usize,
    /// Browser identities; one is picked at random per request.
    pub user_agents: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_redirects: 10,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15".to_string(),
            ],
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// When the orchestrator may fall through to the headless browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderFallback {
    Never,
    /// Only for pages the classifier flags as sparse or client-rendered.
    #[default]
    WhenDynamic,
    Always,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrapeSettings {
    pub concurrency: usize,
    /// Upper bound on how many sources a run visits; list order decides which.
    pub max_sites: Option<usize>,
    pub max_per_source: usize,
    /// A container candidate must match at least this many elements.
    pub min_containers: usize,
    pub min_title_len: usize,
    /// How many generic block elements the frequency analysis inspects.
    pub sample_limit: usize,
    pub container_selectors: Vec<String>,
    pub organization_keywords: Vec<String>,
    pub location_keywords: Vec<String>,
    pub date_keywords: Vec<String>,
    pub salary_keywords: Vec<String>,
    pub render_fallback: RenderFallback,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_sites: None,
            max_per_source: 25,
            min_containers: 4,
            min_title_len: 5,
            sample_limit: 600,
            container_selectors: strings(&[
                ".job-list-item",
                ".jobs-list-item",
                ".job-list .job",
                ".job_list tbody tr",
                ".job-box",
                "div.job-listing",
                "div.job-card",
                "div.job-item",
                "li.job",
                "article.job",
                "div.job",
                "div.vacancy",
                "[data-job-id]",
                "div.listing-item",
                "article",
            ]),
            organization_keywords: strings(&["company", "employer", "organization", "organisation", "recruiter"]),
            location_keywords: strings(&["location", "city", "place", "address"]),
            date_keywords: strings(&["date", "posted", "published"]),
            salary_keywords: strings(&["salary", "pay", "compensation"]),
            render_fallback: RenderFallback::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Launch a headless browser for client-rendered pages. Needs the
    /// `browser` feature.
    pub enabled: bool,
    /// Fixed wait after navigation for client-side rendering.
    pub settle_ms: u64,
    pub navigation_timeout_secs: u64,
    pub chrome_path: Option<String>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            settle_ms: 2500,
            navigation_timeout_secs: 20,
            chrome_path: None,
        }
    }
}

impl RenderSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Body text shorter than this, combined with a framework marker, means
    /// the page is rendered client side.
    pub min_body_text: usize,
    /// Body text shorter than this is sparse regardless of markers.
    pub sparse_body_text: usize,
    pub framework_markers: Vec<String>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            min_body_text: 200,
            sparse_body_text: 40,
            framework_markers: strings(&[
                "id=\"root\"",
                "id=\"app\"",
                "id=\"__next\"",
                "id=\"__nuxt\"",
                "data-reactroot",
                "ng-version",
                "__NEXT_DATA__",
                "window.__NUXT__",
                "<app-root",
            ]),
        }
    }
}

/// One row of the ordered category table. First match wins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CategoryRule {
    pub label: String,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    fn new(label: &str, keywords: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            keywords: strings(keywords),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizeSettings {
    pub max_title_chars: usize,
    pub max_description_chars: usize,
    pub categories: Vec<CategoryRule>,
    pub default_category: String,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            max_title_chars: 200,
            max_description_chars: 4000,
            categories: vec![
                CategoryRule::new(
                    "IT & Software",
                    &["engineer", "developer", "software", "programmer", "devops", "data scientist", "web ", "network", "database", "qa "],
                ),
                CategoryRule::new("Healthcare", &["doctor", "nurse", "medical", "pharmac", "health", "surgeon", "dental"]),
                CategoryRule::new("Education", &["teacher", "lecturer", "professor", "tutor", "educat", "instructor"]),
                CategoryRule::new("Finance & Accounting", &["accountant", "account", "finance", "audit", "bank", "tax"]),
                CategoryRule::new("Sales & Marketing", &["sales", "marketing", "business development", "brand"]),
                CategoryRule::new("Government", &["government", "govt", "ppsc", "fpsc", "spsc", "public service"]),
                CategoryRule::new("Design & Media", &["designer", "graphic", "content", "writer", "editor", "video"]),
                CategoryRule::new("Administration", &["admin", "assistant", "clerk", "receptionist", "office"]),
            ],
            default_category: "Other".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub path: String,
    pub stale_after_hours: u64,
    pub check_interval_secs: u64,
    /// When set, every successful refresh also writes a timestamped copy here.
    pub backup_dir: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: "jobs_cache.csv".to_string(),
            stale_after_hours: 24,
            check_interval_secs: 60,
            backup_dir: None,
        }
    }
}

impl CacheSettings {
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::hours(self.stale_after_hours as i64)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmSettings {
    /// OpenAI-compatible endpoint root, e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Upper bound on jobs serialized into one prompt.
    pub max_context_jobs: usize,
    pub max_retries: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "qwen2.5:7b".to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
            max_context_jobs: 200,
            max_retries: 5,
        }
    }
}

/// Read settings from `path`, or return the defaults when `path` is `None`.
#[instrument(level = "info")]
pub async fn load_settings(path: Option<&str>) -> Result<Settings, ConfigError> {
    let Some(path) = path else {
        info!("No config file given; using defaults");
        return Ok(Settings::default());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
    let settings = parse_settings(&text).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })?;
    info!(path, "Loaded configuration");
    Ok(settings)
}

/// Parse YAML settings. Blank input gives the defaults.
pub fn parse_settings(text: &str) -> Result<Settings, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(text)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
