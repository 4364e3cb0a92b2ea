//! Source list loader.
//!
//! The list is plain text, one URL per line, read from a local file or a
//! remote URL. Blank lines and `#` comments are skipped; order is kept
//! because it decides which sites are visited when a run is capped. Entries
//! are not validated here, a malformed URL simply fails at fetch time.

use crate::errors::SourceListError;
use crate::scrapers::fetch::PageFetch;
use tracing::{info, instrument, warn};

const COMMENT_PREFIX: char = '#';

/// Candidate URLs from a newline-delimited list, in file order.
pub fn parse_source_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_PREFIX))
        .map(str::to_string)
        .collect()
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Read the list at `location`, a local path or an `http(s)` URL.
#[instrument(level = "info", skip(fetcher))]
pub async fn load_source_list(
    location: &str,
    fetcher: &dyn PageFetch,
) -> Result<Vec<String>, SourceListError> {
    let text = if is_remote(location) {
        fetcher
            .fetch(location)
            .await
            .map_err(|e| SourceListError::Unavailable {
                location: location.to_string(),
                reason: e.to_string(),
            })?
    } else {
        tokio::fs::read_to_string(location)
            .await
            .map_err(|e| SourceListError::Unavailable {
                location: location.to_string(),
                reason: e.to_string(),
            })?
    };
    let sources = parse_source_list(&text);
    info!(count = sources.len(), "Loaded source list");
    Ok(sources)
}

/// Load the configured list, falling back to `defaults` when it is missing,
/// unreadable or empty. May still return an empty list if `defaults` is.
pub async fn resolve_sources(
    location: Option<&str>,
    defaults: &[String],
    fetcher: &dyn PageFetch,
) -> Vec<String> {
    let Some(location) = location else {
        info!(count = defaults.len(), "No source list configured; using built-in defaults");
        return defaults.to_vec();
    };
    match load_source_list(location, fetcher).await {
        Ok(sources) if !sources.is_empty() => sources,
        Ok(_) => {
            warn!(%location, "Source list is empty; using built-in defaults");
            defaults.to_vec()
        }
        Err(e) => {
            warn!(error = %e, "Falling back to built-in source list");
            defaults.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FetchError;
    use async_trait::async_trait;

    struct StaticFetcher(Result<String, FetchError>);

    #[async_trait]
    impl PageFetch for StaticFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            self.0.clone()
        }
    }

    fn defaults() -> Vec<String> {
        vec!["https://default.test".to_string()]
    }

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        let text = "# boards\nhttps://rozee.pk\n\n   \n  https://mustakbil.com  \n#https://old.pk\nnot-a-url\n";
        assert_eq!(
            parse_source_list(text),
            vec!["https://rozee.pk", "https://mustakbil.com", "not-a-url"]
        );
    }

    #[tokio::test]
    async fn test_load_local_file_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_links.txt");
        std::fs::write(&path, "https://b.test\nhttps://a.test\n").unwrap();
        let fetcher = StaticFetcher(Err(FetchError::Timeout));
        let sources = load_source_list(path.to_str().unwrap(), &fetcher).await.unwrap();
        assert_eq!(sources, vec!["https://b.test", "https://a.test"]);
    }

    #[tokio::test]
    async fn test_load_remote_list() {
        let fetcher = StaticFetcher(Ok("https://a.test\n# note\nhttps://b.test".to_string()));
        let sources = load_source_list("https://lists.test/job_links.txt", &fetcher)
            .await
            .unwrap();
        assert_eq!(sources.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let fetcher = StaticFetcher(Err(FetchError::Timeout));
        let err = load_source_list("/no/such/job_links.txt", &fetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceListError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_remote_failure() {
        let fetcher = StaticFetcher(Err(FetchError::HttpError { status: 404 }));
        let sources = resolve_sources(Some("https://lists.test/x.txt"), &defaults(), &fetcher).await;
        assert_eq!(sources, defaults());
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_empty_list() {
        let fetcher = StaticFetcher(Ok("# nothing here\n\n".to_string()));
        let sources = resolve_sources(Some("https://lists.test/x.txt"), &defaults(), &fetcher).await;
        assert_eq!(sources, defaults());
    }

    #[tokio::test]
    async fn test_resolve_without_location_uses_defaults() {
        let fetcher = StaticFetcher(Err(FetchError::Timeout));
        assert_eq!(resolve_sources(None, &defaults(), &fetcher).await, defaults());
    }
}
