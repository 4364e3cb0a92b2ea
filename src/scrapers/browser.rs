//! Chromium-backed [`PageRenderer`], compiled with the `browser` feature.
//!
//! Without the feature (or with `render.enabled: false`) [`launch_renderer`]
//! reports the engine as unavailable and sources that need rendering are
//! marked failed for the run.

use crate::config::RenderSettings;
use crate::errors::RenderError;
use crate::scrapers::rendered::PageRenderer;
use std::sync::Arc;

/// Start the headless browser described by `settings`.
pub async fn launch_renderer(settings: &RenderSettings) -> Result<Arc<dyn PageRenderer>, RenderError> {
    if !settings.enabled {
        return Err(RenderError::EngineUnavailable(
            "rendering disabled in configuration".to_string(),
        ));
    }
    launch(settings).await
}

#[cfg(not(feature = "browser"))]
async fn launch(_settings: &RenderSettings) -> Result<Arc<dyn PageRenderer>, RenderError> {
    Err(RenderError::EngineUnavailable(
        "built without the `browser` feature".to_string(),
    ))
}

#[cfg(feature = "browser")]
async fn launch(settings: &RenderSettings) -> Result<Arc<dyn PageRenderer>, RenderError> {
    let renderer = chromium::ChromiumRenderer::launch(settings).await?;
    tracing::info!("Headless browser launched");
    Ok(Arc::new(renderer))
}

#[cfg(feature = "browser")]
mod chromium {
    use super::*;
    use crate::scrapers::rendered::RenderedPage;
    use async_trait::async_trait;
    use chromiumoxide::Page;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tokio::task::JoinHandle;
    use tracing::{debug, warn};

    /// JavaScript resolving once the document is at least interactive.
    const WAIT_FOR_READY_SCRIPT: &str = r#"
        new Promise((resolve) => {
            if (document.readyState === 'complete' || document.readyState === 'interactive') {
                resolve(document.readyState);
            } else {
                document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
                setTimeout(() => resolve('timeout'), 10000);
            }
        })
    "#;

    pub struct ChromiumRenderer {
        browser: Mutex<Browser>,
        handler: JoinHandle<()>,
    }

    impl ChromiumRenderer {
        pub async fn launch(settings: &RenderSettings) -> Result<Self, RenderError> {
            let mut builder = BrowserConfig::builder()
                .no_sandbox()
                .window_size(1920, 1080)
                .arg("--disable-dev-shm-usage")
                .arg("--disable-gpu");
            if let Some(path) = &settings.chrome_path {
                builder = builder.chrome_executable(path);
            }
            let config = builder.build().map_err(RenderError::EngineUnavailable)?;
            let (browser, mut events) = Browser::launch(config)
                .await
                .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?;
            let handler = tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });
            Ok(Self {
                browser: Mutex::new(browser),
                handler,
            })
        }
    }

    impl Drop for ChromiumRenderer {
        fn drop(&mut self) {
            self.handler.abort();
        }
    }

    #[async_trait]
    impl PageRenderer for ChromiumRenderer {
        async fn open(&self, url: &str) -> Result<Box<dyn RenderedPage>, RenderError> {
            let page = {
                let browser = self.browser.lock().await;
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| RenderError::Navigation(e.to_string()))?
            };
            let navigated = page.goto(url).await.map(|_| ());
            if let Err(e) = navigated {
                let _ = page.close().await;
                return Err(RenderError::Navigation(e.to_string()));
            }
            Ok(Box::new(ChromiumPage { page }))
        }
    }

    struct ChromiumPage {
        page: Page,
    }

    #[async_trait]
    impl RenderedPage for ChromiumPage {
        async fn settle(&self, delay: Duration) {
            match tokio::time::timeout(delay, self.page.evaluate(WAIT_FOR_READY_SCRIPT.to_string())).await {
                Ok(Ok(_)) => debug!("Page reported ready"),
                Ok(Err(e)) => debug!(error = %e, "Could not check ready state"),
                Err(_) => warn!("Timeout waiting for page ready state"),
            }
            tokio::time::sleep(delay).await;
        }

        async fn content(&self) -> Result<String, RenderError> {
            self.page
                .content()
                .await
                .map_err(|e| RenderError::Navigation(e.to_string()))
        }

        async fn close(&self) {
            if let Err(e) = self.page.clone().close().await {
                debug!(error = %e, "Failed to close page");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_rendering_is_unavailable() {
        let settings = RenderSettings::default();
        assert!(!settings.enabled);
        let err = launch_renderer(&settings).await.err().unwrap();
        assert!(matches!(err, RenderError::EngineUnavailable(_)));
    }

    #[cfg(not(feature = "browser"))]
    #[tokio::test]
    async fn test_enabled_without_feature_is_unavailable() {
        let settings = RenderSettings {
            enabled: true,
            ..RenderSettings::default()
        };
        let err = launch_renderer(&settings).await.err().unwrap();
        assert!(err.to_string().contains("browser"));
    }
}
