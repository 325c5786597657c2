//! Browser session management.
//!
//! The login state lives in a persistent Chromium profile directory. The
//! session only launches the browser on that profile and opens pages; it never
//! reads or edits the profile contents.

use crate::browser::page::ChromiumPage;
use crate::error::ScrapeError;
use crate::page::PageHandle;
use crate::table::{INFINITE_TABLE_BODY, STATIC_TABLE_BODY};
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use mirror_common::ScraperConfig;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

const LOGIN_URL_MARKERS: &[&str] = &["login", "sign-in", "signin"];
const PAYWALL_MARKERS: &[&str] = &["subscribe", "sign up", "create account"];

/// Viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    pub profile_dir: PathBuf,
    pub executable: Option<PathBuf>,
    pub viewport: Viewport,
    pub navigation_timeout: Duration,
}

impl From<&ScraperConfig> for SessionConfig {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            headless: config.headless,
            profile_dir: config.profile_dir(),
            executable: config.chrome_executable.clone(),
            viewport: Viewport {
                width: config.window_width,
                height: config.window_height,
            },
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&ScraperConfig::default())
    }
}

/// A running browser bound to the persistent profile.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    config: SessionConfig,
}

impl BrowserSession {
    /// Launch Chromium on the configured profile.
    pub async fn launch(config: SessionConfig) -> Result<Self, ScrapeError> {
        std::fs::create_dir_all(&config.profile_dir).map_err(|e| {
            ScrapeError::LaunchFailed(format!(
                "cannot create profile dir {}: {e}",
                config.profile_dir.display()
            ))
        })?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&config.profile_dir)
            .window_size(config.viewport.width, config.viewport.height)
            .request_timeout(config.navigation_timeout);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &config.executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder.build().map_err(ScrapeError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapeError::LaunchFailed(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "CDP handler stopped");
                    break;
                }
            }
        });

        tracing::info!(
            headless = config.headless,
            profile = %config.profile_dir.display(),
            "Browser launched"
        );

        Ok(Self {
            browser,
            handler,
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open `url` in a new tab and wait for the navigation to settle.
    pub async fn open(&self, url: &str) -> Result<ChromiumPage, ScrapeError> {
        let navigate = async {
            let page = self.browser.new_page(url).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(page)
        };

        match tokio::time::timeout(self.config.navigation_timeout, navigate).await {
            Ok(Ok(page)) => {
                tracing::debug!(url = %url, "Page opened");
                Ok(ChromiumPage::new(page))
            }
            Ok(Err(e)) => Err(ScrapeError::Browser(format!("navigation to {url} failed: {e}"))),
            Err(_) => Err(ScrapeError::NavigationTimeout {
                url: url.to_string(),
            }),
        }
    }

    /// Close the browser and stop the handler task.
    pub async fn close(mut self) -> Result<(), ScrapeError> {
        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| ScrapeError::Browser(e.to_string()));
        if let Err(e) = self.browser.wait().await {
            tracing::debug!(error = %e, "Browser process wait failed");
        }
        self.handler.abort();
        tracing::debug!("Browser closed");
        closed
    }
}

/// Whether the page shows a login wall instead of the portfolio.
///
/// A login URL always means logged out. Otherwise a subscribe prompt with
/// no portfolio table body means logged out. A page showing neither is not
/// a login wall; a missing table there is a layout problem.
pub async fn needs_login(page: &dyn PageHandle) -> Result<bool, ScrapeError> {
    if let Some(url) = page.current_url().await {
        let url = url.to_lowercase();
        if LOGIN_URL_MARKERS.iter().any(|m| url.contains(m)) {
            return Ok(true);
        }
    }

    for selector in [INFINITE_TABLE_BODY, STATIC_TABLE_BODY] {
        if !page.query_rows(selector).await?.is_empty() {
            return Ok(false);
        }
    }

    for marker in PAYWALL_MARKERS {
        if page.contains_text(marker).await? {
            tracing::debug!(marker, "Paywall prompt detected");
            return Ok(true);
        }
    }
    Ok(false)
}
