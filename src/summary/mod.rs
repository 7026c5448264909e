//! Page summary orchestration.
//!
//! [`PageSummarizer`] drives one capture end to end: lease a context, open a
//! page with network recording, navigate, wait for the network to settle,
//! read what was asked for, and always close the page and return the context.

pub mod links;
mod scope;

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::recorder::DEFAULT_NETWORK_QUIET_WINDOW;
use crate::browser::{
    ChromiumLauncher, ContextLease, ContextPool, EngineManager, NetworkRecorder, PageSession,
};
use crate::config::Config;
use crate::types::{CapturedNetworkActivity, PageSummary};
use crate::{Result, SnapError};
use scope::PageScope;

pub use links::{extract_links, ExtractionWarning};

/// Default timeout for page navigation.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for waiting for network idle state.
pub const DEFAULT_NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for a free rendering context.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on reading markup or taking a screenshot.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-capture timing and behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Bound on the navigation itself (up to the load event).
    pub navigation_timeout: Duration,
    /// How long to wait for the network to go quiet after load.
    pub network_idle_timeout: Duration,
    /// Quiet period that counts as network idle.
    pub network_quiet_window: Duration,
    pub acquire_timeout: Duration,
    pub capture_timeout: Duration,
    /// Whether summaries screenshot the whole document or only the viewport.
    pub full_page: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            network_idle_timeout: DEFAULT_NETWORK_IDLE_TIMEOUT,
            network_quiet_window: DEFAULT_NETWORK_QUIET_WINDOW,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            full_page: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Want<'a> {
    Summary,
    Markup,
    Screenshot { full_page: bool },
    Evaluate { script: &'a str },
}

#[derive(Debug, Default)]
struct Captured {
    html: String,
    screenshot: Vec<u8>,
    activity: Vec<CapturedNetworkActivity>,
    value: serde_json::Value,
}

/// Captures pages through a shared [`ContextPool`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PageSummarizer {
    pool: ContextPool,
    options: CaptureOptions,
}

impl PageSummarizer {
    pub fn new(pool: ContextPool, options: CaptureOptions) -> Self {
        Self { pool, options }
    }

    /// Builds the Chromium-backed stack described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let launcher = ChromiumLauncher::new(config.browser_options());
        let manager = EngineManager::new(launcher, config.engine.inactivity_timeout)?;
        let pool = ContextPool::new(manager, config.pool_options())?;
        Ok(Self::new(pool, config.capture_options()))
    }

    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Captures markup, links, a screenshot and the network activity of `url`.
    pub async fn capture_summary(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<PageSummary> {
        info!(url, "Capturing page summary");
        let captured = self.run(url, cancel, Want::Summary).await?;

        let links = match extract_links(&captured.html, url) {
            Ok(links) => links,
            Err(warning) => {
                warn!(url, %warning, "Link extraction failed; summary has no links");
                Vec::new()
            }
        };

        info!(
            url,
            links = links.len(),
            requests = captured.activity.len(),
            screenshot_bytes = captured.screenshot.len(),
            "Captured page summary"
        );
        Ok(PageSummary {
            url: url.to_string(),
            timestamp: Utc::now(),
            html: captured.html,
            links,
            network_activity: captured.activity,
            screenshot: captured.screenshot,
        })
    }

    /// Rendered markup of `url`.
    pub async fn get_markup(&self, url: &str, cancel: &CancellationToken) -> Result<String> {
        info!(url, "Capturing markup");
        Ok(self.run(url, cancel, Want::Markup).await?.html)
    }

    /// PNG screenshot of `url`.
    pub async fn get_screenshot(
        &self,
        url: &str,
        full_page: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        info!(url, full_page, "Capturing screenshot");
        Ok(self
            .run(url, cancel, Want::Screenshot { full_page })
            .await?
            .screenshot)
    }

    /// Loads `url` and returns the result of running `script` in it.
    pub async fn evaluate(
        &self,
        url: &str,
        script: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        info!(url, "Evaluating script");
        Ok(self.run(url, cancel, Want::Evaluate { script }).await?.value)
    }

    /// Closes every context and the engine. Context close failures are logged.
    pub async fn shutdown(&self) -> Result<()> {
        let failures = self.pool.drain().await;
        if !failures.is_empty() {
            warn!(count = failures.len(), "Some contexts failed to close during shutdown");
        }
        self.pool.manager().shutdown().await
    }

    async fn run(&self, url: &str, cancel: &CancellationToken, want: Want<'_>) -> Result<Captured> {
        Url::parse(url)?;

        let lease = self.lease(cancel).await?;

        // Not raced against `cancel`: a page the engine opens anyway must
        // still be closed, so opening always runs to completion.
        let page = match lease.context().new_page().await {
            Ok(page) => page,
            Err(err) => {
                warn!(url, error = %err, "Opening a page failed; dropping the context");
                lease.discard().await;
                return Err(err);
            }
        };
        let mut scope = PageScope::new(page, lease, self.options.capture_timeout);

        let outcome = if cancel.is_cancelled() {
            Err(SnapError::Cancelled)
        } else {
            match scope.page() {
                Ok(page) => tokio::select! {
                    _ = cancel.cancelled() => Err(SnapError::Cancelled),
                    captured = self.drive(page, url, want) => captured,
                },
                Err(err) => Err(err),
            }
        };
        scope.close().await;

        if let Err(err) = &outcome {
            warn!(url, error = %err, "Capture failed");
        }
        outcome
    }

    async fn lease(&self, cancel: &CancellationToken) -> Result<ContextLease> {
        let deadline = Instant::now() + self.options.acquire_timeout;
        match self.pool.lease(cancel, deadline).await {
            Err(SnapError::Cancelled) if !cancel.is_cancelled() => {
                Err(SnapError::Acquisition(format!(
                    "no rendering context became available within {:?}",
                    self.options.acquire_timeout
                )))
            }
            other => other,
        }
    }

    async fn drive(
        &self,
        page: &mut dyn PageSession,
        url: &str,
        want: Want<'_>,
    ) -> Result<Captured> {
        let recorder = NetworkRecorder::new();
        recorder.begin_navigation();
        page.install_recorder(recorder.clone()).await?;

        // Load and network idle share one navigation budget.
        let deadline = Instant::now() + self.options.navigation_timeout;
        match timeout_at(deadline, page.navigate(url)).await {
            Ok(Ok(())) => {}
            Ok(Err(err @ SnapError::Navigation { .. })) => return Err(err),
            Ok(Err(err)) => return Err(SnapError::navigation(url, err)),
            Err(_) => {
                return Err(SnapError::navigation(
                    url,
                    format!("timed out after {:?}", self.options.navigation_timeout),
                ))
            }
        }

        let idle_budget = self
            .options
            .network_idle_timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        let idle = recorder
            .wait_for_network_idle(self.options.network_quiet_window, idle_budget)
            .await;
        if !idle {
            warn!(url, "Network did not go idle in time; capturing current state");
        }

        let mut captured = Captured::default();
        if matches!(want, Want::Summary | Want::Markup) {
            captured.html = self.bounded(url, page.content()).await?;
        }
        let full_page = match want {
            Want::Summary => Some(self.options.full_page),
            Want::Screenshot { full_page } => Some(full_page),
            Want::Markup | Want::Evaluate { .. } => None,
        };
        if let Some(full_page) = full_page {
            captured.screenshot = self.bounded(url, page.screenshot(full_page)).await?;
        }
        if let Want::Evaluate { script } = want {
            captured.value = self.bounded(url, page.evaluate(script)).await?;
        }
        captured.activity = recorder.activity();
        debug!(url, requests = captured.activity.len(), "Network activity collected");
        Ok(captured)
    }

    async fn bounded<T>(&self, url: &str, read: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.options.capture_timeout, read).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err @ SnapError::Capture { .. })) => Err(err),
            Ok(Err(err)) => Err(SnapError::capture(url, err)),
            Err(_) => Err(SnapError::capture(
                url,
                format!("timed out after {:?}", self.options.capture_timeout),
            )),
        }
    }
}
