//! Page Snapshot (pagesnap) Library
//!
//! Drives a headless Chromium to capture a structured snapshot of a web page:
//! rendered markup, extracted links, a screenshot, and every request/response
//! exchanged while the page loaded.
//!
//! # Module Overview
//!
//! - [`browser`] - Engine lifecycle, context pool and network recording
//! - [`summary`] - Capture orchestration and link extraction
//! - [`config`] - Configuration file support
//! - [`types`] - Captured data types
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use pagesnap_lib::{Config, PageSummarizer};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> pagesnap_lib::Result<()> {
//! let summarizer = PageSummarizer::from_config(&Config::default())?;
//! let summary = summarizer
//!     .capture_summary("https://example.com", &CancellationToken::new())
//!     .await?;
//! println!("{} links, {} requests", summary.links.len(), summary.network_activity.len());
//! summarizer.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod output;
pub mod summary;
pub mod types;
pub mod viewport;

#[cfg(test)]
pub(crate) mod testing;

pub use browser::{
    BrowserOptions, ChromiumLauncher, ContextLease, ContextPool, EngineManager, NetworkRecorder,
    PoolOptions, PoolStats,
};
pub use config::Config;
pub use error::{ErrorCategory, ErrorPayload, Result, SnapError};
pub use output::{
    ErrorOutput, ImageData, MarkupOutput, ScreenshotOutput, SnapOutput, SummaryOutput,
    PAGESNAP_OUTPUT_VERSION,
};
pub use summary::{extract_links, CaptureOptions, ExtractionWarning, PageSummarizer};
pub use types::{CapturedNetworkActivity, CapturedRequest, CapturedResponse, Link, PageSummary};
pub use viewport::Viewport;
