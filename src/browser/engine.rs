//! Abstractions over the rendering engine.
//!
//! The lifecycle components (manager, pool, summarizer) only talk to these
//! traits. [`super::chromium`] implements them on top of Chromium.

use std::sync::Arc;

use async_trait::async_trait;

use super::recorder::NetworkRecorder;
use crate::Result;

/// Starts a new engine process.
#[async_trait]
pub trait EngineLauncher: Send + Sync + 'static {
    async fn launch(&self) -> Result<Arc<dyn Engine>>;
}

/// A running engine process.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Creates an isolated browsing context (own cookies and storage).
    async fn new_context(&self) -> Result<Arc<dyn RenderContext>>;

    /// Terminates the process. Contexts created by this engine become unusable.
    async fn close(&self) -> Result<()>;
}

/// An isolated browsing context inside an [`Engine`].
#[async_trait]
pub trait RenderContext: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageSession>>;

    async fn close(&self) -> Result<()>;
}

/// A single page inside a [`RenderContext`].
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Starts feeding request and response events into `recorder`.
    /// Must be called before [`PageSession::navigate`] so early requests are seen.
    async fn install_recorder(&mut self, recorder: NetworkRecorder) -> Result<()>;

    /// Navigates and waits for the load event.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String>;

    /// PNG screenshot of the viewport, or of the whole document when `full_page`.
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;

    /// Runs `script` in the page and returns its JSON-serializable result.
    /// Promises are awaited.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    async fn close(&mut self) -> Result<()>;
}
