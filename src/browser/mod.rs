//! Engine lifecycle: the single Chromium process, its pool of reusable
//! browsing contexts, and per-page network recording.
//!
//! # Module Structure
//!
//! - [`engine`] - traits the lifecycle code is written against
//! - [`manager`] - lazy launch and inactivity teardown of the engine
//! - [`pool`] - bounded, reusable rendering contexts
//! - [`recorder`] - request/response correlation for one navigation
//! - [`chromium`] - `chromiumoxide` implementation of [`engine`]
//!
//! # Example
//!
//! ```no_run
//! use pagesnap_lib::browser::{BrowserOptions, ChromiumLauncher, ContextPool, EngineManager, PoolOptions};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> pagesnap_lib::Result<()> {
//! let launcher = ChromiumLauncher::new(BrowserOptions::default());
//! let manager = EngineManager::new(launcher, Duration::from_secs(60))?;
//! let pool = ContextPool::new(manager, PoolOptions::default())?;
//!
//! let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
//! let lease = pool.lease(&CancellationToken::new(), deadline).await?;
//! let page = lease.context().new_page().await?;
//! # drop(page);
//! # Ok(())
//! # }
//! ```

pub mod chromium;
pub mod engine;
pub mod manager;
pub mod pool;
pub mod recorder;

pub use chromium::{BrowserOptions, ChromiumLauncher, DEFAULT_LAUNCH_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use engine::{Engine, EngineLauncher, PageSession, RenderContext};
pub use manager::{EngineHandle, EngineManager, DEFAULT_INACTIVITY_TIMEOUT};
pub use pool::{
    ContextId, ContextLease, ContextPool, PoolOptions, PoolStats, PooledContext,
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_POOL_SIZE, MIN_EVICTION_INTERVAL,
};
pub use recorder::{
    is_textual_content_type, method_carries_body, NetworkRecorder, RequestEvent, ResponseEvent,
    DEFAULT_NETWORK_QUIET_WINDOW,
};
