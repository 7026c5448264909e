//! Engine instance manager.
//!
//! Owns the single engine process: launches it on first use, hands out the
//! live handle, and closes it after a period without activity. Every reset of
//! the inactivity timer bumps a generation counter and cancels the previous
//! timer task, so a late-firing stale timer can never close an engine that
//! was relaunched or used after it was scheduled.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::engine::{Engine, EngineLauncher};
use crate::{Result, SnapError};

/// Default idle period after which the engine is closed.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

/// A live engine together with the launch epoch it belongs to.
#[derive(Clone)]
pub struct EngineHandle {
    pub engine: Arc<dyn Engine>,
    pub epoch: u64,
}

struct TimerState {
    timeout: Duration,
    generation: u64,
    cancel: Option<CancellationToken>,
}

struct ManagerInner {
    launcher: Arc<dyn EngineLauncher>,
    engine: AsyncMutex<Option<EngineHandle>>,
    timer: Mutex<TimerState>,
    /// Epoch of the running engine, 0 while absent.
    live_epoch: AtomicU64,
    launches: AtomicU64,
    busy: AtomicUsize,
}

/// Shared owner of the engine process. Clones refer to the same engine.
#[derive(Clone)]
pub struct EngineManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for EngineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineManager")
            .field("live_epoch", &self.live_epoch())
            .field("busy", &self.inner.busy.load(Ordering::SeqCst))
            .finish()
    }
}

impl EngineManager {
    pub fn new(launcher: impl EngineLauncher, inactivity_timeout: Duration) -> Result<Self> {
        Self::with_launcher(Arc::new(launcher), inactivity_timeout)
    }

    pub fn with_launcher(
        launcher: Arc<dyn EngineLauncher>,
        inactivity_timeout: Duration,
    ) -> Result<Self> {
        validate_timeout(inactivity_timeout)?;
        Ok(Self {
            inner: Arc::new(ManagerInner {
                launcher,
                engine: AsyncMutex::new(None),
                timer: Mutex::new(TimerState {
                    timeout: inactivity_timeout,
                    generation: 0,
                    cancel: None,
                }),
                live_epoch: AtomicU64::new(0),
                launches: AtomicU64::new(0),
                busy: AtomicUsize::new(0),
            }),
        })
    }

    fn timer(&self) -> MutexGuard<'_, TimerState> {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the running engine, launching one if none is running.
    ///
    /// Concurrent callers wait on the same lock, so at most one launch is in
    /// progress and nobody observes a half-started engine.
    pub async fn acquire_engine(&self) -> Result<EngineHandle> {
        let mut slot = self.inner.engine.lock().await;
        if let Some(handle) = slot.as_ref() {
            let handle = handle.clone();
            self.keep_alive();
            return Ok(handle);
        }

        info!("Launching engine");
        let engine = self.inner.launcher.launch().await.map_err(|err| match err {
            SnapError::Launch(_) => err,
            other => SnapError::Launch(other.to_string()),
        });
        let engine = match engine {
            Ok(engine) => engine,
            Err(err) => {
                error!(error = %err, "Engine launch failed");
                return Err(err);
            }
        };

        let epoch = self.inner.launches.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = EngineHandle { engine, epoch };
        *slot = Some(handle.clone());
        self.inner.live_epoch.store(epoch, Ordering::SeqCst);
        info!(epoch, "Engine launched");

        self.keep_alive();
        Ok(handle)
    }

    /// Closes the engine if one is running. Safe to call repeatedly.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel_timer();
        let mut slot = self.inner.engine.lock().await;
        self.close_locked(&mut slot).await
    }

    async fn close_locked(&self, slot: &mut Option<EngineHandle>) -> Result<()> {
        let Some(handle) = slot.take() else {
            debug!("No engine to close");
            return Ok(());
        };
        self.inner.live_epoch.store(0, Ordering::SeqCst);
        info!(epoch = handle.epoch, "Closing engine");
        handle.engine.close().await.map_err(|err| {
            warn!(epoch = handle.epoch, error = %err, "Engine close reported an error");
            err
        })
    }

    /// Changes the idle period. Takes effect from the next timer reset.
    pub fn set_inactivity_timeout(&self, timeout: Duration) -> Result<()> {
        validate_timeout(timeout)?;
        self.timer().timeout = timeout;
        debug!(?timeout, "Inactivity timeout set");
        Ok(())
    }

    pub fn inactivity_timeout(&self) -> Duration {
        self.timer().timeout
    }

    /// Reschedules the inactivity timer from now.
    ///
    /// The previous timer is invalidated both by its cancellation token and
    /// by the generation bump, so only the most recent reset can fire.
    pub fn keep_alive(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("keep_alive called outside a runtime; inactivity timer not armed");
            return;
        };

        let mut timer = self.timer();
        timer.generation += 1;
        if let Some(previous) = timer.cancel.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        timer.cancel = Some(token.clone());
        let generation = timer.generation;
        let timeout = timer.timeout;
        drop(timer);

        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(timeout) => {}
            }
            if let Some(inner) = weak.upgrade() {
                EngineManager { inner }.on_inactivity(generation).await;
            }
        });
    }

    fn cancel_timer(&self) {
        let mut timer = self.timer();
        timer.generation += 1;
        if let Some(token) = timer.cancel.take() {
            token.cancel();
        }
    }

    async fn on_inactivity(&self, generation: u64) {
        let mut slot = self.inner.engine.lock().await;
        if self.timer().generation != generation {
            debug!(generation, "Stale inactivity timer ignored");
            return;
        }
        if slot.is_none() {
            return;
        }

        // Hide the epoch before reading the busy count; the pool marks itself
        // busy before checking the epoch, so one of the two sides backs off.
        let epoch = self.inner.live_epoch.swap(0, Ordering::SeqCst);
        if self.inner.busy.load(Ordering::SeqCst) > 0 {
            self.inner.live_epoch.store(epoch, Ordering::SeqCst);
            drop(slot);
            debug!("Contexts still in use; inactivity timer re-armed");
            self.keep_alive();
            return;
        }

        info!("Engine inactivity timeout reached, closing instance");
        if let Err(err) = self.close_locked(&mut slot).await {
            error!(error = %err, "Failed to close engine on inactivity timeout");
        }
    }

    /// Epoch of the running engine, if any.
    pub fn live_epoch(&self) -> Option<u64> {
        match self.inner.live_epoch.load(Ordering::SeqCst) {
            0 => None,
            epoch => Some(epoch),
        }
    }

    pub fn is_running(&self) -> bool {
        self.live_epoch().is_some()
    }

    /// Records that a context was checked out. Called by the pool.
    pub fn mark_busy(&self) {
        self.inner.busy.fetch_add(1, Ordering::SeqCst);
    }

    /// Records that a checked-out context was returned or discarded.
    pub fn mark_idle(&self) {
        let _ = self
            .inner
            .busy
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn launch_count(&self) -> u64 {
        self.inner.launches.load(Ordering::SeqCst)
    }
}

fn validate_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(SnapError::Config(
            "inactivity timeout must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
