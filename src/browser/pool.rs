//! Bounded pool of reusable rendering contexts.
//!
//! Idle contexts are handed out most-recently-released first (LIFO), so the
//! context whose engine-side caches are warmest is reused. A context lives
//! either in the idle stack or in the in-use map, never both. All pool state
//! sits behind one synchronous mutex that is never held across an `.await`;
//! engine calls (create, close) always happen outside it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::RenderContext;
use super::manager::EngineManager;
use crate::{Result, SnapError};

pub const DEFAULT_MAX_POOL_SIZE: usize = 4;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
/// Lower bound for the derived eviction period.
pub const MIN_EVICTION_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_pool_size: usize,
    pub idle_timeout: Duration,
    /// Defaults to `max(idle_timeout / 2, 1s)` when unset.
    pub eviction_interval: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            eviction_interval: None,
        }
    }
}

impl PoolOptions {
    pub fn effective_eviction_interval(&self) -> Duration {
        self.eviction_interval
            .unwrap_or_else(|| (self.idle_timeout / 2).max(MIN_EVICTION_INTERVAL))
    }

    fn validate(&self) -> Result<()> {
        if self.max_pool_size == 0 {
            return Err(SnapError::Config(
                "max_pool_size must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(SnapError::Config(
                "idle_timeout must be greater than zero".to_string(),
            ));
        }
        if self.eviction_interval.is_some_and(|d| d.is_zero()) {
            return Err(SnapError::Config(
                "eviction_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pool-assigned identity of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A rendering context plus the bookkeeping the pool needs.
#[derive(Clone)]
pub struct PooledContext {
    id: ContextId,
    context: Arc<dyn RenderContext>,
    epoch: u64,
    created_at: Instant,
    last_used_at: Instant,
}

impl fmt::Debug for PooledContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledContext")
            .field("id", &self.id)
            .field("epoch", &self.epoch)
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .finish()
    }
}

impl PooledContext {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn context(&self) -> &Arc<dyn RenderContext> {
        &self.context
    }

    /// Launch epoch of the engine that created this context.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
    pub pending: usize,
    pub max: usize,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<PooledContext>,
    in_use: HashMap<ContextId, PooledContext>,
    pending_creates: usize,
    next_id: u64,
    drained: bool,
}

struct PoolShared {
    manager: EngineManager,
    options: PoolOptions,
    state: Mutex<PoolState>,
    available: Notify,
    eviction_stop: CancellationToken,
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        self.eviction_stop.cancel();
    }
}

enum Step {
    Reuse(PooledContext),
    Create,
    Wait,
}

/// A reserved creation slot. Gives the slot back if creation fails or the
/// acquiring future is dropped before the context is registered.
struct PendingSlot<'a> {
    pool: &'a ContextPool,
    held: bool,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        self.pool.state().pending_creates -= 1;
        self.pool.shared.manager.mark_idle();
        self.pool.shared.available.notify_one();
    }
}

/// Shared handle to the pool. Clones refer to the same pool.
#[derive(Clone)]
pub struct ContextPool {
    shared: Arc<PoolShared>,
}

impl fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextPool")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ContextPool {
    /// Creates the pool and starts its periodic idle eviction.
    pub fn new(manager: EngineManager, options: PoolOptions) -> Result<Self> {
        options.validate()?;
        let pool = Self {
            shared: Arc::new(PoolShared {
                manager,
                options,
                state: Mutex::new(PoolState::default()),
                available: Notify::new(),
                eviction_stop: CancellationToken::new(),
            }),
        };
        pool.start_eviction();
        Ok(pool)
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn options(&self) -> &PoolOptions {
        &self.shared.options
    }

    pub fn manager(&self) -> &EngineManager {
        &self.shared.manager
    }

    fn start_eviction(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Context pool created outside a runtime; idle eviction disabled");
            return;
        };
        let period = self.shared.options.effective_eviction_interval();
        let stop = self.shared.eviction_stop.clone();
        let weak = Arc::downgrade(&self.shared);

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(shared) = weak.upgrade() else { break };
                ContextPool { shared }.run_idle_eviction().await;
            }
            debug!("Idle eviction stopped");
        });
        debug!(?period, "Idle eviction started");
    }

    /// Checks out a context for exclusive use.
    ///
    /// Waits for a release when the pool is at capacity. Returns
    /// [`SnapError::Cancelled`] once `cancel` fires or `deadline` passes; a
    /// call that returned `Cancelled` never hands out a context afterwards.
    pub async fn acquire_context(
        &self,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<PooledContext> {
        let max = self.shared.options.max_pool_size;
        if max == 0 {
            return Err(SnapError::Config(
                "max_pool_size must be at least 1".to_string(),
            ));
        }

        loop {
            if cancel.is_cancelled() || Instant::now() >= deadline {
                return Err(SnapError::Cancelled);
            }

            // Registered before inspecting state so a release in between is not missed.
            let notified = self.shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let step = {
                let mut state = self.state();
                if state.drained {
                    return Err(SnapError::Acquisition(
                        "context pool has been drained".to_string(),
                    ));
                }
                if let Some(ctx) = state.idle.pop() {
                    state.in_use.insert(ctx.id, ctx.clone());
                    self.shared.manager.mark_busy();
                    Step::Reuse(ctx)
                } else if state.in_use.len() + state.pending_creates < max {
                    state.pending_creates += 1;
                    self.shared.manager.mark_busy();
                    Step::Create
                } else {
                    Step::Wait
                }
            };

            match step {
                Step::Reuse(ctx) => {
                    if self.shared.manager.live_epoch() == Some(ctx.epoch) {
                        debug!(id = %ctx.id, "Reusing idle context");
                        self.shared.manager.keep_alive();
                        return Ok(ctx);
                    }
                    self.discard_stale(ctx).await;
                }
                Step::Create => return self.create_context().await,
                Step::Wait => {
                    debug!(max, "Context pool at capacity, waiting for a release");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(SnapError::Cancelled),
                        _ = tokio::time::sleep_until(deadline) => return Err(SnapError::Cancelled),
                        _ = &mut notified => {}
                    }
                }
            }
        }
    }

    async fn discard_stale(&self, ctx: PooledContext) {
        self.state().in_use.remove(&ctx.id);
        self.shared.manager.mark_idle();
        self.shared.available.notify_one();
        debug!(id = %ctx.id, epoch = ctx.epoch, "Discarding context from a previous engine");
        if let Err(err) = ctx.context.close().await {
            debug!(id = %ctx.id, error = %err, "Closing stale context failed");
        }
    }

    async fn create_context(&self) -> Result<PooledContext> {
        let mut slot = PendingSlot {
            pool: self,
            held: true,
        };

        let created = async {
            let handle = self.shared.manager.acquire_engine().await?;
            let context = handle.engine.new_context().await?;
            Ok::<_, SnapError>((context, handle.epoch))
        }
        .await;

        let (context, epoch) = match created {
            Ok(created) => created,
            Err(err) => {
                drop(slot);
                warn!(error = %err, "Context creation failed");
                return Err(err);
            }
        };

        let registered = {
            let mut state = self.state();
            state.pending_creates -= 1;
            slot.held = false;
            if state.drained {
                None
            } else {
                state.next_id += 1;
                let now = Instant::now();
                let pooled = PooledContext {
                    id: ContextId(state.next_id),
                    context: context.clone(),
                    epoch,
                    created_at: now,
                    last_used_at: now,
                };
                state.in_use.insert(pooled.id, pooled.clone());
                Some((pooled, state.in_use.len()))
            }
        };

        let Some((pooled, in_use)) = registered else {
            self.shared.manager.mark_idle();
            if let Err(err) = context.close().await {
                debug!(error = %err, "Closing context created during drain failed");
            }
            return Err(SnapError::Acquisition(
                "context pool has been drained".to_string(),
            ));
        };

        info!(id = %pooled.id, epoch, in_use, "Created rendering context");
        self.shared.manager.keep_alive();
        Ok(pooled)
    }

    /// Like [`acquire_context`](Self::acquire_context) but returns a guard
    /// that releases the context when dropped.
    pub async fn lease(&self, cancel: &CancellationToken, deadline: Instant) -> Result<ContextLease> {
        let context = self.acquire_context(cancel, deadline).await?;
        Ok(ContextLease {
            pool: self.clone(),
            context,
            released: false,
        })
    }

    /// Returns a context to the idle stack. Returns `false` without touching
    /// anything if the context is not currently checked out.
    pub fn release_context(&self, id: ContextId) -> bool {
        let mut state = self.state();
        let Some(mut ctx) = state.in_use.remove(&id) else {
            debug!(%id, "Release of a context that is not in use ignored");
            return false;
        };
        ctx.last_used_at = Instant::now();
        state.idle.push(ctx);
        drop(state);

        self.shared.manager.mark_idle();
        self.shared.available.notify_one();
        self.shared.manager.keep_alive();
        debug!(%id, "Context released");
        true
    }

    /// Drops a checked-out context from the pool without returning it to the
    /// idle stack. The caller is responsible for closing it.
    pub fn forget_context(&self, id: ContextId) -> bool {
        if self.state().in_use.remove(&id).is_none() {
            return false;
        }
        self.shared.manager.mark_idle();
        self.shared.available.notify_one();
        debug!(%id, "Context removed from pool");
        true
    }

    /// Closes idle contexts unused for longer than the idle timeout, and any
    /// left over from an engine that is no longer running. Returns how many
    /// were closed.
    pub async fn run_idle_eviction(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.shared.options.idle_timeout;
        let live = self.shared.manager.live_epoch();

        let evicted: Vec<PooledContext> = {
            let mut state = self.state();
            let (keep, evict) = std::mem::take(&mut state.idle).into_iter().partition(|ctx| {
                now.duration_since(ctx.last_used_at) <= idle_timeout && live == Some(ctx.epoch)
            });
            state.idle = keep;
            evict
        };

        for ctx in &evicted {
            if let Err(err) = ctx.context.close().await {
                warn!(id = %ctx.id, error = %err, "Failed to close evicted context");
            }
        }
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted idle contexts");
        }
        evicted.len()
    }

    /// Stops eviction, closes every context and refuses further acquires.
    /// Close failures do not stop the loop; they are logged and returned.
    pub async fn drain(&self) -> Vec<SnapError> {
        self.shared.eviction_stop.cancel();

        let contexts: Vec<PooledContext> = {
            let mut state = self.state();
            state.drained = true;
            let mut all = std::mem::take(&mut state.idle);
            let in_use = state.in_use.len();
            all.extend(state.in_use.drain().map(|(_, ctx)| ctx));
            for _ in 0..in_use {
                self.shared.manager.mark_idle();
            }
            all
        };
        self.shared.available.notify_waiters();

        let mut errors = Vec::new();
        for ctx in &contexts {
            if let Err(err) = ctx.context.close().await {
                warn!(id = %ctx.id, error = %err, "Failed to close context during drain");
                errors.push(err);
            }
        }
        info!(
            closed = contexts.len() - errors.len(),
            failed = errors.len(),
            "Context pool drained"
        );
        errors
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state();
        PoolStats {
            idle: state.idle.len(),
            in_use: state.in_use.len(),
            pending: state.pending_creates,
            max: self.shared.options.max_pool_size,
        }
    }
}

/// Exclusive use of one pooled context. Released exactly once, either by
/// [`ContextLease::release`] or on drop.
pub struct ContextLease {
    pool: ContextPool,
    context: PooledContext,
    released: bool,
}

impl ContextLease {
    pub fn id(&self) -> ContextId {
        self.context.id
    }

    pub fn context(&self) -> &Arc<dyn RenderContext> {
        &self.context.context
    }

    pub fn release(mut self) {
        self.release_once();
    }

    /// Takes a broken context out of rotation and closes it.
    pub async fn discard(mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.pool.forget_context(self.context.id) {
            if let Err(err) = self.context.context.close().await {
                debug!(id = %self.context.id, error = %err, "Closing discarded context failed");
            }
        }
    }

    /// Takes the context out of rotation without closing it.
    pub fn forget(mut self) {
        if !self.released {
            self.released = true;
            self.pool.forget_context(self.context.id);
        }
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.pool.release_context(self.context.id);
        }
    }
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        self.release_once();
    }
}
