//! Network activity recording for a single navigation.
//!
//! The recorder is fed by the engine backend: every intercepted request is
//! stored in a pending table keyed by URL, and every response that finds a
//! pending entry is paired with it into a [`CapturedNetworkActivity`].
//! Responses without a pending request are dropped.
//!
//! Keying by URL means two concurrent requests for the same URL share one
//! pending slot; the later request overwrites the earlier one and the first
//! response to arrive claims it.
//!
//! A request counts as in flight from [`NetworkRecorder::record_request`]
//! until its activity is stored (or it is forgotten after a failed load).
//! The network is idle once nothing has been in flight for a quiet window.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::types::network::normalize_headers;
use crate::types::{CapturedNetworkActivity, CapturedRequest, CapturedResponse};
use crate::Result;

/// Quiet window used to decide that the network has gone idle.
pub const DEFAULT_NETWORK_QUIET_WINDOW: Duration = Duration::from_millis(500);

const BODY_METHODS: &[&str] = &["POST", "PUT", "PATCH"];

/// An outgoing request as reported by the engine.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub post_data: Option<String>,
}

impl RequestEvent {
    pub fn new<I, K, V>(url: impl Into<String>, method: impl Into<String>, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            url: url.into(),
            method: method.into(),
            headers: normalize_headers(headers),
            post_data: None,
        }
    }

    pub fn with_post_data(mut self, data: impl Into<String>) -> Self {
        self.post_data = Some(data.into());
        self
    }
}

/// A response header block as reported by the engine. The body is read lazily.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    /// URL of the request this response answers.
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

impl ResponseEvent {
    pub fn new<I, K, V>(url: impl Into<String>, status: u16, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            url: url.into(),
            status,
            headers: normalize_headers(headers),
        }
    }
}

/// Whether requests with this method may carry a body worth capturing.
pub fn method_carries_body(method: &str) -> bool {
    BODY_METHODS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(method.trim()))
}

/// Whether a response body with this content type is captured as text.
pub fn is_textual_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence.starts_with("text/") || essence == "application/json" || essence == "application/xml"
}

#[derive(Debug)]
struct RecorderState {
    navigation: u64,
    pending: HashMap<String, CapturedRequest>,
    /// Responses whose body is still being read.
    reading: usize,
    activity: Vec<CapturedNetworkActivity>,
    last_event: Instant,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<RecorderState>,
    changed: Notify,
}

/// Correlates requests with responses for one page. Cheap to clone; clones
/// share state so backend event tasks can each hold one.
#[derive(Debug, Clone)]
pub struct NetworkRecorder {
    shared: Arc<Shared>,
}

impl Default for NetworkRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkRecorder {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RecorderState {
                    navigation: 0,
                    pending: HashMap::new(),
                    reading: 0,
                    activity: Vec::new(),
                    last_event: Instant::now(),
                }),
                changed: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        // A panic while holding the lock cannot leave the tables half-updated.
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify_changed(&self) {
        self.shared.changed.notify_waiters();
    }

    /// Drops everything recorded so far and starts a fresh interception window.
    pub fn begin_navigation(&self) {
        {
            let mut state = self.lock();
            state.navigation += 1;
            state.pending = HashMap::new();
            state.reading = 0;
            state.activity.clear();
            state.last_event = Instant::now();
            debug!(navigation = state.navigation, "network recorder reset");
        }
        self.notify_changed();
    }

    pub fn record_request(&self, event: RequestEvent) {
        let body = if method_carries_body(&event.method) {
            event.post_data.filter(|data| !data.is_empty())
        } else {
            None
        };
        let request = CapturedRequest {
            url: event.url.clone(),
            method: event.method.to_ascii_uppercase(),
            headers: event.headers,
            body,
        };

        {
            let mut state = self.lock();
            state.last_event = Instant::now();
            if state.pending.insert(event.url, request).is_some() {
                trace!("pending request replaced by a newer request for the same URL");
            }
        }
        self.notify_changed();
    }

    /// Drops the pending request for `url` after its load failed, so it no
    /// longer holds up network idle. Returns whether one was pending.
    pub fn forget_request(&self, url: &str) -> bool {
        let removed = {
            let mut state = self.lock();
            state.last_event = Instant::now();
            state.pending.remove(url).is_some()
        };
        self.notify_changed();
        removed
    }

    /// Pairs a response with its pending request.
    ///
    /// `read_body` is only awaited for textual content types. A failed read is
    /// recorded as a placeholder string rather than surfaced as an error.
    /// Returns `true` if an activity was emitted.
    pub async fn record_response<F, Fut>(&self, event: ResponseEvent, read_body: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let (navigation, request) = {
            let mut state = self.lock();
            state.last_event = Instant::now();
            match state.pending.remove(&event.url) {
                Some(request) => {
                    state.reading += 1;
                    (state.navigation, request)
                }
                None => {
                    trace!(url = %event.url, "response without a pending request dropped");
                    return false;
                }
            }
        };
        let _reading = BodyRead {
            recorder: self,
            navigation,
        };

        let textual = event
            .headers
            .get("content-type")
            .is_some_and(|ct| is_textual_content_type(ct));
        let body = if textual {
            match read_body().await {
                Ok(text) => Some(text),
                Err(err) => {
                    debug!(url = %event.url, error = %err, "response body unavailable");
                    Some(format!("<body unavailable: {err}>"))
                }
            }
        } else {
            None
        };

        let activity = CapturedNetworkActivity {
            request,
            response: CapturedResponse {
                status: event.status,
                headers: event.headers,
                body,
            },
        };

        let mut state = self.lock();
        state.last_event = Instant::now();
        if state.navigation != navigation {
            trace!("activity from a previous navigation discarded");
            return false;
        }
        state.activity.push(activity);
        true
    }

    /// Marks network activity that is not a tracked request or response
    /// (for example a failed load) so idle detection sees it.
    pub fn touch(&self) {
        self.lock().last_event = Instant::now();
        self.notify_changed();
    }

    /// Snapshot of the activity recorded in the current window.
    pub fn activity(&self) -> Vec<CapturedNetworkActivity> {
        self.lock().activity.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Requests still waiting for a response plus bodies still being read.
    pub fn in_flight(&self) -> usize {
        let state = self.lock();
        state.pending.len() + state.reading
    }

    /// Waits until nothing has been in flight for `quiet`, or until `timeout`.
    /// Returns whether the network went idle.
    pub async fn wait_for_network_idle(&self, quiet: Duration, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            // Registered before reading state so a change in between wakes us.
            let changed = self.shared.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let (in_flight, idle_at) = {
                let state = self.lock();
                (state.pending.len() + state.reading, state.last_event + quiet)
            };
            let now = Instant::now();
            if in_flight == 0 && now >= idle_at {
                return true;
            }
            if now >= deadline {
                trace!(in_flight, "network still busy at deadline");
                return false;
            }

            let wake = if in_flight == 0 {
                idle_at.min(deadline)
            } else {
                deadline
            };
            tokio::select! {
                _ = tokio::time::sleep_until(wake) => {}
                _ = &mut changed => {}
            }
        }
    }
}

/// Keeps a response counted as in flight while its body is read. Dropped
/// after the activity is stored, or when the read is abandoned.
struct BodyRead<'a> {
    recorder: &'a NetworkRecorder,
    navigation: u64,
}

impl Drop for BodyRead<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.recorder.lock();
            if state.navigation == self.navigation {
                state.reading = state.reading.saturating_sub(1);
                state.last_event = Instant::now();
            }
        }
        self.recorder.notify_changed();
    }
}
