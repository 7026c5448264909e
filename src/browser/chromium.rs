//! Chromium implementation of the engine traits, driven over the DevTools
//! protocol with `chromiumoxide`.
//!
//! Each pooled context is a CDP browser context. Pages route every request
//! through `Fetch` interception (continued unmodified) and report responses
//! from the `Network` domain; both streams feed the page's [`NetworkRecorder`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent, EventResponseReceived, GetRequestPostDataParams,
    GetResponseBodyParams, Headers, PostDataEntry, RequestId,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::handler::viewport::Viewport as ChromeViewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::engine::{Engine, EngineLauncher, PageSession, RenderContext};
use super::recorder::{method_carries_body, NetworkRecorder, RequestEvent, ResponseEvent};
use crate::{Result, SnapError, Viewport};

/// Default timeout for a single DevTools request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed for the browser process to come up.
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Options for launching Chromium.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Explicit browser binary; auto-detected when `None`.
    pub chrome_executable: Option<PathBuf>,
    pub viewport: Viewport,
    pub headless: bool,
    pub request_timeout: Duration,
    pub launch_timeout: Duration,
    /// Pass `--no-sandbox`, needed when running as root in containers.
    pub no_sandbox: bool,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            viewport: Viewport::default(),
            headless: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            no_sandbox: true,
        }
    }
}

impl BrowserOptions {
    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.viewport.width, self.viewport.height)
            .viewport(ChromeViewport {
                width: self.viewport.width,
                height: self.viewport.height,
                ..ChromeViewport::default()
            })
            .request_timeout(self.request_timeout)
            .launch_timeout(self.launch_timeout)
            .arg("--disable-dev-shm-usage")
            .arg("--disable-background-networking")
            .arg("--disable-extensions")
            .arg("--hide-scrollbars");

        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        if !self.headless {
            builder = builder.with_head();
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }

        builder.build().map_err(SnapError::Launch)
    }
}

/// Launches Chromium processes.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    options: BrowserOptions,
}

impl ChromiumLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BrowserOptions {
        &self.options
    }
}

#[async_trait]
impl EngineLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>> {
        let config = self.options.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| SnapError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    trace!(error = %err, "DevTools handler event error");
                }
            }
            debug!("DevTools handler finished");
        });

        Ok(Arc::new(ChromiumEngine {
            browser: Arc::new(RwLock::new(browser)),
            handler_task,
        }))
    }
}

/// A running Chromium process.
pub struct ChromiumEngine {
    browser: Arc<RwLock<Browser>>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl Engine for ChromiumEngine {
    async fn new_context(&self) -> Result<Arc<dyn RenderContext>> {
        let response = self
            .browser
            .read()
            .await
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(SnapError::engine)?;
        let id = response.result.browser_context_id.clone();
        debug!(context = ?id, "Created browser context");

        Ok(Arc::new(ChromiumContext {
            browser: self.browser.clone(),
            id,
        }))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.write().await;
        let closed = browser.close().await.map_err(SnapError::engine);
        if let Err(err) = browser.wait().await {
            debug!(error = %err, "Waiting for browser process exit failed");
        }
        self.handler_task.abort();
        closed.map(|_| ())
    }
}

impl Drop for ChromiumEngine {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// One CDP browser context.
pub struct ChromiumContext {
    browser: Arc<RwLock<Browser>>,
    id: BrowserContextId,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn new_page(&self) -> Result<Box<dyn PageSession>> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.id.clone())
            .build()
            .map_err(SnapError::engine)?;
        let page = self
            .browser
            .read()
            .await
            .new_page(params)
            .await
            .map_err(SnapError::engine)?;

        Ok(Box::new(ChromiumPage {
            page,
            listeners: Vec::new(),
            closed: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.browser
            .read()
            .await
            .execute(DisposeBrowserContextParams::new(self.id.clone()))
            .await
            .map_err(SnapError::engine)?;
        debug!(context = ?self.id, "Disposed browser context");
        Ok(())
    }
}

/// A tab plus the tasks forwarding its network events.
pub struct ChromiumPage {
    page: Page,
    listeners: Vec<JoinHandle<()>>,
    closed: bool,
}

fn header_pairs(headers: &Headers) -> Vec<(String, String)> {
    headers
        .inner()
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(name, value)| {
                    let value = value
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| value.to_string());
                    (name.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Joins the base64 chunks Chromium reports for a request body.
fn post_data_from_entries(entries: &[PostDataEntry]) -> Option<String> {
    let mut bytes = Vec::new();
    for entry in entries {
        let Some(chunk) = &entry.bytes else { continue };
        let encoded = serde_json::to_value(chunk).ok()?;
        let decoded = BASE64_STANDARD.decode(encoded.as_str()?.as_bytes()).ok()?;
        bytes.extend_from_slice(&decoded);
    }
    if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Body of a paused request. Large bodies are not inlined in the event and
/// are fetched from the network domain instead.
async fn request_body(page: &Page, event: &EventRequestPaused) -> Option<String> {
    let request = &event.request;
    if let Some(body) = request
        .post_data_entries
        .as_deref()
        .and_then(post_data_from_entries)
    {
        return Some(body);
    }
    if request.has_post_data != Some(true) {
        return None;
    }
    let network_id = event.network_id.clone()?;
    match page.execute(GetRequestPostDataParams::new(network_id)).await {
        Ok(response) => Some(response.result.post_data.clone()),
        Err(err) => {
            debug!(url = %request.url, error = %err, "Request body unavailable");
            None
        }
    }
}

async fn read_body(page: Page, request_id: RequestId) -> Result<String> {
    let response = page
        .execute(GetResponseBodyParams::new(request_id))
        .await
        .map_err(SnapError::engine)?;
    let body = &response.result;
    if body.base64_encoded {
        let bytes = BASE64_STANDARD
            .decode(body.body.as_bytes())
            .map_err(SnapError::engine)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        Ok(body.body.clone())
    }
}

impl ChromiumPage {
    async fn spawn_listeners(&mut self, recorder: NetworkRecorder) -> Result<()> {
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(SnapError::engine)?;
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(SnapError::engine)?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(SnapError::engine)?;
        let mut failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(SnapError::engine)?;
        let mut sent = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(SnapError::engine)?;

        // Requests: record, then let them through unchanged.
        let page = self.page.clone();
        let rec = recorder.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request = &event.request;
                let mut captured = RequestEvent::new(
                    request.url.as_str(),
                    request.method.as_str(),
                    header_pairs(&request.headers),
                );
                if method_carries_body(&request.method) {
                    if let Some(body) = request_body(&page, &event).await {
                        captured = captured.with_post_data(body);
                    }
                }
                rec.record_request(captured);

                if let Err(err) = page
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                {
                    debug!(url = %request.url, error = %err, "Failed to continue request");
                }
            }
        }));

        // Network request id to URL, so failed loads can be matched up.
        let urls: Arc<Mutex<HashMap<RequestId, String>>> = Arc::default();

        // A redirect answers the previous hop; it never gets a ResponseReceived.
        let known = urls.clone();
        let rec = recorder.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = sent.next().await {
                if let Some(redirect) = &event.redirect_response {
                    let status = u16::try_from(redirect.status).unwrap_or_default();
                    let hop = ResponseEvent::new(
                        redirect.url.as_str(),
                        status,
                        header_pairs(&redirect.headers),
                    );
                    rec.record_response(hop, || async { Ok(String::new()) }).await;
                }
                known
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(event.request_id.clone(), event.request.url.clone());
            }
        }));

        // Responses: headers arrive first, the body only once loading finished.
        let awaiting_body: Arc<Mutex<HashMap<RequestId, ResponseEvent>>> = Arc::default();

        let stash = awaiting_body.clone();
        let rec = recorder.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let response = &event.response;
                let status = u16::try_from(response.status).unwrap_or_default();
                let event_headers = header_pairs(&response.headers);
                let captured = ResponseEvent::new(response.url.as_str(), status, event_headers);
                rec.touch();
                stash
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(event.request_id.clone(), captured);
            }
        }));

        let page = self.page.clone();
        let stash = awaiting_body.clone();
        let known = urls.clone();
        let rec = recorder.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = finished.next().await {
                known
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(&event.request_id);
                let captured = stash
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(&event.request_id);
                let Some(captured) = captured else { continue };
                let page = page.clone();
                let request_id = event.request_id.clone();
                rec.record_response(captured, move || read_body(page, request_id))
                    .await;
            }
        }));

        let stash = awaiting_body;
        let known = urls;
        let rec = recorder;
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = failed.next().await {
                stash
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(&event.request_id);
                let url = known
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(&event.request_id);
                trace!(error = %event.error_text, "Request failed to load");
                match url {
                    Some(url) => {
                        rec.forget_request(&url);
                    }
                    None => rec.touch(),
                }
            }
        }));

        Ok(())
    }

    fn stop_listeners(&mut self) {
        for task in self.listeners.drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl PageSession for ChromiumPage {
    async fn install_recorder(&mut self, recorder: NetworkRecorder) -> Result<()> {
        self.stop_listeners();
        self.spawn_listeners(recorder).await?;

        self.page
            .execute(NetworkEnableParams::default())
            .await
            .map_err(SnapError::engine)?;
        let pattern = RequestPattern::builder()
            .url_pattern("*")
            .request_stage(RequestStage::Request)
            .build();
        self.page
            .execute(FetchEnableParams::builder().pattern(pattern).build())
            .await
            .map_err(SnapError::engine)?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|err| SnapError::navigation(url, err))?;
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.map_err(SnapError::engine)
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        self.page.screenshot(params).await.map_err(SnapError::engine)
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(script).await.map_err(SnapError::engine)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn close(&mut self) -> Result<()> {
        self.stop_listeners();
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.page
            .clone()
            .close()
            .await
            .map_err(|err| {
                warn!(error = %err, "Failed to close page");
                SnapError::engine(err)
            })
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.stop_listeners();
    }
}
