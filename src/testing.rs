//! In-process engine used by the unit tests. Pages are scripted per URL and
//! replay their network traffic into the installed recorder.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::browser::engine::{Engine, EngineLauncher, PageSession, RenderContext};
use crate::browser::recorder::{NetworkRecorder, RequestEvent, ResponseEvent};
use crate::{Result, SnapError};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    launches: AtomicUsize,
    engine_closes: AtomicUsize,
    contexts_created: AtomicUsize,
    contexts_closed: AtomicUsize,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
}

impl Counters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
    pub fn engine_closes(&self) -> usize {
        self.engine_closes.load(Ordering::SeqCst)
    }
    pub fn contexts_created(&self) -> usize {
        self.contexts_created.load(Ordering::SeqCst)
    }
    pub fn contexts_closed(&self) -> usize {
        self.contexts_closed.load(Ordering::SeqCst)
    }
    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst)
    }
    pub fn pages_closed(&self) -> usize {
        self.pages_closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ScriptedResource {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub content_type: String,
    pub body: String,
    /// Delay after the load event before the request is issued.
    pub delay: Duration,
    /// Time between the request and its response.
    pub latency: Duration,
}

impl ScriptedResource {
    pub fn get(url: &str, content_type: &str, body: &str) -> Self {
        Self {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            content_type: content_type.to_string(),
            body: body.to_string(),
            delay: Duration::ZERO,
            latency: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn responding_after(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn is_immediate(&self) -> bool {
        self.delay.is_zero() && self.latency.is_zero()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedPage {
    pub html: String,
    pub resources: Vec<ScriptedResource>,
    pub load_delay: Duration,
    /// Results returned by `evaluate`, keyed by script source.
    pub scripts: HashMap<String, serde_json::Value>,
}

impl ScriptedPage {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            ..Default::default()
        }
    }

    pub fn with_resource(mut self, resource: ScriptedResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_script(mut self, script: &str, result: serde_json::Value) -> Self {
        self.scripts.insert(script.to_string(), result);
        self
    }
}

#[derive(Debug, Default)]
struct Script {
    fail_next_launch: Option<String>,
    launch_delay: Duration,
    fail_context_creation: Option<String>,
    fail_context_close: bool,
    fail_screenshot: Option<String>,
    hang_page_close: bool,
    page_open_delay: Duration,
    pages: HashMap<String, ScriptedPage>,
}

/// Launcher for scripted engines. Clones share counters and script.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedLauncher {
    counters: Arc<Counters>,
    script: Arc<Mutex<Script>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    pub fn set_launch_delay(&self, delay: Duration) {
        self.script().launch_delay = delay;
    }

    pub fn fail_next_launch(&self, message: &str) {
        self.script().fail_next_launch = Some(message.to_string());
    }

    pub fn fail_context_creation(&self, message: Option<&str>) {
        self.script().fail_context_creation = message.map(str::to_string);
    }

    pub fn fail_context_close(&self, fail: bool) {
        self.script().fail_context_close = fail;
    }

    pub fn fail_screenshot(&self, message: Option<&str>) {
        self.script().fail_screenshot = message.map(str::to_string);
    }

    /// Makes `PageSession::close` never complete.
    pub fn hang_page_close(&self, hang: bool) {
        self.script().hang_page_close = hang;
    }

    pub fn set_page_open_delay(&self, delay: Duration) {
        self.script().page_open_delay = delay;
    }

    pub fn serve(&self, url: &str, page: ScriptedPage) {
        self.script().pages.insert(url.to_string(), page);
    }
}

#[async_trait]
impl EngineLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>> {
        let (delay, failure) = {
            let mut script = self.script();
            (script.launch_delay, script.fail_next_launch.take())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = failure {
            return Err(SnapError::Launch(message));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedEngine {
            counters: self.counters.clone(),
            script: self.script.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct ScriptedEngine {
    counters: Arc<Counters>,
    script: Arc<Mutex<Script>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn new_context(&self) -> Result<Arc<dyn RenderContext>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SnapError::engine("engine is closed"));
        }
        if let Some(message) = self.script.lock().unwrap().fail_context_creation.clone() {
            return Err(SnapError::engine(message));
        }
        self.counters.contexts_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedContext {
            counters: self.counters.clone(),
            script: self.script.clone(),
            engine_closed: self.closed.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.engine_closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct ScriptedContext {
    counters: Arc<Counters>,
    script: Arc<Mutex<Script>>,
    engine_closed: Arc<AtomicBool>,
    closed: AtomicBool,
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn new_page(&self) -> Result<Box<dyn PageSession>> {
        if self.closed.load(Ordering::SeqCst) || self.engine_closed.load(Ordering::SeqCst) {
            return Err(SnapError::engine("context is closed"));
        }
        let delay = self.script.lock().unwrap().page_open_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            counters: self.counters.clone(),
            script: self.script.clone(),
            recorder: None,
            current: None,
            closed: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        if self.script.lock().unwrap().fail_context_close {
            return Err(SnapError::engine("context close failed"));
        }
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.contexts_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct ScriptedSession {
    counters: Arc<Counters>,
    script: Arc<Mutex<Script>>,
    recorder: Option<NetworkRecorder>,
    current: Option<ScriptedPage>,
    closed: bool,
}

async fn replay(recorder: &NetworkRecorder, resource: &ScriptedResource) {
    recorder.record_request(RequestEvent::new(
        resource.url.as_str(),
        resource.method.as_str(),
        [("Accept", "*/*")],
    ));
    if !resource.latency.is_zero() {
        tokio::time::sleep(resource.latency).await;
    }
    let body = resource.body.clone();
    recorder
        .record_response(
            ResponseEvent::new(
                resource.url.as_str(),
                resource.status,
                [("Content-Type", resource.content_type.as_str())],
            ),
            move || async move { Ok(body) },
        )
        .await;
}

/// Encodes a blank PNG of the given size.
pub(crate) fn blank_png(width: u32, height: u32) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageOutputFormat::Png)
        .unwrap();
    bytes.into_inner()
}

#[async_trait]
impl PageSession for ScriptedSession {
    async fn install_recorder(&mut self, recorder: NetworkRecorder) -> Result<()> {
        self.recorder = Some(recorder);
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        let page = self.script.lock().unwrap().pages.get(url).cloned();
        let Some(page) = page else {
            return Err(SnapError::navigation(url, "net::ERR_NAME_NOT_RESOLVED"));
        };
        if !page.load_delay.is_zero() {
            tokio::time::sleep(page.load_delay).await;
        }

        if let Some(recorder) = &self.recorder {
            replay(recorder, &ScriptedResource::get(url, "text/html", &page.html)).await;
            for resource in page.resources.iter().filter(|r| r.is_immediate()) {
                replay(recorder, resource).await;
            }
            for resource in page.resources.iter().filter(|r| !r.is_immediate()) {
                let recorder = recorder.clone();
                let resource = resource.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(resource.delay).await;
                    replay(&recorder, &resource).await;
                });
            }
        }
        self.current = Some(page);
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        Ok(self
            .current
            .as_ref()
            .map(|page| page.html.clone())
            .unwrap_or_else(|| "<html><head></head><body></body></html>".to_string()))
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        if let Some(message) = self.script.lock().unwrap().fail_screenshot.clone() {
            return Err(SnapError::engine(message));
        }
        Ok(if full_page { blank_png(4, 6) } else { blank_png(4, 3) })
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let Some(page) = &self.current else {
            return Err(SnapError::engine("no document loaded"));
        };
        page.scripts
            .get(script)
            .cloned()
            .ok_or_else(|| SnapError::engine(format!("Uncaught ReferenceError: {script}")))
    }

    async fn close(&mut self) -> Result<()> {
        if self.script.lock().unwrap().hang_page_close {
            std::future::pending::<()>().await;
        }
        if !self.closed {
            self.closed = true;
            self.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
