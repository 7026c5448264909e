use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ErrorPayload;
use crate::types::{CapturedNetworkActivity, Link, PageSummary};

/// Schema version for output payloads.
pub const PAGESNAP_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SnapOutput {
    Summary(SummaryOutput),
    Markup(MarkupOutput),
    Screenshot(ScreenshotOutput),
    Error(ErrorOutput),
}

/// An encoded screenshot plus what could be read from its header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub bytes: usize,
    /// Base64 of the image bytes.
    pub data: String,
}

impl ImageData {
    pub fn png(bytes: &[u8]) -> Self {
        let (width, height) = match image_dimensions(bytes) {
            Some((w, h)) => (Some(w), Some(h)),
            None => (None, None),
        };
        Self {
            format: "png".to_string(),
            width,
            height,
            bytes: bytes.len(),
            data: BASE64_STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(self.data.as_bytes())
    }
}

/// Reads width and height from an encoded image without decoding pixels.
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    match reader.into_dimensions() {
        Ok(dimensions) => Some(dimensions),
        Err(err) => {
            debug!(error = %err, "Could not read screenshot dimensions");
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryOutput {
    pub version: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub html: String,
    pub links: Vec<Link>,
    pub network_activity: Vec<CapturedNetworkActivity>,
    pub screenshot: ImageData,
}

impl From<PageSummary> for SummaryOutput {
    fn from(summary: PageSummary) -> Self {
        Self {
            version: PAGESNAP_OUTPUT_VERSION.to_string(),
            screenshot: ImageData::png(&summary.screenshot),
            url: summary.url,
            timestamp: summary.timestamp,
            html: summary.html,
            links: summary.links,
            network_activity: summary.network_activity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkupOutput {
    pub version: String,
    pub url: String,
    pub html: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotOutput {
    pub version: String,
    pub url: String,
    pub full_page: bool,
    pub image: ImageData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub error: ErrorPayload,
}
