use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum SnapError {
    #[error("Engine launch failed: {0}")]
    Launch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Context acquisition failed: {0}")]
    Acquisition(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Capture of {url} failed: {message}")]
    Capture { url: String, message: String },

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SnapError {
    pub fn navigation(url: impl Into<String>, message: impl ToString) -> Self {
        SnapError::Navigation {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn capture(url: impl Into<String>, message: impl ToString) -> Self {
        SnapError::Capture {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn engine(message: impl ToString) -> Self {
        SnapError::Engine(message.to_string())
    }

    /// Whether the same request may succeed if issued again.
    pub fn is_retryable(&self) -> bool {
        match self {
            SnapError::Launch(_) | SnapError::Acquisition(_) => true,
            SnapError::Navigation { message, .. } => {
                message.to_ascii_lowercase().contains("timed out")
            }
            _ => false,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            SnapError::Launch(msg) => {
                let lower = msg.to_ascii_lowercase();
                let remediation = if lower.contains("executable") || lower.contains("not found")
                {
                    "Install Chrome/Chromium or set engine.chrome_executable in the config file."
                } else {
                    "Check that Chromium can start headless here (sandbox, /dev/shm); the next request retries the launch."
                };
                ErrorPayload::new(ErrorCategory::Engine, msg.to_string(), remediation)
            }
            SnapError::Config(msg) => ErrorPayload::new(
                ErrorCategory::Config,
                msg.to_string(),
                "Check the config file (durations like \"30s\", pool size > 0, viewport WIDTHxHEIGHT).",
            ),
            SnapError::Acquisition(msg) => ErrorPayload::new(
                ErrorCategory::Pool,
                msg.to_string(),
                "All rendering contexts are busy; raise pool.max_pool_size or timeouts.acquire.",
            ),
            SnapError::Cancelled => ErrorPayload::new(
                ErrorCategory::Cancelled,
                self.to_string(),
                "The request was cancelled before it completed; retry if still needed.",
            ),
            SnapError::Navigation { url, message } => {
                let remediation = if message.to_ascii_lowercase().contains("timed out") {
                    "Try increasing timeouts.navigation/timeouts.network_idle or ensure the page finishes loading."
                } else {
                    "Verify the URL is reachable from this machine (DNS, proxy, TLS)."
                };
                ErrorPayload::new(
                    ErrorCategory::Navigation,
                    format!("Navigation to {} failed: {}", url, message),
                    remediation,
                )
            }
            SnapError::Capture { url, message } => ErrorPayload::new(
                ErrorCategory::Capture,
                format!("Capture of {} failed: {}", url, message),
                "The page loaded but could not be read; very tall pages may exceed screenshot limits.",
            ),
            SnapError::Engine(msg) => ErrorPayload::new(
                ErrorCategory::Engine,
                msg.to_string(),
                "Re-run with --verbose; the engine is relaunched automatically on the next request.",
            ),
            SnapError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check file paths/permissions.",
            ),
            SnapError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Verify URL/format (e.g., https://example.com).",
            ),
            SnapError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Unknown,
                e.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Engine,
    Pool,
    Navigation,
    Capture,
    Cancelled,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_payload_mentions_executable_when_missing() {
        let err = SnapError::Launch("Could not auto detect a chrome executable".to_string());
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Engine);
        let remediation = payload.remediation.unwrap_or_default();
        assert!(
            remediation.contains("chrome_executable"),
            "expected executable hint, got: {remediation}"
        );
    }

    #[test]
    fn navigation_payload_includes_timeout_hint() {
        let err = SnapError::navigation("https://example.com", "timed out after 30s");
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Navigation);
        assert!(payload.message.contains("https://example.com"));
        let remediation = payload.remediation.unwrap_or_default();
        assert!(
            remediation.contains("timeouts.navigation"),
            "expected timeout remediation, got: {remediation}"
        );
    }

    #[test]
    fn navigation_payload_defaults_to_reachability_hint() {
        let err = SnapError::navigation("https://nope.invalid", "net::ERR_NAME_NOT_RESOLVED");
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(remediation.contains("reachable"));
    }

    #[test]
    fn acquisition_payload_points_at_pool_size() {
        let err = SnapError::Acquisition("no context within 5s".to_string());
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Pool);
        assert!(payload
            .remediation
            .unwrap_or_default()
            .contains("max_pool_size"));
    }

    #[test]
    fn retryable_classification() {
        assert!(SnapError::Launch("boom".into()).is_retryable());
        assert!(SnapError::Acquisition("busy".into()).is_retryable());
        assert!(SnapError::navigation("u", "timed out after 1s").is_retryable());
        assert!(!SnapError::navigation("u", "net::ERR_ABORTED").is_retryable());
        assert!(!SnapError::Config("bad".into()).is_retryable());
        assert!(!SnapError::Cancelled.is_retryable());
    }

    #[test]
    fn payload_serializes_camel_case() {
        let payload = SnapError::Cancelled.to_payload();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["category"], "cancelled");
        assert!(json["remediation"].is_string());
    }
}
