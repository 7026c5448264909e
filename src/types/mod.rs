//! Core types produced by a capture.
//!
//! - [`network`] - Intercepted requests, responses and their pairing
//! - [`summary`] - Extracted links and the aggregate page summary

pub mod network;
pub mod summary;

pub use network::{CapturedNetworkActivity, CapturedRequest, CapturedResponse};
pub use summary::{Link, PageSummary};
