//! Binary file access for sector payloads.
//!
//! The loader never speaks a wire protocol itself; it asks a
//! [`BinaryFileProvider`] for named files relative to a model's base URL.
//! An HTTP implementation is included ([`HttpBinaryFileProvider`]); hosts
//! with bespoke storage substitute their own.

mod http;
mod retry;

pub use http::HttpBinaryFileProvider;
pub use retry::{fetch_with_retry, RetryPolicy};

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Fetch failure, classified for retry.
///
/// Carries rendered messages rather than error sources so results stay
/// cloneable across coalesced-subscriber broadcasts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("http status {status} fetching {url}")]
    Status { status: u16, url: String },
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("timed out after {timeout:?} fetching {url}")]
    Timeout { url: String, timeout: Duration },
}

impl FetchError {
    /// True when a retry may reasonably succeed.
    ///
    /// Server-side and throttling statuses are transient; client errors like
    /// 404 are not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            FetchError::Network { .. } => true,
            FetchError::Timeout { .. } => true,
        }
    }
}

/// Async access to named binary files under a model's base URL.
pub trait BinaryFileProvider: Send + Sync + 'static {
    /// Fetch `file_name` relative to `base_url` and return its full content.
    fn get_binary_file(
        &self,
        base_url: &str,
        file_name: &str,
    ) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

/// Resolve a file name against a base URL, tolerating a trailing slash.
pub(crate) fn file_url(base_url: &str, file_name: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), file_name)
}

/// Fetch behavior knobs.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-attempt timeout.
    pub request_timeout: Duration,
    /// Retry schedule for transient failures.
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::exponential(3),
        }
    }
}
