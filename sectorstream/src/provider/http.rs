//! HTTP implementation of [`BinaryFileProvider`] on a pooled reqwest client.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::{file_url, BinaryFileProvider, FetchError};

/// Connections kept warm per host; sector batches fan out to one host.
const POOL_MAX_IDLE_PER_HOST: usize = 32;
/// Client-level safety-net timeout; per-attempt timeouts live in
/// [`FetchConfig`](super::FetchConfig).
const CLIENT_TIMEOUT_SECS: u64 = 30;

/// Fetches sector files over HTTP(S).
///
/// Holds a pooled [`reqwest::Client`]; clone freely, clones share the pool.
#[derive(Debug, Clone)]
pub struct HttpBinaryFileProvider {
    client: reqwest::Client,
}

impl HttpBinaryFileProvider {
    /// Build a provider with connection pooling tuned for sector batches.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError::Network`] when the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .tcp_nodelay(true)
            .timeout(std::time::Duration::from_secs(CLIENT_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                message: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { client })
    }

    /// Wrap an externally configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl BinaryFileProvider for HttpBinaryFileProvider {
    async fn get_binary_file(&self, base_url: &str, file_name: &str) -> Result<Bytes, FetchError> {
        let url = file_url(base_url, file_name);
        trace!(url = %url, "http get");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "http get rejected");
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let bytes = response.bytes().await.map_err(|e| FetchError::Network {
            url: url.clone(),
            message: e.to_string(),
        })?;

        debug!(url = %url, bytes = bytes.len(), "http get complete");
        Ok(bytes)
    }
}
