//! Bounded HTTP fetcher
//!
//! Every outbound request (catalog JSON, cover images, page images) goes
//! through one [`BoundedFetcher`]. A process-wide semaphore caps the number of
//! requests in flight; waiting for a permit suspends only the calling task.

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Longest response body kept on an [`Error::HttpStatus`]
const MAX_ERROR_BODY: usize = 512;

/// Per-request options
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// Overrides the configured request timeout
    pub timeout: Option<Duration>,
}

/// A successful (2xx) response
#[derive(Clone, Debug)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lower-cased
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Vec<u8>,
}

/// Snapshot of fetcher activity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Requests currently holding a permit
    pub in_flight: usize,
    /// Highest `in_flight` value observed since creation
    pub peak_in_flight: usize,
    /// Requests started since creation
    pub started: usize,
}

/// HTTP client gated by a fixed-capacity permit pool
///
/// Cloning is cheap; clones share the client, the pool and the counters.
#[derive(Clone)]
pub struct BoundedFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    capacity: usize,
    timeout: Duration,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
}

impl BoundedFetcher {
    /// Create a fetcher from configuration
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to create HTTP client: {}", e),
                key: None,
            })?;

        Ok(Self::with_client(
            client,
            config.max_concurrent_fetches,
            config.request_timeout,
        ))
    }

    /// Create a fetcher around an existing client
    pub fn with_client(client: reqwest::Client, capacity: usize, timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            client,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            timeout,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pool capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current activity counters
    pub fn stats(&self) -> FetchStats {
        FetchStats {
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
            started: self.started.load(Ordering::SeqCst),
        }
    }

    /// Perform a GET request under a fetch permit
    ///
    /// Non-2xx responses are returned as [`Error::HttpStatus`] carrying the
    /// status and body; transport failures as [`Error::Network`].
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse> {
        // The permit is dropped on every exit path, including errors
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Network {
                url: url.to_string(),
                message: "fetch pool closed".into(),
            })?;

        let _guard = InFlightGuard::enter(self);
        debug!(
            url = %url,
            in_flight = self.in_flight.load(Ordering::SeqCst),
            "requesting"
        );

        let result = self.send(url, options).await;

        match &result {
            Ok(response) => debug!(url = %url, status = response.status, bytes = response.body.len(), "requested"),
            Err(e) => debug!(url = %url, error = %e, "request failed"),
        }
        result
    }

    /// Fetch a body as raw bytes
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        Ok(self.fetch(url, &FetchOptions::default()).await?.body)
    }

    /// Fetch a body and decode it as JSON
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get_bytes(url).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse> {
        let network_error = |e: reqwest::Error| Error::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut request = self
            .client
            .get(url)
            .timeout(options.timeout.unwrap_or(self.timeout));
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(network_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(network_error)?.to_vec();

        if !(200..300).contains(&status) {
            let mut text = String::from_utf8_lossy(&body).into_owned();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status,
                body: text,
            });
        }

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

/// Keeps the in-flight counter accurate even if the request future is dropped
struct InFlightGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> InFlightGuard<'a> {
    fn enter(fetcher: &'a BoundedFetcher) -> Self {
        fetcher.started.fetch_add(1, Ordering::SeqCst);
        let now = fetcher.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        fetcher.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self {
            in_flight: &fetcher.in_flight,
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
