//! JSON-RPC over HTTP
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::{
    error::TransportError,
    jrpc::{JrpcRequest, JrpcResponse},
    transport::TransportChannel,
};
use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;

/// Backoff for connection-level failures.  HTTP error statuses and
/// malformed bodies are never retried.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Retries after the first attempt.  Zero means a single attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Bound on one request/response exchange, connection included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A `TransportChannel` posting each request to a single JSON-RPC listener.
/// An exchange that exceeds `request_timeout` counts as a transient failure.
#[derive(Clone, Debug)]
pub struct HttpJrpcChannel {
    client: reqwest::Client,
    uri: String,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl HttpJrpcChannel {
    pub fn new<U: Into<String>>(
        uri: U,
        retry: RetryConfig,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| TransportError::Unavailable(format!("HTTP client: {}", err)))?;
        Ok(HttpJrpcChannel {
            client,
            uri: uri.into(),
            retry,
            request_timeout,
        })
    }

    #[inline]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn post_once(&self, request: &JrpcRequest) -> Result<JrpcResponse, reqwest::Error> {
        self.client
            .post(&self.uri)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json::<JrpcResponse>()
            .await
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

#[async_trait]
impl TransportChannel for HttpJrpcChannel {
    async fn send(&self, request: &JrpcRequest) -> Result<JrpcResponse, TransportError> {
        let mut attempt = 0;
        loop {
            debug!("HttpJrpcChannel::send {:?} to {} (attempt {})", request.method, self.uri, attempt + 1);
            match self.post_once(request).await {
                Ok(response) => return Ok(response),
                Err(err) if is_transient(&err) && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        "HttpJrpcChannel: {} unreachable or silent ({}), retrying in {:?}",
                        self.uri, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if let Some(status) = err.status() {
                        return Err(TransportError::HttpStatus(status.as_u16()));
                    }
                    if err.is_decode() {
                        return Err(TransportError::MalformedResponse(err.to_string()));
                    }
                    return Err(TransportError::Unavailable(format!("{}: {}", self.uri, err)));
                }
            }
        }
    }
}
