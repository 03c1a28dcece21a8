//! Rate-limited, retrying HTTP transport.
//!
//! [`Transport`] wraps a [`reqwest::Client`] and a shared [`RateLimiter`].
//! Every attempt first waits on the limiter, so requests leave the process
//! totally ordered and at least one interval apart. Failed attempts are
//! retried uniformly:
//!
//! - a response with status `< 500` is returned as-is (including 4xx);
//! - a status `>= 500` or a dispatch error triggers another attempt, after
//!   `retry_delay`, until `max_retries` extra attempts have been spent;
//! - exhaustion yields [`ClientError::RetriesExceeded`] wrapping the error
//!   from the final attempt.
//!
//! There is no backoff, jitter, or idempotency classification.
//!
//! # Request bodies
//!
//! A request body is read into memory once, before the first attempt, and
//! every attempt sends a fresh body over those bytes. Requests without a body
//! are rebuilt from method, URL, and headers alone.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::BodyExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Body, Client, Method, Request, Response, Url, Version};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::rate_limit::RateLimiter;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Paced, retrying wrapper around a [`reqwest::Client`].
///
/// Cheap to clone: the HTTP client pools connections internally and the
/// limiter is shared through an [`Arc`].
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    limiter: Arc<RateLimiter>,
    max_retries: u32,
    retry_delay: Duration,
}

/// The parts of a request needed to rebuild it for each attempt.
struct Template {
    method: Method,
    url: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
    version: Version,
    body: Option<Bytes>,
}

impl Template {
    fn build(&self) -> Request {
        let mut request = Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        *request.timeout_mut() = self.timeout;
        *request.version_mut() = self.version;
        if let Some(body) = &self.body {
            *request.body_mut() = Some(Body::from(body.clone()));
        }
        request
    }
}

impl Transport {
    /// Create a transport.
    ///
    /// # Arguments
    ///
    /// * `client`: pre-configured `reqwest::Client` (its timeout applies per attempt).
    /// * `limiter`: pacing shared with any other transport hitting the same service.
    /// * `max_retries`: extra attempts after the first; `0` means try once.
    /// * `retry_delay`: pause before each retry.
    pub fn new(
        client: Client,
        limiter: Arc<RateLimiter>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            client,
            limiter,
            max_retries,
            retry_delay,
        }
    }

    /// Build a transport, HTTP client, and limiter from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(
            config.build_http_client()?,
            Arc::new(RateLimiter::new(config.rate_limit_interval)),
            config.max_retries,
            config.retry_delay,
        ))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// `GET url`.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let request = self.client.get(url).build()?;
        self.execute(request).await
    }

    /// `POST url` with a raw body and an explicit content type.
    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<Response> {
        let body: Bytes = body.into();
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .build()?;
        self.execute(request).await
    }

    /// `POST url` with an `application/x-www-form-urlencoded` body.
    pub async fn post_form<T: Serialize + ?Sized>(&self, url: &str, form: &T) -> Result<Response> {
        let request = self.client.post(url).form(form).build()?;
        self.execute(request).await
    }

    /// Send an arbitrary request with pacing and retries.
    pub async fn execute(&self, mut request: Request) -> Result<Response> {
        let body = match request.body_mut().take() {
            Some(body) => Some(body.collect().await?.to_bytes()),
            None => None,
        };
        let template = Template {
            method: request.method().clone(),
            url: request.url().clone(),
            headers: request.headers().clone(),
            timeout: request.timeout().copied(),
            version: request.version(),
            body,
        };
        self.dispatch(&template).await
    }

    async fn dispatch(&self, template: &Template) -> Result<Response> {
        let url = template.url.as_str();
        let attempts = self.max_retries.saturating_add(1);
        let mut last: Option<ClientError> = None;

        for attempt in 0..attempts {
            self.limiter.wait().await;
            if attempt > 0 && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }

            debug!("transport: {} {url} (attempt {})", template.method, attempt + 1);
            match self.client.execute(template.build()).await {
                Ok(response) if response.status().as_u16() < 500 => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    warn!("transport: {url} returned {status} (attempt {})", attempt + 1);
                    drop(response);
                    last = Some(ClientError::ApiStatus {
                        url: url.to_string(),
                        status,
                    });
                }
                Err(e) => {
                    warn!("transport: {url} failed (attempt {}): {e}", attempt + 1);
                    last = Some(ClientError::Transport(e));
                }
            }
        }

        Err(ClientError::RetriesExceeded {
            url: url.to_string(),
            attempts,
            last: Box::new(last.unwrap_or(ClientError::ApiStatus {
                url: url.to_string(),
                status: 0,
            })),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
