//! # HTTP Retrieval Utilities
//!
//! This module provides an asynchronous API client wrapper around `reqwest`.
//! It includes middleware support for exponential backoff retries and
//! standardized JSON response handling.

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Result, TrackerError};

/// A standardized container for API responses.
///
/// This struct wraps the deserialized data along with the status of the
/// HTTP transaction.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The deserialized response body. `None` for empty bodies and failures.
    pub data: Option<T>,
    /// The raw body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
}

/// Construction options for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How many times a transient failure (connect error, 5xx, 408, 429) is
    /// retried with exponential backoff. `0` disables the retry middleware.
    pub max_retries: u32,
    /// Per-request timeout covering connect, send and body read.
    pub timeout: Duration,
    /// Headers attached to every request made by this client.
    pub default_headers: HeaderMap,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_retries: 0,
            timeout: Duration::from_secs(30),
            default_headers: HeaderMap::new(),
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs, default
/// headers and automatic retries.
#[derive(Clone)]
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// `base_url` must be absolute. Requests made with an empty path go to
    /// `base_url` itself, which is how full-URL endpoints (the chatter list,
    /// the analytics sink) are addressed.
    pub fn new(base_url: &str, options: ClientOptions) -> Result<Self> {
        let url = Url::parse(base_url).map_err(|source| TrackerError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(concat!("chatter-tracker/", env!("CARGO_PKG_VERSION")))
            .default_headers(options.default_headers)
            .build()?;

        let mut builder = ClientBuilder::new(client);
        if options.max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(options.max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }

        Ok(Self {
            inner: builder.build(),
            base_url: url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds and sends a request, returning the raw response.
    async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        // 1. Construct the full absolute URL
        let full_url = self.base_url.join(path).map_err(|source| TrackerError::InvalidUrl {
            url: format!("{}{}", self.base_url, path),
            source,
        })?;
        let mut req = self.inner.request(method, full_url);

        // 2. Serialize and attach the JSON body if present
        if let Some(b) = body {
            let json_body = serde_json::to_string(b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        Ok(req.send().await?)
    }

    /// Performs a generic HTTP request and handles the response.
    ///
    /// Non-2xx statuses are not errors here: they come back as an
    /// `ApiResponse` with `success == false` so callers can decide what a
    /// given status means to them.
    ///
    /// # Errors
    /// URL joining, transport failures, and a 2xx body that does not decode
    /// into `T`.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(method, path, body).await?;
        let status = response.status();
        let success = status.is_success();
        let text = response.text().await.map_err(reqwest_middleware::Error::from)?;

        if success {
            let data = if text.trim().is_empty() {
                None
            } else {
                Some(serde_json::from_str::<T>(&text)?)
            };
            Ok(ApiResponse {
                data,
                error_body: None,
                status: status.as_u16(),
                success: true,
            })
        } else {
            Ok(ApiResponse {
                data: None,
                error_body: Some(text),
                status: status.as_u16(),
                success: false,
            })
        }
    }

    /// GET `path` and decode a JSON body, treating anything but 2xx as an error.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request::<T, ()>(Method::GET, path, None).await?;
        if !response.success {
            return Err(TrackerError::Status {
                status: response.status,
                body: response.error_body.unwrap_or_default(),
            });
        }
        response
            .data
            .ok_or_else(|| TrackerError::Schema(format!("empty body from {}", self.base_url)))
    }

    /// POST a JSON body to `path` and return the status code. The response
    /// body is never read.
    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<u16> {
        let response = self.send(Method::POST, path, Some(body)).await?;
        Ok(response.status().as_u16())
    }
}
