//! The transport collaborator: one network exchange per call.
//!
//! [`Transport`] is the seam between the orchestration pipeline and the
//! actual HTTP machinery. The default implementation wraps
//! [`reqwest::Client`]; tests and embedders can inject their own.

use crate::{Error, Result};
use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Everything needed to perform one network exchange.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Resolved URL without query string.
    pub url: Url,
    /// Query parameters to append.
    pub query: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
    /// Merged default and per-request headers.
    pub headers: HeaderMap,
    /// Deadline for this single attempt.
    pub timeout: Option<Duration>,
}

/// A raw response as returned by the transport, before classification.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body as text.
    pub body: String,
}

/// Performs one network exchange.
///
/// Implementations must surface their own timeouts as [`Error::Timeout`]
/// and connection-level failures as [`Error::Network`]; classification of
/// status codes and envelopes happens upstream. Cancellation is cooperative:
/// the orchestrator drops the in-progress future, which must abort the
/// exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs the exchange described by `request`.
    async fn invoke(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Default transport backed by a pooled [`reqwest::Client`].
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a default reqwest client.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an already-configured reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn invoke(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut url = request.url;
        for (key, value) in &request.query {
            url.query_pairs_mut().append_pair(key, value);
        }

        tracing::debug!(method = %request.method, url = %url, "executing HTTP request");

        let mut builder = self
            .client
            .request(request.method, url)
            .headers(request.headers);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(normalize_transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(normalize_transport_error)?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn normalize_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout {
            message: e.to_string(),
        }
    } else {
        Error::Network {
            message: e.to_string(),
            cause: Arc::new(e),
        }
    }
}
