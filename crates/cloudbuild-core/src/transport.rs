//! Transport adapter for the Cloud Build REST API.
//!
//! [`TransportAdapter::send`] issues exactly one request, waits for it to
//! finish or for the per-call deadline to pass, and classifies the result as
//! an [`Outcome`]. The network itself sits behind the [`HttpBackend`] trait;
//! [`ReqwestBackend`] is the production implementation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{CloudBuildError, Result};
use crate::obs;

/// HTTP verbs used by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built request, headers included.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (name.as_str(), "<redacted>")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &headers)
            .field("body", &self.body)
            .finish()
    }
}

/// Status code and body text of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Executes one HTTP exchange.
///
/// Errors returned here are transport-level (connection, DNS, TLS, body read)
/// and are reported as [`CloudBuildError::Network`].
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpBackend`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cloudbuild-launcher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CloudBuildError::Network(format!("failed to create HTTP client: {}", e)))?;
        Ok(ReqwestBackend { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        ReqwestBackend { client }
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

impl From<reqwest::Error> for CloudBuildError {
    fn from(err: reqwest::Error) -> Self {
        CloudBuildError::Network(err.to_string())
    }
}

/// Why a call that completed in time was not a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Network(String),
    UnexpectedStatus(u16),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Network(detail) => write!(f, "network error: {}", detail),
            FailureReason::UnexpectedStatus(code) => write!(f, "unexpected status {}", code),
        }
    }
}

/// Classified result of a remote call. Every call resolves to exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Failure(FailureReason),
    Timeout,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(reason) => Outcome::Failure(reason),
            Outcome::Timeout => Outcome::Timeout,
        }
    }

    /// Convert into a `Result`, raising failures as errors.
    pub fn into_result(self) -> Result<T> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(FailureReason::Network(detail)) => {
                Err(CloudBuildError::Network(detail))
            }
            Outcome::Failure(FailureReason::UnexpectedStatus(code)) => {
                Err(CloudBuildError::UnexpectedStatus(code))
            }
            Outcome::Timeout => Err(CloudBuildError::Timeout),
        }
    }

    fn label(&self) -> String {
        match self {
            Outcome::Success(_) => "success".to_string(),
            Outcome::Failure(reason) => reason.to_string(),
            Outcome::Timeout => "timeout".to_string(),
        }
    }
}

/// Adds the JSON content type and Basic authorization to every request and
/// bounds each call by a fixed timeout.
#[derive(Clone)]
pub struct TransportAdapter {
    backend: Arc<dyn HttpBackend>,
    api_token: String,
    timeout: Duration,
}

impl TransportAdapter {
    pub fn new(backend: Arc<dyn HttpBackend>, api_token: &str, timeout: Duration) -> Self {
        TransportAdapter {
            backend,
            api_token: api_token.to_string(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue one request and classify it against `expected_status`.
    ///
    /// `url_class` is the path template used for logging. When the deadline
    /// passes the request future is dropped; whatever the server does later
    /// is ignored.
    pub async fn send(
        &self,
        method: HttpMethod,
        url: Url,
        url_class: &str,
        body: Option<String>,
        expected_status: u16,
    ) -> Outcome<String> {
        let request = HttpRequest {
            method,
            url,
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                (
                    "Authorization".to_string(),
                    format!("Basic {}", self.api_token),
                ),
            ],
            body,
        };

        let started = tokio::time::Instant::now();
        let outcome =
            match tokio::time::timeout(self.timeout, self.backend.execute(request)).await {
                Err(_) => Outcome::Timeout,
                Ok(Err(CloudBuildError::Network(detail))) => {
                    Outcome::Failure(FailureReason::Network(detail))
                }
                Ok(Err(other)) => Outcome::Failure(FailureReason::Network(other.to_string())),
                Ok(Ok(response)) if response.status == expected_status => {
                    Outcome::Success(response.body)
                }
                Ok(Ok(response)) => {
                    Outcome::Failure(FailureReason::UnexpectedStatus(response.status))
                }
            };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if outcome.is_success() {
            obs::emit_request_completed(method.as_str(), url_class, "success", elapsed_ms);
        } else {
            obs::emit_request_failed(method.as_str(), url_class, &outcome.label(), elapsed_ms);
        }
        outcome
    }
}

impl fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
