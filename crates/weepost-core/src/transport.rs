//! HTTP POST transport with credential header and outcome classification.
//!
//! Uses async reqwest on a shared tokio runtime, but presents a sync
//! interface to the delivery worker thread.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};

/// Header carrying the base64-encoded credential
pub const KEY_HEADER: &str = "key";

/// Content type of every delivered document
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Connect timeout, independent of the per-request timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body excerpt kept in error messages
const MAX_ERROR_BODY: usize = 200;

/// Error types for a single POST attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostError {
    /// HTTP error with optional status code (`None` = no response received)
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Request did not complete within the timeout
    Timeout(String),
    /// Request could not be built (bad URL, bad header value)
    Invalid(String),
}

impl std::fmt::Display for PostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Timeout(message) => write!(f, "timed out: {message}"),
            Self::Invalid(message) => write!(f, "invalid request: {message}"),
        }
    }
}

impl std::error::Error for PostError {}

impl PostError {
    /// Create from a reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        let message = e.to_string();
        if e.is_timeout() {
            Self::Timeout(message)
        } else if e.is_builder() {
            Self::Invalid(message)
        } else {
            Self::Http {
                status: e.status().map(|s| s.as_u16()),
                message,
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            // No response: connection refused/reset, DNS, TLS
            Self::Http { status: None, .. } => true,
            // 408 = request timeout, 429 = rate limited, 5xx = server side
            Self::Http {
                status: Some(s), ..
            } => matches!(s, 408 | 429 | 500..=599),
            Self::Timeout(_) => true,
            Self::Invalid(_) => false,
        }
    }
}

/// Classified result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { status: u16 },
    Retryable(PostError),
    NonRetryable(PostError),
}

impl Outcome {
    pub fn classify(result: Result<u16, PostError>) -> Self {
        match result {
            Ok(status) => Self::Success { status },
            Err(e) if e.is_retryable() => Self::Retryable(e),
            Err(e) => Self::NonRetryable(e),
        }
    }
}

/// Everything needed for one POST
#[derive(Debug, Clone, Copy)]
pub struct PostRequest<'a> {
    pub endpoint: &'a str,
    /// Plain credential; encoded by the transport
    pub credential: &'a str,
    pub body: &'a [u8],
    pub content_type: &'a str,
    pub timeout: Duration,
}

/// Sends one request and classifies what happened.
pub trait Transport: Send {
    fn post(&self, request: &PostRequest<'_>) -> Outcome;
}

impl<T: Transport + Sync + ?Sized> Transport for Arc<T> {
    fn post(&self, request: &PostRequest<'_>) -> Outcome {
        (**self).post(request)
    }
}

/// Base64 form of the credential as sent in the `key` header
pub fn encode_credential(credential: &str) -> String {
    general_purpose::STANDARD.encode(credential.as_bytes())
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("weepost-http")
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self, PostError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| PostError::from_reqwest(&e))?;
        Ok(Self { client })
    }

    async fn send(&self, request: &PostRequest<'_>) -> Result<u16, PostError> {
        let response = self
            .client
            .post(request.endpoint)
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .header(KEY_HEADER, encode_credential(request.credential))
            .timeout(request.timeout)
            .body(request.body.to_vec())
            .send()
            .await
            .map_err(|e| PostError::from_reqwest(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }

        let body = response.text().await.unwrap_or_default();
        Err(PostError::Http {
            status: Some(status.as_u16()),
            message: excerpt(status.canonical_reason().unwrap_or("error"), &body),
        })
    }
}

impl Transport for HttpTransport {
    fn post(&self, request: &PostRequest<'_>) -> Outcome {
        Outcome::classify(SHARED_RUNTIME.handle().block_on(self.send(request)))
    }
}

fn excerpt(reason: &str, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return reason.to_string();
    }
    let cut = body
        .char_indices()
        .nth(MAX_ERROR_BODY)
        .map_or(body.len(), |(i, _)| i);
    format!("{reason}: {}", &body[..cut])
}
