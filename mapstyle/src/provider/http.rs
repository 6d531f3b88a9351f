//! HTTP client abstraction for testability

use std::future::Future;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!("mapstyle/", env!("CARGO_PKG_VERSION"));

/// Failure of a single HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// Connection, DNS, TLS or timeout failure before a response arrived
    Transport(String),
    /// The server answered with a non-success status
    Status { status: u16, url: String },
}

impl HttpError {
    /// Whether trying the same request again could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Transport(_) => true,
            HttpError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::Transport(msg) => write!(f, "{msg}"),
            HttpError::Status { status, url } => write!(f, "HTTP {status} from {url}"),
        }
    }
}

/// Trait for asynchronous HTTP GET requests.
///
/// Lets the remote provider be driven by a mock in tests.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs an async HTTP GET request and returns the response body.
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, HttpError>> + Send;
}

/// Async HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| HttpError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        log::trace!("HTTP GET {url}");

        let response = self.client.get(url).send().await.map_err(|e| {
            log::warn!(
                "HTTP request to {url} failed (connect: {}, timeout: {}): {e}",
                e.is_connect(),
                e.is_timeout()
            );
            HttpError::Transport(format!("Request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("HTTP {} from {url}", status.as_u16());
            return Err(HttpError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| HttpError::Transport(format!("Failed to read response: {e}")))?;
        log::trace!("HTTP response from {url}: {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}
