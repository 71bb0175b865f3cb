//! Transport configuration for the model runtime.

use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// How to reach the model runtime and how long to wait for it.
///
/// Streaming responses are not bounded as a whole (a long generation is
/// legitimate); instead every read waits at most `read_timeout` for the next
/// chunk.
///
/// # Example
/// ```rust
/// use ollachat::options::TransportOptions;
/// use std::time::Duration;
///
/// let options = TransportOptions::new("http://gpu-box:11434")
///     .with_read_timeout(Duration::from_secs(60));
/// assert_eq!(options.base_url, "http://gpu-box:11434");
/// ```
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Base URL of the runtime, without a trailing slash.
    pub base_url: String,

    /// Time allowed to establish a connection.
    pub connect_timeout: Option<Duration>,

    /// Total time allowed for a non-streaming request.
    pub request_timeout: Option<Duration>,

    /// Longest silence tolerated between chunks of a chat stream.
    pub read_timeout: Option<Duration>,

    /// Longest silence tolerated between chunks of a model download.
    pub pull_read_timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Some(Duration::from_secs(10)),
            request_timeout: Some(Duration::from_secs(300)),
            read_timeout: Some(Duration::from_secs(300)),
            pull_read_timeout: Some(Duration::from_secs(3600)),
            proxy: None,
            extra_headers: None,
        }
    }
}

impl TransportOptions {
    /// Default options pointed at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().with_base_url(base_url)
    }

    /// Set the base URL. A trailing slash is dropped.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_pull_read_timeout(mut self, timeout: Duration) -> Self {
        self.pull_read_timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }

    /// Join an API path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
