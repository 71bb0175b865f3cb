//! HTTP client utilities for talking to the model runtime.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use crate::options::TransportOptions;

/// Build a configured HTTP client from transport options.
///
/// Only the connect timeout is set on the client. Total request timeouts are
/// applied per request so that streaming bodies are not cut off.
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => tracing::warn!("Ignoring invalid proxy {}: {}", proxy_url, e),
        }
    }

    builder.build()
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(mut request: RequestBuilder, transport_options: &TransportOptions) -> RequestBuilder {
    if let Some(headers) = &transport_options.extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Best human-readable diagnostic for a failed response.
///
/// Prefers a JSON `detail` field, then an `error` field, and falls back to
/// the status line.
pub fn error_detail(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    field("detail")
        .or_else(|| field("error"))
        .unwrap_or_else(|| status.to_string())
}
