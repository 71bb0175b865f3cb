//! Core runtime trait and error types.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ChatCompletion, ChatRequest, ModelInfo};
use crate::relay::{ChatStreamRelay, ModelPullRelay};

/// Errors that can occur while talking to the model runtime.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No data from upstream for {0:?}")]
    Timeout(Duration),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Error payload reported by the runtime itself, carried verbatim.
    #[error("{0}")]
    Upstream(String),

    #[error("HTTP {status}: {detail}")]
    Status {
        status: reqwest::StatusCode,
        detail: String,
    },
}

impl ClientError {
    /// Connection refused, reset, or timed out. The caller may retry these.
    pub fn is_transport(&self) -> bool {
        match self {
            ClientError::Http(e) => !e.is_status() && !e.is_decode(),
            ClientError::Timeout(_) => true,
            _ => false,
        }
    }
}

/// The upstream model runtime.
///
/// Relays never talk HTTP directly; they consume the byte streams a runtime
/// hands them. `OllamaClient` is the production implementation, tests plug in
/// canned streams.
///
/// # Provided Methods
/// - `model_exists`: checks `list_models` for an exact or base-name match
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// List locally available models.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ClientError>;

    /// Run a chat request to completion without streaming.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, ClientError>;

    /// Start a streaming chat request.
    ///
    /// Fails fast when the runtime answers with a non-success status; the
    /// returned relay yields increments as they arrive.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStreamRelay, ClientError>;

    /// Start downloading a model and relay its progress.
    async fn pull(&self, model: &str) -> Result<ModelPullRelay, ClientError>;

    /// Check whether a model is already downloaded.
    ///
    /// `qwen2.5:7b` matches only that exact tag. A name without a tag such as
    /// `qwen2.5` also matches any local tag of that model. Listing failures
    /// count as "not present".
    async fn model_exists(&self, model: &str) -> bool {
        match self.list_models().await {
            Ok(models) => models.iter().any(|m| model_matches(&m.id, model)),
            Err(e) => {
                tracing::warn!("Could not list models while checking {}: {}", model, e);
                false
            }
        }
    }
}

fn base_name(id: &str) -> &str {
    id.split(':').next().unwrap_or(id)
}

pub(crate) fn model_matches(local_id: &str, wanted: &str) -> bool {
    if local_id == wanted {
        return true;
    }
    !wanted.contains(':') && base_name(local_id) == wanted
}
