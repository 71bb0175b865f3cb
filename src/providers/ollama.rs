//! Ollama REST API client.
//!
//! Implements [`ModelRuntime`] over `/api/tags`, `/api/chat` and `/api/pull`.
//! See: <https://github.com/ollama/ollama/blob/main/docs/api.md>

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{ClientError, ModelRuntime};
use crate::http::{add_extra_headers, build_http_client, error_detail};
use crate::model::{ChatCompletion, ChatMessage, ChatRequest, Choice, FinishReason, ModelInfo, Role, Usage};
use crate::options::TransportOptions;
use crate::relay::{ChatStreamRelay, ModelPullRelay};
use crate::stream::byte_stream;

/// Ollama client using HTTP transport.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    transport_options: TransportOptions,
}

impl OllamaClient {
    pub fn new(transport_options: TransportOptions) -> Result<Self, ClientError> {
        let http = build_http_client(&transport_options)?;
        Ok(Self {
            http,
            transport_options,
        })
    }

    pub fn transport_options(&self) -> &TransportOptions {
        &self.transport_options
    }

    /// POST a JSON body and return the response once its status is known to be good.
    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        streaming: bool,
    ) -> Result<reqwest::Response, ClientError> {
        let url = self.transport_options.url(path);
        debug!("POST {} (streaming: {})", url, streaming);

        let mut req = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json");
        if !streaming {
            if let Some(timeout) = self.transport_options.request_timeout {
                req = req.timeout(timeout);
            }
        }
        req = add_extra_headers(req, &self.transport_options);

        let response = req.json(body).send().await?;
        Self::check_status(response).await
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::handle_error_response(status, &body))
    }

    /// Handle Ollama error responses.
    fn handle_error_response(status: reqwest::StatusCode, body: &str) -> ClientError {
        ClientError::Status {
            status,
            detail: error_detail(status, body),
        }
    }
}

#[async_trait]
impl ModelRuntime for OllamaClient {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ClientError> {
        let url = self.transport_options.url("/api/tags");
        let mut req = self.http.get(&url);
        if let Some(timeout) = self.transport_options.request_timeout {
            req = req.timeout(timeout);
        }
        req = add_extra_headers(req, &self.transport_options);

        let response = Self::check_status(req.send().await?).await?;
        let tags: OllamaTagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(ModelInfo::from).collect())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, ClientError> {
        let body = OllamaChatRequest::new(request, false);
        let response = self.post("/api/chat", &body, false).await?;
        let text = response.text().await?;
        let parsed: OllamaChatResponse = serde_json::from_str(&text)?;
        if let Some(error) = parsed.error {
            return Err(ClientError::Upstream(error));
        }
        Ok(parsed.into_completion(&request.model))
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStreamRelay, ClientError> {
        let body = OllamaChatRequest::new(request, true);
        let response = self.post("/api/chat", &body, true).await?;
        Ok(ChatStreamRelay::new(
            byte_stream(response),
            self.transport_options.read_timeout,
        ))
    }

    async fn pull(&self, model: &str) -> Result<ModelPullRelay, ClientError> {
        let body = OllamaPullRequest {
            name: model,
            stream: true,
        };
        let response = self.post("/api/pull", &body, true).await?;
        Ok(ModelPullRelay::new(
            byte_stream(response),
            self.transport_options.pull_read_timeout,
        ))
    }
}

/// Unix seconds of an RFC 3339 timestamp, or now when missing or unparsable.
fn timestamp(value: Option<&str>) -> i64 {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.timestamp())
        .unwrap_or_else(|| Utc::now().timestamp())
}

pub(crate) fn completion_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("chatcmpl-{:x}", nanos)
}

// --- Ollama API Request/Response Types ---

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<&'a ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

impl<'a> OllamaChatRequest<'a> {
    fn new(request: &'a ChatRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: request.messages.iter().collect(),
            stream,
            options: OllamaOptions {
                temperature: request.temperature,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaPullRequest<'a> {
    name: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
    #[serde(default)]
    modified_at: Option<String>,
}

impl From<OllamaModel> for ModelInfo {
    fn from(model: OllamaModel) -> Self {
        let created = model
            .modified_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.timestamp())
            .unwrap_or(0);
        ModelInfo::new(model.name, created)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    role: Role,
    #[serde(default)]
    content: String,
}

impl OllamaChatResponse {
    fn into_completion(self, model: &str) -> ChatCompletion {
        let message = self
            .message
            .map(|m| ChatMessage::new(m.role, m.content))
            .unwrap_or_else(|| ChatMessage::new(Role::Assistant, ""));
        let finish_reason = match self.done_reason.as_deref() {
            Some("length") => FinishReason::Length,
            _ => FinishReason::Stop,
        };

        ChatCompletion {
            id: completion_id(),
            object: "chat.completion".to_string(),
            created: timestamp(self.created_at.as_deref()),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason,
            }],
            usage: Usage::new(self.prompt_eval_count, self.eval_count),
            context_info: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{ChatIncrement, PullPhase};
    use nonempty::nonempty;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OllamaClient {
        OllamaClient::new(TransportOptions::new(server.uri())).expect("client")
    }

    fn request() -> ChatRequest {
        ChatRequest::new("llama3.2", nonempty![ChatMessage::user("Hello")]).with_temperature(0.2)
    }

    #[tokio::test]
    async fn test_list_models_transforms_tags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    {"name": "llama3.2:latest", "modified_at": "2024-05-01T10:00:00Z", "size": 1},
                    {"name": "qwen2.5-coder:7b"}
                ]
            })))
            .mount(&server)
            .await;

        let models = client(&server).list_models().await.expect("models");
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "llama3.2:latest");
        assert_eq!(models[0].object, "model");
        assert_eq!(models[0].owned_by, "ollama");
        assert_eq!(models[0].created, 1714557600);
        assert_eq!(models[1].created, 0);
    }

    #[tokio::test]
    async fn test_model_exists_uses_base_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"models": [{"name": "mistral:latest"}]})),
            )
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(client.model_exists("mistral").await);
        assert!(client.model_exists("mistral:latest").await);
        assert!(!client.model_exists("mistral:7b").await);
    }

    #[tokio::test]
    async fn test_model_exists_is_false_when_runtime_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        assert!(!client(&server).model_exists("anything").await);
    }

    #[tokio::test]
    async fn test_chat_non_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "llama3.2",
                "stream": false,
                "messages": [{"role": "user", "content": "Hello"}],
                "options": {"temperature": 0.2}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3.2",
                "created_at": "2024-05-01T10:00:00Z",
                "message": {"role": "assistant", "content": "Hi!"},
                "done": true,
                "done_reason": "stop",
                "prompt_eval_count": 20,
                "eval_count": 10
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = client(&server).chat(&request()).await.expect("completion");
        assert_eq!(completion.content(), Some("Hi!"));
        assert_eq!(completion.object, "chat.completion");
        assert_eq!(completion.usage.total_tokens, 30);
        assert_eq!(completion.created, 1714557600);
        assert!(completion.id.starts_with("chatcmpl-"));
    }

    #[tokio::test]
    async fn test_chat_stream_relays_ndjson() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"eval_count\":2}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let mut relay = client(&server).chat_stream(&request()).await.expect("relay");
        let mut increments = Vec::new();
        while let Some(increment) = relay.next().await {
            increments.push(increment);
        }
        assert_eq!(
            increments,
            vec![
                ChatIncrement::Delta("Hel".into()),
                ChatIncrement::Delta("lo".into()),
                ChatIncrement::Done {
                    text: "Hello".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_stream_fails_fast_with_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"error": "model \"llama3.2\" not found, try pulling it first"})),
            )
            .mount(&server)
            .await;

        match client(&server).chat_stream(&request()).await {
            Err(ClientError::Status { status, detail }) => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
                assert_eq!(detail, "model \"llama3.2\" not found, try pulling it first");
            }
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_pull_relays_progress() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"status\":\"pulling manifest\"}\n",
            "{\"status\":\"pulling 8eeb52dfb3bb\",\"digest\":\"sha256:8eeb\",\"total\":200,\"completed\":100}\n",
            "{\"status\":\"verifying sha256 digest\"}\n",
            "{\"status\":\"writing manifest\"}\n",
            "{\"status\":\"success\"}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .and(body_partial_json(json!({"name": "llama3.2", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let mut relay = client(&server).pull("llama3.2").await.expect("relay");
        let mut events = Vec::new();
        while let Some(event) = relay.next().await {
            events.push(event);
        }
        let summary: Vec<(PullPhase, u8)> = events.iter().map(|e| (e.phase, e.percent)).collect();
        assert_eq!(
            summary,
            vec![
                (PullPhase::Manifest, 5),
                (PullPhase::Downloading, 50),
                (PullPhase::Verifying, 50),
                (PullPhase::Verifying, 50),
                (PullPhase::Complete, 100),
            ]
        );
        assert_eq!(events[1].layer_id.as_deref(), Some("sha256:8eeb"));
    }
}
