//! API route definitions

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;

use super::handlers;
use super::AppState;

/// Every route the server exposes, without middleware.
pub fn app_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        // Browser probes
        .route("/favicon.ico", get(handlers::no_content))
        .route("/.well-known/appspecific/com.chrome.devtools.json", get(handlers::no_content))
        // OpenAI-compatible endpoints
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        // Model management
        .route("/api/models/recommended", get(handlers::recommended_models))
        .route("/api/models/search", get(handlers::search_models))
        .route("/api/models/check/*model", get(handlers::check_model))
        .route("/api/models/pull", post(handlers::pull_model))
        .nest_service("/static", static_files)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use nonempty::NonEmpty;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::client::{ClientError, ModelRuntime};
    use crate::config::AppConfig;
    use crate::model::{ChatCompletion, ChatMessage, ChatRequest, Choice, FinishReason, ModelInfo, Usage};
    use crate::relay::{ChatStreamRelay, ModelPullRelay};
    use crate::stream::tests::{chunks, chunks_then_hang};

    /// Runtime with canned answers.
    struct FakeRuntime {
        models: Vec<&'static str>,
        chat_lines: Vec<&'static str>,
        pull_lines: Vec<&'static str>,
        fail_with: Option<&'static str>,
        /// Keep the chat body open after the last line.
        chat_hangs: bool,
    }

    impl Default for FakeRuntime {
        fn default() -> Self {
            Self {
                models: vec!["llama3.2:latest"],
                chat_lines: vec![
                    "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n",
                    "{\"message\":{\"content\":\"lo\"},\"done\":false}\n{\"done\":true}\n",
                ],
                pull_lines: vec![
                    "{\"status\":\"pulling manifest\"}\n",
                    "{\"status\":\"pulling abc\",\"digest\":\"sha256:abc\",\"total\":100,\"completed\":50}\n",
                    "{\"status\":\"success\"}\n",
                ],
                fail_with: None,
                chat_hangs: false,
            }
        }
    }

    #[async_trait]
    impl ModelRuntime for FakeRuntime {
        async fn list_models(&self) -> Result<Vec<ModelInfo>, ClientError> {
            match self.fail_with {
                Some(msg) => Err(ClientError::Upstream(msg.to_string())),
                None => Ok(self.models.iter().map(|id| ModelInfo::new(*id, 0)).collect()),
            }
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, ClientError> {
            if let Some(msg) = self.fail_with {
                return Err(ClientError::Upstream(msg.to_string()));
            }
            Ok(ChatCompletion {
                id: "chatcmpl-1".into(),
                object: "chat.completion".into(),
                created: 0,
                model: request.model.clone(),
                choices: vec![Choice {
                    index: 0,
                    message: ChatMessage::new(crate::model::Role::Assistant, "Hello"),
                    finish_reason: FinishReason::Stop,
                }],
                usage: Usage::new(3, 1),
                context_info: None,
            })
        }

        async fn chat_stream(&self, _request: &ChatRequest) -> Result<ChatStreamRelay, ClientError> {
            if let Some(msg) = self.fail_with {
                return Err(ClientError::Upstream(msg.to_string()));
            }
            let body = if self.chat_hangs {
                chunks_then_hang(&self.chat_lines)
            } else {
                chunks(&self.chat_lines)
            };
            Ok(ChatStreamRelay::new(body, None))
        }

        async fn pull(&self, _model: &str) -> Result<ModelPullRelay, ClientError> {
            if let Some(msg) = self.fail_with {
                return Err(ClientError::Upstream(msg.to_string()));
            }
            Ok(ModelPullRelay::new(chunks(&self.pull_lines), None))
        }
    }

    fn app(runtime: FakeRuntime) -> Router {
        app_router(AppState::new(Arc::new(runtime), AppConfig::default()))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// `data:` payloads of an SSE body, in order.
    fn sse_data(body: &str) -> Vec<String> {
        body.lines()
            .filter_map(|l| l.strip_prefix("data:"))
            .map(|d| d.trim().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_health_and_probes() {
        let (status, body) = send(app(FakeRuntime::default()), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["status"], "ok");

        let (status, _) = send(app(FakeRuntime::default()), get("/favicon.ico")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_index_and_static_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.server.static_dir = dir.path().to_path_buf();
        let with_dir = || app_router(AppState::new(Arc::new(FakeRuntime::default()), config.clone()));

        let (status, body) = send(with_dir(), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Frontend not found"));

        std::fs::write(dir.path().join("index.html"), "<h1>chat</h1>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
        let (_, body) = send(with_dir(), get("/")).await;
        assert_eq!(body, "<h1>chat</h1>");
        let (status, body) = send(with_dir(), get("/static/app.js")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "console.log(1)");
    }

    #[tokio::test]
    async fn test_models_empty_on_upstream_failure() {
        let runtime = FakeRuntime {
            fail_with: Some("connection refused"),
            ..Default::default()
        };
        let (status, body) = send(app(runtime), get("/v1/models")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"object": "list", "data": []}));
    }

    #[tokio::test]
    async fn test_search_and_check() {
        let (_, body) = send(app(FakeRuntime::default()), get("/api/models/search?q=llama3.2")).await;
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["query"], "llama3.2");
        assert_eq!(value["results"][0]["id"], "llama3.2:latest");
        assert_eq!(value["results"][0]["downloaded"], true);

        let (_, body) = send(app(FakeRuntime::default()), get("/api/models/check/llama3.2")).await;
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            json!({"exists": true, "model": "llama3.2"})
        );
    }

    #[tokio::test]
    async fn test_chat_validation() {
        let (status, body) = send(
            app(FakeRuntime::default()),
            post_json("/v1/chat/completions", json!({"model": " ", "messages": [{"role": "user", "content": "hi"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"detail": "Model is required"}));

        let (status, body) = send(
            app(FakeRuntime::default()),
            post_json("/v1/chat/completions", json!({"model": "llama3.2", "messages": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            json!({"detail": "At least one message is required"})
        );
    }

    #[tokio::test]
    async fn test_chat_stream_sse_framing() {
        let (status, body) = send(
            app(FakeRuntime::default()),
            post_json(
                "/v1/chat/completions",
                json!({"model": "llama3.2", "stream": true, "messages": [{"role": "user", "content": "hi"}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let data = sse_data(&body);
        assert_eq!(data.len(), 4);
        let first: Value = serde_json::from_str(&data[0]).unwrap();
        assert_eq!(first["object"], "chat.completion.chunk");
        assert_eq!(first["choices"][0]["delta"]["content"], "Hel");
        let second: Value = serde_json::from_str(&data[1]).unwrap();
        assert_eq!(second["choices"][0]["delta"]["content"], "lo");
        let stop: Value = serde_json::from_str(&data[2]).unwrap();
        assert_eq!(stop["choices"][0]["finish_reason"], "stop");
        assert_eq!(data[3], "[DONE]");
    }

    #[tokio::test]
    async fn test_chat_stream_marks_empty_reply() {
        let runtime = FakeRuntime {
            chat_lines: vec!["{\"done\":true}\n"],
            ..Default::default()
        };
        let (_, body) = send(
            app(runtime),
            post_json(
                "/v1/chat/completions",
                json!({"model": "llama3.2", "stream": true, "messages": [{"role": "user", "content": "hi"}]}),
            ),
        )
        .await;
        let data = sse_data(&body);
        assert_eq!(data.len(), 2);
        let closing: Value = serde_json::from_str(&data[0]).unwrap();
        assert_eq!(closing["empty_response"], true);
        assert_eq!(closing["choices"][0]["finish_reason"], "stop");
        assert_eq!(data[1], "[DONE]");
    }

    #[tokio::test]
    async fn test_chat_stream_ends_when_upstream_stays_open() {
        let runtime = FakeRuntime {
            chat_lines: vec!["{\"message\":{\"content\":\"hi\"},\"done\":true}\n"],
            chat_hangs: true,
            ..Default::default()
        };
        let request = post_json(
            "/v1/chat/completions",
            json!({"model": "llama3.2", "stream": true, "messages": [{"role": "user", "content": "hi"}]}),
        );
        let (_, body) = tokio::time::timeout(std::time::Duration::from_secs(2), send(app(runtime), request))
            .await
            .expect("response should end after [DONE]");

        let data = sse_data(&body);
        assert_eq!(data.len(), 3);
        let delta: Value = serde_json::from_str(&data[0]).unwrap();
        assert_eq!(delta["choices"][0]["delta"]["content"], "hi");
        assert_eq!(data[2], "[DONE]");
    }

    #[tokio::test]
    async fn test_chat_stream_upstream_error_frame() {
        let runtime = FakeRuntime {
            chat_lines: vec!["{\"message\":{\"content\":\"par\"}}\n", "{\"error\":\"model crashed\"}\n"],
            ..Default::default()
        };
        let (_, body) = send(
            app(runtime),
            post_json(
                "/v1/chat/completions",
                json!({"model": "llama3.2", "stream": true, "messages": [{"role": "user", "content": "hi"}]}),
            ),
        )
        .await;
        let data = sse_data(&body);
        assert_eq!(data.len(), 2);
        assert_eq!(serde_json::from_str::<Value>(&data[1]).unwrap(), json!({"error": "model crashed"}));
    }

    #[tokio::test]
    async fn test_chat_non_streaming_carries_context_info() {
        let (status, body) = send(
            app(FakeRuntime::default()),
            post_json(
                "/v1/chat/completions",
                json!({
                    "model": "llama3.2",
                    "messages": [{"role": "user", "content": "explain"}],
                    "uploaded_files": [{"filename": "a.py", "content": "x = 1"}]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["choices"][0]["message"]["content"], "Hello");
        assert_eq!(value["context_info"]["included_files"], json!(["a.py"]));
        assert_eq!(value["context_info"]["message_count"], 2);
    }

    #[tokio::test]
    async fn test_chat_upstream_failure_is_500_with_hint() {
        let runtime = FakeRuntime {
            fail_with: Some("model \"ghost\" not found, try pulling it first"),
            ..Default::default()
        };
        let (status, body) = send(
            app(runtime),
            post_json(
                "/v1/chat/completions",
                json!({"model": "ghost", "messages": [{"role": "user", "content": "hi"}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let detail = serde_json::from_str::<Value>(&body).unwrap()["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("Model 'ghost' not found."));
    }

    #[tokio::test]
    async fn test_pull_sse_framing() {
        let (status, body) = send(
            app(FakeRuntime::default()),
            post_json("/api/models/pull", json!({"model": "llama3.2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let data = sse_data(&body);
        assert_eq!(data.last().map(String::as_str), Some("[DONE]"));
        let events: Vec<Value> = data[..data.len() - 1]
            .iter()
            .map(|d| serde_json::from_str(d).unwrap())
            .collect();
        let percents: Vec<u64> = events.iter().map(|e| e["percent"].as_u64().unwrap()).collect();
        assert_eq!(percents, vec![5, 50, 100]);
        assert_eq!(events[2]["phase"], "complete");
    }

    #[tokio::test]
    async fn test_pull_start_failure_is_error_record() {
        let runtime = FakeRuntime {
            fail_with: Some("connection refused"),
            ..Default::default()
        };
        let (_, body) = send(app(runtime), post_json("/api/models/pull", json!({"model": "x"}))).await;
        let data = sse_data(&body);
        assert_eq!(data.len(), 2);
        let event: Value = serde_json::from_str(&data[0]).unwrap();
        assert_eq!(event["phase"], "error");
        assert_eq!(event["message"], "connection refused");
    }

    #[test]
    fn test_prepare_chat_prepends_system_prompt() {
        let config = AppConfig::default();
        let body = crate::api::types::ChatCompletionRequest {
            model: "llama3.2".into(),
            messages: vec![ChatMessage::user("hi")],
            system_prompt: Some("Be terse.".into()),
            temperature: Some(0.2),
            ..Default::default()
        };
        let prepared = crate::api::handlers::prepare_chat(&config, body).unwrap();
        let messages: NonEmpty<ChatMessage> = prepared.request.messages;
        assert_eq!(messages.head, ChatMessage::system("Be terse."));
        assert_eq!(messages.tail, vec![ChatMessage::user("hi")]);
        assert_eq!(prepared.request.temperature, 0.2);
        assert_eq!(prepared.context_info.context_length, 0);
    }
}
