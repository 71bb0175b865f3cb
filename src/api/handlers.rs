//! API request handlers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use nonempty::NonEmpty;
use tracing::{error, info, warn};

use super::error::ApiError;
use super::types::{
    ChatCompletionRequest, CheckResponse, HealthResponse, ModelList, PullModelRequest, RecommendedModels,
    SearchQuery, SearchResponse,
};
use super::AppState;
use crate::catalog::{self, RECOMMENDED};
use crate::config::AppConfig;
use crate::context::{format_uploaded_files, ProjectContext};
use crate::model::{ChatCompletionChunk, ChatMessage, ChatRequest, ContextInfo};
use crate::providers::ollama::completion_id;
use crate::relay::{ChatIncrement, PullProgress, PullProgressEvent};

const FALLBACK_INDEX: &str = "<h1>OllamaChat</h1><p>Frontend not found. Please check static/index.html</p>";

/// Health check handler
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Answers browser probes (favicon, devtools) without a 404.
pub async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Serve `index.html` from the static directory.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let path = state.config.server.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(page),
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            Html(FALLBACK_INDEX.to_string())
        }
    }
}

/// List local models (GET /v1/models)
pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    match state.runtime.list_models().await {
        Ok(models) => Json(ModelList::new(models)),
        Err(e) => {
            error!("Error listing models: {}", e);
            Json(ModelList::new(Vec::new()))
        }
    }
}

pub async fn recommended_models() -> Json<RecommendedModels> {
    Json(RecommendedModels { models: RECOMMENDED })
}

/// Search local and catalog models (GET /api/models/search?q=)
pub async fn search_models(State(state): State<AppState>, Query(params): Query<SearchQuery>) -> Json<SearchResponse> {
    let local = state.runtime.list_models().await.unwrap_or_else(|e| {
        warn!("Searching without local models: {}", e);
        Vec::new()
    });
    Json(SearchResponse {
        results: catalog::search(&local, &params.q),
        query: params.q,
    })
}

/// Check whether a model is downloaded (GET /api/models/check/*model)
pub async fn check_model(State(state): State<AppState>, Path(model): Path<String>) -> Json<CheckResponse> {
    let exists = state.runtime.model_exists(&model).await;
    Json(CheckResponse { exists, model })
}

/// Download a model, streaming progress as server-sent events.
pub async fn pull_model(
    State(state): State<AppState>,
    Json(body): Json<PullModelRequest>,
) -> Result<Response, ApiError> {
    let model = body.model.trim().to_string();
    if model.is_empty() {
        return Err(ApiError::BadRequest("Model is required".to_string()));
    }
    info!("POST /api/models/pull {}", model);

    let events: BoxStream<'static, PullProgressEvent> = match state.runtime.pull(&model).await {
        Ok(relay) => relay.into_stream().boxed(),
        Err(e) => {
            error!("Could not start pull of {}: {}", model, e);
            stream::once(async move { PullProgress::new().error(e.to_string()) }).boxed()
        }
    };

    let frames = events
        .map(|event| Event::default().json_data(&event))
        .chain(stream::once(async { Ok(Event::default().data("[DONE]")) }));

    Ok(Sse::new(frames).into_response())
}

/// A validated chat request plus a summary of the context that went in.
#[derive(Debug)]
pub struct PreparedChat {
    pub request: ChatRequest,
    pub context_info: ContextInfo,
}

/// Validate a chat body and assemble the system prompt with its context.
pub fn prepare_chat(config: &AppConfig, body: ChatCompletionRequest) -> Result<PreparedChat, ApiError> {
    let model = body.model.trim();
    if model.is_empty() {
        return Err(ApiError::BadRequest("Model is required".to_string()));
    }
    let conversation = NonEmpty::from_vec(body.messages)
        .ok_or_else(|| ApiError::BadRequest("At least one message is required".to_string()))?;

    let mut context_parts = Vec::new();
    let mut included_files = Vec::new();

    let uploaded = body.uploaded_files.unwrap_or_default();
    if let Some(section) = format_uploaded_files(&uploaded) {
        context_parts.push(section);
        included_files.extend(uploaded.into_iter().map(|f| f.filename));
    }

    if let Some(project) = &body.project_context {
        match &config.context.project_root {
            Some(root) => match ProjectContext::new(root) {
                Ok(ctx) => {
                    let section = ctx.with_max_file_size(config.context.max_file_size).build(project);
                    if !section.is_empty() {
                        context_parts.push(section);
                        included_files.extend(project.selected_files.iter().cloned());
                    }
                }
                Err(e) => warn!("Project root {} unavailable: {}", root.display(), e),
            },
            None => warn!("Project context requested but no project root is configured"),
        }
    }

    let mut system = body
        .system_prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| config.chat.system_prompt.clone());
    if !context_parts.is_empty() {
        system.push_str("\n\n");
        system.push_str(&context_parts.join("\n"));
    }

    let messages = NonEmpty {
        head: ChatMessage::system(system),
        tail: conversation.into(),
    };
    let context_info = ContextInfo {
        included_files,
        context_length: context_parts.iter().map(String::len).sum(),
        message_count: messages.len(),
    };
    let temperature = body.temperature.unwrap_or(config.chat.default_temperature);

    Ok(PreparedChat {
        request: ChatRequest::new(model, messages).with_temperature(temperature),
        context_info,
    })
}

/// Chat completions (POST /v1/chat/completions)
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(body): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    let streaming = body.stream;
    let prepared = prepare_chat(&state.config, body)?;
    let PreparedChat { request, context_info } = prepared;
    info!(
        "Chat with {} ({} messages, {} context bytes, stream={})",
        request.model, context_info.message_count, context_info.context_length, streaming
    );
    let base_url = &state.config.upstream.base_url;

    if !streaming {
        let mut completion = state.runtime.chat(&request).await.map_err(|e| {
            error!("Error in chat_completions: {}", e);
            ApiError::upstream(&e, &request.model, base_url)
        })?;
        completion.context_info = Some(context_info);
        return Ok(Json(completion).into_response());
    }

    let relay = state.runtime.chat_stream(&request).await.map_err(|e| {
        error!("Error in chat_completions: {}", e);
        ApiError::upstream(&e, &request.model, base_url)
    })?;

    let id = completion_id();
    let model = request.model;
    let created = Utc::now().timestamp();

    // The relay is dropped right after its terminal increment, which closes
    // the upstream connection and ends the response.
    let increments = stream::unfold(Some(relay), |relay| async move {
        let mut relay = relay?;
        let increment = relay.next().await?;
        let relay = (!increment.is_terminal()).then_some(relay);
        Some((increment, relay))
    });
    let frames = increments.flat_map(move |increment| stream::iter(chat_frames(&id, &model, created, increment)));

    Ok(Sse::new(frames).into_response())
}

/// SSE frames for one chat increment.
fn chat_frames(id: &str, model: &str, created: i64, increment: ChatIncrement) -> Vec<Result<Event, axum::Error>> {
    match increment {
        ChatIncrement::Delta(text) => vec![Event::default().json_data(ChatCompletionChunk::delta(id, model, created, text))],
        ChatIncrement::Done { .. } | ChatIncrement::Cancelled { .. } => vec![
            Event::default().json_data(ChatCompletionChunk::stop(id, model, created)),
            Ok(Event::default().data("[DONE]")),
        ],
        ChatIncrement::Empty => {
            warn!("Model {} returned an empty response", model);
            vec![
                Event::default().json_data(ChatCompletionChunk::empty(id, model, created)),
                Ok(Event::default().data("[DONE]")),
            ]
        }
        ChatIncrement::Failed { message, partial } => {
            warn!("Chat stream failed after {} bytes: {}", partial.len(), message);
            vec![Event::default().json_data(serde_json::json!({ "error": message }))]
        }
    }
}
