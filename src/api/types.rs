//! API request and response types

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogModel, SearchResult};
use crate::context::ProjectContextRequest;
use crate::model::{ChatMessage, ModelInfo, UploadedFile};

/// Body of `POST /v1/chat/completions`.
///
/// `model` and `messages` default to empty so that missing fields surface
/// as a 400 with a readable detail.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
    pub uploaded_files: Option<Vec<UploadedFile>>,
    pub project_context: Option<ProjectContextRequest>,
}

#[derive(Debug, Deserialize)]
pub struct PullModelRequest {
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

impl ModelList {
    pub fn new(data: Vec<ModelInfo>) -> Self {
        Self { object: "list", data }
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendedModels {
    pub models: &'static [CatalogModel],
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub exists: bool,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
