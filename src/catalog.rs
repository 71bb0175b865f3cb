//! Recommended models and model search.

use serde::Serialize;

use crate::model::ModelInfo;

/// Most search results returned at once.
pub const MAX_SEARCH_RESULTS: usize = 20;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CatalogModel {
    pub id: &'static str,
    pub name: &'static str,
    pub size: &'static str,
    pub category: &'static str,
}

const fn entry(id: &'static str, name: &'static str, size: &'static str, category: &'static str) -> CatalogModel {
    CatalogModel {
        id,
        name,
        size,
        category,
    }
}

/// Popular models from the Ollama library.
pub const RECOMMENDED: &[CatalogModel] = &[
    entry("llama3.2:3b", "Llama 3.2 3B", "~2GB", "chat"),
    entry("llama3.2:1b", "Llama 3.2 1B", "~1.3GB", "chat"),
    entry("llama3.1:8b", "Llama 3.1 8B", "~4.7GB", "chat"),
    entry("llama3.1:70b", "Llama 3.1 70B", "~40GB", "chat"),
    entry("gemma2:9b", "Gemma 2 9B", "~5.4GB", "chat"),
    entry("gemma2:27b", "Gemma 2 27B", "~16GB", "chat"),
    entry("mistral:7b", "Mistral 7B", "~4.1GB", "chat"),
    entry("mixtral:8x7b", "Mixtral 8x7B", "~26GB", "chat"),
    entry("phi3:mini", "Phi-3 Mini", "~2.2GB", "chat"),
    entry("phi3:medium", "Phi-3 Medium", "~7.9GB", "chat"),
    entry("qwen2.5:7b", "Qwen 2.5 7B", "~4.4GB", "chat"),
    entry("qwen2.5:14b", "Qwen 2.5 14B", "~8.9GB", "chat"),
    entry("qwen2.5:32b", "Qwen 2.5 32B", "~19GB", "chat"),
    entry("qwen2.5-coder:7b", "Qwen 2.5 Coder 7B", "~4.4GB", "code"),
    entry("qwen2.5-coder:14b", "Qwen 2.5 Coder 14B", "~8.9GB", "code"),
    entry("qwen2.5-coder:32b", "Qwen 2.5 Coder 32B", "~19GB", "code"),
    entry("deepseek-coder-v2:16b", "DeepSeek Coder V2 16B", "~8.9GB", "code"),
    entry("codellama:7b", "CodeLlama 7B", "~3.8GB", "code"),
    entry("codellama:13b", "CodeLlama 13B", "~7.3GB", "code"),
    entry("starcoder2:7b", "StarCoder2 7B", "~4GB", "code"),
    entry("llava:7b", "LLaVA 7B", "~4.7GB", "vision"),
    entry("llava:13b", "LLaVA 13B", "~8GB", "vision"),
    entry("llava-llama3:8b", "LLaVA Llama3 8B", "~5GB", "vision"),
    entry("nomic-embed-text", "Nomic Embed Text", "~274MB", "embedding"),
    entry("mxbai-embed-large", "MXBai Embed Large", "~670MB", "embedding"),
];

/// One search hit, either a local model or a catalog entry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchResult {
    pub id: String,
    pub name: String,
    pub size: String,
    pub category: String,
    pub downloaded: bool,
}

/// Search local models and the catalog.
///
/// Local matches come first. Catalog entries already present locally are
/// skipped. Matching is a case-insensitive substring test on the id (and the
/// display name for catalog entries); an empty query matches everything.
pub fn search(local: &[ModelInfo], query: &str) -> Vec<SearchResult> {
    let query = query.trim().to_lowercase();
    let matches = |text: &str| query.is_empty() || text.to_lowercase().contains(&query);

    let local_hits = local.iter().filter(|m| matches(&m.id)).map(|m| SearchResult {
        id: m.id.clone(),
        name: m.id.clone(),
        size: String::new(),
        category: "local".to_string(),
        downloaded: true,
    });

    let catalog_hits = RECOMMENDED
        .iter()
        .filter(|c| !local.iter().any(|m| m.id == c.id))
        .filter(|c| matches(c.id) || matches(c.name))
        .map(|c| SearchResult {
            id: c.id.to_string(),
            name: c.name.to_string(),
            size: c.size.to_string(),
            category: c.category.to_string(),
            downloaded: false,
        });

    local_hits.chain(catalog_hits).take(MAX_SEARCH_RESULTS).collect()
}
