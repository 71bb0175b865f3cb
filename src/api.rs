//! HTTP API: OpenAI-compatible chat, model management and the frontend.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

use std::sync::Arc;

use crate::client::ModelRuntime;
use crate::config::AppConfig;

pub use error::ApiError;
pub use routes::app_router;
pub use server::serve;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<dyn ModelRuntime>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(runtime: Arc<dyn ModelRuntime>, config: AppConfig) -> Self {
        Self {
            runtime,
            config: Arc::new(config),
        }
    }
}
