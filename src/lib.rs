//! # ollachat - local chat and model-download relay for Ollama
//!
//! A thin web server that lets a browser chat with models hosted by a local
//! Ollama runtime, download new models, and inject uploaded or project files
//! into prompts.
//!
//! ## Architecture
//!
//! The heart of the crate is the streaming relay pipeline:
//!
//! 1. [`line::LineDecoder`] reassembles UTF-8 lines from arbitrary byte chunks
//! 2. [`sse::decode_line`] turns each line into a [`sse::Frame`], dropping
//!    malformed ones
//! 3. [`relay::ChatStreamRelay`] forwards chat text as [`relay::ChatIncrement`]s
//! 4. [`relay::ModelPullRelay`] turns download status records into monotonic
//!    [`relay::PullProgressEvent`]s
//!
//! Both relays can be cancelled at any time through a
//! [`stream::CancelHandle`] and bound every upstream read by a timeout.
//!
//! The upstream is reached through the [`ModelRuntime`] trait;
//! [`OllamaClient`] implements it over HTTP. The [`api`] module exposes
//! everything as an OpenAI-compatible axum server.
//!
//! ## Example
//! ```no_run
//! use nonempty::NonEmpty;
//! use ollachat::model::{ChatMessage, ChatRequest};
//! use ollachat::options::TransportOptions;
//! use ollachat::{ModelRuntime, OllamaClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OllamaClient::new(TransportOptions::default())?;
//!     let request = ChatRequest::new("llama3.2", NonEmpty::new(ChatMessage::user("Hello!")));
//!
//!     let mut relay = client.chat_stream(&request).await?;
//!     while let Some(increment) = relay.next().await {
//!         if let Some(text) = increment.as_delta() {
//!             print!("{text}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod catalog;
pub mod client;
pub mod config;
pub mod context;
pub mod http;
pub mod line;
pub mod logging;
pub mod model;
pub mod options;
pub mod providers;
pub mod relay;
pub mod sse;
pub mod stream;

// Re-exports for convenience
pub use client::{ClientError, ModelRuntime};
pub use model::{ChatCompletion, ChatMessage, ChatRequest};
pub use providers::OllamaClient;
pub use relay::{ChatIncrement, ChatStreamRelay, ModelPullRelay, PullProgressEvent};
