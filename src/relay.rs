//! Relays: one upstream stream in, one normalized caller-facing stream out.

pub mod chat;
pub mod pull;

pub use chat::{ChatIncrement, ChatStreamRelay};
pub use pull::{ModelPullRelay, PullPhase, PullProgress, PullProgressEvent, PullStatus};
