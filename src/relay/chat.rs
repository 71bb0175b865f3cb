//! Chat completion relay.
//!
//! Accepts both OpenAI-style chunks (`choices[0].delta.content`, ended by
//! `data: [DONE]`) and Ollama's native NDJSON (`message.content`, ended by
//! `"done": true`).

use std::time::Duration;

use futures::Stream;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::sse::{decode_line, Frame};
use crate::stream::{ByteStream, CancelHandle, LineEvent, RelaySession, SessionStatus, UpstreamLines};

/// What the caller receives incrementally.
///
/// Zero or more `Delta`s are followed by exactly one terminal increment.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatIncrement {
    /// Next piece of assistant text.
    Delta(String),
    /// Upstream finished; `text` is everything that was streamed.
    Done { text: String },
    /// Upstream finished without producing any text.
    Empty,
    /// The upstream reported an error or the transport broke. Deltas already
    /// delivered stay valid; `partial` is their concatenation.
    Failed { message: String, partial: String },
    /// The consumer cancelled.
    Cancelled { partial: String },
}

impl ChatIncrement {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatIncrement::Delta(_))
    }

    pub fn as_delta(&self) -> Option<&str> {
        match self {
            ChatIncrement::Delta(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Drives one streaming chat response.
///
/// # Example
/// ```ignore
/// let mut relay = runtime.chat_stream(&request).await?;
/// let cancel = relay.cancel_handle();
/// while let Some(increment) = relay.next().await {
///     if let Some(text) = increment.as_delta() {
///         print!("{text}");
///     }
/// }
/// ```
pub struct ChatStreamRelay {
    lines: UpstreamLines,
    session: RelaySession<String>,
    done_pending: bool,
    terminal_sent: bool,
}

impl ChatStreamRelay {
    pub fn new(upstream: ByteStream, read_timeout: Option<Duration>) -> Self {
        let session = RelaySession::new();
        let lines = UpstreamLines::new(upstream, read_timeout, session.token());
        Self {
            lines,
            session,
            done_pending: false,
            terminal_sent: false,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.session.cancel_handle()
    }

    pub fn session(&self) -> &RelaySession<String> {
        &self.session
    }

    /// Next increment, or `None` once the terminal increment was delivered.
    pub async fn next(&mut self) -> Option<ChatIncrement> {
        if self.terminal_sent {
            self.drain().await;
            return None;
        }
        let increment = self.advance().await;
        self.terminal_sent = increment.is_terminal();
        Some(increment)
    }

    /// Turn the relay into a `Stream` of increments.
    pub fn into_stream(self) -> impl Stream<Item = ChatIncrement> + Send {
        futures::stream::unfold(self, |mut relay| async move {
            let increment = relay.next().await?;
            Some((increment, relay))
        })
    }

    async fn advance(&mut self) -> ChatIncrement {
        loop {
            if self.done_pending {
                return self.complete();
            }

            let line = match self.lines.next().await {
                LineEvent::Line(line) => line,
                LineEvent::End => {
                    warn!("Chat stream closed without a terminal marker");
                    return self.complete();
                }
                LineEvent::Cancelled => return self.cancelled(),
                LineEvent::Failed(e) => return self.fail(e.to_string()),
            };

            let payload = match decode_line(&line) {
                None => continue,
                Some(Frame::Done) => return self.complete(),
                Some(Frame::Error(message)) => {
                    self.lines.release();
                    return self.fail(message);
                }
                Some(Frame::Object(value)) => value,
            };

            let chunk: UpstreamChunk = match serde_json::from_value(payload) {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!("Skipping chat frame with unexpected shape: {}", e);
                    continue;
                }
            };

            self.done_pending = chunk.done;
            if let Some(content) = chunk.into_content().filter(|c| !c.is_empty()) {
                self.session.output_mut().push_str(&content);
                return ChatIncrement::Delta(content);
            }
        }
    }

    fn complete(&mut self) -> ChatIncrement {
        self.session.finish(SessionStatus::Completed);
        let text = self.session.output().clone();
        if text.is_empty() {
            ChatIncrement::Empty
        } else {
            ChatIncrement::Done { text }
        }
    }

    fn fail(&mut self, message: String) -> ChatIncrement {
        self.session.finish(SessionStatus::Failed(message.clone()));
        ChatIncrement::Failed {
            message,
            partial: self.session.output().clone(),
        }
    }

    fn cancelled(&mut self) -> ChatIncrement {
        self.session.finish(SessionStatus::Cancelled);
        ChatIncrement::Cancelled {
            partial: self.session.output().clone(),
        }
    }

    /// Read whatever the upstream still sends after completion.
    ///
    /// Nothing read here reaches the caller.
    async fn drain(&mut self) {
        if self.lines.is_released() {
            return;
        }
        loop {
            match self.lines.next().await {
                LineEvent::Line(line) => {
                    if let Some(frame) = decode_line(&line) {
                        warn!("Ignoring frame after end of chat stream: {:?}", frame);
                    }
                }
                LineEvent::End | LineEvent::Cancelled => break,
                LineEvent::Failed(e) => {
                    debug!("Chat stream failed while draining: {}", e);
                    break;
                }
            }
        }
    }
}

// --- Upstream chunk shapes ---

#[derive(Debug, Default, Deserialize)]
struct UpstreamChunk {
    #[serde(default)]
    choices: Vec<UpstreamChoice>,
    #[serde(default)]
    message: Option<UpstreamMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct UpstreamChoice {
    #[serde(default)]
    delta: Option<UpstreamMessage>,
}

#[derive(Debug, Deserialize)]
struct UpstreamMessage {
    #[serde(default)]
    content: Option<String>,
}

impl UpstreamChunk {
    fn into_content(self) -> Option<String> {
        let from_choice = self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content);
        from_choice.or_else(|| self.message.and_then(|m| m.content))
    }
}
