//! Streaming support types shared by the relays.
//!
//! A relay owns exactly one upstream [`ByteStream`]. [`UpstreamLines`] turns it
//! into complete lines, bounding every read by the configured read timeout
//! and racing it against the session's cancellation token.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::client::ClientError;
use crate::line::LineDecoder;

/// Body of an upstream response, chunked however the transport delivered it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Wrap a reqwest response body as a [`ByteStream`].
pub fn byte_stream(response: reqwest::Response) -> ByteStream {
    Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(ClientError::from)))
}

/// Lifecycle of one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Cancelled,
    Failed(String),
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

/// Handle the consumer uses to stop a relay.
///
/// Cloneable so it can be moved into a signal handler or another task while
/// the relay itself is being polled.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Request cancellation. Later calls have no further effect.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Live state of one in-flight relay.
///
/// `T` is the accumulated output: the full text for chat, the last progress
/// event for pulls.
#[derive(Debug)]
pub struct RelaySession<T> {
    status: SessionStatus,
    output: T,
    token: CancellationToken,
}

impl<T: Default> RelaySession<T> {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Running,
            output: T::default(),
            token: CancellationToken::new(),
        }
    }
}

impl<T: Default> Default for RelaySession<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RelaySession<T> {
    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn output(&self) -> &T {
        &self.output
    }

    pub(crate) fn output_mut(&mut self) -> &mut T {
        &mut self.output
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.token.clone(),
        }
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Move to a terminal status. The first terminal status sticks.
    pub(crate) fn finish(&mut self, status: SessionStatus) {
        if !self.status.is_terminal() {
            self.status = status;
        }
    }
}

/// Outcome of waiting for the next upstream line.
#[derive(Debug)]
pub enum LineEvent {
    Line(String),
    /// Upstream closed cleanly and every buffered line was handed out.
    End,
    Cancelled,
    Failed(ClientError),
}

/// Line reader over one upstream body.
pub struct UpstreamLines {
    upstream: Option<ByteStream>,
    decoder: LineDecoder,
    ready: VecDeque<String>,
    read_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl UpstreamLines {
    pub fn new(upstream: ByteStream, read_timeout: Option<Duration>, cancel: CancellationToken) -> Self {
        Self {
            upstream: Some(upstream),
            decoder: LineDecoder::new(),
            ready: VecDeque::new(),
            read_timeout,
            cancel,
        }
    }

    /// Wait for the next complete line.
    ///
    /// Cancellation wins over buffered lines and over a read that is still
    /// pending.
    pub async fn next(&mut self) -> LineEvent {
        loop {
            if self.cancel.is_cancelled() {
                self.release();
                return LineEvent::Cancelled;
            }
            if let Some(line) = self.ready.pop_front() {
                return LineEvent::Line(line);
            }
            let Some(upstream) = self.upstream.as_mut() else {
                return LineEvent::End;
            };

            let cancel = self.cancel.clone();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                read = read_chunk(upstream, self.read_timeout) => Some(read),
            };

            match outcome {
                None => {
                    self.release();
                    return LineEvent::Cancelled;
                }
                Some(Ok(Some(chunk))) => {
                    let lines = self.decoder.feed(&chunk);
                    self.ready.extend(lines);
                }
                Some(Ok(None)) => {
                    self.upstream = None;
                    if let Some(last) = self.decoder.finish() {
                        self.ready.push_back(last);
                    }
                }
                Some(Err(e)) => {
                    self.release();
                    return LineEvent::Failed(e);
                }
            }
        }
    }

    /// Drop the upstream body, closing the connection, and forget buffered lines.
    pub fn release(&mut self) {
        self.upstream = None;
        self.ready.clear();
    }

    pub fn is_released(&self) -> bool {
        self.upstream.is_none()
    }
}

async fn read_chunk(
    upstream: &mut ByteStream,
    read_timeout: Option<Duration>,
) -> Result<Option<Bytes>, ClientError> {
    let next = match read_timeout {
        Some(limit) => tokio::time::timeout(limit, upstream.next())
            .await
            .map_err(|_| ClientError::Timeout(limit))?,
        None => upstream.next().await,
    };
    next.transpose()
}
