//! Model download relay.
//!
//! Ollama reports a pull as a sequence of status records:
//! ```text
//! {"status":"pulling manifest"}
//! {"status":"pulling 8eeb52dfb3bb","digest":"sha256:8eeb…","total":4661211808,"completed":241173}
//! {"status":"verifying sha256 digest"}
//! {"status":"writing manifest"}
//! {"status":"success"}
//! ```
//! [`PullProgress`] folds those into [`PullProgressEvent`]s whose percent never
//! goes backwards, even when a later layer restarts its byte count at zero.

use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::sse::{decode_line, Frame};
use crate::stream::{ByteStream, CancelHandle, LineEvent, RelaySession, SessionStatus, UpstreamLines};

/// Percent shown while the manifest is fetched.
const MANIFEST_PERCENT: u8 = 5;
/// Percent shown once a layer size is known but no bytes arrived yet.
const PREPARING_PERCENT: u8 = 10;
/// Highest percent reported before the upstream confirms completion.
const MAX_RUNNING_PERCENT: u8 = 99;

/// Coarse stage of a download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullPhase {
    #[default]
    Manifest,
    Downloading,
    Verifying,
    Complete,
    Error,
    Cancelled,
}

impl PullPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, PullPhase::Complete | PullPhase::Error | PullPhase::Cancelled)
    }
}

/// Normalized progress record handed to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullProgressEvent {
    pub phase: PullPhase,
    /// Upstream status label, passed through for display.
    pub status: String,
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_completed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_total: Option<u64>,
    /// Error text, verbatim from the upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PullProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// Upstream status, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullStatus {
    PullingManifest,
    /// `"pulling"` or `"pulling <digest>"`.
    Pulling,
    Verifying,
    Success,
    Complete,
    /// Anything else: "writing manifest", "removing any unused layers", ...
    Other(String),
}

impl PullStatus {
    pub fn parse(status: &str) -> Self {
        let status = status.trim();
        match status {
            "pulling manifest" => PullStatus::PullingManifest,
            "success" => PullStatus::Success,
            "complete" => PullStatus::Complete,
            s if s == "pulling" || s.starts_with("pulling ") => PullStatus::Pulling,
            s if s.starts_with("verifying") => PullStatus::Verifying,
            s => PullStatus::Other(s.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PullStatus::Success | PullStatus::Complete)
    }
}

/// One upstream status record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRecord {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl PullRecord {
    fn layer_id(&self) -> Option<String> {
        self.digest.clone().or_else(|| {
            self.status
                .strip_prefix("pulling ")
                .filter(|rest| *rest != "manifest")
                .map(str::to_string)
        })
    }
}

/// Percent bookkeeping for one download session.
#[derive(Debug, Default)]
pub struct PullProgress {
    phase: PullPhase,
    percent: u8,
}

impl PullProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Map one upstream record to a progress event.
    pub fn apply(&mut self, record: &PullRecord) -> PullProgressEvent {
        let status = PullStatus::parse(&record.status);
        if status.is_success() {
            return self.complete(&record.status);
        }
        let (phase, computed) = match &status {
            PullStatus::PullingManifest => (PullPhase::Manifest, Some(MANIFEST_PERCENT)),
            PullStatus::Pulling => (PullPhase::Downloading, download_percent(record)),
            PullStatus::Verifying => (PullPhase::Verifying, None),
            PullStatus::Success | PullStatus::Complete | PullStatus::Other(_) => (self.phase, None),
        };

        self.phase = phase;
        if let Some(percent) = computed {
            self.percent = self.percent.max(percent);
        }

        let downloading = status == PullStatus::Pulling;
        PullProgressEvent {
            phase,
            status: record.status.clone(),
            percent: self.percent,
            layer_id: if downloading { record.layer_id() } else { None },
            bytes_completed: if downloading { record.completed } else { None },
            bytes_total: if downloading { record.total } else { None },
            message: None,
        }
    }

    pub fn complete(&mut self, status: &str) -> PullProgressEvent {
        self.phase = PullPhase::Complete;
        self.percent = 100;
        self.terminal(status, None)
    }

    pub fn error(&mut self, message: String) -> PullProgressEvent {
        self.phase = PullPhase::Error;
        self.terminal("error", Some(message))
    }

    pub fn cancelled(&mut self) -> PullProgressEvent {
        self.phase = PullPhase::Cancelled;
        self.terminal("cancelled", None)
    }

    fn terminal(&self, status: &str, message: Option<String>) -> PullProgressEvent {
        PullProgressEvent {
            phase: self.phase,
            status: status.to_string(),
            percent: self.percent,
            message,
            ..Default::default()
        }
    }
}

fn download_percent(record: &PullRecord) -> Option<u8> {
    let total = record.total.filter(|t| *t > 0)?;
    match record.completed.filter(|c| *c > 0) {
        Some(completed) => {
            let ratio = (u128::from(completed) * 100 / u128::from(total)).min(u128::from(MAX_RUNNING_PERCENT));
            Some(ratio as u8)
        }
        None => Some(PREPARING_PERCENT),
    }
}

/// Drives one model download.
pub struct ModelPullRelay {
    lines: UpstreamLines,
    session: RelaySession<Option<PullProgressEvent>>,
    progress: PullProgress,
    terminal_sent: bool,
}

impl ModelPullRelay {
    pub fn new(upstream: ByteStream, read_timeout: Option<Duration>) -> Self {
        let session = RelaySession::new();
        let lines = UpstreamLines::new(upstream, read_timeout, session.token());
        Self {
            lines,
            session,
            progress: PullProgress::new(),
            terminal_sent: false,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.session.cancel_handle()
    }

    /// Session state; the output is the last event delivered.
    pub fn session(&self) -> &RelaySession<Option<PullProgressEvent>> {
        &self.session
    }

    /// Next progress event, or `None` after the terminal one.
    pub async fn next(&mut self) -> Option<PullProgressEvent> {
        if self.terminal_sent {
            return None;
        }
        let event = self.advance().await;
        if event.is_terminal() {
            self.terminal_sent = true;
            self.lines.release();
            self.session.finish(match event.phase {
                PullPhase::Complete => SessionStatus::Completed,
                PullPhase::Cancelled => SessionStatus::Cancelled,
                _ => SessionStatus::Failed(event.message.clone().unwrap_or_default()),
            });
        }
        *self.session.output_mut() = Some(event.clone());
        Some(event)
    }

    pub fn into_stream(self) -> impl Stream<Item = PullProgressEvent> + Send {
        futures::stream::unfold(self, |mut relay| async move {
            let event = relay.next().await?;
            Some((event, relay))
        })
    }

    async fn advance(&mut self) -> PullProgressEvent {
        loop {
            let line = match self.lines.next().await {
                LineEvent::Line(line) => line,
                LineEvent::End => {
                    warn!("Pull stream closed without a success status");
                    return self.progress.complete("success");
                }
                LineEvent::Cancelled => return self.progress.cancelled(),
                LineEvent::Failed(e) => return self.progress.error(e.to_string()),
            };

            let payload = match decode_line(&line) {
                None => continue,
                Some(Frame::Done) => return self.progress.complete("success"),
                Some(Frame::Error(message)) => return self.progress.error(message),
                Some(Frame::Object(value)) => value,
            };

            match serde_json::from_value::<PullRecord>(payload) {
                Ok(record) => return self.progress.apply(&record),
                Err(e) => debug!("Skipping pull frame with unexpected shape: {}", e),
            }
        }
    }
}
