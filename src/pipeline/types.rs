use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use super::error::PipelineError;
use super::sanitize::SanitizedTitle;
use crate::youtube::RemoteVideoId;

/// Reference to the media attached to a channel post. Opaque to the
/// pipeline; only the listener's downloader knows how to resolve it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandle {
    pub file_id: String,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

/// One inbound "new media" event.
#[derive(Debug, Clone)]
pub struct MediaNotification {
    pub id: Uuid,
    pub source: String,
    pub has_video: bool,
    pub caption: Option<String>,
    pub media: Option<MediaHandle>,
    pub received_at: DateTime<Utc>,
}

impl MediaNotification {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            has_video: false,
            caption: None,
            media: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_video(mut self, media: MediaHandle) -> Self {
        self.has_video = true;
        self.media = Some(media);
        self
    }

    pub fn with_caption(mut self, caption: Option<String>) -> Self {
        self.caption = caption;
        self
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.media.as_ref().and_then(|m| m.mime_type.as_deref())
    }
}

impl fmt::Display for MediaNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} from {} (video: {})",
            self.received_at.format("%Y-%m-%dT%H:%M:%SZ"),
            self.id,
            self.source,
            self.has_video
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Received,
    Filtered,
    Downloading,
    Uploading,
    CleaningUp,
    Done,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// No local file ever existed
    NotAttempted,
    Removed,
    Failed(String),
}

/// Everything one handler run did, in order.
#[derive(Debug, Clone)]
pub struct HandlerReport {
    pub event_id: Uuid,
    pub source: String,
    pub title: Option<SanitizedTitle>,
    pub trail: Vec<HandlerState>,
    pub remote_id: Option<RemoteVideoId>,
    pub error: Option<PipelineError>,
    pub cleanup: CleanupOutcome,
}

impl HandlerReport {
    pub fn new(notification: &MediaNotification) -> Self {
        Self {
            event_id: notification.id,
            source: notification.source.clone(),
            title: None,
            trail: vec![HandlerState::Received],
            remote_id: None,
            error: None,
            cleanup: CleanupOutcome::NotAttempted,
        }
    }

    pub fn advance(&mut self, state: HandlerState) {
        self.trail.push(state);
    }

    pub fn state(&self) -> HandlerState {
        self.trail
            .last()
            .copied()
            .unwrap_or(HandlerState::Received)
    }

    pub fn visited(&self, state: HandlerState) -> bool {
        self.trail.contains(&state)
    }

    /// Finished without touching the video (no video payload).
    pub fn is_skip(&self) -> bool {
        self.state() == HandlerState::Done && !self.visited(HandlerState::Filtered)
    }
}

impl fmt::Display for HandlerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = self
            .title
            .as_ref()
            .map(|t| t.as_str())
            .unwrap_or("-");
        write!(f, "{} \"{}\" -> {:?}", self.event_id, title, self.state())?;
        if let Some(id) = &self.remote_id {
            write!(f, " ({})", id.watch_url())?;
        }
        if let Some(err) = &self.error {
            write!(f, " [{}: {}]", err.kind(), err)?;
        }
        Ok(())
    }
}
