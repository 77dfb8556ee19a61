//! Per-notification state machine:
//! `Received -> Filtered -> Downloading -> Uploading -> CleaningUp -> Done`,
//! with `Errored` as the terminal state after a failed download or upload.
//!
//! The local file is deleted once an upload attempt has concluded, whatever
//! its result. A download that never produced a file leaves nothing to delete.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::PipelineError;
use super::sanitize::{sanitize, SanitizedTitle};
use super::types::{CleanupOutcome, HandlerReport, HandlerState, MediaNotification};
use crate::config::{Config, UploadDefaults};
use crate::media::Transcoder;
use crate::youtube::{UploadMetadata, VideoUploader};

/// Download primitive owned by the channel listener.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Write the notification's media to `dest`, returning the byte count.
    async fn download(&self, notification: &MediaNotification, dest: &Path) -> anyhow::Result<u64>;
}

#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub work_dir: PathBuf,
    pub download_timeout: Duration,
    pub upload_timeout: Duration,
    pub defaults: UploadDefaults,
}

impl HandlerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_dir: config.work_dir(),
            download_timeout: Duration::from_secs(config.pipeline.download_timeout_secs),
            upload_timeout: Duration::from_secs(config.pipeline.upload_timeout_secs),
            defaults: config.youtube.defaults.clone(),
        }
    }
}

pub struct MediaIngestionHandler {
    downloader: Arc<dyn MediaDownloader>,
    uploader: Arc<dyn VideoUploader>,
    transcoder: Option<Transcoder>,
    settings: HandlerSettings,
}

impl MediaIngestionHandler {
    pub fn new(
        downloader: Arc<dyn MediaDownloader>,
        uploader: Arc<dyn VideoUploader>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            downloader,
            uploader,
            transcoder: None,
            settings,
        }
    }

    pub fn with_transcoder(mut self, transcoder: Option<Transcoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    /// Scratch directory of one event. Its name is the event id, so two
    /// events with the same caption never share a path.
    pub fn event_dir(&self, event_id: Uuid) -> PathBuf {
        self.settings.work_dir.join(event_id.to_string())
    }

    /// `<work_dir>/<event id>/<title>.mp4`
    pub fn local_path(&self, event_id: Uuid, title: &SanitizedTitle) -> PathBuf {
        self.event_dir(event_id).join(title.file_name())
    }

    pub async fn handle(&self, notification: MediaNotification) -> HandlerReport {
        let mut report = HandlerReport::new(&notification);

        if !notification.has_video || notification.media.is_none() {
            debug!("Skipping {}: no video payload", notification);
            report.advance(HandlerState::Done);
            return report;
        }
        report.advance(HandlerState::Filtered);

        let title = sanitize(notification.caption.as_deref());
        report.title = Some(title.clone());

        let event_dir = self.event_dir(notification.id);
        let local_file = self.local_path(notification.id, &title);

        report.advance(HandlerState::Downloading);
        info!(
            "New video detected from {}, downloading to {}",
            notification.source,
            local_file.display()
        );

        if let Err(e) = self.download(&notification, &event_dir, &local_file).await {
            error!("{} for {}: {}", e.kind(), notification.id, e);
            report.error = Some(e);
            // A transfer that died midway may have left a partial file behind.
            if local_file.exists() {
                report.advance(HandlerState::CleaningUp);
                report.cleanup = remove_local(&local_file).await;
            }
            remove_event_dir(&event_dir).await;
            report.advance(HandlerState::Errored);
            return report;
        }

        let (upload_path, transcoded) = self
            .maybe_transcode(&notification, &event_dir, &local_file, &title)
            .await;

        report.advance(HandlerState::Uploading);
        let metadata = UploadMetadata::new(&title, &self.settings.defaults);

        match timeout(
            self.settings.upload_timeout,
            self.uploader.upload(&upload_path, &metadata),
        )
        .await
        {
            Ok(Ok(id)) => {
                info!("Published {} as {}", notification.id, id.watch_url());
                report.remote_id = Some(id);
            }
            Ok(Err(e)) => {
                let err = PipelineError::from(e);
                error!("{} for {}: {}", err.kind(), notification.id, err);
                report.error = Some(err);
            }
            Err(_) => {
                let err = PipelineError::Upload(format!(
                    "timed out after {}s",
                    self.settings.upload_timeout.as_secs()
                ));
                error!("{} for {}: {}", err.kind(), notification.id, err);
                report.error = Some(err);
            }
        }

        report.advance(HandlerState::CleaningUp);
        report.cleanup = remove_local(&local_file).await;
        if let Some(path) = transcoded {
            if let CleanupOutcome::Failed(msg) = remove_local(&path).await {
                debug!("Transcoded copy left behind: {}", msg);
            }
            remove_event_dir(path.parent().unwrap_or(&event_dir)).await;
        }
        remove_event_dir(&event_dir).await;

        if report.error.is_some() {
            report.advance(HandlerState::Errored);
        } else {
            report.advance(HandlerState::Done);
        }
        report
    }

    async fn download(
        &self,
        notification: &MediaNotification,
        event_dir: &Path,
        dest: &Path,
    ) -> Result<(), PipelineError> {
        tokio::fs::create_dir_all(event_dir).await.map_err(|e| {
            PipelineError::Download(format!("create {}: {}", event_dir.display(), e))
        })?;

        match timeout(
            self.settings.download_timeout,
            self.downloader.download(notification, dest),
        )
        .await
        {
            Ok(Ok(bytes)) => {
                if !dest.exists() {
                    return Err(PipelineError::Download(format!(
                        "downloader reported success but {} does not exist",
                        dest.display()
                    )));
                }
                debug!("Downloaded {} bytes to {}", bytes, dest.display());
                Ok(())
            }
            Ok(Err(e)) => Err(PipelineError::Download(format!("{:#}", e))),
            Err(_) => Err(PipelineError::Download(format!(
                "timed out after {}s",
                self.settings.download_timeout.as_secs()
            ))),
        }
    }

    /// Returns the file to upload and, when a converted copy was written,
    /// its path so cleanup can remove it too.
    async fn maybe_transcode(
        &self,
        notification: &MediaNotification,
        event_dir: &Path,
        local_file: &Path,
        title: &SanitizedTitle,
    ) -> (PathBuf, Option<PathBuf>) {
        let transcoder = match &self.transcoder {
            Some(t) if Transcoder::needs_transcode(notification.mime_type()) => t,
            _ => return (local_file.to_path_buf(), None),
        };

        let out_dir = event_dir.join("transcoded");
        let converted = out_dir.join(title.file_name());
        if let Err(e) = tokio::fs::create_dir_all(&out_dir).await {
            warn!("Skipping transcode, cannot create {}: {}", out_dir.display(), e);
            return (local_file.to_path_buf(), None);
        }

        match transcoder.to_mp4(local_file, &converted).await {
            Ok(()) => (converted.clone(), Some(converted)),
            Err(e) => {
                warn!("Transcode failed, uploading original: {}", e);
                let leftover = converted.exists().then_some(converted);
                if leftover.is_none() {
                    remove_event_dir(&out_dir).await;
                }
                (local_file.to_path_buf(), leftover)
            }
        }
    }
}

async fn remove_local(path: &Path) -> CleanupOutcome {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!("Deleted local file {}", path.display());
            CleanupOutcome::Removed
        }
        Err(e) => {
            let err = PipelineError::Cleanup(format!("{}: {}", path.display(), e));
            warn!("{}", err);
            CleanupOutcome::Failed(err.to_string())
        }
    }
}

async fn remove_event_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove scratch directory {}: {}", dir.display(), e);
        }
    }
}
