use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use super::auth::AuthProvider;
use super::error::UploadError;
use super::resumable::{InsertRequest, TransferMode, VideoTransport};
use super::types::{RemoteVideoId, UploadMetadata, VideoUploader};

/// The upload client adapter: authenticate, then hand the file to the
/// transport in resumable mode. Failures are logged here and returned.
pub struct YoutubeUploader {
    auth: Arc<dyn AuthProvider>,
    transport: Arc<dyn VideoTransport>,
    chunk_size: usize,
}

impl YoutubeUploader {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        transport: Arc<dyn VideoTransport>,
        chunk_size: usize,
    ) -> Self {
        Self {
            auth,
            transport,
            chunk_size,
        }
    }

    /// Every upload goes through the resumable protocol, whatever the file size.
    fn transfer_mode(&self) -> TransferMode {
        TransferMode::Resumable {
            chunk_size: self.chunk_size,
        }
    }

    async fn try_upload(
        &self,
        path: &Path,
        metadata: &UploadMetadata,
    ) -> Result<RemoteVideoId, UploadError> {
        if !path.is_file() {
            return Err(UploadError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a readable file"),
            });
        }

        let access_token = self.auth.access_token().await?;

        let request = InsertRequest {
            access_token,
            path: path.to_path_buf(),
            metadata: metadata.clone(),
            content_type: content_type_for(path).to_string(),
            mode: self.transfer_mode(),
        };

        self.transport.insert(request).await
    }
}

#[async_trait]
impl VideoUploader for YoutubeUploader {
    async fn upload(
        &self,
        path: &Path,
        metadata: &UploadMetadata,
    ) -> Result<RemoteVideoId, UploadError> {
        info!(
            "Uploading {} as \"{}\" (auth: {})",
            path.display(),
            metadata.title,
            self.auth.name()
        );

        match self.try_upload(path, metadata).await {
            Ok(id) => {
                info!("Video uploaded successfully: {}", id.watch_url());
                Ok(id)
            }
            Err(e) => {
                error!("YouTube upload failed for {}: {}", path.display(), e);
                Err(e)
            }
        }
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadDefaults;
    use crate::pipeline::sanitize;
    use crate::youtube::error::AuthError;
    use crate::youtube::resumable::MockVideoTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StaticAuth;

    #[async_trait]
    impl AuthProvider for StaticAuth {
        async fn access_token(&self) -> Result<String, AuthError> {
            Ok("ya29.static".to_string())
        }
        fn name(&self) -> &'static str {
            "static"
        }
    }

    struct BrokenAuth;

    #[async_trait]
    impl AuthProvider for BrokenAuth {
        async fn access_token(&self) -> Result<String, AuthError> {
            Err(AuthError::TokenRequest("invalid_grant".to_string()))
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn metadata() -> UploadMetadata {
        UploadMetadata::new(&sanitize(Some("clip")), &UploadDefaults::default())
    }

    fn video_file(dir: &TempDir, name: &str, bytes: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, vec![7u8; bytes]).unwrap();
        path
    }

    #[tokio::test]
    async fn test_always_requests_resumable_mode() {
        let dir = TempDir::new().unwrap();
        let small = video_file(&dir, "small.mp4", 10);
        let large = video_file(&dir, "large.mp4", 3 * 1024 * 1024);

        let mut transport = MockVideoTransport::new();
        transport
            .expect_insert()
            .withf(|req| {
                req.mode == TransferMode::Resumable { chunk_size: 256 * 1024 }
                    && req.access_token == "ya29.static"
            })
            .times(2)
            .returning(|_| Ok(RemoteVideoId("id".to_string())));

        let uploader = YoutubeUploader::new(Arc::new(StaticAuth), Arc::new(transport), 256 * 1024);
        uploader.upload(&small, &metadata()).await.unwrap();
        uploader.upload(&large, &metadata()).await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_once_then_succeed() {
        let dir = TempDir::new().unwrap();
        let file = video_file(&dir, "clip.mp4", 1024);

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let mut transport = MockVideoTransport::new();
        transport
            .expect_insert()
            .withf(|req| req.mode.is_resumable())
            .times(2)
            .returning(move |_| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(UploadError::Transport("connection reset".to_string()))
                } else {
                    Ok(RemoteVideoId("second-time".to_string()))
                }
            });

        let uploader = YoutubeUploader::new(Arc::new(StaticAuth), Arc::new(transport), 512 * 1024);

        let first = uploader.upload(&file, &metadata()).await;
        assert!(matches!(first, Err(UploadError::Transport(_))));

        let second = uploader.upload(&file, &metadata()).await.unwrap();
        assert_eq!(second.0, "second-time");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_skips_transport() {
        let dir = TempDir::new().unwrap();
        let file = video_file(&dir, "clip.mp4", 10);

        let mut transport = MockVideoTransport::new();
        transport.expect_insert().times(0);

        let uploader = YoutubeUploader::new(Arc::new(BrokenAuth), Arc::new(transport), 256 * 1024);
        let err = uploader.upload(&file, &metadata()).await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let mut transport = MockVideoTransport::new();
        transport.expect_insert().times(0);

        let uploader = YoutubeUploader::new(Arc::new(StaticAuth), Arc::new(transport), 256 * 1024);
        let err = uploader
            .upload(&dir.path().join("gone.mp4"), &metadata())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Io { .. }));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a.MOV")), "video/quicktime");
        assert_eq!(content_type_for(Path::new("a")), "application/octet-stream");
    }
}
