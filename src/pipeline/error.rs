use thiserror::Error;

use crate::youtube::UploadError;

/// Failures recovered at the level of a single notification. Each one is
/// logged and ends the handler run; none of them stop the listener.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Download failed: {0}")]
    Download(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Cleanup failed: {0}")]
    Cleanup(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Download(_) => "DownloadFailure",
            PipelineError::Auth(_) => "AuthFailure",
            PipelineError::Upload(_) => "UploadFailure",
            PipelineError::Cleanup(_) => "CleanupFailure",
        }
    }
}

impl From<UploadError> for PipelineError {
    fn from(e: UploadError) -> Self {
        if e.is_auth() {
            PipelineError::Auth(e.to_string())
        } else {
            PipelineError::Upload(e.to_string())
        }
    }
}
