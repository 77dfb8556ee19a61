use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to load credentials: {0}")]
    Credentials(String),

    #[error("Token request failed: {0}")]
    TokenRequest(String),

    #[error("No usable token and interactive authorization is disabled (run `tube-relay auth login`)")]
    InteractiveRequired,

    #[error("Interactive authorization failed: {0}")]
    Interactive(String),

    #[error("Token store error: {0}")]
    Store(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to upload empty file {0}")]
    EmptyFile(PathBuf),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upload rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Resumable session could not be resumed after {0} attempts")]
    ResumeExhausted(u32),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported transfer mode: {0}")]
    UnsupportedMode(&'static str),
}

impl UploadError {
    pub fn is_auth(&self) -> bool {
        matches!(self, UploadError::Auth(_)) || matches!(self, UploadError::Rejected { status: 401, .. })
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        UploadError::Transport(e.to_string())
    }
}
