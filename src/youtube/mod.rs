pub mod auth;
pub mod error;
pub mod oauth;
pub mod resumable;
pub mod token_store;
pub mod types;
pub mod uploader;

pub use auth::{build_auth_provider, AuthProvider, ServiceAccountAuth, UserTokenAuth};
pub use error::{AuthError, UploadError};
pub use resumable::{InsertRequest, ResumableTransport, TransferMode, VideoTransport};
pub use token_store::{StoredToken, TokenStore};
pub use types::{RemoteVideoId, UploadMetadata, VideoUploader};
pub use uploader::YoutubeUploader;

use std::sync::Arc;

use crate::config::Config;

/// Adapter wired from config: selected auth provider plus the HTTP resumable transport.
pub fn build_uploader(config: &Config) -> anyhow::Result<YoutubeUploader> {
    let auth = build_auth_provider(config)?;
    let transport = ResumableTransport::new(
        config.youtube.upload_base.clone(),
        config.youtube.max_resume_attempts,
    );
    Ok(YoutubeUploader::new(
        auth,
        Arc::new(transport),
        config.youtube.chunk_size,
    ))
}
