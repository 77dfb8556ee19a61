//! YouTube Data API v3 resumable upload.
//!
//! 1. `POST .../upload/youtube/v3/videos?uploadType=resumable` with the video
//!    resource as JSON. The session URI comes back in `Location`.
//! 2. `PUT` the bytes in chunks with `Content-Range`. `308` means "keep going",
//!    its `Range` header tells how much the server has.
//! 3. When a chunk dies on the wire (or with a 5xx), ask the session where it
//!    stands (`Content-Range: bytes */total`) and continue from there.

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use super::error::UploadError;
use super::types::{RemoteVideoId, UploadMetadata};
use crate::config::UPLOAD_CHUNK_GRANULARITY;

/// HTTP 308, which YouTube uses for "Resume Incomplete".
const RESUME_INCOMPLETE: u16 = 308;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Whole file in one request. Not used for videos.
    Simple,
    Resumable { chunk_size: usize },
}

impl TransferMode {
    pub fn is_resumable(&self) -> bool {
        matches!(self, TransferMode::Resumable { .. })
    }
}

#[derive(Debug, Clone)]
pub struct InsertRequest {
    pub access_token: String,
    pub path: PathBuf,
    pub metadata: UploadMetadata,
    pub content_type: String,
    pub mode: TransferMode,
}

/// Moves bytes to the hosting platform. The adapter decides the mode,
/// transports carry it out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoTransport: Send + Sync {
    async fn insert(&self, request: InsertRequest) -> Result<RemoteVideoId, UploadError>;
}

#[derive(Deserialize)]
struct VideoResponse {
    id: String,
}

pub struct ResumableTransport {
    http: Client,
    upload_base: String,
    max_resume_attempts: u32,
    resume_backoff: Duration,
}

impl ResumableTransport {
    pub fn new(upload_base: impl Into<String>, max_resume_attempts: u32) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("tube-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            upload_base: upload_base.into().trim_end_matches('/').to_string(),
            max_resume_attempts,
            resume_backoff: Duration::from_secs(1),
        }
    }

    pub fn with_resume_backoff(mut self, backoff: Duration) -> Self {
        self.resume_backoff = backoff;
        self
    }

    async fn start_session(
        &self,
        request: &InsertRequest,
        total: u64,
    ) -> Result<String, UploadError> {
        let url = format!(
            "{}/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status",
            self.upload_base
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&request.access_token)
            .header("X-Upload-Content-Type", &request.content_type)
            .header("X-Upload-Content-Length", total.to_string())
            .json(&request.metadata.to_resource())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        resp.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                UploadError::InvalidResponse("no Location header on session start".to_string())
            })
    }

    /// Ask the session how many bytes it holds.
    async fn query_offset(&self, session: &str, total: u64) -> Result<ChunkReply, UploadError> {
        let resp = self
            .http
            .put(session)
            .header(CONTENT_LENGTH, "0")
            .header(CONTENT_RANGE, format!("bytes */{}", total))
            .send()
            .await?;
        interpret(resp).await
    }

    async fn send_chunk(
        &self,
        session: &str,
        request: &InsertRequest,
        chunk: Vec<u8>,
        start: u64,
        total: u64,
    ) -> Result<ChunkReply, UploadError> {
        let end = start + chunk.len() as u64 - 1;
        let resp = self
            .http
            .put(session)
            .header(CONTENT_TYPE, &request.content_type)
            .header(CONTENT_LENGTH, chunk.len().to_string())
            .header(CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, total))
            .body(chunk)
            .send()
            .await?;
        interpret(resp).await
    }
}

/// What the session said after a PUT.
#[derive(Debug)]
enum ChunkReply {
    Complete(RemoteVideoId),
    /// Next byte the server expects.
    Incomplete(u64),
}

async fn interpret(resp: reqwest::Response) -> Result<ChunkReply, UploadError> {
    let status = resp.status();

    if status == StatusCode::OK || status == StatusCode::CREATED {
        let body: VideoResponse = resp
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(format!("video resource: {}", e)))?;
        return Ok(ChunkReply::Complete(RemoteVideoId(body.id)));
    }

    if status.as_u16() == RESUME_INCOMPLETE {
        let next = resp
            .headers()
            .get(RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_range_end)
            .map(|last| last + 1)
            .unwrap_or(0);
        return Ok(ChunkReply::Incomplete(next));
    }

    if status.is_server_error() {
        return Err(UploadError::Transport(format!("server error {}", status)));
    }

    let body = resp.text().await.unwrap_or_default();
    Err(UploadError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// `bytes=0-524287` → `524287`
fn parse_range_end(header: &str) -> Option<u64> {
    header
        .trim()
        .strip_prefix("bytes=")?
        .split('-')
        .nth(1)?
        .trim()
        .parse()
        .ok()
}

async fn read_chunk(
    file: &mut File,
    path: &Path,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>, UploadError> {
    let io_err = |source: std::io::Error| UploadError::Io {
        path: path.to_path_buf(),
        source,
    };
    file.seek(SeekFrom::Start(offset)).await.map_err(io_err)?;

    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = file.read(&mut buf[filled..]).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

#[async_trait]
impl VideoTransport for ResumableTransport {
    async fn insert(&self, request: InsertRequest) -> Result<RemoteVideoId, UploadError> {
        let chunk_size = match request.mode {
            TransferMode::Resumable { chunk_size } => chunk_size,
            TransferMode::Simple => return Err(UploadError::UnsupportedMode("simple")),
        };
        if chunk_size == 0 || chunk_size % UPLOAD_CHUNK_GRANULARITY != 0 {
            return Err(UploadError::UnsupportedMode(
                "chunk size must be a multiple of 256 KiB",
            ));
        }

        let io_err = |source: std::io::Error| UploadError::Io {
            path: request.path.clone(),
            source,
        };
        let mut file = File::open(&request.path).await.map_err(io_err)?;
        let total = file.metadata().await.map_err(io_err)?.len();
        if total == 0 {
            return Err(UploadError::EmptyFile(request.path.clone()));
        }

        let session = self.start_session(&request, total).await?;
        debug!("Opened resumable session for {} ({} bytes)", request.path.display(), total);

        let mut offset: u64 = 0;
        let mut resumes: u32 = 0;

        loop {
            let len = (total.saturating_sub(offset)).min(chunk_size as u64) as usize;
            let chunk = read_chunk(&mut file, &request.path, offset, len).await?;
            if chunk.is_empty() {
                return Err(UploadError::Io {
                    path: request.path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("file ended at byte {} of {}", offset, total),
                    ),
                });
            }

            let reply = match self
                .send_chunk(&session, &request, chunk, offset, total)
                .await
            {
                Ok(reply) => reply,
                Err(UploadError::Transport(e)) => {
                    resumes += 1;
                    if resumes > self.max_resume_attempts {
                        return Err(UploadError::ResumeExhausted(self.max_resume_attempts));
                    }
                    warn!(
                        "Chunk at byte {} failed ({}), resuming (attempt {}/{})",
                        offset, e, resumes, self.max_resume_attempts
                    );
                    tokio::time::sleep(self.resume_backoff * resumes).await;
                    match self.query_offset(&session, total).await {
                        Ok(reply) => reply,
                        // Status query failed as well: retry the same range
                        Err(UploadError::Transport(_)) => ChunkReply::Incomplete(offset),
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            };

            match reply {
                ChunkReply::Complete(id) => {
                    info!("Resumable upload finished: {} bytes, id {}", total, id);
                    return Ok(id);
                }
                ChunkReply::Incomplete(next) => {
                    if next >= total {
                        // Server has everything but has not produced the resource yet
                        return Err(UploadError::InvalidResponse(
                            "session complete without a video resource".to_string(),
                        ));
                    }
                    debug!("Session acknowledged {} of {} bytes", next, total);
                    offset = next;
                }
            }
        }
    }
}
