use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::error::UploadError;
use crate::config::UploadDefaults;
use crate::pipeline::SanitizedTitle;

/// Id of a published video, e.g. `dQw4w9WgXcQ`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteVideoId(pub String);

impl RemoteVideoId {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for RemoteVideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-upload metadata. Built fresh for every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
}

impl UploadMetadata {
    pub fn new(title: &SanitizedTitle, defaults: &UploadDefaults) -> Self {
        Self {
            title: title.as_str().to_string(),
            description: defaults.description.clone(),
            tags: defaults.tags.clone(),
            category_id: defaults.category_id.clone(),
            privacy_status: defaults.privacy_status.clone(),
        }
    }

    /// `videos.insert` request body with `snippet` and `status` parts.
    pub fn to_resource(&self) -> VideoResource<'_> {
        VideoResource {
            snippet: Snippet {
                title: &self.title,
                description: &self.description,
                tags: &self.tags,
                category_id: &self.category_id,
            },
            status: Status {
                privacy_status: &self.privacy_status,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VideoResource<'a> {
    pub snippet: Snippet<'a>,
    pub status: Status<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub tags: &'a [String],
    pub category_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status<'a> {
    pub privacy_status: &'a str,
}

/// Publishes a local file. Implementations log their own failures.
#[async_trait]
pub trait VideoUploader: Send + Sync {
    async fn upload(
        &self,
        path: &Path,
        metadata: &UploadMetadata,
    ) -> Result<RemoteVideoId, UploadError>;
}
