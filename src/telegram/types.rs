//! Bot API objects, limited to the fields a channel post carrying video needs.

use serde::Deserialize;

use crate::pipeline::{MediaHandle, MediaNotification};

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
    pub channel_post: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub chat: TelegramChat,
    pub caption: Option<String>,
    pub text: Option<String>,
    pub video: Option<TelegramVideo>,
    pub document: Option<TelegramDocument>,
    pub animation: Option<TelegramVideo>,
    pub video_note: Option<TelegramVideoNote>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub username: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramVideo {
    pub file_id: String,
    pub file_unique_id: Option<String>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramDocument {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

/// Round video messages. Never uploaded.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramVideoNote {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramFile {
    pub file_id: String,
    pub file_size: Option<u64>,
    pub file_path: Option<String>,
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

impl TelegramMessage {
    /// Video attachment of this message, if any. Documents count when their
    /// MIME type is `video/*`.
    pub fn video_media(&self, include_animations: bool) -> Option<MediaHandle> {
        if let Some(v) = &self.video {
            return Some(MediaHandle {
                file_id: v.file_id.clone(),
                mime_type: v.mime_type.clone(),
                file_size: v.file_size,
            });
        }
        if let Some(doc) = &self.document {
            let is_video = doc
                .mime_type
                .as_deref()
                .map(|m| m.to_ascii_lowercase().starts_with("video/"))
                .unwrap_or(false);
            if is_video {
                return Some(MediaHandle {
                    file_id: doc.file_id.clone(),
                    mime_type: doc.mime_type.clone(),
                    file_size: doc.file_size,
                });
            }
        }
        if include_animations {
            if let Some(a) = &self.animation {
                return Some(MediaHandle {
                    file_id: a.file_id.clone(),
                    mime_type: a.mime_type.clone(),
                    file_size: a.file_size,
                });
            }
        }
        None
    }

    /// `@username` when the chat has one, otherwise the numeric id.
    pub fn source(&self) -> String {
        match &self.chat.username {
            Some(u) => format!("telegram:@{}", u),
            None => format!("telegram:{}", self.chat.id),
        }
    }

    pub fn to_notification(&self, include_animations: bool) -> MediaNotification {
        let caption = self.caption.clone().or_else(|| self.text.clone());
        let notification = MediaNotification::new(self.source()).with_caption(caption);
        match self.video_media(include_animations) {
            Some(media) => notification.with_video(media),
            None => notification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> TelegramUpdate {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_channel_post_with_video() {
        let update = parse(
            r#"{"update_id": 10, "channel_post": {
                "message_id": 5,
                "chat": {"id": -1001, "type": "channel", "username": "trips"},
                "caption": "My Trip: Day 1",
                "video": {"file_id": "AAA", "mime_type": "video/mp4", "file_size": 1024, "duration": 3}
            }}"#,
        );
        let post = update.channel_post.unwrap();
        let n = post.to_notification(false);
        assert!(n.has_video);
        assert_eq!(n.caption.as_deref(), Some("My Trip: Day 1"));
        assert_eq!(n.source, "telegram:@trips");
        assert_eq!(n.media.unwrap().file_id, "AAA");
    }

    #[test]
    fn test_video_document_counts() {
        let update = parse(
            r#"{"update_id": 11, "channel_post": {
                "message_id": 6,
                "chat": {"id": -1001, "type": "channel"},
                "document": {"file_id": "DOC", "mime_type": "video/quicktime"}
            }}"#,
        );
        let n = update.channel_post.unwrap().to_notification(false);
        assert!(n.has_video);
        assert_eq!(n.mime_type(), Some("video/quicktime"));
        assert_eq!(n.source, "telegram:-1001");
        assert!(n.caption.is_none());
    }

    #[test]
    fn test_non_video_posts() {
        let text = parse(
            r#"{"update_id": 12, "channel_post": {
                "message_id": 7, "chat": {"id": -1001, "type": "channel"}, "text": "hello"
            }}"#,
        );
        let n = text.channel_post.unwrap().to_notification(false);
        assert!(!n.has_video);
        assert_eq!(n.caption.as_deref(), Some("hello"));

        let pdf = parse(
            r#"{"update_id": 13, "channel_post": {
                "message_id": 8, "chat": {"id": -1001, "type": "channel"},
                "document": {"file_id": "PDF", "mime_type": "application/pdf"}
            }}"#,
        );
        assert!(!pdf.channel_post.unwrap().to_notification(false).has_video);

        let note = parse(
            r#"{"update_id": 14, "channel_post": {
                "message_id": 9, "chat": {"id": -1001, "type": "channel"},
                "video_note": {"file_id": "ROUND"}
            }}"#,
        );
        assert!(!note.channel_post.unwrap().to_notification(true).has_video);
    }

    #[test]
    fn test_animation_opt_in() {
        let update = parse(
            r#"{"update_id": 15, "channel_post": {
                "message_id": 10, "chat": {"id": -1001, "type": "channel"},
                "animation": {"file_id": "GIF", "mime_type": "video/mp4"}
            }}"#,
        );
        let post = update.channel_post.unwrap();
        assert!(!post.to_notification(false).has_video);
        assert!(post.to_notification(true).has_video);
    }
}
