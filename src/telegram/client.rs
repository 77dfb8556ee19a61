use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::types::{ApiResponse, TelegramFile, TelegramUpdate};
use crate::pipeline::{MediaDownloader, MediaNotification};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// `getFile` refuses anything larger on the hosted Bot API.
pub const HOSTED_DOWNLOAD_LIMIT: u64 = 20 * 1024 * 1024;

#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn get_updates(&self, offset: Option<i64>, timeout: u64) -> Result<Vec<TelegramUpdate>>;

    async fn get_file(&self, file_id: &str) -> Result<TelegramFile>;

    /// Stream `file_path` into `dest`, returning the number of bytes written.
    async fn download_file(&self, file_path: &str, dest: &Path) -> Result<u64>;
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    bot_token: String,
    api_base: String,
}

impl TelegramClient {
    pub fn new(bot_token: String) -> Self {
        Self::with_api_base(bot_token, DEFAULT_API_BASE.to_string())
    }

    pub fn with_api_base(bot_token: String, api_base: String) -> Self {
        Self {
            client: Client::new(),
            bot_token,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_hosted(&self) -> bool {
        self.api_base == DEFAULT_API_BASE
    }

    /// Point Telegram at `url` for channel posts. `secret` comes back in the
    /// `X-Telegram-Bot-Api-Secret-Token` header of every delivery.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<()> {
        let mut body = json!({
            "url": url,
            "allowed_updates": ["channel_post"],
        });
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            body["secret_token"] = json!(secret);
        }
        let _: bool = self
            .call("setWebhook", body, Some(Duration::from_secs(30)))
            .await?;
        Ok(())
    }

    /// `getUpdates` is refused while a webhook is registered.
    pub async fn delete_webhook(&self) -> Result<()> {
        let _: bool = self
            .call("deleteWebhook", json!({}), Some(Duration::from_secs(30)))
            .await?;
        Ok(())
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let mut req = self.client.post(self.method_url(method)).json(&body);
        if let Some(t) = timeout {
            req = req.timeout(t);
        }
        // URLs carry the bot token, keep them out of error messages.
        let resp = req.send().await.map_err(|e| e.without_url())?;
        let status = resp.status();
        let parsed: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Telegram {} returned an unreadable body ({})", method, status))?;

        if !parsed.ok {
            anyhow::bail!(
                "Telegram {} failed ({}): {}",
                method,
                status,
                parsed.description.unwrap_or_default()
            );
        }
        parsed
            .result
            .ok_or_else(|| anyhow::anyhow!("Telegram {} returned no result", method))
    }
}

#[async_trait]
impl TelegramApi for TelegramClient {
    async fn get_updates(&self, offset: Option<i64>, timeout: u64) -> Result<Vec<TelegramUpdate>> {
        let mut body = json!({
            "timeout": timeout,
            "allowed_updates": ["channel_post"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", body, Some(Duration::from_secs(timeout + 10)))
            .await
    }

    async fn get_file(&self, file_id: &str) -> Result<TelegramFile> {
        self.call(
            "getFile",
            json!({ "file_id": file_id }),
            Some(Duration::from_secs(30)),
        )
        .await
    }

    async fn download_file(&self, file_path: &str, dest: &Path) -> Result<u64> {
        let url = format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.without_url())?;
        if !resp.status().is_success() {
            anyhow::bail!("Telegram file download failed: {}", resp.status());
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut stream = resp.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| e.without_url())?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

/// Resolves a notification's file id through `getFile` and streams it to disk.
pub struct TelegramDownloader {
    api: Arc<dyn TelegramApi>,
    size_limit: Option<u64>,
}

impl TelegramDownloader {
    pub fn new(api: Arc<dyn TelegramApi>) -> Self {
        Self {
            api,
            size_limit: None,
        }
    }

    pub fn with_size_limit(mut self, limit: Option<u64>) -> Self {
        self.size_limit = limit;
        self
    }
}

#[async_trait]
impl MediaDownloader for TelegramDownloader {
    async fn download(&self, notification: &MediaNotification, dest: &Path) -> Result<u64> {
        let media = notification
            .media
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("notification {} has no media", notification.id))?;

        if let (Some(limit), Some(size)) = (self.size_limit, media.file_size) {
            if size > limit {
                anyhow::bail!(
                    "file is {} bytes, over the {} byte Bot API download limit (use a self-hosted telegram.api_base)",
                    size,
                    limit
                );
            }
        }

        let file = self.api.get_file(&media.file_id).await?;
        let file_path = file
            .file_path
            .ok_or_else(|| anyhow::anyhow!("getFile returned no file_path for {}", media.file_id))?;
        debug!("Resolved {} to {}", media.file_id, file_path);

        self.api.download_file(&file_path, dest).await
    }
}
