use anyhow::Result;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use super::client::TelegramApi;
use super::types::{TelegramChat, TelegramUpdate};
use crate::pipeline::JobQueue;

/// The watched channel, as configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    Username(String),
    Id(i64),
}

impl ChannelRef {
    /// Accepts `@name`, `name`, a `t.me/name` link or a numeric chat id.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if let Ok(id) = trimmed.parse::<i64>() {
            return Ok(ChannelRef::Id(id));
        }
        let name = trimmed
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("t.me/")
            .trim_start_matches('@');
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            anyhow::bail!("Invalid channel reference: {:?}", raw);
        }
        Ok(ChannelRef::Username(name.to_string()))
    }

    pub fn matches(&self, chat: &TelegramChat) -> bool {
        match self {
            ChannelRef::Id(id) => chat.id == *id,
            ChannelRef::Username(name) => chat
                .username
                .as_deref()
                .map(|u| u.eq_ignore_ascii_case(name))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Username(name) => write!(f, "@{}", name),
            ChannelRef::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Watches one channel and turns its posts into queued notifications.
/// Runs as a long polling loop, or passively receives webhook updates.
pub struct ChannelListener {
    api: Arc<dyn TelegramApi>,
    channel: ChannelRef,
    queue: JobQueue,
    poll_timeout: u64,
    include_animations: bool,
    wake: Arc<Notify>,
    offset: Mutex<Option<i64>>,
}

impl ChannelListener {
    pub fn new(api: Arc<dyn TelegramApi>, channel: ChannelRef, queue: JobQueue) -> Self {
        Self {
            api,
            channel,
            queue,
            poll_timeout: 30,
            include_animations: false,
            wake: Arc::new(Notify::new()),
            offset: Mutex::new(None),
        }
    }

    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout = secs;
        self
    }

    pub fn with_animations(mut self, include: bool) -> Self {
        self.include_animations = include;
        self
    }

    pub fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    /// Handle that makes the polling loop skip its current wait and poll now.
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    pub async fn run(&self) {
        info!("Listening for videos in {} (long polling)", self.channel);

        let mut backoff_secs = 1;
        let mut immediate = false;

        loop {
            let timeout = if immediate { 0 } else { self.poll_timeout };
            immediate = false;

            // Only the fetch is raced against the trigger. Once updates are in
            // hand they are queued and the offset advanced without interruption.
            let fetched = tokio::select! {
                r = self.api.get_updates(self.current_offset(), timeout) => r,
                _ = self.wake.notified() => {
                    info!("Run-now trigger received, polling immediately");
                    immediate = true;
                    continue;
                }
            };
            let result = match fetched {
                Ok(updates) => self.enqueue(updates).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(n) => {
                    backoff_secs = 1;
                    if n > 0 {
                        debug!("Queued {} post(s) from {}", n, self.channel);
                    }
                }
                Err(e) => {
                    warn!(
                        "Telegram polling error: {}. Retrying in {}s...",
                        e, backoff_secs
                    );
                    tokio::select! {
                        _ = sleep(Duration::from_secs(backoff_secs)) => {}
                        _ = self.wake.notified() => immediate = true,
                    }
                    backoff_secs = (backoff_secs * 2).min(60);
                }
            }
        }
    }

    /// One `getUpdates` round. Returns how many posts were queued.
    pub async fn poll_once(&self, timeout: u64) -> Result<usize> {
        let updates = self.api.get_updates(self.current_offset(), timeout).await?;
        self.enqueue(updates).await
    }

    fn current_offset(&self) -> Option<i64> {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn advance_offset(&self, next: i64) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset = Some(next);
    }

    async fn enqueue(&self, updates: Vec<TelegramUpdate>) -> Result<usize> {
        let mut queued = 0;
        for update in updates {
            let next = update.update_id + 1;
            if self.accept(update).await? {
                queued += 1;
            }
            // Advance only once the post is in the queue, so a failed push
            // re-fetches it instead of losing it.
            self.advance_offset(next);
        }
        Ok(queued)
    }

    /// Queue a channel post from the watched channel. Everything else is
    /// ignored and `false` is returned.
    pub async fn accept(&self, update: TelegramUpdate) -> Result<bool> {
        let Some(post) = update.channel_post else {
            debug!("Ignoring update {}: not a channel post", update.update_id);
            return Ok(false);
        };
        if !self.channel.matches(&post.chat) {
            debug!(
                "Ignoring post from chat {} (watching {})",
                post.chat.id, self.channel
            );
            return Ok(false);
        }

        let notification = post.to_notification(self.include_animations);
        debug!("Queueing {}", notification);
        self.queue.push(notification).await?;
        Ok(true)
    }
}
