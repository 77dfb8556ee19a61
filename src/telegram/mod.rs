pub mod client;
pub mod listener;
pub mod types;

pub use client::{TelegramApi, TelegramClient, TelegramDownloader, HOSTED_DOWNLOAD_LIMIT};
pub use listener::{ChannelListener, ChannelRef};
pub use types::{TelegramChat, TelegramMessage, TelegramUpdate};
