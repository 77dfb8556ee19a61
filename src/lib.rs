//! Watches a Telegram channel and re-uploads every posted video to YouTube.

pub mod config;
pub mod media;
pub mod pipeline;
pub mod server;
pub mod service;
pub mod telegram;
pub mod youtube;
