pub mod auth;
pub mod config;
pub mod serve;
pub mod upload;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tube-relay")]
#[command(author, version, about = "Re-upload videos posted to a Telegram channel to YouTube")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "TUBE_RELAY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay (listener, upload pipeline and HTTP server)
    Serve {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop a backgrounded relay
    Stop,

    /// Show relay status
    Status,

    /// Upload one local file with the configured credentials
    Upload(upload::UploadArgs),

    /// Google account authorization
    Auth(auth::AuthArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}
