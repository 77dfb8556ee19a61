
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Resumable upload chunks must be a multiple of this size.
pub const UPLOAD_CHUNK_GRANULARITY: usize = 256 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub youtube: YoutubeConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TelegramMode {
    #[default]
    Polling,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token. The bot must be an administrator of the watched channel.
    pub bot_token: Option<String>,

    /// Channel to watch: `@username` or numeric chat id (e.g. `-1001234567890`)
    pub channel: Option<String>,

    #[serde(default)]
    pub mode: TelegramMode,

    /// Bot API base URL. Point at a self-hosted Bot API server to lift the 20 MB download limit.
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    /// Long polling timeout in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: u64,

    /// Expected `X-Telegram-Bot-Api-Secret-Token` in webhook mode
    pub webhook_secret: Option<String>,

    /// Public HTTPS URL of `/telegram/webhook`. When set in webhook mode it is
    /// registered with `setWebhook` at startup.
    pub webhook_url: Option<String>,

    /// Treat GIF-style animations as videos
    #[serde(default)]
    pub include_animations: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel: None,
            mode: TelegramMode::Polling,
            api_base: default_telegram_api_base(),
            poll_timeout: default_poll_timeout(),
            webhook_secret: None,
            webhook_url: None,
            include_animations: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ServiceAccount,
    UserToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,

    /// Path to a service account JSON key
    pub service_account_file: Option<String>,

    /// Base64-encoded service account JSON (env: GOOGLE_SERVICE_ACCOUNT_JSON)
    pub service_account_json_b64: Option<String>,

    /// Path to an installed-app OAuth client secrets JSON
    pub client_secrets_file: Option<String>,

    /// Base64-encoded client secrets JSON (env: GOOGLE_CREDENTIALS)
    pub client_secrets_json_b64: Option<String>,

    /// Where the user token is persisted (default: ~/.tube-relay/token.json)
    pub token_file: Option<String>,

    /// Allow the browser consent flow when no usable token exists
    #[serde(default = "default_true")]
    pub allow_interactive: bool,

    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::ServiceAccount,
            service_account_file: None,
            service_account_json_b64: None,
            client_secrets_file: None,
            client_secrets_json_b64: None,
            token_file: None,
            allow_interactive: true,
            token_uri: default_token_uri(),
            auth_uri: default_auth_uri(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDefaults {
    #[serde(default = "default_description")]
    pub description: String,

    #[serde(default = "default_tags")]
    pub tags: Vec<String>,

    /// 22 = "People & Blogs"
    #[serde(default = "default_category_id")]
    pub category_id: String,

    #[serde(default = "default_privacy_status")]
    pub privacy_status: String,
}

impl Default for UploadDefaults {
    fn default() -> Self {
        Self {
            description: default_description(),
            tags: default_tags(),
            category_id: default_category_id(),
            privacy_status: default_privacy_status(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub defaults: UploadDefaults,

    #[serde(default = "default_upload_base")]
    pub upload_base: String,

    /// Bytes per resumable chunk, multiple of 256 KiB
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// How many times an interrupted chunk transfer is resumed
    #[serde(default = "default_max_resume_attempts")]
    pub max_resume_attempts: u32,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            defaults: UploadDefaults::default(),
            upload_base: default_upload_base(),
            chunk_size: default_chunk_size(),
            max_resume_attempts: default_max_resume_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Scratch directory for downloaded videos
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            queue_capacity: default_queue_capacity(),
            download_timeout_secs: default_download_timeout(),
            upload_timeout_secs: default_upload_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind")]
    pub bind: String,

    /// Expected `X-Trigger-Token` on the run-now endpoint
    pub trigger_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_port(),
            bind: default_bind(),
            trigger_token: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscodeConfig {
    #[serde(default)]
    pub enabled: bool,

    /// ffmpeg binary; looked up on PATH when unset
    pub ffmpeg_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_poll_timeout() -> u64 {
    30
}
fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}
fn default_description() -> String {
    "Uploaded from Telegram".to_string()
}
fn default_tags() -> Vec<String> {
    vec![
        "Telegram".to_string(),
        "AutoUpload".to_string(),
        "PythonBot".to_string(),
    ]
}
fn default_category_id() -> String {
    "22".to_string()
}
fn default_privacy_status() -> String {
    "public".to_string()
}
fn default_upload_base() -> String {
    "https://www.googleapis.com".to_string()
}
fn default_chunk_size() -> usize {
    8 * 1024 * 1024
}
fn default_max_resume_attempts() -> u32 {
    5
}
fn default_work_dir() -> String {
    "~/.tube-relay/work".to_string()
}
fn default_max_concurrent_jobs() -> usize {
    2
}
fn default_queue_capacity() -> usize {
    64
}
fn default_download_timeout() -> u64 {
    30 * 60
}
fn default_upload_timeout() -> u64 {
    60 * 60
}
fn default_port() -> u16 {
    8443
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from `path` (or the default location), apply environment
    /// overrides and validate. A missing file is created from the template.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::load_unvalidated(path)?;
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// Same as [`Config::load`] minus validation. Used by commands that only
    /// need part of the config (`upload`, `config show`).
    pub fn load_unvalidated(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            Self::from_toml(&content)?
        } else {
            Self::save_template(&path)?;
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.expand_env_vars();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        Ok(config)
    }

    /// Environment variables used by container deployments. They win over the file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(channel) = non_empty("CHANNEL_USERNAME") {
            self.telegram.channel = Some(channel);
        }
        if let Some(sa) = non_empty("GOOGLE_SERVICE_ACCOUNT_JSON") {
            self.youtube.auth.service_account_json_b64 = Some(sa);
        }
        if let Some(secrets) = non_empty("GOOGLE_CREDENTIALS") {
            self.youtube.auth.client_secrets_json_b64 = Some(secrets);
        }
        if let Some(port) = non_empty("PORT").and_then(|p| p.trim().parse().ok()) {
            self.server.port = port;
        }
    }

    fn expand_env_vars(&mut self) {
        let fields = [
            &mut self.telegram.bot_token,
            &mut self.telegram.webhook_secret,
            &mut self.server.trigger_token,
            &mut self.youtube.auth.service_account_json_b64,
            &mut self.youtube.auth.client_secrets_json_b64,
        ];
        for field in fields {
            if let Some(value) = field.as_mut() {
                *value = expand_env(value);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_telegram()?;
        self.validate_youtube()?;

        if self.pipeline.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.queue_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_telegram(&self) -> Result<(), ConfigError> {
        if is_blank(&self.telegram.bot_token) {
            return Err(ConfigError::Missing(
                "telegram.bot_token (or TELEGRAM_BOT_TOKEN)".to_string(),
            ));
        }
        let channel = match self.telegram.channel.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => {
                return Err(ConfigError::Missing(
                    "telegram.channel (or CHANNEL_USERNAME)".to_string(),
                ))
            }
        };
        crate::telegram::ChannelRef::parse(channel)
            .map_err(|e| ConfigError::Invalid(format!("telegram.channel: {}", e)))?;
        Ok(())
    }

    /// Credentials for the selected auth mode plus a valid chunk size.
    pub fn validate_youtube(&self) -> Result<(), ConfigError> {
        let auth = &self.youtube.auth;
        match auth.mode {
            AuthMode::ServiceAccount => {
                if is_blank(&auth.service_account_file) && is_blank(&auth.service_account_json_b64)
                {
                    return Err(ConfigError::Missing(
                        "youtube.auth.service_account_file (or GOOGLE_SERVICE_ACCOUNT_JSON)"
                            .to_string(),
                    ));
                }
            }
            AuthMode::UserToken => {
                if is_blank(&auth.client_secrets_file) && is_blank(&auth.client_secrets_json_b64) {
                    return Err(ConfigError::Missing(
                        "youtube.auth.client_secrets_file (or GOOGLE_CREDENTIALS)".to_string(),
                    ));
                }
            }
        }

        let chunk = self.youtube.chunk_size;
        if chunk == 0 || chunk % UPLOAD_CHUNK_GRANULARITY != 0 {
            return Err(ConfigError::Invalid(format!(
                "youtube.chunk_size must be a positive multiple of {} (got {})",
                UPLOAD_CHUNK_GRANULARITY, chunk
            )));
        }
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(state_dir()?.join("config.toml"))
    }

    fn save_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
        eprintln!("Created default config at {}", path.display());
        Ok(())
    }

    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.pipeline.work_dir).to_string())
    }

    pub fn token_file(&self) -> Result<PathBuf> {
        match &self.youtube.auth.token_file {
            Some(p) => Ok(PathBuf::from(shellexpand::tilde(p).to_string())),
            None => Ok(state_dir()?.join("token.json")),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

/// `~/.tube-relay`, home of the config, token, PID and log files.
pub fn state_dir() -> Result<PathBuf> {
    let base = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(base.home_dir().join(".tube-relay"))
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true)
}

fn expand_env(s: &str) -> String {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else if let Some(var_name) = s.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else {
        s.to_string()
    }
}

/// Default config template with helpful comments (used for first-time setup)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Tube Relay Configuration
# Auto-created on first run. Edit as needed.

[telegram]
# Bot token from @BotFather. The bot must be an admin of the channel.
# bot_token = "${TELEGRAM_BOT_TOKEN}"
# channel = "@my_channel"
# "polling" (default) or "webhook"
mode = "polling"
poll_timeout = 30
# webhook_secret = "${TELEGRAM_WEBHOOK_SECRET}"
# Registered with setWebhook at startup in webhook mode
# webhook_url = "https://relay.example.com/telegram/webhook"

[youtube.auth]
# "service_account" or "user_token"
mode = "service_account"
# service_account_file = "~/.tube-relay/service_account.json"
# client_secrets_file = "~/.tube-relay/credentials.json"
# token_file = "~/.tube-relay/token.json"
allow_interactive = true

[youtube.defaults]
description = "Uploaded from Telegram"
tags = ["Telegram", "AutoUpload", "PythonBot"]
category_id = "22"
privacy_status = "public"

[pipeline]
work_dir = "~/.tube-relay/work"
max_concurrent_jobs = 2
download_timeout_secs = 1800
upload_timeout_secs = 3600

[server]
enabled = true
port = 8443
bind = "0.0.0.0"
# trigger_token = "${TRIGGER_TOKEN}"

[transcode]
enabled = false

[logging]
level = "info"
# "text" or "json"
format = "text"
"#;
