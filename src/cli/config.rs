use anyhow::Result;
use clap::{Args, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use tube_relay::config::{Config, DEFAULT_CONFIG_TEMPLATE};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration (secrets redacted)
    Show,

    /// Print the config file location
    Path,
}

pub async fn run(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => Config::config_path()?,
    };

    match args.command {
        ConfigCommands::Init { force } => init(&path, force),
        ConfigCommands::Show => show(&path),
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn init(path: &PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn show(path: &Path) -> Result<()> {
    let mut config = Config::load_unvalidated(Some(path))?;
    redact(&mut config);
    print!("{}", toml::to_string_pretty(&config)?);

    if let Err(e) = config.validate() {
        eprintln!("\nWarning: {}", e);
    }
    Ok(())
}

fn redact(config: &mut Config) {
    let secrets = [
        &mut config.telegram.bot_token,
        &mut config.telegram.webhook_secret,
        &mut config.server.trigger_token,
        &mut config.youtube.auth.service_account_json_b64,
        &mut config.youtube.auth.client_secrets_json_b64,
    ];
    for secret in secrets {
        if secret.is_some() {
            *secret = Some("<redacted>".to_string());
        }
    }
}
