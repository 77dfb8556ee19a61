use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use tube_relay::config::Config;
use tube_relay::pipeline::sanitize;
use tube_relay::youtube::{self, UploadMetadata, VideoUploader};

#[derive(Args)]
pub struct UploadArgs {
    /// Video file to upload. It is left in place afterwards.
    pub file: PathBuf,

    /// Video title (default: the file name without extension)
    #[arg(short, long)]
    pub title: Option<String>,
}

pub async fn run(args: UploadArgs, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_unvalidated(config_path)?;
    config
        .validate_youtube()
        .context("Configuration validation failed")?;

    let raw_title = args.title.clone().or_else(|| {
        args.file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
    });
    let title = sanitize(raw_title.as_deref());
    let metadata = UploadMetadata::new(&title, &config.youtube.defaults);

    let uploader = youtube::build_uploader(&config)?;
    println!("Uploading {} as \"{}\"...", args.file.display(), title);
    let id = uploader.upload(&args.file, &metadata).await?;
    println!("Published: {}", id.watch_url());

    Ok(())
}
