//! Optional re-encode of downloaded videos to H.264/AAC MP4 via ffmpeg.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::TranscodeConfig;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// Builder for a single-input, single-output ffmpeg invocation.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    program: PathBuf,
    input: PathBuf,
    output: PathBuf,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(program: impl AsRef<Path>, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.log_level.clone(),
        ];
        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().into_owned());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }

    pub async fn run(&self) -> Result<(), TranscodeError> {
        let args = self.build_args();
        debug!("Running {} {:?}", self.program.display(), args);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(5)..].join("\n");
            return Err(TranscodeError::Failed {
                code: output.status.code(),
                stderr: tail,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg: PathBuf,
}

impl Transcoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// `None` when transcoding is disabled or no ffmpeg binary can be found.
    pub fn from_config(config: &TranscodeConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let program = config.ffmpeg_path.as_deref().unwrap_or("ffmpeg");
        match which::which(program) {
            Ok(path) => {
                info!("Transcoding enabled using {}", path.display());
                Some(Self::new(path))
            }
            Err(e) => {
                tracing::warn!("Transcoding enabled but {} not found: {}", program, e);
                None
            }
        }
    }

    /// Anything not already MP4 gets re-encoded. Unknown types are left alone.
    pub fn needs_transcode(mime_type: Option<&str>) -> bool {
        match mime_type {
            Some(mime) => !mime.eq_ignore_ascii_case("video/mp4"),
            None => false,
        }
    }

    pub fn mp4_command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(&self.ffmpeg, input, output).output_args([
            "-c:v", "libx264", "-preset", "fast", "-c:a", "aac", "-b:a", "128k",
        ])
    }

    pub async fn to_mp4(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        self.mp4_command(input, output).run().await?;
        info!("Transcoded {} -> {}", input.display(), output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mp4_args() {
        let t = Transcoder::new("/usr/bin/ffmpeg");
        let args = t
            .mp4_command(Path::new("/w/in.mov"), Path::new("/w/converted.mp4"))
            .build_args();
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-loglevel", "error", "-y", "-i", "/w/in.mov", "-c:v", "libx264",
                "-preset", "fast", "-c:a", "aac", "-b:a", "128k", "/w/converted.mp4"
            ]
        );
    }

    #[test]
    fn test_no_overwrite_flag() {
        let args = FfmpegCommand::new("ffmpeg", "a", "b")
            .overwrite(false)
            .log_level("warning")
            .build_args();
        assert!(!args.contains(&"-y".to_string()));
        assert_eq!(args[2], "warning");
    }

    #[test]
    fn test_needs_transcode() {
        assert!(!Transcoder::needs_transcode(Some("video/mp4")));
        assert!(!Transcoder::needs_transcode(Some("VIDEO/MP4")));
        assert!(Transcoder::needs_transcode(Some("video/quicktime")));
        assert!(!Transcoder::needs_transcode(None));
    }

    #[test]
    fn test_disabled_config_yields_none() {
        let config = TranscodeConfig::default();
        assert!(Transcoder::from_config(&config).is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let t = Transcoder::new("/nonexistent/ffmpeg-binary");
        let err = t
            .to_mp4(Path::new("in.mov"), Path::new("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn { .. }));
    }
}
