pub mod transcode;

pub use transcode::{FfmpegCommand, TranscodeError, Transcoder};
