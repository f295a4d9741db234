//! Process-wide configuration.
//!
//! A `Config` is resolved once at startup (from CLI flags / environment in the binaries) and then
//! shared read-only by every export. Nothing in here is mutated per request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Default directory for uploads and intermediate audio.
pub const DEFAULT_TEMP_DIR: &str = "temp_uploads";

/// Default directory for finished exports.
pub const DEFAULT_RESULT_DIR: &str = "resultvideos";

/// Default voice-cancellation endpoint.
pub const DEFAULT_VOICE_ENDPOINT: &str = "http://127.0.0.1:5001/process";

/// Default bound on a single voice-cancellation call.
pub const DEFAULT_VOICE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default bound on a single encode.
pub const DEFAULT_ENCODE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct Config {
    /// Scoped temp files (uploads, processed audio) live here.
    pub temp_dir: PathBuf,

    /// Finished exports are written here. Append-only from our point of view.
    pub result_dir: PathBuf,

    /// `POST` target for voice cancellation (multipart field `video`, WAV body back).
    pub voice_endpoint: String,

    /// How long we wait for the voice service before giving up on substitution.
    pub voice_timeout: Duration,

    /// Kill an encode that runs longer than this. `None` waits indefinitely.
    pub encode_timeout: Option<Duration>,

    /// `ffmpeg` program name or path.
    pub ffmpeg: PathBuf,

    /// `ffprobe` program name or path.
    pub ffprobe: PathBuf,

    /// Output encoding. Fixed per process.
    pub encoding: Encoding,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            result_dir: PathBuf::from(DEFAULT_RESULT_DIR),
            voice_endpoint: DEFAULT_VOICE_ENDPOINT.to_owned(),
            voice_timeout: DEFAULT_VOICE_TIMEOUT,
            encode_timeout: Some(DEFAULT_ENCODE_TIMEOUT),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            encoding: Encoding::default(),
        }
    }
}

impl Config {
    /// Create the temp and result directories if they are missing.
    ///
    /// Safe to call any number of times.
    pub fn ensure_dirs(&self) -> Result<()> {
        ensure_dir(&self.temp_dir)?;
        ensure_dir(&self.result_dir)?;
        Ok(())
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// The single output codec pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    pub video_codec: String,
    pub audio_codec: String,
    pub pixel_format: String,
    pub preset: String,
    pub crf: u8,
    pub audio_bitrate: String,
    /// Container, implied by the output file extension.
    pub extension: String,
}

impl Default for Encoding {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_owned(),
            audio_codec: "aac".to_owned(),
            pixel_format: "yuv420p".to_owned(),
            preset: "medium".to_owned(),
            crf: 23,
            audio_bitrate: "192k".to_owned(),
            extension: "mp4".to_owned(),
        }
    }
}
