//! Thin wrappers around the `ffmpeg` and `ffprobe` command-line tools.
//!
//! - `command` builds and runs `ffmpeg` invocations
//! - `probe` reads stream/format metadata through `ffprobe`

pub mod command;
pub mod probe;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub use command::{FfmpegCommand, FfmpegRunner};
pub use probe::{MediaInfo, probe_media};

/// Resolve a program name or path to an executable, failing with `ToolNotFound`.
pub fn locate(program: &Path) -> Result<PathBuf> {
    which::which(program).map_err(|_| Error::ToolNotFound(program.display().to_string()))
}
