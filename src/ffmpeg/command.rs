//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ffmpeg::locate;

/// Keep at most this much of ffmpeg's stderr in error messages.
const MAX_STDERR_CHARS: usize = 4 * 1024;

/// One `-i` entry together with the options that apply to it.
#[derive(Debug, Clone)]
struct Input {
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for FFmpeg commands with any number of inputs and a single output.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<Input>,
    output: PathBuf,
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
        }
    }

    /// Add an input that is read only from `start` for `duration` seconds (input-side seek).
    ///
    /// Inputs are numbered in the order they are added (`0:v`, `1:a`, ...).
    pub fn input_range(mut self, path: impl AsRef<Path>, start: f64, duration: f64) -> Self {
        self.inputs.push(Input {
            args: vec![
                "-ss".to_owned(),
                format!("{start:.6}"),
                "-t".to_owned(),
                format!("{duration:.6}"),
            ],
            path: path.as_ref().to_path_buf(),
        });
        self
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

    pub fn filter_complex(self, graph: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(graph)
    }

    pub fn map(self, label: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(label)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-nostdin", "-v", "error"]
            .into_iter()
            .map(str::to_owned)
            .collect();

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_owned());
            args.push(input.path.to_string_lossy().into_owned());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());

        args
    }
}

/// Runs `FfmpegCommand`s to completion.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `cmd` and wait for it. A non-zero exit becomes `Error::Ffmpeg` carrying stderr.
    ///
    /// The child is killed if this future is dropped or the timeout elapses.
    pub async fn run(&self, cmd: &FfmpegCommand) -> Result<()> {
        let program = locate(&self.program)?;
        let args = cmd.build_args();
        debug!(program = %program.display(), args = %args.join(" "), "running ffmpeg");

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(res) => res?,
                Err(_) => {
                    warn!(timeout = ?limit, "ffmpeg timed out, killing process");
                    return Err(Error::ffmpeg_failed(
                        format!("ffmpeg timed out after {limit:?}"),
                        None,
                        None,
                    ));
                }
            },
            None => child.wait_with_output().await?,
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = stderr_tail(&output.stderr);
        let message = match stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(last) => format!("ffmpeg failed: {}", last.trim()),
            None => "ffmpeg exited with non-zero status".to_owned(),
        };

        Err(Error::ffmpeg_failed(
            message,
            Some(stderr),
            output.status.code(),
        ))
    }
}

fn stderr_tail(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let total = text.chars().count();
    if total <= MAX_STDERR_CHARS {
        return text.into_owned();
    }
    text.chars().skip(total - MAX_STDERR_CHARS).collect()
}
