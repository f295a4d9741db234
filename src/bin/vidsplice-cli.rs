use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncWriteExt;

use vidsplice::config::{
    DEFAULT_ENCODE_TIMEOUT, DEFAULT_RESULT_DIR, DEFAULT_TEMP_DIR, DEFAULT_VOICE_ENDPOINT,
    DEFAULT_VOICE_TIMEOUT,
};
use vidsplice::{Config, ExportOptions, Exporter, parse_segments};

#[tokio::main]
async fn main() -> Result<()> {
    vidsplice::init_logging();
    let params = Params::parse();

    let file_name = params
        .video_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.mp4")
        .to_owned();

    let segments = parse_segments(&params.segments)?;
    let opts = ExportOptions {
        mute: params.mute,
        cancel_male_voice: params.cancel_male_voice,
    };

    let exporter = Exporter::new(params.config())?;

    let mut source = tokio::fs::File::open(&params.video_path)
        .await
        .with_context(|| format!("failed to open {}", params.video_path.display()))?;
    let (upload, mut staged) = exporter.stage_upload(&file_name)?;
    tokio::io::copy(&mut source, &mut staged)
        .await
        .with_context(|| format!("failed to read {}", params.video_path.display()))?;
    staged.flush().await?;
    drop(staged);

    let output = exporter
        .export_upload(upload, &segments, &opts)
        .await
        .context("export failed")?;

    println!("{}", output.path.display());
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "vidsplice")]
#[command(about = "Cut segments out of a video and join them into one file")]
struct Params {
    /// Source video.
    #[arg(short = 'i', long = "input")]
    video_path: PathBuf,

    /// Segments as a JSON array, e.g. `[{"start":5,"end":10},{"start":0,"end":2}]`.
    #[arg(short = 's', long = "segments")]
    segments: String,

    /// Drop audio from the output.
    #[arg(long = "mute", default_value_t = false)]
    mute: bool,

    /// Replace the speech track using the voice-cancellation service.
    #[arg(long = "cancel-male-voice", default_value_t = false)]
    cancel_male_voice: bool,

    #[arg(long = "temp-dir", env = "VIDSPLICE_TEMP_DIR", default_value = DEFAULT_TEMP_DIR)]
    temp_dir: PathBuf,

    #[arg(short = 'o', long = "result-dir", env = "VIDSPLICE_RESULT_DIR", default_value = DEFAULT_RESULT_DIR)]
    result_dir: PathBuf,

    #[arg(long = "voice-endpoint", env = "VIDSPLICE_VOICE_ENDPOINT", default_value = DEFAULT_VOICE_ENDPOINT)]
    voice_endpoint: String,

    /// Voice-cancellation timeout (seconds).
    #[arg(long = "voice-timeout", env = "VIDSPLICE_VOICE_TIMEOUT", default_value_t = DEFAULT_VOICE_TIMEOUT.as_secs())]
    voice_timeout_secs: u64,

    /// Kill an encode after this many seconds. 0 disables the limit.
    #[arg(long = "encode-timeout", env = "VIDSPLICE_ENCODE_TIMEOUT", default_value_t = DEFAULT_ENCODE_TIMEOUT.as_secs())]
    encode_timeout_secs: u64,

    #[arg(long = "ffmpeg", env = "VIDSPLICE_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    #[arg(long = "ffprobe", env = "VIDSPLICE_FFPROBE", default_value = "ffprobe")]
    ffprobe: PathBuf,
}

impl Params {
    fn config(&self) -> Config {
        Config {
            temp_dir: self.temp_dir.clone(),
            result_dir: self.result_dir.clone(),
            voice_endpoint: self.voice_endpoint.clone(),
            voice_timeout: Duration::from_secs(self.voice_timeout_secs),
            encode_timeout: (self.encode_timeout_secs > 0)
                .then(|| Duration::from_secs(self.encode_timeout_secs)),
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
            ..Config::default()
        }
    }
}
