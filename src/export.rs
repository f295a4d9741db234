//! High-level API for running exports.
//!
//! `Exporter` wires the pieces together for one request:
//! validate → persist upload → (optional) voice cancellation → open source → substitute audio →
//! cut → concatenate → (optional) mute → write → release everything.
//!
//! The intent is:
//! - Validation failures return before any file or media work.
//! - Voice cancellation is best-effort: any failure is logged and the original audio is kept.
//! - Every handle and scratch file acquired for a request is released on every exit path, and a
//!   failed release never masks the export's own result.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::extract::cut;
use crate::ffmpeg::FfmpegRunner;
use crate::media::{ProcessedAudio, SourceMedia, substitute_audio};
use crate::opts::{AudioPolicy, ExportOptions};
use crate::scratch::ScratchFile;
use crate::segments::{Segment, validate_segments};
use crate::timeline::concatenate;
use crate::voice::{HttpVoiceCanceller, VoiceCanceller};
use crate::writer::{self, OutputFile};

/// What happened to the voice-cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceOutcome {
    /// Not asked for, or overridden by `mute`.
    NotRequested,
    /// The processed track replaced the original audio.
    Applied,
    /// The service failed; the original audio was kept.
    Skipped,
}

impl VoiceOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequested => "not_requested",
            Self::Applied => "applied",
            Self::Skipped => "skipped",
        }
    }
}

/// A successful export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutput {
    pub path: PathBuf,
    pub file_name: String,
    /// Sum of the requested segment durations, in seconds.
    pub duration: f64,
    pub has_audio: bool,
    pub voice: VoiceOutcome,
}

/// The main export entry point.
///
/// `Exporter` holds only read-only, process-wide state (configuration, the ffmpeg runner and the
/// voice client), so a single instance can serve any number of concurrent exports.
pub struct Exporter<V: VoiceCanceller = HttpVoiceCanceller> {
    config: Config,
    runner: FfmpegRunner,
    voice: V,
}

impl Exporter<HttpVoiceCanceller> {
    /// Create an exporter that talks to `config.voice_endpoint`.
    pub fn new(config: Config) -> Result<Self> {
        let voice = HttpVoiceCanceller::new(config.voice_endpoint.clone(), config.voice_timeout)?;
        Self::with_voice_canceller(config, voice)
    }
}

impl<V: VoiceCanceller> Exporter<V> {
    /// Create an exporter with a custom voice canceller.
    ///
    /// Creates the temp and result directories if needed.
    pub fn with_voice_canceller(config: Config, voice: V) -> Result<Self> {
        config.ensure_dirs()?;
        let mut runner = FfmpegRunner::new(config.ffmpeg.clone());
        if let Some(limit) = config.encode_timeout {
            runner = runner.with_timeout(limit);
        }
        Ok(Self {
            config,
            runner,
            voice,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create an empty upload file in the temp dir, for callers that stream the video in.
    ///
    /// Hand the result to [`Exporter::export_upload`] once it is fully written.
    pub fn stage_upload(&self, file_name: &str) -> Result<(ScratchFile, File)> {
        ScratchFile::create(&self.config.temp_dir, file_name, "upload")
    }

    /// Export `segments` of `video` (uploaded as `file_name`) into one output file.
    pub async fn export(
        &self,
        video: &[u8],
        file_name: &str,
        segments: &[Segment],
        opts: &ExportOptions,
    ) -> Result<ExportOutput> {
        validate_segments(segments)?;
        let upload =
            ScratchFile::write_new(&self.config.temp_dir, file_name, video, "upload").await?;
        self.export_upload(upload, segments, opts).await
    }

    /// Export `segments` of an upload that is already on disk. The upload is always released.
    pub async fn export_upload(
        &self,
        upload: ScratchFile,
        segments: &[Segment],
        opts: &ExportOptions,
    ) -> Result<ExportOutput> {
        if let Err(err) = validate_segments(segments) {
            upload.discard();
            return Err(err);
        }

        let export_id = Uuid::new_v4();
        let span = info_span!("export", id = %export_id, segments = segments.len());

        async move {
            info!(
                upload = %upload.path().display(),
                mute = opts.mute,
                cancel_male_voice = opts.cancel_male_voice,
                "export started"
            );

            let (processed, voice) = self.fetch_processed_audio(upload.path(), opts).await;
            let result = self.render(upload.path(), processed, segments, opts).await;

            upload.discard();

            let output = result?;
            info!(path = %output.path.display(), voice = voice.as_str(), "export finished");

            Ok(ExportOutput {
                path: output.path,
                file_name: output.file_name,
                duration: output.duration,
                has_audio: output.has_audio,
                voice,
            })
        }
        .instrument(span)
        .await
    }

    /// Run voice cancellation if the options ask for it. Never fails the export.
    async fn fetch_processed_audio(
        &self,
        video: &Path,
        opts: &ExportOptions,
    ) -> (Option<ProcessedAudio>, VoiceOutcome) {
        if opts.audio_policy() != AudioPolicy::CancelVoice {
            return (None, VoiceOutcome::NotRequested);
        }

        let bytes = match self.voice.cancel(video).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "voice cancellation failed; keeping original audio");
                return (None, VoiceOutcome::Skipped);
            }
        };

        match ProcessedAudio::from_wav_bytes(&self.config.temp_dir, &bytes).await {
            Ok(audio) => (Some(audio), VoiceOutcome::Applied),
            Err(err) => {
                warn!(error = %err, "voice service returned unusable audio; keeping original audio");
                (None, VoiceOutcome::Skipped)
            }
        }
    }

    /// Open the source, attach processed audio, cut, assemble and write. Releases the source on
    /// every path.
    async fn render(
        &self,
        upload: &Path,
        processed: Option<ProcessedAudio>,
        segments: &[Segment],
        opts: &ExportOptions,
    ) -> Result<Rendered> {
        let mut source = match SourceMedia::open(&self.config.ffprobe, upload).await {
            Ok(source) => source,
            Err(err) => {
                if let Some(audio) = processed {
                    audio.discard();
                }
                return Err(err);
            }
        };

        if let Some(audio) = processed {
            substitute_audio(&mut source, audio);
        }

        let result = self.assemble_and_write(&source, segments, opts).await;
        source.close();
        result
    }

    async fn assemble_and_write(
        &self,
        source: &SourceMedia,
        segments: &[Segment],
        opts: &ExportOptions,
    ) -> Result<Rendered> {
        let cuts = segments
            .iter()
            .map(|seg| cut(source, seg.start, seg.end))
            .collect::<Result<Vec<_>>>()?;

        let mut timeline = concatenate(cuts)?;
        if opts.audio_policy() == AudioPolicy::Mute {
            timeline = timeline.without_audio();
        }

        let OutputFile { path, file_name } = writer::write(
            &timeline,
            &self.config.result_dir,
            &self.config.encoding,
            &self.runner,
        )
        .await?;

        Ok(Rendered {
            path,
            file_name,
            duration: timeline.duration(),
            has_audio: timeline.has_audio(),
        })
    }
}

struct Rendered {
    path: PathBuf,
    file_name: String,
    duration: f64,
    has_audio: bool,
}
