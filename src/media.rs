//! Media handles owned by one export.
//!
//! - `SourceMedia` is the opened upload: its probed layout plus the audio track that cuts
//!   will carry.
//! - `ProcessedAudio` is the voice-cancelled track returned by the remote service, validated and
//!   parked in a scratch file.
//!
//! Both release their scratch files exactly once, through `close`/`discard` or on drop.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use hound::{WavReader, WavSpec};
use tracing::info;

use crate::error::{Error, Result};
use crate::ffmpeg::{MediaInfo, probe_media};
use crate::scratch::ScratchFile;

/// A validated WAV track waiting to replace the source's audio.
#[derive(Debug)]
pub struct ProcessedAudio {
    file: ScratchFile,
    spec: WavSpec,
    duration: f64,
}

impl ProcessedAudio {
    /// Validate `bytes` as WAV and persist them under `dir`.
    pub async fn from_wav_bytes(dir: &Path, bytes: &[u8]) -> Result<Self> {
        let (spec, duration) = inspect_wav(bytes)?;
        let file = ScratchFile::write_new(dir, "processed.wav", bytes, "processed-audio").await?;
        Ok(Self {
            file,
            spec,
            duration,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn discard(self) {
        self.file.discard();
    }
}

fn inspect_wav(bytes: &[u8]) -> Result<(WavSpec, f64)> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let frames = reader.duration();

    if frames == 0 || spec.sample_rate == 0 {
        return Err(Error::remote("voice service returned an empty audio track"));
    }

    Ok((spec, frames as f64 / spec.sample_rate as f64))
}

/// Which audio a cut of the source carries.
#[derive(Debug)]
pub enum AudioTrack {
    /// The upload has no audio stream.
    Absent,
    /// The upload's own audio stream.
    Native,
    /// A processed track that supersedes the native one.
    Substituted(ProcessedAudio),
}

/// The opened upload.
#[derive(Debug)]
pub struct SourceMedia {
    path: PathBuf,
    info: MediaInfo,
    audio: AudioTrack,
}

impl SourceMedia {
    /// Probe `path` and open it as a cuttable source.
    pub async fn open(ffprobe: &Path, path: &Path) -> Result<Self> {
        let info = probe_media(ffprobe, path).await?;
        info!(
            path = %path.display(),
            duration = info.duration,
            width = info.width,
            height = info.height,
            has_audio = info.has_audio,
            "opened source media"
        );

        let audio = if info.has_audio {
            AudioTrack::Native
        } else {
            AudioTrack::Absent
        };

        Ok(Self {
            path: path.to_path_buf(),
            info,
            audio,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    pub fn duration(&self) -> f64 {
        self.info.duration
    }

    pub fn audio(&self) -> &AudioTrack {
        &self.audio
    }

    pub fn has_audio(&self) -> bool {
        !matches!(self.audio, AudioTrack::Absent)
    }

    /// Release the handle and anything attached to it.
    pub fn close(self) {
        if let AudioTrack::Substituted(audio) = self.audio {
            audio.discard();
        }
    }

    #[cfg(test)]
    pub(crate) fn from_parts(path: PathBuf, info: MediaInfo) -> Self {
        let audio = if info.has_audio {
            AudioTrack::Native
        } else {
            AudioTrack::Absent
        };
        Self { path, info, audio }
    }
}

/// Replace `source`'s audio with `audio` for every cut made afterwards.
///
/// A track that was substituted earlier is released.
pub fn substitute_audio(source: &mut SourceMedia, audio: ProcessedAudio) {
    info!(
        source = %source.path.display(),
        audio = %audio.path().display(),
        audio_duration = audio.duration(),
        sample_rate = audio.spec().sample_rate,
        channels = audio.spec().channels,
        source_duration = source.duration(),
        "substituting audio track"
    );

    let previous = std::mem::replace(&mut source.audio, AudioTrack::Substituted(audio));
    if let AudioTrack::Substituted(old) = previous {
        old.discard();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    use hound::{SampleFormat, WavSpec, WavWriter};

    /// A mono 16-bit WAV of `seconds` of silence.
    pub fn silent_wav(seconds: f64, sample_rate: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut buf, spec).expect("wav writer");
            let frames = (seconds * sample_rate as f64).round() as usize;
            for _ in 0..frames {
                writer.write_sample(0i16).expect("write sample");
            }
            writer.finalize().expect("finalize wav");
        }
        buf.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::silent_wav;
    use super::*;

    fn info(has_audio: bool) -> MediaInfo {
        MediaInfo {
            duration: 20.0,
            width: 320,
            height: 240,
            fps: 25.0,
            has_audio,
        }
    }

    #[tokio::test]
    async fn processed_audio_reports_wav_duration() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let audio = ProcessedAudio::from_wav_bytes(dir.path(), &silent_wav(1.5, 16_000)).await?;

        assert!((audio.duration() - 1.5).abs() < 1e-6);
        assert_eq!(audio.spec().channels, 1);
        assert!(audio.path().exists());

        let path = audio.path().to_path_buf();
        audio.discard();
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn non_wav_bytes_are_rejected_without_touching_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = ProcessedAudio::from_wav_bytes(dir.path(), b"<html>502</html>")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Wav(_)));
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn empty_wav_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = ProcessedAudio::from_wav_bytes(dir.path(), &silent_wav(0.0, 16_000))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty audio"));
        Ok(())
    }

    #[tokio::test]
    async fn substitution_replaces_and_close_releases() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = SourceMedia::from_parts(dir.path().join("in.mp4"), info(true));
        assert!(matches!(source.audio(), AudioTrack::Native));

        let first = ProcessedAudio::from_wav_bytes(dir.path(), &silent_wav(1.0, 8_000)).await?;
        let first_path = first.path().to_path_buf();
        substitute_audio(&mut source, first);

        let second = ProcessedAudio::from_wav_bytes(dir.path(), &silent_wav(1.0, 8_000)).await?;
        let second_path = second.path().to_path_buf();
        substitute_audio(&mut source, second);

        assert!(!first_path.exists());
        assert!(second_path.exists());
        assert!(matches!(source.audio(), AudioTrack::Substituted(_)));

        source.close();
        assert!(!second_path.exists());
        Ok(())
    }

    #[test]
    fn silent_upload_has_no_audio() {
        let source = SourceMedia::from_parts(PathBuf::from("in.mp4"), info(false));
        assert!(!source.has_audio());
    }
}
