//! Output writer: encode a timeline into the result directory.
//!
//! ffmpeg writes into a hidden partial file next to the final location. Only a fully finalized
//! file is moved into place, with a no-clobber rename, so a failed encode never leaves anything
//! under a result name and two requests can never overwrite each other.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Encoding;
use crate::error::{Error, Result};
use crate::ffmpeg::{FfmpegCommand, FfmpegRunner};
use crate::timeline::Timeline;

/// Fresh names tried before giving up on a collision-free rename.
const MAX_NAME_ATTEMPTS: usize = 8;

/// A finished export on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub file_name: String,
}

/// Generate `result_<8 hex>.<extension>`.
pub fn generate_file_name(extension: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("result_{}.{extension}", &id[..8])
}

/// Build the ffmpeg invocation that encodes `timeline` into `output`.
pub fn build_command(timeline: &Timeline<'_>, output: &Path, encoding: &Encoding) -> FfmpegCommand {
    let plan = timeline.render();

    let mut cmd = FfmpegCommand::new(output);
    for input in &plan.inputs {
        cmd = cmd.input_range(&input.path, input.start, input.duration);
    }

    cmd = cmd
        .filter_complex(plan.filter_graph)
        .map(plan.video_label)
        .video_codec(&encoding.video_codec)
        .output_args([
            "-preset".to_owned(),
            encoding.preset.clone(),
            "-crf".to_owned(),
            encoding.crf.to_string(),
            "-pix_fmt".to_owned(),
            encoding.pixel_format.clone(),
        ]);

    cmd = match plan.audio_label {
        Some(label) => cmd
            .map(label)
            .audio_codec(&encoding.audio_codec)
            .output_arg("-b:a")
            .output_arg(&encoding.audio_bitrate),
        None => cmd.no_audio(),
    };

    cmd.output_args(["-movflags", "+faststart"])
}

/// Encode `timeline` into `result_dir` under a freshly generated unique name.
///
/// Returns only after ffmpeg has exited successfully and the file is in its final place.
pub async fn write(
    timeline: &Timeline<'_>,
    result_dir: &Path,
    encoding: &Encoding,
    runner: &FfmpegRunner,
) -> Result<OutputFile> {
    let partial = Builder::new()
        .prefix(".partial_")
        .suffix(&format!(".{}", encoding.extension))
        .tempfile_in(result_dir)?
        .into_temp_path();

    let cmd = build_command(timeline, &partial, encoding);
    info!(
        cuts = timeline.cuts().len(),
        duration = timeline.duration(),
        audio = timeline.has_audio(),
        "encoding timeline"
    );

    // On failure `partial` is dropped here and removed.
    runner.run(&cmd).await?;

    let output = persist_unique(partial, result_dir, &encoding.extension)?;
    info!(path = %output.path.display(), "export written");
    Ok(output)
}

fn persist_unique(mut partial: TempPath, dir: &Path, extension: &str) -> Result<OutputFile> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        let file_name = generate_file_name(extension);
        let path = dir.join(&file_name);

        match partial.persist_noclobber(&path) {
            Ok(()) => return Ok(OutputFile { path, file_name }),
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                warn!(%file_name, "output name collision, retrying");
                partial = err.path;
            }
            Err(err) => return Err(Error::Io(err.error)),
        }
    }

    Err(Error::Io(std::io::Error::new(
        ErrorKind::AlreadyExists,
        "could not find a free output file name",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::cut;
    use crate::ffmpeg::MediaInfo;
    use crate::media::SourceMedia;
    use crate::timeline::concatenate;

    fn source(has_audio: bool) -> SourceMedia {
        SourceMedia::from_parts(
            PathBuf::from("in.mp4"),
            MediaInfo {
                duration: 20.0,
                width: 320,
                height: 240,
                fps: 25.0,
                has_audio,
            },
        )
    }

    #[test]
    fn generated_names_are_distinct_and_shaped() {
        let a = generate_file_name("mp4");
        let b = generate_file_name("mp4");
        assert_ne!(a, b);
        assert!(a.starts_with("result_"));
        assert!(a.ends_with(".mp4"));
        assert_eq!(a.len(), "result_".len() + 8 + ".mp4".len());
    }

    #[test]
    fn command_maps_audio_with_the_fixed_codec_pair() -> anyhow::Result<()> {
        let src = source(true);
        let tl = concatenate(vec![cut(&src, 5.0, 10.0)?, cut(&src, 0.0, 2.0)?])?;
        let args = build_command(&tl, Path::new("out.mp4"), &Encoding::default()).build_args();

        let joined = args.join(" ");
        assert!(joined.contains("-ss 5.000000 -t 5.000000 -i in.mp4"));
        assert!(joined.contains("-ss 0.000000 -t 2.000000 -i in.mp4"));
        assert!(joined.contains("-map [outv]"));
        assert!(joined.contains("-map [outa]"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-c:a aac"));
        assert!(!args.contains(&"-an".to_owned()));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        Ok(())
    }

    #[test]
    fn muted_command_drops_audio_entirely() -> anyhow::Result<()> {
        let src = source(true);
        let tl = concatenate(vec![cut(&src, 1.0, 3.0)?])?.without_audio();
        let args = build_command(&tl, Path::new("out.mp4"), &Encoding::default()).build_args();

        assert!(args.contains(&"-an".to_owned()));
        assert!(!args.contains(&"[outa]".to_owned()));
        assert!(!args.contains(&"-c:a".to_owned()));
        Ok(())
    }

    #[test]
    fn persist_unique_never_clobbers() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let first = tempfile::NamedTempFile::new_in(dir.path())?.into_temp_path();
        std::fs::write(&first, b"one")?;
        let a = persist_unique(first, dir.path(), "mp4")?;

        let second = tempfile::NamedTempFile::new_in(dir.path())?.into_temp_path();
        std::fs::write(&second, b"two")?;
        let b = persist_unique(second, dir.path(), "mp4")?;

        assert_ne!(a.path, b.path);
        assert_eq!(std::fs::read(&a.path)?, b"one");
        assert_eq!(std::fs::read(&b.path)?, b"two");
        Ok(())
    }

    #[tokio::test]
    async fn failed_encode_leaves_nothing_behind() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let src = source(true);
        let tl = concatenate(vec![cut(&src, 0.0, 1.0)?])?;
        let runner = FfmpegRunner::new("definitely-not-ffmpeg-vidsplice");

        let err = write(&tl, dir.path(), &Encoding::default(), &runner)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }
}
