//! Concatenation: lay cuts end-to-end and describe the result as an FFmpeg filter graph.
//!
//! Every cut becomes its own input-seeked ffmpeg input (`-ss start -t duration`), so out-of-order
//! and overlapping cuts never force ffmpeg to buffer decoded frames. A substituted audio track is
//! opened once per cut the same way. Each audio leg is padded/trimmed to its cut's exact duration
//! so audio and video stay aligned across boundaries, then everything meets in a single `concat`
//! in submission order. Boundaries are hard cuts; there are no transitions.

use std::fmt::Write as _;
use std::path::PathBuf;

use tracing::info;

use crate::error::{Error, Result};
use crate::extract::SegmentCut;
use crate::media::AudioTrack;

/// Audio is normalized to this layout before `concat` so legs with different native audio
/// formats can be joined.
const AUDIO_FORMAT: &str = "aformat=sample_fmts=fltp:sample_rates=48000:channel_layouts=stereo";

/// Label of the final video stream in the rendered graph.
pub const VIDEO_OUT: &str = "[outv]";

/// Label of the final audio stream in the rendered graph.
pub const AUDIO_OUT: &str = "[outa]";

/// The ordered join of all cuts.
#[derive(Debug)]
pub struct Timeline<'a> {
    cuts: Vec<SegmentCut<'a>>,
    audio: bool,
}

/// One ffmpeg input restricted to a time range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangedInput {
    pub path: PathBuf,
    pub start: f64,
    pub duration: f64,
}

/// Everything the writer needs to hand to ffmpeg.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub inputs: Vec<RangedInput>,
    pub filter_graph: String,
    pub video_label: String,
    pub audio_label: Option<String>,
}

/// Join `cuts` in the order given. Nothing is sorted, merged or deduplicated.
///
/// Audio is kept only if every cut has audio. Fails with `Error::Assembly` on an empty list or
/// when cuts disagree on frame dimensions.
pub fn concatenate(cuts: Vec<SegmentCut<'_>>) -> Result<Timeline<'_>> {
    let Some(first) = cuts.first() else {
        return Err(Error::assembly("cannot assemble an empty list of cuts"));
    };

    let (width, height) = (first.source().info().width, first.source().info().height);
    if let Some((idx, odd)) = cuts.iter().enumerate().find(|(_, c)| {
        c.source().info().width != width || c.source().info().height != height
    }) {
        return Err(Error::assembly(format!(
            "cut {idx} is {}x{} but the timeline is {width}x{height}",
            odd.source().info().width,
            odd.source().info().height
        )));
    }

    let audio = cuts.iter().all(SegmentCut::has_audio);
    if !audio && cuts.iter().any(SegmentCut::has_audio) {
        info!("some cuts have no audio; assembling without audio");
    }

    Ok(Timeline { cuts, audio })
}

impl<'a> Timeline<'a> {
    pub fn cuts(&self) -> &[SegmentCut<'a>] {
        &self.cuts
    }

    /// Sum of the cut durations.
    pub fn duration(&self) -> f64 {
        self.cuts.iter().map(SegmentCut::duration).sum()
    }

    pub fn has_audio(&self) -> bool {
        self.audio
    }

    /// Drop audio from the whole timeline.
    pub fn without_audio(mut self) -> Self {
        self.audio = false;
        self
    }

    /// Describe this timeline as ffmpeg inputs plus a `-filter_complex` graph.
    pub fn render(&self) -> RenderPlan {
        let mut inputs: Vec<RangedInput> = Vec::new();
        let mut chains: Vec<String> = Vec::with_capacity(self.cuts.len() * 2 + 1);
        let mut concat_inputs = String::new();

        for (idx, c) in self.cuts.iter().enumerate() {
            let duration = c.duration();
            let video_input = push_input(&mut inputs, c.source().path().to_path_buf(), c);

            chains.push(format!(
                "[{video_input}:v]trim=duration={d},setpts=PTS-STARTPTS[v{idx}]",
                d = secs_arg(duration)
            ));
            let _ = write!(concat_inputs, "[v{idx}]");

            if !self.audio {
                continue;
            }

            let audio_input = match c.source().audio() {
                AudioTrack::Substituted(processed) => {
                    push_input(&mut inputs, processed.path().to_path_buf(), c)
                }
                AudioTrack::Native | AudioTrack::Absent => video_input,
            };

            chains.push(format!(
                "[{audio_input}:a]apad=whole_dur={d},atrim=duration={d},asetpts=PTS-STARTPTS,{AUDIO_FORMAT}[a{idx}]",
                d = secs_arg(duration)
            ));
            let _ = write!(concat_inputs, "[a{idx}]");
        }

        let (audio_flag, outputs) = if self.audio {
            (1, format!("{VIDEO_OUT}{AUDIO_OUT}"))
        } else {
            (0, VIDEO_OUT.to_owned())
        };
        chains.push(format!(
            "{concat_inputs}concat=n={}:v=1:a={audio_flag}{outputs}",
            self.cuts.len()
        ));

        RenderPlan {
            inputs,
            filter_graph: chains.join(";"),
            video_label: VIDEO_OUT.to_owned(),
            audio_label: self.audio.then(|| AUDIO_OUT.to_owned()),
        }
    }
}

fn push_input(inputs: &mut Vec<RangedInput>, path: PathBuf, c: &SegmentCut<'_>) -> usize {
    inputs.push(RangedInput {
        path,
        start: c.start(),
        duration: c.duration(),
    });
    inputs.len() - 1
}

fn secs_arg(secs: f64) -> String {
    format!("{secs:.6}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::cut;
    use crate::ffmpeg::MediaInfo;
    use crate::media::test_support::silent_wav;
    use crate::media::{ProcessedAudio, SourceMedia, substitute_audio};

    fn source(path: &str, width: u32, has_audio: bool) -> SourceMedia {
        SourceMedia::from_parts(
            PathBuf::from(path),
            MediaInfo {
                duration: 20.0,
                width,
                height: 240,
                fps: 25.0,
                has_audio,
            },
        )
    }

    fn ranged(path: &str, start: f64, duration: f64) -> RangedInput {
        RangedInput {
            path: PathBuf::from(path),
            start,
            duration,
        }
    }

    #[test]
    fn duration_is_the_sum_of_cuts() -> anyhow::Result<()> {
        let src = source("in.mp4", 320, true);
        let tl = concatenate(vec![cut(&src, 5.0, 10.0)?, cut(&src, 0.0, 2.0)?])?;
        assert!((tl.duration() - 7.0).abs() < 1e-9);
        assert_eq!(tl.cuts().len(), 2);
        assert!(tl.has_audio());
        Ok(())
    }

    #[test]
    fn empty_timeline_is_an_assembly_error() {
        let err = concatenate(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Assembly(_)));
    }

    #[test]
    fn mismatched_dimensions_are_an_assembly_error() -> anyhow::Result<()> {
        let a = source("a.mp4", 320, true);
        let b = source("b.mp4", 640, true);
        let err = concatenate(vec![cut(&a, 0.0, 1.0)?, cut(&b, 0.0, 1.0)?]).unwrap_err();
        assert!(matches!(err, Error::Assembly(_)));
        assert!(err.to_string().contains("640x240"));
        Ok(())
    }

    #[test]
    fn render_keeps_submission_order() -> anyhow::Result<()> {
        let src = source("in.mp4", 320, true);
        let tl = concatenate(vec![cut(&src, 5.0, 10.0)?, cut(&src, 0.0, 2.0)?])?;
        let plan = tl.render();

        assert_eq!(
            plan.inputs,
            vec![ranged("in.mp4", 5.0, 5.0), ranged("in.mp4", 0.0, 2.0)]
        );

        let expected: Vec<String> = vec![
            "[0:v]trim=duration=5.000000,setpts=PTS-STARTPTS[v0]".to_owned(),
            format!(
                "[0:a]apad=whole_dur=5.000000,atrim=duration=5.000000,asetpts=PTS-STARTPTS,{AUDIO_FORMAT}[a0]"
            ),
            "[1:v]trim=duration=2.000000,setpts=PTS-STARTPTS[v1]".to_owned(),
            format!(
                "[1:a]apad=whole_dur=2.000000,atrim=duration=2.000000,asetpts=PTS-STARTPTS,{AUDIO_FORMAT}[a1]"
            ),
            "[v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]".to_owned(),
        ];
        assert_eq!(plan.filter_graph, expected.join(";"));
        assert_eq!(plan.video_label, VIDEO_OUT);
        assert_eq!(plan.audio_label.as_deref(), Some(AUDIO_OUT));
        Ok(())
    }

    #[test]
    fn overlapping_cuts_are_not_merged() -> anyhow::Result<()> {
        let src = source("in.mp4", 320, true);
        let tl = concatenate(vec![cut(&src, 0.0, 8.0)?, cut(&src, 4.0, 12.0)?])?;
        assert!((tl.duration() - 16.0).abs() < 1e-9);
        assert_eq!(tl.render().inputs.len(), 2);
        Ok(())
    }

    #[test]
    fn muted_render_has_no_audio_chains() -> anyhow::Result<()> {
        let src = source("in.mp4", 320, true);
        let tl = concatenate(vec![cut(&src, 1.0, 2.0)?])?.without_audio();
        let plan = tl.render();

        assert!(!tl.has_audio());
        assert!(plan.audio_label.is_none());
        assert!(!plan.filter_graph.contains("atrim"));
        assert!(plan.filter_graph.ends_with("[v0]concat=n=1:v=1:a=0[outv]"));
        Ok(())
    }

    #[test]
    fn silent_source_assembles_without_audio() -> anyhow::Result<()> {
        let src = source("in.mp4", 320, false);
        let tl = concatenate(vec![cut(&src, 1.0, 2.0)?])?;
        assert!(!tl.has_audio());
        assert!(tl.render().audio_label.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn substituted_audio_is_read_instead_of_the_native_track() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut src = source("in.mp4", 320, true);
        let audio = ProcessedAudio::from_wav_bytes(dir.path(), &silent_wav(0.5, 8_000)).await?;
        let wav_path = audio.path().to_path_buf();
        substitute_audio(&mut src, audio);

        let plan = {
            let tl = concatenate(vec![cut(&src, 0.0, 1.0)?, cut(&src, 3.0, 4.0)?])?;
            tl.render()
        };

        assert_eq!(plan.inputs.len(), 4);
        assert_eq!(plan.inputs[1].path, wav_path);
        assert_eq!(plan.inputs[3].path, wav_path);
        assert_eq!(plan.inputs[3].start, 3.0);
        assert!(plan.filter_graph.contains("[1:a]apad=whole_dur=1.000000"));
        assert!(plan.filter_graph.contains("[3:a]apad=whole_dur=1.000000"));
        assert!(!plan.filter_graph.contains("[0:a]"));
        assert!(!plan.filter_graph.contains("[2:a]"));

        src.close();
        Ok(())
    }
}
