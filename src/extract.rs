//! Segment extraction: bind a `[start, end]` range to an opened source.

use crate::error::{Error, Result};
use crate::media::SourceMedia;

/// Ends up to this far past the probed duration are accepted and pinned to the duration.
///
/// Container durations are rounded; a browser editor that offers "to the end" sends the
/// duration it measured, which can differ from ffprobe's in the last millisecond.
pub const END_TOLERANCE_SECS: f64 = 1e-3;

/// One realized segment. Borrows the source, so it can never outlive it.
///
/// Cuts reflect the source's audio track at the time they are made; substitute audio first.
#[derive(Debug, Clone, Copy)]
pub struct SegmentCut<'a> {
    source: &'a SourceMedia,
    start: f64,
    end: f64,
}

impl<'a> SegmentCut<'a> {
    pub fn source(&self) -> &'a SourceMedia {
        self.source
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn has_audio(&self) -> bool {
        self.source.has_audio()
    }
}

/// Cut `[start, end]` out of `source`.
///
/// Fails with `Error::Range` unless `0 <= start < end <= duration`. The source is not modified,
/// and any number of cuts may overlap.
pub fn cut(source: &SourceMedia, start: f64, end: f64) -> Result<SegmentCut<'_>> {
    let duration = source.duration();

    let in_range = start.is_finite()
        && end.is_finite()
        && start >= 0.0
        && end > start
        && end <= duration + END_TOLERANCE_SECS
        && start < duration;

    if !in_range {
        return Err(Error::Range {
            start,
            end,
            duration,
        });
    }

    Ok(SegmentCut {
        source,
        start,
        end: end.min(duration),
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::ffmpeg::MediaInfo;

    fn source(duration: f64) -> SourceMedia {
        SourceMedia::from_parts(
            PathBuf::from("in.mp4"),
            MediaInfo {
                duration,
                width: 320,
                height: 240,
                fps: 25.0,
                has_audio: true,
            },
        )
    }

    #[test]
    fn cuts_inside_the_source() -> anyhow::Result<()> {
        let src = source(20.0);
        let c = cut(&src, 5.0, 10.0)?;
        assert_eq!(c.start(), 5.0);
        assert_eq!(c.duration(), 5.0);
        assert!(c.has_audio());
        Ok(())
    }

    #[test]
    fn whole_source_is_a_valid_cut() -> anyhow::Result<()> {
        let src = source(20.0);
        let c = cut(&src, 0.0, 20.0)?;
        assert_eq!(c.duration(), 20.0);
        Ok(())
    }

    #[test]
    fn end_rounding_past_duration_is_pinned() -> anyhow::Result<()> {
        let src = source(20.0);
        let c = cut(&src, 19.0, 20.0005)?;
        assert_eq!(c.duration(), 1.0);
        Ok(())
    }

    #[test]
    fn out_of_range_cuts_fail() {
        let src = source(20.0);
        for (start, end) in [(5.0, 5.0), (6.0, 5.0), (-1.0, 2.0), (18.0, 25.0), (20.0, 21.0)] {
            let err = cut(&src, start, end).unwrap_err();
            assert!(
                matches!(err, Error::Range { .. }),
                "expected range error for [{start}, {end}]"
            );
        }
    }

    #[test]
    fn overlapping_cuts_are_independent() -> anyhow::Result<()> {
        let src = source(20.0);
        let a = cut(&src, 0.0, 8.0)?;
        let b = cut(&src, 4.0, 12.0)?;
        assert_eq!(a.duration(), 8.0);
        assert_eq!(b.start(), 4.0);
        assert_eq!(src.duration(), 20.0);
        Ok(())
    }
}
