//! Segment requests: the `(start, end)` ranges a caller wants, in the order they want them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const NO_SEGMENTS_MESSAGE: &str = "No segments provided";
pub const INVALID_SEGMENTS_MESSAGE: &str = "Invalid segments format";

/// A requested time range in seconds.
///
/// Submission order is meaningful: it is the output order. Overlapping ranges are allowed and
/// are neither merged nor deduplicated. Extra fields sent by the editor (`id`, `label`) are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Parse the `segments` form field (a JSON array of `{start, end}` objects).
///
/// Any JSON or shape error is reported as `Invalid segments format`.
pub fn parse_segments(raw: &str) -> Result<Vec<Segment>> {
    serde_json::from_str::<Vec<Segment>>(raw).map_err(|_| Error::validation(INVALID_SEGMENTS_MESSAGE))
}

/// Structural checks that need no media: non-empty, finite, `start >= 0`, `end > start`.
///
/// Bounds against the source duration are checked by the extractor once the source is open.
pub fn validate_segments(segments: &[Segment]) -> Result<()> {
    if segments.is_empty() {
        return Err(Error::validation(NO_SEGMENTS_MESSAGE));
    }

    for (idx, seg) in segments.iter().enumerate() {
        if !seg.start.is_finite() || !seg.end.is_finite() {
            return Err(Error::validation(format!(
                "segment {idx} has a non-finite bound"
            )));
        }
        if seg.start < 0.0 {
            return Err(Error::validation(format!(
                "segment {idx} starts before 0 ({})",
                seg.start
            )));
        }
        if seg.end <= seg.start {
            return Err(Error::validation(format!(
                "segment {idx} must end after it starts ({} <= {})",
                seg.end, seg.start
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_editor_payload_and_ignores_extra_fields() -> anyhow::Result<()> {
        let raw = r#"[{"id":"a","start":5,"end":10,"label":"intro"},{"start":0,"end":2.5}]"#;
        let segs = parse_segments(raw)?;
        assert_eq!(segs, vec![Segment::new(5.0, 10.0), Segment::new(0.0, 2.5)]);
        Ok(())
    }

    #[test]
    fn malformed_json_is_invalid_format() {
        let err = parse_segments("[{\"start\": 1,").unwrap_err();
        assert_eq!(err.to_string(), INVALID_SEGMENTS_MESSAGE);

        let err = parse_segments(r#"{"start":1,"end":2}"#).unwrap_err();
        assert_eq!(err.to_string(), INVALID_SEGMENTS_MESSAGE);

        let err = parse_segments(r#"[{"start":1}]"#).unwrap_err();
        assert_eq!(err.to_string(), INVALID_SEGMENTS_MESSAGE);
    }

    #[test]
    fn empty_list_is_rejected() {
        let err = validate_segments(&[]).unwrap_err();
        assert_eq!(err.to_string(), NO_SEGMENTS_MESSAGE);
    }

    #[test]
    fn inverted_and_negative_ranges_are_rejected() {
        assert!(validate_segments(&[Segment::new(3.0, 3.0)]).is_err());
        assert!(validate_segments(&[Segment::new(4.0, 3.0)]).is_err());
        assert!(validate_segments(&[Segment::new(-0.5, 3.0)]).is_err());
        assert!(validate_segments(&[Segment::new(0.0, f64::INFINITY)]).is_err());
    }

    #[test]
    fn overlapping_and_unsorted_ranges_are_fine() -> anyhow::Result<()> {
        let segs = [
            Segment::new(5.0, 10.0),
            Segment::new(0.0, 2.0),
            Segment::new(1.0, 6.0),
        ];
        validate_segments(&segs)?;
        Ok(())
    }
}
