use std::time::Duration;

use thiserror::Error;

/// vidsplice's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// How an error should be reported to whoever asked for the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was bad (missing fields, malformed segments). Nothing was processed.
    Validation,
    /// Decoding, cutting, assembling or encoding failed.
    Processing,
    /// The remote voice-cancellation service failed. Never fatal to an export.
    RemoteService,
}

/// vidsplice's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("segment [{start}, {end}] is outside the source range [0, {duration}]")]
    Range { start: f64, end: f64, duration: f64 },

    #[error("{0}")]
    Assembly(String),

    #[error("{message}")]
    Ffmpeg {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("required tool '{0}' was not found")]
    ToolNotFound(String),

    #[error("voice service error: {0}")]
    Remote(String),

    #[error("voice service timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("invalid WAV data: {0}")]
    Wav(#[from] hound::Error),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn assembly(message: impl Into<String>) -> Self {
        Self::Assembly(message.into())
    }

    pub(crate) fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    pub(crate) fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::Ffmpeg {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Classify this error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Remote(_) | Self::Timeout(_) | Self::Http(_) | Self::Wav(_) => {
                ErrorKind::RemoteService
            }
            Self::Range { .. }
            | Self::Assembly(_)
            | Self::Ffmpeg { .. }
            | Self::ToolNotFound(_)
            | Self::Io(_)
            | Self::Json(_) => ErrorKind::Processing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_reporting_taxonomy() {
        assert_eq!(
            Error::validation("No segments provided").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            Error::Range {
                start: 1.0,
                end: 30.0,
                duration: 20.0
            }
            .kind(),
            ErrorKind::Processing
        );
        assert_eq!(
            Error::ffmpeg_failed("boom", None, Some(1)).kind(),
            ErrorKind::Processing
        );
        assert_eq!(
            Error::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::RemoteService
        );
    }

    #[test]
    fn range_error_names_the_bounds() {
        let err = Error::Range {
            start: 18.0,
            end: 25.0,
            duration: 20.0,
        };
        assert_eq!(
            err.to_string(),
            "segment [18, 25] is outside the source range [0, 20]"
        );
    }
}
