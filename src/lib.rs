//! `vidsplice`: cut segments out of an uploaded video and join them into a single export.
//!
//! This crate provides:
//! - Segment parsing and validation
//! - Media probing, cutting and ordered concatenation (driven through `ffmpeg`/`ffprobe`)
//! - Optional muting and best-effort remote voice cancellation
//! - A single fixed output encoding (H.264 + AAC in MP4)
//!
//! The library is used by both the CLI and the HTTP server. Most consumers should start with
//! [`Exporter`].

// High-level API (most consumers should start here).
pub mod export;
pub mod opts;

// Configuration and errors.
pub mod config;
pub mod error;

// Segment data structures and validation.
pub mod segments;

// Media handling.
pub mod extract;
pub mod ffmpeg;
pub mod media;
pub mod scratch;
pub mod timeline;
pub mod writer;

// Remote voice cancellation.
pub mod voice;

// Logging configuration.
#[cfg(feature = "logging")]
pub mod logging;

pub use config::{Config, Encoding};
pub use error::{Error, ErrorKind, Result};
pub use export::{ExportOutput, Exporter, VoiceOutcome};
pub use opts::{AudioPolicy, ExportOptions};
pub use segments::{Segment, parse_segments};
pub use voice::{HttpVoiceCanceller, VoiceCanceller};

#[cfg(feature = "logging")]
pub use logging::init as init_logging;
