//! Request-scoped temporary files.
//!
//! A `ScratchFile` is removed exactly once: explicitly via `discard` (which logs a failed
//! removal) or, on any early-return/panic path, when it is dropped. Removal never fails the
//! caller.

use std::path::Path;

use tempfile::{Builder, TempPath};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

/// Longest original filename fragment we carry into a temp file name.
const MAX_NAME_CHARS: usize = 64;

#[derive(Debug)]
pub struct ScratchFile {
    path: TempPath,
    label: &'static str,
}

impl ScratchFile {
    /// Create an empty file in `dir` named `<uuid>_<name>` and open it for writing.
    ///
    /// `name` is sanitized first. The uuid keeps concurrent requests from colliding.
    pub fn create(dir: &Path, name: &str, label: &'static str) -> Result<(Self, File)> {
        let prefix = format!("{}_", Uuid::new_v4());
        let suffix = sanitize_file_name(name);

        let (file, path) = Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .rand_bytes(0)
            .tempfile_in(dir)?
            .into_parts();

        debug!(label, path = %path.display(), "created scratch file");
        Ok((Self { path, label }, File::from_std(file)))
    }

    /// Create a scratch file holding `bytes`.
    pub async fn write_new(
        dir: &Path,
        name: &str,
        bytes: &[u8],
        label: &'static str,
    ) -> Result<Self> {
        let (scratch, mut file) = Self::create(dir, name, label)?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(scratch)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now. A failure is logged and otherwise ignored.
    pub fn discard(self) {
        let label = self.label;
        let path = self.path.to_path_buf();
        if let Err(err) = self.path.close() {
            warn!(label, path = %path.display(), error = %err, "failed to remove scratch file");
        }
    }
}

/// Reduce an uploaded filename to `[A-Za-z0-9._-]`, keeping its extension where possible.
///
/// A name that is only an extension (`.mp4`) becomes `upload.mp4`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        return "upload".to_owned();
    }
    let cleaned = if trimmed.len() < cleaned.len() && !trimmed.contains('.') {
        format!("upload.{trimmed}")
    } else {
        trimmed.to_owned()
    };

    let count = cleaned.chars().count();
    if count <= MAX_NAME_CHARS {
        return cleaned;
    }
    cleaned.chars().skip(count - MAX_NAME_CHARS).collect()
}
