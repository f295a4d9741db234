//! Client for the remote voice-cancellation service.
//!
//! The service is opaque to us: we `POST` the video as multipart field `video` and expect
//! `200 OK` with a WAV body. Anything else (another status, a transport error, the timeout) is a
//! failure, and the caller decides what a failure means.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::{Body, StatusCode};
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Anything that can turn a video into a voice-cancelled audio track.
pub trait VoiceCanceller: Send + Sync {
    /// Return the processed audio bytes for the video at `video`.
    fn cancel(&self, video: &Path) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// `VoiceCanceller` backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpVoiceCanceller {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpVoiceCanceller {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vidsplice/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client, endpoint, timeout))
    }

    /// Use a preconfigured client (proxy settings, TLS roots, ...).
    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    async fn call(&self, video: &Path) -> Result<Vec<u8>> {
        let file = tokio::fs::File::open(video).await?;
        let len = file.metadata().await?.len();
        let file_name = video
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video.mp4")
            .to_owned();

        debug!(endpoint = %self.endpoint, len, "calling voice service");

        // Streamed from disk; the upload is never held in memory.
        let part = Part::stream_with_length(Body::from(file), len)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("video", part);

        let resp = self.client.post(&self.endpoint).multipart(form).send().await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(Error::remote(format!(
                "voice service returned HTTP {status}"
            )));
        }

        let body = resp.bytes().await?;
        info!(len = body.len(), "voice service returned audio");
        Ok(body.to_vec())
    }
}

impl VoiceCanceller for HttpVoiceCanceller {
    async fn cancel(&self, video: &Path) -> Result<Vec<u8>> {
        // The bound covers the whole exchange, including reading the body.
        match tokio::time::timeout(self.timeout, self.call(video)).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }
}
