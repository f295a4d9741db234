use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};

mod metrics;

use vidsplice::config::{
    DEFAULT_ENCODE_TIMEOUT, DEFAULT_RESULT_DIR, DEFAULT_TEMP_DIR, DEFAULT_VOICE_ENDPOINT,
    DEFAULT_VOICE_TIMEOUT,
};
use vidsplice::opts::parse_flag;
use vidsplice::scratch::ScratchFile;
use vidsplice::segments::NO_SEGMENTS_MESSAGE;
use vidsplice::{Config, ErrorKind, ExportOptions, Exporter, Segment, parse_segments};

const NO_VIDEO_MESSAGE: &str = "No video file provided";

#[derive(Parser, Debug)]
#[command(name = "vidsplice-server")]
#[command(about = "HTTP server for cutting and joining video segments")]
struct Params {
    /// Host interface to bind to.
    #[arg(long = "host", env = "VIDSPLICE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", env = "VIDSPLICE_PORT", default_value_t = 5000)]
    port: u16,

    /// Maximum request body size (bytes).
    #[arg(long = "max-bytes", env = "VIDSPLICE_MAX_BYTES", default_value_t = 1024 * 1024 * 1024)]
    max_bytes: usize,

    /// Allowed CORS origin. May be repeated; any origin is allowed when omitted.
    #[arg(long = "cors-origin", env = "VIDSPLICE_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Vec<String>,

    /// Directory for uploads and intermediate audio.
    #[arg(long = "temp-dir", env = "VIDSPLICE_TEMP_DIR", default_value = DEFAULT_TEMP_DIR)]
    temp_dir: PathBuf,

    /// Directory for finished exports.
    #[arg(long = "result-dir", env = "VIDSPLICE_RESULT_DIR", default_value = DEFAULT_RESULT_DIR)]
    result_dir: PathBuf,

    /// Voice-cancellation endpoint.
    #[arg(long = "voice-endpoint", env = "VIDSPLICE_VOICE_ENDPOINT", default_value = DEFAULT_VOICE_ENDPOINT)]
    voice_endpoint: String,

    /// Voice-cancellation timeout (seconds).
    #[arg(long = "voice-timeout", env = "VIDSPLICE_VOICE_TIMEOUT", default_value_t = DEFAULT_VOICE_TIMEOUT.as_secs())]
    voice_timeout_secs: u64,

    /// Kill an encode after this many seconds. 0 disables the limit.
    #[arg(long = "encode-timeout", env = "VIDSPLICE_ENCODE_TIMEOUT", default_value_t = DEFAULT_ENCODE_TIMEOUT.as_secs())]
    encode_timeout_secs: u64,

    /// `ffmpeg` program name or path.
    #[arg(long = "ffmpeg", env = "VIDSPLICE_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// `ffprobe` program name or path.
    #[arg(long = "ffprobe", env = "VIDSPLICE_FFPROBE", default_value = "ffprobe")]
    ffprobe: PathBuf,
}

impl Params {
    fn config(&self) -> Config {
        Config {
            temp_dir: self.temp_dir.clone(),
            result_dir: self.result_dir.clone(),
            voice_endpoint: self.voice_endpoint.clone(),
            voice_timeout: Duration::from_secs(self.voice_timeout_secs),
            encode_timeout: (self.encode_timeout_secs > 0)
                .then(|| Duration::from_secs(self.encode_timeout_secs)),
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
            ..Config::default()
        }
    }
}

#[derive(Clone)]
struct AppState {
    exporter: Arc<Exporter>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<vidsplice::Error> for AppError {
    fn from(err: vidsplice::Error) -> Self {
        match err.kind() {
            ErrorKind::Validation => Self::bad_request(err.to_string()),
            ErrorKind::Processing | ErrorKind::RemoteService => Self::internal(err.to_string()),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[tokio::main]
async fn main() {
    vidsplice::init_logging();

    if let Err(err) = run().await {
        error!(error = ?err, "vidsplice-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    if let Err(err) = metrics::init() {
        warn!(error = ?err, "metrics disabled (init failed)");
    }

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let exporter = Exporter::new(params.config()).context("failed to initialize exporter")?;
    let state = AppState {
        exporter: Arc::new(exporter),
    };

    let cors = cors_layer(&params.cors_origins)?;
    let app = app(state, params.max_bytes).layer(cors);

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn app(state: AppState, max_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/export", post(export))
        .route_layer(from_fn(metrics::track_http_metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let values = origins
            .iter()
            .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin '{o}'")))
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn root() -> &'static str {
    "vidsplice-server: POST /export (multipart fields: video, segments, mute, cancelMaleVoice)"
}

async fn healthz() -> &'static str {
    "ok"
}

/// The raw multipart fields of an export request.
///
/// The video is streamed to a staged upload as it arrives. Dropping the form removes it.
#[derive(Debug, Default)]
struct ExportForm {
    video: Option<ScratchFile>,
    segments: Option<String>,
    mute: Option<String>,
    cancel_male_voice: Option<String>,
}

/// A fully validated export request.
#[derive(Debug)]
struct ExportRequest {
    video: ScratchFile,
    segments: Vec<Segment>,
    opts: ExportOptions,
}

impl ExportForm {
    async fn read(
        exporter: &Exporter,
        mut multipart: Multipart,
    ) -> std::result::Result<Self, AppError> {
        let mut form = Self::default();

        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("video") => {
                    // A part without a filename is not a file upload.
                    let Some(file_name) = field
                        .file_name()
                        .filter(|n| !n.is_empty())
                        .map(str::to_owned)
                    else {
                        continue;
                    };
                    let (upload, mut file) = exporter.stage_upload(&file_name)?;
                    while let Some(chunk) = field.chunk().await? {
                        file.write_all(&chunk).await.map_err(vidsplice::Error::from)?;
                    }
                    file.flush().await.map_err(vidsplice::Error::from)?;
                    form.video = Some(upload);
                }
                Some("segments") => form.segments = Some(field.text().await?),
                Some("mute") => form.mute = Some(field.text().await?),
                Some("cancelMaleVoice") => form.cancel_male_voice = Some(field.text().await?),
                _ => {}
            }
        }

        Ok(form)
    }

    /// Check the fields in a fixed order so the first problem found is the one reported.
    fn into_request(self) -> std::result::Result<ExportRequest, AppError> {
        let video = self
            .video
            .ok_or_else(|| AppError::bad_request(NO_VIDEO_MESSAGE))?;
        let raw = self
            .segments
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::bad_request(NO_SEGMENTS_MESSAGE))?;
        let segments = parse_segments(&raw)?;

        let opts = ExportOptions {
            mute: parse_flag(self.mute.as_deref()),
            cancel_male_voice: parse_flag(self.cancel_male_voice.as_deref()),
        };

        Ok(ExportRequest {
            video,
            segments,
            opts,
        })
    }
}

async fn export(
    State(state): State<AppState>,
    multipart: Multipart,
) -> std::result::Result<Response, AppError> {
    let request = match ExportForm::read(&state.exporter, multipart)
        .await
        .and_then(ExportForm::into_request)
    {
        Ok(request) => request,
        Err(err) => {
            metrics::record_export("rejected");
            return Err(err);
        }
    };

    let output = match state
        .exporter
        .export_upload(request.video, &request.segments, &request.opts)
        .await
    {
        Ok(output) => output,
        Err(err) => {
            let rejected = err.kind() == ErrorKind::Validation;
            metrics::record_export(if rejected { "rejected" } else { "failed" });
            if !rejected {
                error!(error = %err, "export failed");
            }
            return Err(err.into());
        }
    };

    metrics::record_export("ok");
    metrics::record_voice(output.voice);

    let file = tokio::fs::File::open(&output.path).await.map_err(|err| {
        error!(error = %err, path = %output.path.display(), "failed to open export");
        AppError::internal(err.to_string())
    })?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        output.file_name
    ))
    .map_err(|err| AppError::internal(err.to_string()))?;

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("video/mp4")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
