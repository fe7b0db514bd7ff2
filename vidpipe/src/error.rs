use std::path::PathBuf;

/// All errors that can occur in vidpipe.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid source URL (must start with http:// or https://): {0}")]
    InvalidUrl(String),

    #[error("yt-dlp not found — install with: pip install yt-dlp")]
    YtDlpNotFound,

    #[error("{0} not found on PATH")]
    ToolNotFound(&'static str),

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: &'static str, secs: u64 },

    #[error("download error: {0}")]
    Fetch(String),

    #[error("no playable media file found after download")]
    NoMediaFile,

    #[error("video validation failed: {0}")]
    Validation(String),

    #[error("video repair failed: {0}")]
    Repair(String),

    #[error("audio extraction error: {0}")]
    AudioExtract(String),

    #[error("audio decoding error: {0}")]
    AudioDecode(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("model not found: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("model download failed: {0}")]
    ModelDownload(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("whisper error: {0}")]
    Whisper(#[from] whisper_rs::WhisperError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
