use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::process::Command;
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::{Error, Result};
use crate::tool;

const HUGGINGFACE_BASE: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// One bounded audio span — the whole clip or a single chunk — handed
/// to a recognition backend. Ephemeral; the WAV behind `audio_path` is
/// owned by the caller.
#[derive(Debug, Clone)]
pub struct TranscriptionUnit {
    pub audio_path: PathBuf,
    pub duration_secs: f64,
}

/// Why a backend produced no text for a unit.
#[derive(Debug, thiserror::Error)]
pub enum RecognizeError {
    #[error("no speech detected")]
    NoSpeech,

    #[error("{0}")]
    Backend(String),
}

/// A speech recognition engine.
///
/// The transcriber iterates an ordered backend list per unit of work
/// until one succeeds or the list is exhausted; a miss carries the
/// backend-specific reason.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the backend can run in this environment at all.
    fn is_available(&self) -> bool {
        true
    }

    /// One recognition attempt over the unit.
    async fn recognize(&self, unit: &TranscriptionUnit) -> std::result::Result<String, RecognizeError>;

    /// Ranked alternative readings, best first. The default is a single
    /// plain attempt.
    async fn alternatives(
        &self,
        unit: &TranscriptionUnit,
    ) -> std::result::Result<Vec<String>, RecognizeError> {
        self.recognize(unit).await.map(|text| vec![text])
    }
}

/// Whisper model sizes the in-process backend knows how to fetch.
#[derive(Debug, Clone)]
pub enum WhisperModel {
    Tiny,
    Base,
    Small,
    /// User-provided .bin file path.
    Custom(PathBuf),
}

impl WhisperModel {
    /// Model filename as published by whisper.cpp on HuggingFace.
    pub fn filename(&self) -> String {
        match self {
            WhisperModel::Tiny => "ggml-tiny.bin".into(),
            WhisperModel::Base => "ggml-base.bin".into(),
            WhisperModel::Small => "ggml-small.bin".into(),
            WhisperModel::Custom(path) => path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "custom-model".into()),
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        match self {
            WhisperModel::Tiny => "tiny",
            WhisperModel::Base => "base",
            WhisperModel::Small => "small",
            WhisperModel::Custom(_) => "custom",
        }
    }

    /// Parse from string (e.g. CLI argument); unknown names that point
    /// at an existing file become a custom model.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tiny" => Some(WhisperModel::Tiny),
            "base" => Some(WhisperModel::Base),
            "small" => Some(WhisperModel::Small),
            _ => {
                let path = PathBuf::from(s);
                path.exists().then_some(WhisperModel::Custom(path))
            }
        }
    }
}

/// In-process whisper.cpp backend.
///
/// Greedy sampling for the plain attempt; `alternatives` re-runs with
/// beam search, which explores a wider candidate set and returns its
/// best reading.
pub struct WhisperBackend {
    ctx: WhisperContext,
    model_name: String,
    gpu: bool,
}

impl WhisperBackend {
    /// Load the backend, downloading the model on first use.
    pub async fn load(model: WhisperModel, cache_dir: Option<PathBuf>, gpu: bool) -> Result<Self> {
        let cache_dir = cache_dir.unwrap_or_else(default_cache_dir);
        let model_path = ensure_model(&model, &cache_dir).await?;

        info!(model = model.name(), path = %model_path.display(), "loading whisper model");

        let mut ctx_params = WhisperContextParameters::new();
        ctx_params.use_gpu(gpu);

        let ctx = WhisperContext::new_with_params(
            model_path
                .to_str()
                .ok_or_else(|| Error::Model("model path contains invalid UTF-8".into()))?,
            ctx_params,
        )?;

        Ok(Self {
            ctx,
            model_name: model.name().to_string(),
            gpu,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn gpu(&self) -> bool {
        self.gpu
    }

    fn run(
        &self,
        samples: &[f32],
        strategy: SamplingStrategy,
    ) -> std::result::Result<String, RecognizeError> {
        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| RecognizeError::Backend(format!("whisper state: {e}")))?;

        let mut params = FullParams::new(strategy);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| RecognizeError::Backend(format!("whisper run: {e}")))?;

        let num_segments = state.full_n_segments();
        let mut text = String::new();
        for i in 0..num_segments {
            let Some(segment) = state.get_segment(i) else {
                continue;
            };
            let Ok(segment_text) = segment.to_str_lossy() else {
                continue;
            };
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(segment_text.trim());
        }

        let text = text.trim().to_string();
        if text.is_empty() {
            Err(RecognizeError::NoSpeech)
        } else {
            Ok(text)
        }
    }
}

#[async_trait]
impl SpeechBackend for WhisperBackend {
    fn name(&self) -> &'static str {
        "whisper"
    }

    async fn recognize(&self, unit: &TranscriptionUnit) -> std::result::Result<String, RecognizeError> {
        let samples = read_wav_samples(&unit.audio_path)?;
        self.run(&samples, SamplingStrategy::Greedy { best_of: 5 })
    }

    async fn alternatives(
        &self,
        unit: &TranscriptionUnit,
    ) -> std::result::Result<Vec<String>, RecognizeError> {
        let samples = read_wav_samples(&unit.audio_path)?;
        self.run(
            &samples,
            SamplingStrategy::BeamSearch {
                beam_size: 5,
                patience: -1.0,
            },
        )
        .map(|text| vec![text])
    }
}

/// Backend shelling out to the `whisper` command-line tool.
///
/// Useful where linking whisper.cpp is impossible but the Python
/// package is installed; bounded by its own timeout like every other
/// external tool invocation.
pub struct WhisperCliBackend {
    model: String,
    timeout: Duration,
}

impl WhisperCliBackend {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model: model.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SpeechBackend for WhisperCliBackend {
    fn name(&self) -> &'static str {
        "whisper-cli"
    }

    async fn recognize(&self, unit: &TranscriptionUnit) -> std::result::Result<String, RecognizeError> {
        let out_dir = unit
            .audio_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let mut cmd = Command::new("whisper");
        cmd.arg(&unit.audio_path)
            .args(["--model", &self.model])
            .args(["--output_format", "txt"])
            .arg("--output_dir")
            .arg(&out_dir);

        let output = tool::run("whisper", &mut cmd, self.timeout)
            .await
            .map_err(|e| RecognizeError::Backend(e.to_string()))?;

        if !output.status.success() {
            return Err(RecognizeError::Backend(format!(
                "whisper CLI failed: {}",
                tool::stderr_snippet(&output)
            )));
        }

        // The CLI names its output after the input stem.
        let stem = unit
            .audio_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio");
        let transcript_file = out_dir.join(format!("{stem}.txt"));

        let text = std::fs::read_to_string(&transcript_file)
            .map_err(|e| RecognizeError::Backend(format!("missing CLI output: {e}")))?;
        if let Err(e) = std::fs::remove_file(&transcript_file) {
            warn!(path = %transcript_file.display(), error = %e, "could not remove CLI scratch file");
        }

        let text = text.trim().to_string();
        if text.is_empty() {
            Err(RecognizeError::NoSpeech)
        } else {
            Ok(text)
        }
    }
}

fn read_wav_samples(path: &Path) -> std::result::Result<Vec<f32>, RecognizeError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| RecognizeError::Backend(format!("cannot read WAV: {e}")))?;
    let samples: Vec<f32> = reader
        .samples::<i16>()
        .filter_map(|s| s.ok())
        .map(|s| s as f32 / 32768.0)
        .collect();
    Ok(samples)
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("vidpipe")
        .join("models")
}

/// Ensure a model is available locally, downloading if necessary.
/// Returns the path to the model file.
pub async fn ensure_model(model: &WhisperModel, cache_dir: &Path) -> Result<PathBuf> {
    if let WhisperModel::Custom(path) = model {
        return if path.exists() {
            Ok(path.clone())
        } else {
            Err(Error::ModelNotFound { path: path.clone() })
        };
    }

    let model_path = cache_dir.join(model.filename());
    if model_path.exists() {
        debug!(path = %model_path.display(), "model already cached");
        return Ok(model_path);
    }

    std::fs::create_dir_all(cache_dir).map_err(|e| {
        Error::Model(format!(
            "failed to create cache dir {}: {e}",
            cache_dir.display()
        ))
    })?;

    let url = format!("{HUGGINGFACE_BASE}/{}", model.filename());
    info!(%url, "downloading model");
    download_model(&url, &model_path).await?;

    Ok(model_path)
}

async fn download_model(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| Error::ModelDownload(format!("HTTP error: {e}")))?;

    let total_size = response.content_length().unwrap_or(0);
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    pb.set_message(format!(
        "Downloading {}",
        dest.file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));

    // Stream into a part file first, rename when complete.
    let tmp_path = dest.with_extension("bin.part");
    let mut file = std::fs::File::create(&tmp_path)?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    use std::io::Write;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    file.flush()?;
    drop(file);

    let file_size = std::fs::metadata(&tmp_path)?.len();
    if file_size < 1_000_000 {
        std::fs::remove_file(&tmp_path).ok();
        return Err(Error::ModelDownload(format!(
            "downloaded file too small ({file_size} bytes) — likely an error page"
        )));
    }

    std::fs::rename(&tmp_path, dest)?;
    pb.finish_with_message("Download complete");
    info!(path = %dest.display(), size = file_size, "model saved");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_filenames() {
        assert_eq!(WhisperModel::Tiny.filename(), "ggml-tiny.bin");
        assert_eq!(WhisperModel::Base.filename(), "ggml-base.bin");
        assert_eq!(WhisperModel::Small.filename(), "ggml-small.bin");
    }

    #[test]
    fn test_model_parse_known_names() {
        assert!(matches!(WhisperModel::parse("tiny"), Some(WhisperModel::Tiny)));
        assert!(matches!(WhisperModel::parse("base"), Some(WhisperModel::Base)));
        assert!(WhisperModel::parse("enormous").is_none());
    }

    #[test]
    fn test_model_parse_custom_path() {
        let path = std::env::temp_dir().join("vidpipe_test_custom_model.bin");
        std::fs::write(&path, b"fake model").unwrap();

        let parsed = WhisperModel::parse(path.to_str().unwrap());
        assert!(matches!(parsed, Some(WhisperModel::Custom(_))));

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_ensure_model_custom_exists() {
        let path = std::env::temp_dir().join("vidpipe_test_ensure_custom.bin");
        std::fs::write(&path, b"fake model data").unwrap();

        let model = WhisperModel::Custom(path.clone());
        let resolved = ensure_model(&model, Path::new("/unused")).await.unwrap();
        assert_eq!(resolved, path);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_ensure_model_custom_not_found() {
        let model = WhisperModel::Custom(PathBuf::from("/nonexistent/model.bin"));
        let err = ensure_model(&model, Path::new("/unused")).await.unwrap_err();
        assert!(matches!(err, Error::ModelNotFound { .. }));
    }

    #[tokio::test]
    async fn test_ensure_model_uses_cache() {
        let cache = std::env::temp_dir().join("vidpipe_test_model_cache");
        let _ = std::fs::remove_dir_all(&cache);
        std::fs::create_dir_all(&cache).unwrap();

        let cached = cache.join("ggml-tiny.bin");
        std::fs::write(&cached, b"fake cached model").unwrap();

        let resolved = ensure_model(&WhisperModel::Tiny, &cache).await.unwrap();
        assert_eq!(resolved, cached);

        std::fs::remove_dir_all(&cache).ok();
    }

    #[test]
    fn test_read_wav_samples_missing_file() {
        let err = read_wav_samples(Path::new("/nonexistent/audio.wav")).unwrap_err();
        assert!(matches!(err, RecognizeError::Backend(_)));
    }

    #[test]
    fn test_recognize_error_display() {
        assert_eq!(RecognizeError::NoSpeech.to_string(), "no speech detected");
        assert_eq!(
            RecognizeError::Backend("engine exploded".into()).to_string(),
            "engine exploded"
        );
    }
}
