use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::tool;

/// Codecs that play everywhere; anything else logs a warning but still
/// passes validation.
const WEB_CODECS: &[&str] = &["h264", "mpeg4", "vp8", "vp9"];

/// Why a media file failed validation.
///
/// An enumerated classification, not a diagnostic string: repair
/// decisions hang off `repairable()` and must not depend on message
/// wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidKind {
    /// File does not exist.
    Missing,
    /// Below the minimum plausible size for real media.
    TooSmall,
    /// Sniffed as something that is not a media container at all.
    NotVideo,
    /// Container holds no video-typed stream (audio-only included).
    NoVideoStream,
    /// Structural inspection could not run or produced nothing usable.
    ProbeFailed,
}

impl InvalidKind {
    /// Whether a re-encode repair is worth attempting.
    ///
    /// A missing or tiny file has nothing to re-encode, and a file with
    /// no video stream cannot gain one — those short-circuit repair.
    pub fn repairable(self) -> bool {
        matches!(self, InvalidKind::NotVideo | InvalidKind::ProbeFailed)
    }
}

/// Verdict for one media file. Ephemeral — consumed immediately by the
/// orchestrator, never persisted.
#[derive(Debug, Clone)]
pub enum Validation {
    Pass { message: String },
    Fail { kind: InvalidKind, message: String },
}

impl Validation {
    pub fn is_pass(&self) -> bool {
        matches!(self, Validation::Pass { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Validation::Pass { message } => message,
            Validation::Fail { message, .. } => message,
        }
    }

    fn fail(kind: InvalidKind, message: impl Into<String>) -> Self {
        Validation::Fail {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Inspect a media file and report whether it contains a usable video
/// stream.
///
/// Cheap checks run first: existence, minimum size, then a coarse
/// file-type sniff. Only plausible candidates reach the structural
/// ffprobe inspection. Tool trouble never escapes as an error — it
/// becomes a classified failure (or a downgraded pass when a simpler
/// probe still shows a video stream).
pub async fn validate_video(path: &Path, cfg: &PipelineConfig) -> Validation {
    info!(path = %path.display(), "validating media file");

    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(_) => return Validation::fail(InvalidKind::Missing, "file not found"),
    };

    let size = meta.len();
    if size < cfg.min_video_bytes {
        return Validation::fail(
            InvalidKind::TooSmall,
            format!("file too small: {size} bytes"),
        );
    }

    if let Some(verdict) = sniff(path) {
        return verdict;
    }

    probe_streams(path, size, cfg).await
}

/// Coarse magic-byte sniff. Returns an early verdict for files that are
/// provably not usable video; unknown types fall through to ffprobe.
fn sniff(path: &Path) -> Option<Validation> {
    let sniffed = match infer::get_from_path(path) {
        Ok(sniffed) => sniffed,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "file type sniff failed");
            return None;
        }
    };

    let Some(kind) = sniffed else {
        // Unknown magic — could still be a raw stream; let ffprobe decide.
        return None;
    };

    match kind.matcher_type() {
        infer::MatcherType::Video => None,
        infer::MatcherType::Audio => Some(Validation::fail(
            InvalidKind::NoVideoStream,
            format!("no video streams: {} container is audio-only", kind.mime_type()),
        )),
        _ => Some(Validation::fail(
            InvalidKind::NotVideo,
            format!("not a video file: {}", kind.mime_type()),
        )),
    }
}

/// Structural inspection: ask ffprobe for the stream list and look for
/// a stream whose type is video — not merely any stream.
async fn probe_streams(path: &Path, size: u64, cfg: &PipelineConfig) -> Validation {
    let mut cmd = Command::new("ffprobe");
    cmd.args(["-v", "error"])
        .args(["-show_entries", "stream=codec_name,codec_type,width,height"])
        .args(["-of", "json"])
        .arg(path);

    let output = match tool::run("ffprobe", &mut cmd, cfg.probe_timeout).await {
        Ok(output) => output,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ffprobe failed to run");
            return fallback_probe(path, cfg).await;
        }
    };

    if !output.status.success() {
        warn!(
            path = %path.display(),
            stderr = %tool::stderr_snippet(&output),
            "ffprobe inspection failed"
        );
        return fallback_probe(path, cfg).await;
    }

    let probe: ProbeOutput = match serde_json::from_slice(&output.stdout) {
        Ok(probe) => probe,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ffprobe output unparsable");
            return fallback_probe(path, cfg).await;
        }
    };

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let Some(video) = video else {
        let present: Vec<&str> = probe
            .streams
            .iter()
            .map(|s| s.codec_type.as_deref().unwrap_or("unknown"))
            .collect();
        return Validation::fail(
            InvalidKind::NoVideoStream,
            format!("no video streams detected (present: {present:?})"),
        );
    };

    let codec = video.codec_name.as_deref().unwrap_or("unknown");
    info!(
        codec,
        width = video.width.unwrap_or(0),
        height = video.height.unwrap_or(0),
        "video stream found"
    );

    if !WEB_CODECS.contains(&codec) {
        warn!(codec, "non-standard codec, may not play in all browsers");
    }

    Validation::Pass {
        message: format!("valid {codec} video, {size} bytes"),
    }
}

/// Simpler secondary probe, used when the detailed inspection itself
/// cannot run. A structurally sound file should not fail on tool
/// flakiness alone.
async fn fallback_probe(path: &Path, cfg: &PipelineConfig) -> Validation {
    let mut cmd = Command::new("ffprobe");
    cmd.args(["-v", "quiet", "-show_streams", "-show_format"])
        .arg(path);

    let output = match tool::run("ffprobe", &mut cmd, cfg.fallback_probe_timeout).await {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            return Validation::fail(
                InvalidKind::ProbeFailed,
                format!("ffprobe failed: {}", tool::stderr_snippet(&output)),
            );
        }
        Err(e) => {
            return Validation::fail(InvalidKind::ProbeFailed, format!("ffprobe failed: {e}"));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.contains("codec_type=video") {
        warn!(path = %path.display(), "detailed probe failed but a video stream is present");
        Validation::Pass {
            message: "video stream present but detailed validation failed".into(),
        }
    } else {
        Validation::fail(InvalidKind::NoVideoStream, "no video streams detected")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vidpipe_validate_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_wav(path: &Path, secs: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(16_000 * secs) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_repairable_classification() {
        assert!(!InvalidKind::Missing.repairable());
        assert!(!InvalidKind::TooSmall.repairable());
        assert!(!InvalidKind::NoVideoStream.repairable());
        assert!(InvalidKind::NotVideo.repairable());
        assert!(InvalidKind::ProbeFailed.repairable());
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let cfg = PipelineConfig::default();
        let verdict = validate_video(Path::new("/nonexistent/video.mp4"), &cfg).await;
        match verdict {
            Validation::Fail { kind, .. } => assert_eq!(kind, InvalidKind::Missing),
            Validation::Pass { .. } => panic!("missing file must not validate"),
        }
    }

    #[tokio::test]
    async fn test_small_file_fails_without_inspection() {
        let dir = scratch("small");
        let path = dir.join("video.mp4");
        std::fs::write(&path, vec![0u8; 500_000]).unwrap();

        let cfg = PipelineConfig::default();
        let verdict = validate_video(&path, &cfg).await;
        match verdict {
            Validation::Fail { kind, message } => {
                assert_eq!(kind, InvalidKind::TooSmall);
                assert!(message.contains("500000 bytes"));
            }
            Validation::Pass { .. } => panic!("undersized file must not validate"),
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_audio_only_container_is_unrepairable() {
        // A WAV well above the size floor: sniffed as an audio
        // container, so it provably holds no video stream.
        let dir = scratch("audio_only");
        let path = dir.join("video.mp4");
        write_wav(&path, 40);
        assert!(std::fs::metadata(&path).unwrap().len() > 1_024_000);

        let cfg = PipelineConfig::default();
        let verdict = validate_video(&path, &cfg).await;
        match verdict {
            Validation::Fail { kind, message } => {
                assert_eq!(kind, InvalidKind::NoVideoStream);
                assert!(!kind.repairable());
                assert!(message.contains("no video streams"));
            }
            Validation::Pass { .. } => panic!("audio-only file must not validate"),
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_non_media_file_is_repairable_failure() {
        // PNG magic followed by padding: sniffed as an image.
        let dir = scratch("png");
        let path = dir.join("video.mp4");
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.resize(2_000_000, 0u8);
        std::fs::write(&path, bytes).unwrap();

        let cfg = PipelineConfig::default();
        let verdict = validate_video(&path, &cfg).await;
        match verdict {
            Validation::Fail { kind, .. } => {
                assert_eq!(kind, InvalidKind::NotVideo);
                assert!(kind.repairable());
            }
            Validation::Pass { .. } => panic!("image file must not validate"),
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_validation_accessors() {
        let pass = Validation::Pass {
            message: "valid h264 video".into(),
        };
        assert!(pass.is_pass());
        assert_eq!(pass.message(), "valid h264 video");

        let fail = Validation::fail(InvalidKind::TooSmall, "file too small");
        assert!(!fail.is_pass());
        assert_eq!(fail.message(), "file too small");
    }
}
