use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::tool;
use crate::validate::{self, Validation};

/// Re-encode a media file to the canonical H.264/AAC pair in a
/// streaming-friendly MP4 and replace the original in place.
///
/// Downstream consumers keep using the stable original path: on
/// success the repaired file is atomically renamed over it, then
/// re-validated — a re-encode that still fails validation is an
/// overall failure. Every failure path removes the partial repaired
/// file; a half-written repair is never left behind.
pub async fn repair_video(path: &Path, dest_dir: &Path, cfg: &PipelineConfig) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    let repaired = dest_dir.join(format!("{stem}_repaired.mp4"));

    info!(path = %path.display(), "re-encoding media file");

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-i")
        .arg(path)
        .args(["-c:v", "libx264"])
        .args(["-preset", "medium"])
        .args(["-crf", "23"])
        .args(["-c:a", "aac"])
        .args(["-b:a", "128k"])
        .args(["-movflags", "+faststart"])
        .args(["-y", "-loglevel", "error"])
        .arg(&repaired);

    let output = match tool::run("ffmpeg", &mut cmd, cfg.repair_timeout).await {
        Ok(output) => output,
        Err(e) => {
            discard(&repaired);
            return Err(e);
        }
    };

    if !output.status.success() {
        discard(&repaired);
        return Err(Error::Repair(format!(
            "ffmpeg failed: {}",
            tool::stderr_snippet(&output)
        )));
    }

    let size = match std::fs::metadata(&repaired) {
        Ok(meta) => meta.len(),
        Err(_) => {
            return Err(Error::Repair("re-encoded file was not created".into()));
        }
    };
    if size < cfg.min_video_bytes {
        discard(&repaired);
        return Err(Error::Repair(format!(
            "re-encoded file too small: {size} bytes"
        )));
    }

    // Replace the original at its stable path.
    if let Err(e) = std::fs::rename(&repaired, path) {
        discard(&repaired);
        return Err(Error::Io(e));
    }

    match validate::validate_video(path, cfg).await {
        Validation::Pass { message } => {
            info!(path = %path.display(), size, %message, "repair succeeded");
            Ok(path.to_path_buf())
        }
        Validation::Fail { message, .. } => Err(Error::Repair(format!(
            "re-validation failed: {message}"
        ))),
    }
}

fn discard(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "could not remove partial repair output");
        }
    }
}
