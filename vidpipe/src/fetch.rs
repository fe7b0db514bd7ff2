use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::tool;

/// Container extensions a finished download may land in.
const MEDIA_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv"];

/// Best-effort source metadata, probed before the download.
#[derive(Debug, Default)]
pub struct SourceMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    description: Option<String>,
}

/// Validate that a string looks like a URL.
/// Rejects anything that isn't http:// or https://.
pub(crate) fn validate_url(url: &str) -> Result<()> {
    let trimmed = url.trim();
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        Ok(())
    } else {
        Err(Error::InvalidUrl(trimmed.to_string()))
    }
}

/// Probe title and description with one yt-dlp metadata call.
///
/// Best-effort by contract: callers log failures and move on, the job
/// is never affected.
pub async fn probe_metadata(url: &str, cfg: &PipelineConfig) -> Result<SourceMetadata> {
    validate_url(url)?;

    let mut cmd = Command::new("yt-dlp");
    cmd.args(["--dump-json", "--no-download", "--no-exec", "--no-warnings"])
        .arg(url);

    let output = tool::run("yt-dlp", &mut cmd, cfg.metadata_timeout).await?;
    if !output.status.success() {
        return Err(Error::Fetch(format!(
            "metadata probe failed: {}",
            tool::stderr_snippet(&output)
        )));
    }

    let info: YtDlpInfo = serde_json::from_slice(&output.stdout)?;
    let metadata = SourceMetadata {
        title: info.title.as_deref().map(sanitize_title).filter(|t| !t.is_empty()),
        description: info.description.as_deref().and_then(clip_description),
    };

    debug!(
        title = metadata.title.as_deref().unwrap_or("<none>"),
        "metadata probed"
    );

    Ok(metadata)
}

/// Strip characters that are invalid in filenames and cap the length.
fn sanitize_title(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .take(100)
        .collect()
}

/// Keep a description only when it carries meaningful content.
fn clip_description(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() > 10 {
        Some(trimmed.chars().take(500).collect())
    } else {
        None
    }
}

/// Download the media behind a URL into `dest_dir` using yt-dlp.
///
/// One external retrieval attempt, no retry of the whole fetch. The
/// format ladder prefers a web-playable MP4 capped at `cfg.max_height`,
/// falling back to progressively looser selections. The output name
/// embeds a timestamp so a re-submitted job never collides with the
/// remains of a previous attempt.
///
/// # Security
/// - URL is validated to start with http:// or https://
/// - Arguments are passed to yt-dlp via `.arg()` (no shell expansion)
/// - `--no-exec` prevents yt-dlp from running post-processing commands
pub async fn fetch_video(url: &str, dest_dir: &Path, cfg: &PipelineConfig) -> Result<PathBuf> {
    validate_url(url)?;
    std::fs::create_dir_all(dest_dir)?;

    let format = format!(
        "bestvideo[ext=mp4][height<={h}]+bestaudio[ext=m4a]/best[ext=mp4][height<={h}]/best[ext=mp4]/best",
        h = cfg.max_height
    );
    let template = dest_dir
        .join(format!("video_{}.%(ext)s", Utc::now().timestamp()))
        .to_str()
        .ok_or_else(|| Error::Fetch("destination path contains invalid UTF-8".into()))?
        .to_string();

    info!(%url, dest = %dest_dir.display(), "downloading media");

    let mut cmd = Command::new("yt-dlp");
    cmd.args(["-f", &format])
        .args(["--merge-output-format", "mp4"])
        .args([
            "--no-write-thumbnail",
            "--no-write-info-json",
            "--no-write-subs",
            "--no-write-auto-subs",
            "--no-post-overwrites",
            "--no-overwrites",
            "--no-playlist",
            "--no-exec",
        ])
        .args(["--socket-timeout", "30"])
        .args(["--retries", "3"])
        .args(["--output", &template])
        .arg(url);

    let output = tool::run("yt-dlp", &mut cmd, cfg.fetch_timeout).await?;
    if !output.status.success() {
        return Err(Error::Fetch(format!(
            "yt-dlp failed: {}",
            tool::stderr_snippet(&output)
        )));
    }

    // The tool exiting 0 is not enough — insist on a plausible media
    // file actually sitting in the destination directory.
    let path = find_media_file(dest_dir, cfg.min_video_bytes)?;
    let size = std::fs::metadata(&path)?.len();
    info!(path = %path.display(), size, "media downloaded");

    Ok(path)
}

/// Newest file in `dir` with a known media extension and a believable
/// size. Anything smaller than `min_bytes` is certainly incomplete.
fn find_media_file(dir: &Path, min_bytes: u64) -> Result<PathBuf> {
    let mut best: Option<(PathBuf, std::time::SystemTime)> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !MEDIA_EXTENSIONS.contains(&ext) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.len() < min_bytes {
            warn!(path = %path.display(), size = meta.len(), "ignoring undersized media file");
            continue;
        }
        if let Ok(modified) = meta.modified() {
            if best.as_ref().is_none_or(|(_, t)| modified > *t) {
                best = Some((path, modified));
            }
        }
    }

    best.map(|(p, _)| p).ok_or(Error::NoMediaFile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_https() {
        assert!(validate_url("https://youtube.com/watch?v=abc").is_ok());
    }

    #[test]
    fn test_validate_url_http() {
        assert!(validate_url("http://example.com/clip.mp4").is_ok());
    }

    #[test]
    fn test_validate_url_rejects_no_scheme() {
        assert!(validate_url("youtube.com/watch?v=abc").is_err());
    }

    #[test]
    fn test_validate_url_rejects_file_scheme() {
        assert!(validate_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_validate_url_rejects_empty() {
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_validate_url_rejects_command() {
        assert!(validate_url("$(whoami)").is_err());
    }

    #[test]
    fn test_sanitize_title_strips_filename_chars() {
        assert_eq!(
            sanitize_title(r#"What: a "title" <with> bad/chars?|*"#),
            "What a title with badchars"
        );
    }

    #[test]
    fn test_sanitize_title_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_title(&long).len(), 100);
    }

    #[test]
    fn test_clip_description_rejects_trivial_content() {
        assert!(clip_description("short").is_none());
        assert!(clip_description("  ").is_none());
    }

    #[test]
    fn test_clip_description_caps_length() {
        let long = "y".repeat(2000);
        assert_eq!(clip_description(&long).unwrap().len(), 500);
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vidpipe_fetch_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_find_media_file_rejects_small_files() {
        let dir = scratch("small");
        std::fs::write(dir.join("video_1.mp4"), vec![0u8; 500]).unwrap();

        let err = find_media_file(&dir, 1024).unwrap_err();
        assert!(matches!(err, Error::NoMediaFile));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_find_media_file_ignores_other_extensions() {
        let dir = scratch("ext");
        std::fs::write(dir.join("notes.txt"), vec![0u8; 4096]).unwrap();
        std::fs::write(dir.join("clip.webm"), vec![0u8; 4096]).unwrap();

        let found = find_media_file(&dir, 1024).unwrap();
        assert!(found.ends_with("clip.webm"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_find_media_file_empty_dir() {
        let dir = scratch("empty");
        assert!(matches!(
            find_media_file(&dir, 1024),
            Err(Error::NoMediaFile)
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_fetch_video_rejects_bad_url_before_any_subprocess() {
        let dir = scratch("badurl");
        let cfg = PipelineConfig::default();
        let err = fetch_video("not a url", &dir, &cfg).await.unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
