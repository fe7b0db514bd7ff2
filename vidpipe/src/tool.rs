use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

use crate::error::{Error, Result};

/// Run an external command with a hard wall-clock timeout.
///
/// A timeout, a missing binary and a non-zero exit are three distinct
/// failures; callers decide what a non-zero exit means. The child is
/// killed if the timeout fires.
pub(crate) async fn run(
    tool: &'static str,
    cmd: &mut Command,
    timeout: Duration,
) -> Result<Output> {
    cmd.kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            if tool == "yt-dlp" {
                Err(Error::YtDlpNotFound)
            } else {
                Err(Error::ToolNotFound(tool))
            }
        }
        Ok(Err(e)) => Err(Error::Io(e)),
        Err(_) => {
            warn!(tool, secs = timeout.as_secs(), "external tool timed out");
            Err(Error::Timeout {
                tool,
                secs: timeout.as_secs(),
            })
        }
    }
}

/// First chunk of a command's stderr, for error messages.
/// Bounded so a chatty tool cannot flood the logs.
pub(crate) fn stderr_snippet(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .chars()
        .take(1000)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_success() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo ok"]);
        let output = run("sh", &mut cmd, Duration::from_secs(5)).await.unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ok");
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_is_not_an_error() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 3"]);
        let output = run("sh", &mut cmd, Duration::from_secs(5)).await.unwrap();
        assert!(!output.status.success());
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let err = run("sh", &mut cmd, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { tool: "sh", .. }));
    }

    #[tokio::test]
    async fn test_run_missing_binary() {
        let mut cmd = Command::new("vidpipe-no-such-binary");
        let err = run("ffmpeg", &mut cmd, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound("ffmpeg")));
    }

    #[tokio::test]
    async fn test_run_missing_ytdlp_gets_install_hint() {
        let mut cmd = Command::new("vidpipe-no-such-binary");
        let err = run("yt-dlp", &mut cmd, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::YtDlpNotFound));
    }

    #[test]
    fn test_stderr_snippet_truncates() {
        let status = std::process::Command::new("sh")
            .args(["-c", ":"])
            .status()
            .unwrap();
        let output = Output {
            status,
            stdout: Vec::new(),
            stderr: vec![b'x'; 5000],
        };
        assert_eq!(stderr_snippet(&output).len(), 1000);
    }
}
