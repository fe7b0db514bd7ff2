use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

/// Resolve the storage root for a job, creating it if needed.
///
/// One directory per job, named deterministically from the job id;
/// safe to call repeatedly.
pub fn job_dir(base: &Path, job_id: &str) -> Result<PathBuf> {
    let dir = base.join(format!("job_{job_id}"));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Best-effort removal of regular files under a job's storage root.
///
/// Used after a failed fetch: partial downloads go, the directory
/// itself stays.
pub fn clear_partial_files(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "could not scan job dir for cleanup");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "could not remove partial file");
            } else {
                debug!(path = %path.display(), "removed partial file");
            }
        }
    }
}

/// Remove a job's storage root entirely.
///
/// The deletion contract: whoever deletes a job must also take its
/// storage root with it.
pub fn remove_job_dir(base: &Path, job_id: &str) -> Result<()> {
    let dir = base.join(format!("job_{job_id}"));
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    Ok(())
}
