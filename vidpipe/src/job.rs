use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::warn;

/// Lifecycle status of one ingestion job.
///
/// Transitions run strictly forward: `Pending → Downloading`, then
/// `Downloading → Completed` or `Downloading → Failed`. The last two
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl JobStatus {
    /// Status string as persisted by the surrounding system.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact paths applied together with a status transition.
///
/// A `None` field leaves the stored path untouched — a path, once set,
/// never reverts to empty for the job's lifetime.
#[derive(Debug, Clone, Default)]
pub struct JobArtifacts {
    pub video_path: Option<PathBuf>,
    pub audio_path: Option<PathBuf>,
    pub transcript_path: Option<PathBuf>,
}

/// One unit of pipeline work as persisted by the surrounding system.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub source_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: JobStatus,
    pub video_path: Option<PathBuf>,
    pub audio_path: Option<PathBuf>,
    pub transcript_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            title: None,
            description: None,
            status: JobStatus::Pending,
            video_path: None,
            audio_path: None,
            transcript_path: None,
            created_at: Utc::now(),
        }
    }
}

/// Narrow persistence boundary the pipeline needs.
///
/// Schema and query details belong to the surrounding system; the
/// pipeline only ever reads a job back, applies one status transition
/// (with whatever artifact paths the transition produced) or records
/// freshly probed metadata. Implementations must apply each call
/// atomically per job.
pub trait JobStore: Send + Sync {
    fn create(&self, record: JobRecord);

    fn load(&self, id: &str) -> Option<JobRecord>;

    /// Apply a status plus zero-or-more artifact paths as one logical update.
    fn update_status(&self, id: &str, status: JobStatus, artifacts: &JobArtifacts);

    /// Record probed title/description; only called right after a
    /// successful metadata fetch.
    fn update_metadata(&self, id: &str, title: Option<&str>, description: Option<&str>);

    fn delete(&self, id: &str);
}

/// In-memory job store — the reference implementation and test double.
#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryStore {
    fn create(&self, record: JobRecord) {
        self.jobs
            .lock()
            .expect("job store lock poisoned")
            .insert(record.id.clone(), record);
    }

    fn load(&self, id: &str) -> Option<JobRecord> {
        self.jobs
            .lock()
            .expect("job store lock poisoned")
            .get(id)
            .cloned()
    }

    fn update_status(&self, id: &str, status: JobStatus, artifacts: &JobArtifacts) {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        match jobs.get_mut(id) {
            Some(job) => {
                job.status = status;
                if let Some(path) = &artifacts.video_path {
                    job.video_path = Some(path.clone());
                }
                if let Some(path) = &artifacts.audio_path {
                    job.audio_path = Some(path.clone());
                }
                if let Some(path) = &artifacts.transcript_path {
                    job.transcript_path = Some(path.clone());
                }
            }
            None => warn!(job = id, %status, "status update for unknown job"),
        }
    }

    fn update_metadata(&self, id: &str, title: Option<&str>, description: Option<&str>) {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        match jobs.get_mut(id) {
            Some(job) => {
                if let Some(title) = title {
                    job.title = Some(title.to_string());
                }
                if let Some(description) = description {
                    job.description = Some(description.to_string());
                }
            }
            None => warn!(job = id, "metadata update for unknown job"),
        }
    }

    fn delete(&self, id: &str) {
        self.jobs
            .lock()
            .expect("job store lock poisoned")
            .remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_status_strings() {
        assert_eq!(JobStatus::Pending.as_str(), "pending");
        assert_eq!(JobStatus::Downloading.as_str(), "downloading");
        assert_eq!(JobStatus::Completed.as_str(), "completed");
        assert_eq!(JobStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Downloading.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_and_artifacts_applied_together() {
        let store = MemoryStore::new();
        store.create(JobRecord::new("a", "https://example.com/v"));

        let artifacts = JobArtifacts {
            video_path: Some(PathBuf::from("/data/job_a/video.mp4")),
            audio_path: Some(PathBuf::from("/data/job_a/audio.wav")),
            transcript_path: None,
        };
        store.update_status("a", JobStatus::Completed, &artifacts);

        let job = store.load("a").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.video_path.as_deref(), Some(Path::new("/data/job_a/video.mp4")));
        assert_eq!(job.audio_path.as_deref(), Some(Path::new("/data/job_a/audio.wav")));
        assert!(job.transcript_path.is_none());
    }

    #[test]
    fn test_paths_never_revert_to_empty() {
        let store = MemoryStore::new();
        store.create(JobRecord::new("a", "https://example.com/v"));

        let artifacts = JobArtifacts {
            video_path: Some(PathBuf::from("/data/job_a/video.mp4")),
            ..Default::default()
        };
        store.update_status("a", JobStatus::Downloading, &artifacts);
        store.update_status("a", JobStatus::Failed, &JobArtifacts::default());

        let job = store.load("a").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.video_path.is_some());
    }

    #[test]
    fn test_metadata_update() {
        let store = MemoryStore::new();
        store.create(JobRecord::new("a", "https://example.com/v"));
        store.update_metadata("a", Some("A Title"), None);

        let job = store.load("a").unwrap();
        assert_eq!(job.title.as_deref(), Some("A Title"));
        assert!(job.description.is_none());
    }

    #[test]
    fn test_update_unknown_job_is_noop() {
        let store = MemoryStore::new();
        store.update_status("missing", JobStatus::Failed, &JobArtifacts::default());
        assert!(store.load("missing").is_none());
    }

    #[test]
    fn test_delete() {
        let store = MemoryStore::new();
        store.create(JobRecord::new("a", "https://example.com/v"));
        store.delete("a");
        assert!(store.load("a").is_none());
    }

    #[test]
    fn test_updates_do_not_interleave_across_jobs() {
        let store = MemoryStore::new();
        store.create(JobRecord::new("a", "https://example.com/a"));
        store.create(JobRecord::new("b", "https://example.com/b"));

        let artifacts = JobArtifacts {
            video_path: Some(PathBuf::from("/data/job_a/video.mp4")),
            ..Default::default()
        };
        store.update_status("a", JobStatus::Completed, &artifacts);

        let other = store.load("b").unwrap();
        assert_eq!(other.status, JobStatus::Pending);
        assert!(other.video_path.is_none());
    }
}
