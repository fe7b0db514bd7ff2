use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::audio;
use crate::backend::SpeechBackend;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::fetch;
use crate::job::{JobArtifacts, JobRecord, JobStatus, JobStore};
use crate::repair;
use crate::storage;
use crate::transcribe;
use crate::validate::{self, Validation};

/// Drives accepted jobs through fetch → validate → (repair) → extract
/// audio → transcribe, updating the persisted job at every transition.
///
/// Owns the admission semaphore: at most `cfg.concurrency` jobs run the
/// heavy stages at once, the rest queue on the gate. Once admitted a
/// job runs to a terminal status — there is no mid-pipeline
/// cancellation, and no stage is ever retried at the job level.
pub struct Pipeline {
    cfg: PipelineConfig,
    store: Arc<dyn JobStore>,
    backends: Arc<Vec<Box<dyn SpeechBackend>>>,
    gate: Arc<Semaphore>,
    base_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        cfg: PipelineConfig,
        store: Arc<dyn JobStore>,
        backends: Vec<Box<dyn SpeechBackend>>,
        base_dir: PathBuf,
    ) -> Self {
        let gate = Arc::new(Semaphore::new(cfg.concurrency));
        Self {
            cfg,
            store,
            backends: Arc::new(backends),
            gate,
            base_dir,
        }
    }

    /// Accept a job and spawn its execution task. The job starts
    /// `Pending` and waits on the admission gate before any heavy work.
    pub fn submit(&self, id: impl Into<String>, url: impl Into<String>) -> JoinHandle<()> {
        let id = id.into();
        let url = url.into();
        self.store.create(JobRecord::new(id.clone(), url.clone()));

        let cfg = self.cfg.clone();
        let store = self.store.clone();
        let backends = self.backends.clone();
        let gate = self.gate.clone();
        let base_dir = self.base_dir.clone();

        tokio::spawn(async move {
            run_job(cfg, store, backends, gate, base_dir, id, url).await;
        })
    }

    #[cfg(test)]
    pub(crate) fn admission(&self) -> Arc<Semaphore> {
        self.gate.clone()
    }
}

/// One job, start to terminal status. Nothing escapes this function:
/// stage errors and stage panics both end in a `Failed` update, so a
/// job can never be observed stuck in `Downloading` after its task
/// finishes.
async fn run_job(
    cfg: PipelineConfig,
    store: Arc<dyn JobStore>,
    backends: Arc<Vec<Box<dyn SpeechBackend>>>,
    gate: Arc<Semaphore>,
    base_dir: PathBuf,
    id: String,
    url: String,
) {
    let _permit = match gate.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            // Semaphore closed — process is shutting down.
            store.update_status(&id, JobStatus::Failed, &JobArtifacts::default());
            return;
        }
    };

    info!(job = %id, %url, "job admitted");
    store.update_status(&id, JobStatus::Downloading, &JobArtifacts::default());

    let stages = {
        let cfg = cfg.clone();
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move { run_stages(cfg, store, backends, base_dir, id, url).await })
    };

    match stages.await {
        Ok(Ok(artifacts)) => {
            store.update_status(&id, JobStatus::Completed, &artifacts);
            info!(job = %id, "job completed");
        }
        Ok(Err(e)) => {
            error!(job = %id, error = %e, "job failed");
            store.update_status(&id, JobStatus::Failed, &JobArtifacts::default());
        }
        Err(e) => {
            // A panic inside a stage lands here as a JoinError.
            error!(job = %id, error = %e, "job crashed");
            store.update_status(&id, JobStatus::Failed, &JobArtifacts::default());
        }
    }
}

async fn run_stages(
    cfg: PipelineConfig,
    store: Arc<dyn JobStore>,
    backends: Arc<Vec<Box<dyn SpeechBackend>>>,
    base_dir: PathBuf,
    id: String,
    url: String,
) -> Result<JobArtifacts> {
    let job_dir = storage::job_dir(&base_dir, &id)?;

    // Metadata first, best-effort: a failure here is logged and the
    // job carries on without a title.
    match fetch::probe_metadata(&url, &cfg).await {
        Ok(meta) => {
            if meta.title.is_some() || meta.description.is_some() {
                store.update_metadata(&id, meta.title.as_deref(), meta.description.as_deref());
            }
        }
        Err(e) => warn!(job = %id, error = %e, "metadata probe failed"),
    }

    let video = match fetch::fetch_video(&url, &job_dir, &cfg).await {
        Ok(path) => path,
        Err(e) => {
            // Partial downloads go; the directory structure stays.
            storage::clear_partial_files(&job_dir);
            return Err(e);
        }
    };

    let video = match validate::validate_video(&video, &cfg).await {
        Validation::Pass { message } => {
            info!(job = %id, %message, "media file validated");
            video
        }
        Validation::Fail { kind, message } if kind.repairable() => {
            warn!(job = %id, %message, "validation failed, attempting repair");
            repair::repair_video(&video, &job_dir, &cfg).await?
        }
        Validation::Fail { message, .. } => {
            return Err(Error::Validation(message));
        }
    };

    let audio_path = audio::extract_audio(&video, &job_dir, &cfg).await;

    let transcript_path = match &audio_path {
        Some(path) => Some(transcribe::transcribe(path, &job_dir, &backends, &cfg).await),
        None => {
            // No audio track is a valid outcome, not a failure; the
            // transcript stage is simply skipped.
            info!(job = %id, "no audio track, skipping transcription");
            None
        }
    };

    Ok(JobArtifacts {
        video_path: Some(video),
        audio_path,
        transcript_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vidpipe_pipeline_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_pipeline(base_dir: PathBuf, store: Arc<MemoryStore>) -> Pipeline {
        Pipeline::new(PipelineConfig::default(), store, Vec::new(), base_dir)
    }

    #[tokio::test]
    async fn test_invalid_url_job_terminates_failed() {
        let dir = scratch("invalid_url");
        let store = Arc::new(MemoryStore::new());
        let pipeline = test_pipeline(dir.clone(), store.clone());

        let handle = pipeline.submit("1", "not a url at all");
        handle.await.unwrap();

        let job = store.load("1").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.video_path.is_none());
        assert!(job.transcript_path.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_no_job_left_in_downloading() {
        let dir = scratch("terminal");
        let store = Arc::new(MemoryStore::new());
        let pipeline = test_pipeline(dir.clone(), store.clone());

        let handles: Vec<_> = (0..5)
            .map(|i| pipeline.submit(i.to_string(), "bogus://source"))
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..5 {
            let job = store.load(&i.to_string()).unwrap();
            assert!(job.status.is_terminal(), "job {i} stuck in {}", job.status);
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_admission_gate_capacity() {
        let dir = scratch("gate");
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(
            PipelineConfig::default().concurrency(2),
            store,
            Vec::new(),
            dir.clone(),
        );

        let gate = pipeline.admission();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire_owned().await.unwrap();
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2, "admission gate exceeded");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_job_record_created_on_submit() {
        let dir = scratch("record");
        let store = Arc::new(MemoryStore::new());
        let pipeline = test_pipeline(dir.clone(), store.clone());

        // Scheme is intentionally bogus so the job fails fast without
        // ever reaching an external tool.
        let handle = pipeline.submit("42", "bogus://clip");
        let job = store.load("42").expect("record exists immediately");
        assert_eq!(job.source_url, "bogus://clip");
        assert_eq!(job.status, JobStatus::Pending);

        handle.await.unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }
}
