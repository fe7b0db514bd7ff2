pub mod audio;
pub mod backend;
pub mod config;
pub mod error;
pub mod fetch;
pub mod job;
pub mod pipeline;
pub mod repair;
pub mod storage;
mod tool;
pub mod transcribe;
pub mod validate;

pub use backend::{
    RecognizeError, SpeechBackend, TranscriptionUnit, WhisperBackend, WhisperCliBackend,
    WhisperModel,
};
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use job::{JobArtifacts, JobRecord, JobStatus, JobStore, MemoryStore};
pub use pipeline::Pipeline;
pub use validate::{InvalidKind, Validation};

use std::path::Path;
use std::sync::Arc;

/// Ingest a single URL with default configuration and an in-memory job
/// store. Convenience for one-off use; anything long-lived should build
/// a [`Pipeline`] with its own store.
pub async fn ingest_url(
    url: &str,
    base_dir: impl AsRef<Path>,
    backends: Vec<Box<dyn SpeechBackend>>,
) -> Result<JobRecord> {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        store.clone(),
        backends,
        base_dir.as_ref().to_path_buf(),
    );

    let handle = pipeline.submit("1", url);
    handle
        .await
        .map_err(|e| Error::Pipeline(format!("job task failed: {e}")))?;

    store
        .load("1")
        .ok_or_else(|| Error::Pipeline("job record disappeared".into()))
}
