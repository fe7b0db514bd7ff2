use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use vidpipe::{
    JobStatus, JobStore, MemoryStore, Pipeline, PipelineConfig, SpeechBackend, WhisperBackend,
    WhisperCliBackend, WhisperModel,
};

#[derive(Parser)]
#[command(
    name = "vidpipe",
    about = "Fetch media from URLs and derive playable video, audio and transcript artifacts"
)]
struct Cli {
    /// Media URLs to ingest, one job each.
    #[arg(required = true)]
    urls: Vec<String>,

    /// Base directory for per-job storage roots.
    #[arg(short, long, default_value = "downloads")]
    dir: PathBuf,

    /// Jobs allowed to run heavy stages concurrently.
    #[arg(short, long, default_value = "2")]
    jobs: usize,

    /// Whisper model (tiny, base, small, or a path to a .bin file).
    #[arg(short, long, default_value = "base")]
    model: String,

    /// Model cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Disable GPU acceleration.
    #[arg(long)]
    no_gpu: bool,

    /// Also try the `whisper` command-line tool as a fallback backend.
    #[arg(long)]
    cli_fallback: bool,

    /// Audio extraction retries.
    #[arg(long, default_value = "2")]
    retries: u32,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vidpipe=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(model) = WhisperModel::parse(&cli.model) else {
        eprintln!("Unknown model: {} (expected tiny, base, small, or a path)", cli.model);
        std::process::exit(1);
    };

    let mut backends: Vec<Box<dyn SpeechBackend>> = Vec::new();
    match WhisperBackend::load(model, cli.cache_dir.clone(), !cli.no_gpu).await {
        Ok(backend) => backends.push(Box::new(backend)),
        Err(e) => eprintln!("whisper backend unavailable: {e}"),
    }
    if cli.cli_fallback {
        backends.push(Box::new(WhisperCliBackend::new(
            cli.model.clone(),
            Duration::from_secs(600),
        )));
    }
    if backends.is_empty() {
        eprintln!("No recognition backend available; transcripts will be failure records");
    }

    let cfg = PipelineConfig::default()
        .concurrency(cli.jobs)
        .extract_retries(cli.retries);

    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(cfg, store.clone(), backends, cli.dir.clone());

    let handles: Vec<_> = cli
        .urls
        .iter()
        .enumerate()
        .map(|(i, url)| pipeline.submit((i + 1).to_string(), url.clone()))
        .collect();

    for handle in handles {
        let _ = handle.await;
    }

    let mut failed = 0usize;
    for i in 1..=cli.urls.len() {
        let Some(job) = store.load(&i.to_string()) else {
            continue;
        };
        println!("job {i}: {}", job.status);
        if let Some(title) = &job.title {
            println!("  title:      {title}");
        }
        if let Some(path) = &job.video_path {
            println!("  video:      {}", path.display());
        }
        if let Some(path) = &job.audio_path {
            println!("  audio:      {}", path.display());
        }
        if let Some(path) = &job.transcript_path {
            println!("  transcript: {}", path.display());
        }
        if job.status == JobStatus::Failed {
            failed += 1;
        }
    }

    if failed > 0 {
        eprintln!("{failed} of {} jobs failed", cli.urls.len());
        std::process::exit(1);
    }
}
