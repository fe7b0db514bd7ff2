use std::time::Duration;

/// Tunables for one pipeline instance.
///
/// Defaults: two concurrent jobs, a 1 MB minimum for any fetched media
/// file, two extraction retries with a 2 s pause, and 15 s
/// transcription chunks with 1 s overlap. Every timeout and retry
/// counter is injectable so tests can set retries to zero and shrink
/// timeouts to milliseconds.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Jobs allowed to run heavy stages (fetch through transcribe) at once.
    pub concurrency: usize,
    /// Wall-clock limit for the whole yt-dlp retrieval call.
    pub fetch_timeout: Duration,
    /// Wall-clock limit for the best-effort metadata probe.
    pub metadata_timeout: Duration,
    /// Wall-clock limit for the structural ffprobe inspection.
    pub probe_timeout: Duration,
    /// Wall-clock limit for the simpler secondary probe.
    pub fallback_probe_timeout: Duration,
    /// Wall-clock limit for the re-encode repair.
    pub repair_timeout: Duration,
    /// Wall-clock limit for one ffmpeg audio extraction call.
    pub extract_timeout: Duration,
    /// Extra extraction attempts after the first (primary + fallback
    /// together count as one attempt).
    pub extract_retries: u32,
    /// Fixed pause between extraction attempts.
    pub extract_retry_delay: Duration,
    /// Wall-clock limit for one external recognition call.
    pub recognize_timeout: Duration,
    /// Anything below this is certainly an incomplete media file.
    pub min_video_bytes: u64,
    /// Anything below this means the video had no usable audio track.
    pub min_audio_bytes: u64,
    /// Audio shorter than this is not worth submitting to recognition.
    pub min_speech_secs: f64,
    /// Clips up to this long are transcribed in a single pass.
    pub single_pass_max_secs: f64,
    /// Chunk length for long-clip transcription.
    pub chunk_secs: f64,
    /// Overlap between consecutive chunks.
    pub chunk_overlap_secs: f64,
    /// Resolution cap requested from yt-dlp.
    pub max_height: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            fetch_timeout: Duration::from_secs(600),
            metadata_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(30),
            fallback_probe_timeout: Duration::from_secs(10),
            repair_timeout: Duration::from_secs(600),
            extract_timeout: Duration::from_secs(120),
            extract_retries: 2,
            extract_retry_delay: Duration::from_secs(2),
            recognize_timeout: Duration::from_secs(600),
            min_video_bytes: 1_024_000,
            min_audio_bytes: 1024,
            min_speech_secs: 0.5,
            single_pass_max_secs: 30.0,
            chunk_secs: 15.0,
            chunk_overlap_secs: 1.0,
            max_height: 720,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn repair_timeout(mut self, timeout: Duration) -> Self {
        self.repair_timeout = timeout;
        self
    }

    pub fn extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
        self
    }

    pub fn extract_retries(mut self, retries: u32) -> Self {
        self.extract_retries = retries;
        self
    }

    pub fn extract_retry_delay(mut self, delay: Duration) -> Self {
        self.extract_retry_delay = delay;
        self
    }

    pub fn min_video_bytes(mut self, bytes: u64) -> Self {
        self.min_video_bytes = bytes;
        self
    }

    pub fn min_audio_bytes(mut self, bytes: u64) -> Self {
        self.min_audio_bytes = bytes;
        self
    }

    pub fn single_pass_max_secs(mut self, secs: f64) -> Self {
        self.single_pass_max_secs = secs;
        self
    }

    pub fn chunking(mut self, chunk_secs: f64, overlap_secs: f64) -> Self {
        self.chunk_secs = chunk_secs;
        self.chunk_overlap_secs = overlap_secs;
        self
    }

    pub fn max_height(mut self, height: u32) -> Self {
        self.max_height = height;
        self
    }
}
