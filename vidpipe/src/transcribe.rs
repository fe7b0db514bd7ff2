use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::backend::{SpeechBackend, TranscriptionUnit};
use crate::config::PipelineConfig;

/// Assumed speaking rate for the estimated-duration line in the report.
const WORDS_PER_MINUTE: f64 = 150.0;

/// Which strategy produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    SinglePass,
    Chunked,
}

impl Strategy {
    fn as_str(self) -> &'static str {
        match self {
            Strategy::SinglePass => "single",
            Strategy::Chunked => "chunked",
        }
    }
}

/// Convert an audio track to text.
///
/// Always produces a file and returns its path: recognized text on
/// success, a structured failure record otherwise. Nothing here errors
/// out to the caller — a job with unusable audio still completes with a
/// transcript artifact saying so.
///
/// Clips at or under `cfg.single_pass_max_secs` get one recognition
/// pass (with a ranked-alternatives second pass if the first yields
/// nothing); longer clips are split into fixed-length chunks with a
/// short overlap and recognized independently.
pub async fn transcribe(
    audio_path: &Path,
    dest_dir: &Path,
    backends: &[Box<dyn SpeechBackend>],
    cfg: &PipelineConfig,
) -> PathBuf {
    info!(path = %audio_path.display(), "starting transcription");

    let reader = match hound::WavReader::open(audio_path) {
        Ok(reader) => reader,
        Err(e) => {
            error!(path = %audio_path.display(), error = %e, "audio file unreadable");
            return write_failure(dest_dir, &format!("audio file unreadable: {e}"));
        }
    };

    let spec = reader.spec();
    let frames = reader.duration();
    let duration = frames as f64 / spec.sample_rate as f64;
    info!(duration_secs = format!("{duration:.2}"), "audio duration");

    if duration < cfg.min_speech_secs {
        warn!(duration_secs = duration, "audio too short to carry speech");
        return write_failure(
            dest_dir,
            &format!("audio too short for recognition: {duration:.2}s"),
        );
    }

    if duration <= cfg.single_pass_max_secs {
        debug!("short clip, single-pass transcription");
        match single_pass(audio_path, duration, backends).await {
            Some(text) => write_transcript(dest_dir, &text, Strategy::SinglePass),
            None => write_failure(dest_dir, "no speech content detected"),
        }
    } else {
        debug!("long clip, chunked transcription");
        match chunked(audio_path, dest_dir, backends, cfg).await {
            Some(text) => write_transcript(dest_dir, &text, Strategy::Chunked),
            None => write_failure(dest_dir, "no speech content detected in any chunk"),
        }
    }
}

/// One recognition call over the whole clip; if every backend misses,
/// a second pass asks for ranked alternatives and takes the top one.
async fn single_pass(
    audio_path: &Path,
    duration: f64,
    backends: &[Box<dyn SpeechBackend>],
) -> Option<String> {
    let unit = TranscriptionUnit {
        audio_path: audio_path.to_path_buf(),
        duration_secs: duration,
    };

    for backend in backends.iter().filter(|b| b.is_available()) {
        match backend.recognize(&unit).await {
            Ok(text) => {
                info!(backend = backend.name(), "recognition succeeded");
                return Some(text);
            }
            Err(e) => warn!(backend = backend.name(), reason = %e, "recognition missed"),
        }
    }

    for backend in backends.iter().filter(|b| b.is_available()) {
        match backend.alternatives(&unit).await {
            Ok(alternatives) => {
                if let Some(top) = alternatives.into_iter().next() {
                    info!(backend = backend.name(), "alternatives pass succeeded");
                    return Some(top);
                }
            }
            Err(e) => warn!(backend = backend.name(), reason = %e, "alternatives pass missed"),
        }
    }

    None
}

/// Split the clip into overlapping chunks, recognize each one
/// independently, and join whatever came back with single spaces.
///
/// The overlap only shapes chunk boundaries; duplicated words at the
/// seams are accepted and not merged away. A chunk every backend
/// misses contributes nothing.
async fn chunked(
    audio_path: &Path,
    dest_dir: &Path,
    backends: &[Box<dyn SpeechBackend>],
    cfg: &PipelineConfig,
) -> Option<String> {
    let (samples, sample_rate) = match read_samples(audio_path) {
        Ok(read) => read,
        Err(e) => {
            error!(error = %e, "could not load audio for chunking");
            return None;
        }
    };

    let chunk_len = (cfg.chunk_secs * sample_rate as f64) as usize;
    let overlap = (cfg.chunk_overlap_secs * sample_rate as f64) as usize;
    let spans = chunk_spans(samples.len(), chunk_len, overlap);
    info!(chunks = spans.len(), "split audio into chunks");

    let mut texts: Vec<String> = Vec::new();

    for (i, &(start, end)) in spans.iter().enumerate() {
        let chunk_path = dest_dir.join(format!("chunk_{i}.wav"));
        if let Err(e) = write_chunk(&chunk_path, &samples[start..end], sample_rate) {
            warn!(chunk = i, error = %e, "could not export chunk");
            std::fs::remove_file(&chunk_path).ok();
            continue;
        }
        // Chunk temporaries never outlive their recognition attempt.
        let _cleanup = ChunkGuard(&chunk_path);

        let unit = TranscriptionUnit {
            audio_path: chunk_path.clone(),
            duration_secs: (end - start) as f64 / sample_rate as f64,
        };

        for backend in backends.iter().filter(|b| b.is_available()) {
            match backend.recognize(&unit).await {
                Ok(text) => {
                    debug!(chunk = i, backend = backend.name(), "chunk recognized");
                    texts.push(text.trim().to_string());
                    break;
                }
                Err(e) => {
                    warn!(chunk = i, backend = backend.name(), reason = %e, "chunk missed")
                }
            }
        }
    }

    if texts.is_empty() {
        None
    } else {
        info!(recognized = texts.len(), total = spans.len(), "chunked recognition done");
        Some(texts.join(" "))
    }
}

/// Chunk boundaries over `total` samples: fixed `chunk` length, each
/// chunk starting `chunk - overlap` after the previous, stopping once a
/// chunk reaches the end. Produces exactly
/// `ceil((total - overlap) / (chunk - overlap))` spans, and a single
/// span when the clip fits in one chunk.
fn chunk_spans(total: usize, chunk: usize, overlap: usize) -> Vec<(usize, usize)> {
    if total == 0 || chunk == 0 {
        return Vec::new();
    }
    if chunk <= overlap {
        return vec![(0, total)];
    }

    let stride = chunk - overlap;
    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk).min(total);
        spans.push((start, end));
        if end == total {
            break;
        }
        start += stride;
    }
    spans
}

fn read_samples(path: &Path) -> Result<(Vec<i16>, u32), hound::Error> {
    let mut reader = hound::WavReader::open(path)?;
    let sample_rate = reader.spec().sample_rate;
    let samples: Vec<i16> = reader.samples::<i16>().filter_map(|s| s.ok()).collect();
    Ok((samples, sample_rate))
}

fn write_chunk(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Removes a chunk temporary when dropped, success or not.
struct ChunkGuard<'a>(&'a Path);

impl Drop for ChunkGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(self.0) {
            warn!(path = %self.0.display(), error = %e, "failed to clean up chunk file");
        }
    }
}

/// Save the recognized text in both forms: the plain newline-terminated
/// document consumed downstream, and a metadata-annotated report
/// alongside it. Returns the plain document's path.
fn write_transcript(dest_dir: &Path, text: &str, strategy: Strategy) -> PathBuf {
    let text = text.trim();

    let plain_path = dest_dir.join("transcript.txt");
    let mut plain = text.to_string();
    plain.push('\n');
    if let Err(e) = std::fs::write(&plain_path, &plain) {
        error!(path = %plain_path.display(), error = %e, "could not write transcript");
    }

    let report_path = dest_dir.join("transcript_report.txt");
    if let Err(e) = std::fs::write(&report_path, format_report(text, strategy)) {
        warn!(path = %report_path.display(), error = %e, "could not write transcript report");
    }

    let words = text.split_whitespace().count();
    info!(
        path = %plain_path.display(),
        words,
        chars = text.len(),
        method = strategy.as_str(),
        "transcript saved"
    );

    plain_path
}

/// Metadata-annotated transcript document: fixed header/footer template
/// around the recognized text.
fn format_report(text: &str, strategy: Strategy) -> String {
    let word_count = text.split_whitespace().count();
    let char_count = text.chars().count();
    let estimated_minutes = word_count as f64 / WORDS_PER_MINUTE;
    let avg_word_len = char_count as f64 / word_count.max(1) as f64;
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");

    format!(
        "=== VIDEO TRANSCRIPT ===\n\
         Generated on: {now}\n\
         Transcription Method: {method}\n\
         Word Count: {word_count}\n\
         Character Count: {char_count}\n\
         Estimated Speaking Time: {estimated_minutes:.1} minutes\n\
         Average Word Length: {avg_word_len:.1} characters\n\
         \n\
         --- TRANSCRIPT START ---\n\
         {text}\n\
         --- TRANSCRIPT END ---\n\
         \n\
         Note: This transcript was automatically generated and may contain errors.\n",
        method = strategy.as_str(),
    )
}

/// Structured failure record written in place of a transcript.
fn write_failure(dest_dir: &Path, reason: &str) -> PathBuf {
    let path = dest_dir.join("transcript.txt");
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");

    let content = format!(
        "=== VIDEO TRANSCRIPT ===\n\
         Generated on: {now}\n\
         Status: FAILED\n\
         \n\
         Error: {reason}\n\
         \n\
         This could be due to:\n\
         - No speech content in the audio\n\
         - Poor audio quality\n\
         - Network connectivity issues\n\
         - Recognition service unavailable\n",
    );

    if let Err(e) = std::fs::write(&path, content) {
        error!(path = %path.display(), error = %e, "could not write failure transcript");
    }
    info!(path = %path.display(), reason, "failure transcript saved");

    path
}
