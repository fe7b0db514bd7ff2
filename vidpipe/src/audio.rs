use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::tool;

/// Sample rate every extracted track is normalized to.
pub const AUDIO_SAMPLE_RATE: u32 = 16_000;

/// Derive a mono 16 kHz PCM WAV from a validated video file.
///
/// Primary method is a direct ffmpeg transcode; if that fails, a
/// decoder-library pass (symphonia decode, downmix, resample, WAV
/// export) gets a turn. Primary-then-fallback counts as one attempt;
/// attempts repeat up to `cfg.extract_retries` times with a fixed
/// pause. Exhaustion returns `None` — absence of audio is a valid
/// outcome here, not a job failure.
pub async fn extract_audio(video: &Path, dest_dir: &Path, cfg: &PipelineConfig) -> Option<PathBuf> {
    let size = match std::fs::metadata(video) {
        Ok(meta) => meta.len(),
        Err(_) => {
            error!(path = %video.display(), "video file not found, skipping extraction");
            return None;
        }
    };
    if size < cfg.min_video_bytes {
        error!(path = %video.display(), size, "video file too small, skipping extraction");
        return None;
    }

    let stem = video
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    let out = dest_dir.join(format!("{stem}_audio.wav"));

    for attempt in 0..=cfg.extract_retries {
        debug!(attempt = attempt + 1, path = %video.display(), "starting audio extraction");

        match extract_with_ffmpeg(video, &out, cfg).await {
            Ok(path) => {
                info!(path = %path.display(), "audio extracted (ffmpeg)");
                return Some(path);
            }
            Err(e) => warn!(attempt = attempt + 1, error = %e, "ffmpeg extraction failed"),
        }

        match extract_with_decoder(video, &out, cfg) {
            Ok(path) => {
                info!(path = %path.display(), "audio extracted (decoder fallback)");
                return Some(path);
            }
            Err(e) => warn!(attempt = attempt + 1, error = %e, "decoder extraction failed"),
        }

        if attempt < cfg.extract_retries {
            debug!(delay_ms = cfg.extract_retry_delay.as_millis() as u64, "retrying extraction");
            tokio::time::sleep(cfg.extract_retry_delay).await;
        }
    }

    error!(path = %video.display(), "all audio extraction attempts failed");
    None
}

/// Direct stream transcode: no video, mono, 16 kHz signed PCM.
async fn extract_with_ffmpeg(video: &Path, out: &Path, cfg: &PipelineConfig) -> Result<PathBuf> {
    if out.exists() {
        std::fs::remove_file(out)?;
    }

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-i")
        .arg(video)
        .arg("-vn")
        .args(["-acodec", "pcm_s16le"])
        .args(["-ac", "1"])
        .args(["-ar", &AUDIO_SAMPLE_RATE.to_string()])
        .args(["-y", "-loglevel", "error"])
        .arg(out);

    let output = tool::run("ffmpeg", &mut cmd, cfg.extract_timeout).await?;
    if !output.status.success() {
        return Err(Error::AudioExtract(format!(
            "ffmpeg failed: {}",
            tool::stderr_snippet(&output)
        )));
    }

    sized_output(out, cfg)
}

/// Fallback: decode whatever track symphonia finds, downmix to mono,
/// resample to 16 kHz and export as WAV.
fn extract_with_decoder(video: &Path, out: &Path, cfg: &PipelineConfig) -> Result<PathBuf> {
    let samples = decode_to_mono_16k(video)?;
    if samples.is_empty() {
        return Err(Error::AudioDecode("no audio samples decoded".into()));
    }

    if out.exists() {
        std::fs::remove_file(out)?;
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: AUDIO_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(out, spec)?;
    for sample in &samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;

    sized_output(out, cfg)
}

/// Reject extraction output below the minimum byte threshold — an
/// almost-empty WAV means the source had no audio track.
fn sized_output(out: &Path, cfg: &PipelineConfig) -> Result<PathBuf> {
    let size = std::fs::metadata(out)
        .map_err(|_| Error::AudioExtract("audio file was not created".into()))?
        .len();
    if size < cfg.min_audio_bytes {
        std::fs::remove_file(out).ok();
        return Err(Error::AudioExtract(format!(
            "audio file too small ({size} bytes) — likely no audio track"
        )));
    }
    debug!(path = %out.display(), size, "audio output accepted");
    Ok(out.to_path_buf())
}

/// Decode the first audio track of a media file into 16 kHz mono f32
/// samples.
pub(crate) fn decode_to_mono_16k(path: &Path) -> Result<Vec<f32>> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::AudioDecode(format!("probe: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.sample_rate.is_some())
        .ok_or_else(|| Error::AudioDecode("no audio track found".into()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::AudioDecode("unknown sample rate".into()))?;
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::AudioDecode(format!("codec: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(Error::AudioDecode(format!("packet: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                warn!(error = %e, "skipping corrupt audio frame");
                continue;
            }
            Err(e) => return Err(Error::AudioDecode(format!("decode: {e}"))),
        };

        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            continue;
        }

        let mut buf = SampleBuffer::<f32>::new(frames as u64, spec);
        buf.copy_interleaved_ref(decoded);

        if channels > 1 {
            for frame in buf.samples().chunks(channels) {
                samples.push(frame.iter().sum::<f32>() / channels as f32);
            }
        } else {
            samples.extend_from_slice(buf.samples());
        }
    }

    if source_rate != AUDIO_SAMPLE_RATE {
        samples = resample(&samples, source_rate, AUDIO_SAMPLE_RATE)?;
    }

    debug!(
        samples = samples.len(),
        duration_secs = samples.len() as f64 / AUDIO_SAMPLE_RATE as f64,
        "decoded audio to 16kHz mono"
    );

    Ok(samples)
}

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
        WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let chunk_size = 1024;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| Error::AudioDecode(format!("resampler init: {e}")))?;

    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize + chunk_size);

    for chunk in samples.chunks(chunk_size) {
        let input = if chunk.len() < chunk_size {
            let mut padded = chunk.to_vec();
            padded.resize(chunk_size, 0.0);
            padded
        } else {
            chunk.to_vec()
        };

        let processed = resampler
            .process(&[input], None)
            .map_err(|e| Error::AudioDecode(format!("resample: {e}")))?;

        if let Some(channel) = processed.first() {
            output.extend_from_slice(channel);
        }
    }

    output.truncate((samples.len() as f64 * ratio) as usize);
    Ok(output)
}
