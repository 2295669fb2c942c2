//! Audio Codec - decode, concatenate, pad, normalize and export PCM audio
//!
//! All audio inside the pipeline is 16-bit interleaved PCM at one target
//! sample rate and channel count. Provider payloads are decoded and conformed
//! to that format up front, so concatenation never has to resample.
//!
//! WAV is read and written natively; MP3 goes through `ffmpeg`.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{CastError, CastResult};

// ============================================================================
// DATA MODELS
// ============================================================================

/// Encoding of a payload returned by a speech provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// Headerless signed 16-bit little-endian mono PCM
    Pcm16 { sample_rate: u32 },
    /// RIFF/WAVE container
    Wav,
    /// MPEG layer III
    Mp3,
}

impl AudioFormat {
    /// Map an ElevenLabs `output_format` value (`pcm_22050`, `mp3_44100_128`, ...)
    pub fn from_output_format(output_format: &str) -> Option<Self> {
        let mut parts = output_format.split('_');
        match parts.next()? {
            "pcm" => {
                let sample_rate = parts.next()?.parse().ok()?;
                Some(AudioFormat::Pcm16 { sample_rate })
            }
            "mp3" => Some(AudioFormat::Mp3),
            "wav" => Some(AudioFormat::Wav),
            _ => None,
        }
    }
}

/// Container of an exported track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// WAV format (uncompressed)
    Wav,
    /// MP3 format (compressed)
    Mp3,
}

impl ExportFormat {
    /// Pick the export format from a destination file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "wav" => Some(ExportFormat::Wav),
            "mp3" => Some(ExportFormat::Mp3),
            _ => None,
        }
    }
}

/// MP3 bitrate options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mp3Bitrate {
    Kbps128,
    Kbps192,
    Kbps256,
    Kbps320,
}

impl Mp3Bitrate {
    /// Get bitrate value in kbps
    pub fn kbps(&self) -> u32 {
        match self {
            Mp3Bitrate::Kbps128 => 128,
            Mp3Bitrate::Kbps192 => 192,
            Mp3Bitrate::Kbps256 => 256,
            Mp3Bitrate::Kbps320 => 320,
        }
    }

    pub fn from_kbps(kbps: u32) -> Option<Self> {
        match kbps {
            128 => Some(Mp3Bitrate::Kbps128),
            192 => Some(Mp3Bitrate::Kbps192),
            256 => Some(Mp3Bitrate::Kbps256),
            320 => Some(Mp3Bitrate::Kbps320),
            _ => None,
        }
    }
}

/// Tags written into MP3 exports
#[derive(Debug, Clone, Default)]
pub struct AudioMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<String>,
    pub comment: Option<String>,
}

/// Export parameters for the final track
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub format: ExportFormat,
    pub mp3_bitrate: Mp3Bitrate,
    pub metadata: AudioMetadata,
}

impl ExportSettings {
    /// Settings for a destination, format taken from its extension
    pub fn for_path(path: &Path, mp3_bitrate: Mp3Bitrate) -> CastResult<Self> {
        let format = ExportFormat::from_path(path).ok_or_else(|| CastError::Export {
            path: path.to_path_buf(),
            reason: "unsupported file extension (expected .wav or .mp3)".to_string(),
        })?;

        Ok(Self {
            format,
            mp3_bitrate,
            metadata: AudioMetadata::default(),
        })
    }

    pub fn with_metadata(mut self, metadata: AudioMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Interleaved 16-bit PCM audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcm {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl Pcm {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Duration rounded to the nearest millisecond
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let rate = self.sample_rate as u64;
        (self.frames() as u64 * 1000 + rate / 2) / rate
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> u16 {
        self.samples
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap_or(0)
    }

    fn same_format(&self, other: &Pcm) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }
}

// ============================================================================
// TRAIT DEFINITIONS
// ============================================================================

/// Audio primitives used by the synthesizer and the assembler
pub trait AudioCodec: Send + Sync {
    /// Decode a provider payload into PCM in the codec's target format
    fn decode(&self, bytes: &[u8], format: AudioFormat) -> CastResult<Pcm>;

    /// Append `tail` to `head`
    fn concat(&self, head: Pcm, tail: &Pcm) -> CastResult<Pcm>;

    /// Silence of the given duration in the target format
    fn silence(&self, duration_ms: u64) -> Pcm;

    /// Peak-normalize so the loudest sample sits `headroom_db` below full scale
    fn normalize(&self, pcm: Pcm, headroom_db: f32) -> Pcm;

    /// Encode and write to `path`
    fn export(&self, pcm: &Pcm, path: &Path, settings: &ExportSettings) -> CastResult<()>;
}

// ============================================================================
// PCM CODEC
// ============================================================================

/// In-memory 16-bit PCM codec with WAV support and `ffmpeg` for MP3
#[derive(Debug, Clone)]
pub struct PcmCodec {
    sample_rate: u32,
    channels: u16,
    ffmpeg: PathBuf,
    temp_dir: PathBuf,
}

impl PcmCodec {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            ffmpeg: PathBuf::from("ffmpeg"),
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Use a specific `ffmpeg` binary
    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    /// Directory for intermediate files during MP3 export
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    fn decode_pcm16(&self, bytes: &[u8], sample_rate: u32) -> CastResult<Pcm> {
        if bytes.len() % 2 != 0 {
            return Err(CastError::Codec(format!(
                "PCM payload has odd length {}",
                bytes.len()
            )));
        }

        let samples = bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();

        self.conform(samples, sample_rate, 1)
    }

    fn decode_wav(&self, bytes: &[u8]) -> CastResult<Pcm> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| CastError::Codec(format!("Invalid WAV payload: {}", e)))?;
        let spec = reader.spec();

        let samples: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<Result<Vec<i16>, _>>(),
            hound::SampleFormat::Int => {
                let shift = spec.bits_per_sample.saturating_sub(16) as u32;
                let widen = 16u32.saturating_sub(spec.bits_per_sample as u32);
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| ((v >> shift) << widen) as i16))
                    .collect::<Result<Vec<i16>, _>>()
            }
        }
        .map_err(|e| CastError::Codec(format!("Failed to read WAV samples: {}", e)))?;

        self.conform(samples, spec.sample_rate, spec.channels)
    }

    fn decode_mp3(&self, bytes: &[u8]) -> CastResult<Pcm> {
        let mut child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-f", "mp3", "-i", "pipe:0"])
            .args(["-f", "s16le", "-acodec", "pcm_s16le"])
            .arg("-ac")
            .arg(self.channels.to_string())
            .arg("-ar")
            .arg(self.sample_rate.to_string())
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CastError::Codec(format!("Failed to run ffmpeg: {}. Is ffmpeg installed?", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CastError::Codec("ffmpeg stdin unavailable".to_string()))?;
        let payload = bytes.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&payload));

        let output = child
            .wait_with_output()
            .map_err(|e| CastError::Codec(format!("ffmpeg decode failed: {}", e)))?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::debug!("ffmpeg closed stdin early: {}", e),
            Err(_) => return Err(CastError::Codec("ffmpeg writer thread panicked".to_string())),
        }

        if !output.status.success() {
            return Err(CastError::Codec(format!(
                "ffmpeg decode failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let samples = output
            .stdout
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();
        Ok(Pcm::new(samples, self.sample_rate, self.channels))
    }

    /// Convert decoded samples to the target channel count and sample rate
    fn conform(&self, samples: Vec<i16>, sample_rate: u32, channels: u16) -> CastResult<Pcm> {
        if sample_rate == 0 || channels == 0 {
            return Err(CastError::Codec(format!(
                "Invalid source format: {} Hz, {} channels",
                sample_rate, channels
            )));
        }

        let samples = match (channels, self.channels) {
            (from, to) if from == to => samples,
            (from, 1) => samples
                .chunks(from as usize)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / frame.len() as i32) as i16
                })
                .collect(),
            (1, to) => samples
                .iter()
                .flat_map(|&s| std::iter::repeat(s).take(to as usize))
                .collect(),
            (from, to) => {
                return Err(CastError::Codec(format!(
                    "Channel mismatch: cannot convert {} channels to {}",
                    from, to
                )))
            }
        };

        let samples = if sample_rate == self.sample_rate {
            samples
        } else {
            resample_linear(&samples, self.channels as usize, sample_rate, self.sample_rate)
        };

        Ok(Pcm::new(samples, self.sample_rate, self.channels))
    }

    fn write_wav_file(&self, pcm: &Pcm, path: &Path) -> CastResult<()> {
        let spec = hound::WavSpec {
            channels: pcm.channels(),
            sample_rate: pcm.sample_rate(),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let export_error = |e: hound::Error| CastError::Export {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let mut writer = hound::WavWriter::create(path, spec).map_err(export_error)?;
        for &sample in pcm.samples() {
            writer.write_sample(sample).map_err(export_error)?;
        }
        writer.finalize().map_err(export_error)
    }

    /// Encode to MP3 through a temporary WAV file
    fn write_mp3_file(&self, pcm: &Pcm, path: &Path, settings: &ExportSettings) -> CastResult<()> {
        let temp_wav = self.temp_dir.join(format!("mofa-radio-{}.wav", uuid::Uuid::new_v4()));
        if let Err(e) = self.write_wav_file(pcm, &temp_wav) {
            let _ = std::fs::remove_file(&temp_wav);
            return Err(CastError::Export {
                path: path.to_path_buf(),
                reason: format!("temporary WAV failed: {}", e),
            });
        }

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(&temp_wav)
            .args(["-codec:a", "libmp3lame", "-b:a"])
            .arg(format!("{}k", settings.mp3_bitrate.kbps()));

        let metadata = &settings.metadata;
        let tags = [
            ("title", &metadata.title),
            ("artist", &metadata.artist),
            ("album", &metadata.album),
            ("date", &metadata.year),
            ("comment", &metadata.comment),
        ];
        for (key, value) in tags {
            if let Some(value) = value {
                cmd.arg("-metadata").arg(format!("{}={}", key, value));
            }
        }
        cmd.arg(path);

        let output = cmd.output();
        let _ = std::fs::remove_file(&temp_wav);

        match output {
            Ok(output) if output.status.success() => {
                log::info!("MP3 export completed: {}", path.display());
                Ok(())
            }
            Ok(output) => Err(CastError::Export {
                path: path.to_path_buf(),
                reason: format!(
                    "ffmpeg exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }),
            Err(e) => Err(CastError::Export {
                path: path.to_path_buf(),
                reason: format!("ffmpeg conversion failed: {}. Is ffmpeg installed?", e),
            }),
        }
    }
}

impl Default for PcmCodec {
    fn default() -> Self {
        Self::new(22050, 1)
    }
}

impl AudioCodec for PcmCodec {
    fn decode(&self, bytes: &[u8], format: AudioFormat) -> CastResult<Pcm> {
        match format {
            AudioFormat::Pcm16 { sample_rate } => self.decode_pcm16(bytes, sample_rate),
            AudioFormat::Wav => self.decode_wav(bytes),
            AudioFormat::Mp3 => self.decode_mp3(bytes),
        }
    }

    fn concat(&self, mut head: Pcm, tail: &Pcm) -> CastResult<Pcm> {
        if head.is_empty() && !head.same_format(tail) {
            return Ok(tail.clone());
        }
        if !head.same_format(tail) {
            return Err(CastError::Codec(format!(
                "Format mismatch: {} Hz/{} ch vs {} Hz/{} ch",
                head.sample_rate, head.channels, tail.sample_rate, tail.channels
            )));
        }
        head.samples.extend_from_slice(&tail.samples);
        Ok(head)
    }

    fn silence(&self, duration_ms: u64) -> Pcm {
        let frames = (self.sample_rate as u64 * duration_ms / 1000) as usize;
        Pcm::new(
            vec![0; frames * self.channels as usize],
            self.sample_rate,
            self.channels,
        )
    }

    fn normalize(&self, mut pcm: Pcm, headroom_db: f32) -> Pcm {
        let peak = pcm.peak();
        if peak == 0 {
            return pcm;
        }

        let target_peak = i16::MAX as f64 * 10_f64.powf(-(headroom_db as f64) / 20.0);
        let gain = target_peak / peak as f64;

        for sample in pcm.samples.iter_mut() {
            let scaled = (*sample as f64 * gain).round();
            *sample = scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        }

        log::info!(
            "Audio normalized: peak {:.2} dBFS -> {:.2} dBFS (gain {:.2}x)",
            20.0 * (peak as f64 / i16::MAX as f64).log10(),
            -headroom_db,
            gain
        );

        pcm
    }

    fn export(&self, pcm: &Pcm, path: &Path, settings: &ExportSettings) -> CastResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CastError::Export {
                path: path.to_path_buf(),
                reason: format!("Failed to create output directory: {}", e),
            })?;
        }

        match settings.format {
            ExportFormat::Wav => self.write_wav_file(pcm, path),
            ExportFormat::Mp3 => self.write_mp3_file(pcm, path, settings),
        }
    }
}

/// Linear-interpolation resampler for interleaved samples
fn resample_linear(samples: &[i16], channels: usize, from_rate: u32, to_rate: u32) -> Vec<i16> {
    let channels = channels.max(1);
    let in_frames = samples.len() / channels;
    if in_frames == 0 {
        return Vec::new();
    }

    let out_frames = (in_frames as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let mut out = Vec::with_capacity(out_frames * channels);

    for frame in 0..out_frames {
        let position = frame as f64 * step;
        let left = (position.floor() as usize).min(in_frames - 1);
        let right = (left + 1).min(in_frames - 1);
        let fraction = position - left as f64;

        for channel in 0..channels {
            let a = samples[left * channels + channel] as f64;
            let b = samples[right * channels + channel] as f64;
            out.push((a + (b - a) * fraction).round() as i16);
        }
    }

    out
}

// ============================================================================
// TESTS
// ============================================================================
