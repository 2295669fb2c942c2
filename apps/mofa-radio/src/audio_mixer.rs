//! Audio Mixer - Join turn clips into one mastered track and export it
//!
//! Clips are concatenated strictly in order by folding over an empty
//! accumulator, then peak-normalized once over the whole track.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::audio_codec::{AudioCodec, ExportFormat, ExportSettings, Pcm};
use crate::error::{CastError, CastResult};
use crate::tts_batch::AudioClip;

// ============================================================================
// DATA MODELS
// ============================================================================

/// One finished track, ready to export
#[derive(Debug, Clone)]
pub struct Track {
    pub pcm: Pcm,
    /// Number of clips joined into the track
    pub clip_count: usize,
}

impl Track {
    pub fn duration_ms(&self) -> u64 {
        self.pcm.duration_ms()
    }
}

/// Result of writing a track to disk
#[derive(Debug, Clone)]
pub struct ExportReport {
    /// Output file path (with extension)
    pub output_file: PathBuf,
    pub format: ExportFormat,
    /// Total duration in seconds
    pub total_duration_secs: f64,
    /// Number of clips in the track
    pub segment_count: usize,
    /// File size in bytes
    pub file_size_bytes: u64,
    /// Wall time spent encoding and writing, in milliseconds
    pub export_ms: u64,
}

// ============================================================================
// TRACK ASSEMBLER
// ============================================================================

/// Joins, masters and exports clips through an [`AudioCodec`]
pub struct TrackAssembler {
    codec: Arc<dyn AudioCodec>,
}

impl TrackAssembler {
    pub fn new(codec: Arc<dyn AudioCodec>) -> Self {
        Self { codec }
    }

    /// Concatenate clips in order. An empty slice yields empty audio.
    pub fn concatenate(&self, clips: &[AudioClip]) -> CastResult<Pcm> {
        clips
            .iter()
            .try_fold(self.codec.silence(0), |track, clip| self.codec.concat(track, &clip.pcm))
    }

    /// Concatenate and normalize clips into a single track
    pub fn assemble(&self, clips: &[AudioClip], headroom_db: f32) -> CastResult<Track> {
        if clips.is_empty() {
            return Err(CastError::EmptyInput("assemble"));
        }

        let joined = self.concatenate(clips)?;
        log::info!(
            "Joined {} clips into {:.2}s of audio",
            clips.len(),
            joined.duration_secs()
        );

        Ok(Track {
            pcm: self.codec.normalize(joined, headroom_db),
            clip_count: clips.len(),
        })
    }

    /// Write the track to `path`.
    ///
    /// The track is encoded into a sibling staging file and renamed into place,
    /// so a failed export leaves no partial file and never touches an existing
    /// file at `path`.
    pub fn export(&self, track: &Track, path: &Path, settings: &ExportSettings) -> CastResult<ExportReport> {
        let start_time = Instant::now();
        let staging = staging_path(path);

        let written = self
            .codec
            .export(&track.pcm, &staging, settings)
            .map_err(|e| match e {
                CastError::Export { reason, .. } => CastError::Export {
                    path: path.to_path_buf(),
                    reason,
                },
                other => other,
            })
            .and_then(|()| {
                std::fs::rename(&staging, path).map_err(|e| CastError::Export {
                    path: path.to_path_buf(),
                    reason: format!("Failed to move encoded file into place: {}", e),
                })
            });
        if let Err(e) = written {
            if staging.exists() {
                let _ = std::fs::remove_file(&staging);
            }
            return Err(e);
        }

        let file_size = std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| CastError::Export {
                path: path.to_path_buf(),
                reason: format!("output missing after export: {}", e),
            })?;

        log::info!(
            "Exported {} ({:.1}s, {:.2} MB)",
            path.display(),
            track.pcm.duration_secs(),
            file_size as f64 / (1024.0 * 1024.0)
        );

        Ok(ExportReport {
            output_file: path.to_path_buf(),
            format: settings.format,
            total_duration_secs: track.pcm.duration_secs(),
            segment_count: track.clip_count,
            file_size_bytes: file_size,
            export_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}

/// Hidden file next to `path` with the same extension, so encoders that pick
/// the container from the extension still see it
fn staging_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let mut name = format!(".{}.{}.partial", stem, uuid::Uuid::new_v4().simple());
    if let Some(extension) = path.extension() {
        name.push('.');
        name.push_str(&extension.to_string_lossy());
    }
    path.with_file_name(name)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_codec::{Mp3Bitrate, PcmCodec};
    use crate::script_parser::Speaker;

    const RATE: u32 = 24000;

    fn clip(index: usize, value: i16, ms: u64) -> AudioClip {
        let frames = (RATE as u64 * ms / 1000) as usize;
        AudioClip {
            index,
            speaker: if index % 2 == 0 { Speaker::A } else { Speaker::B },
            speech_ms: ms,
            pcm: Pcm::new(vec![value; frames], RATE, 1),
        }
    }

    fn assembler() -> TrackAssembler {
        TrackAssembler::new(Arc::new(PcmCodec::new(RATE, 1)))
    }

    #[test]
    fn test_fold_matches_direct_concatenation() {
        let assembler = assembler();
        let codec = PcmCodec::new(RATE, 1);
        let clips = vec![clip(0, 1, 100), clip(1, 2, 50), clip(2, 3, 200)];

        for n in 1..=clips.len() {
            let folded = assembler.concatenate(&clips[..n]).unwrap();

            let mut expected = Vec::new();
            for c in &clips[..n] {
                expected.extend_from_slice(c.pcm.samples());
            }
            assert_eq!(folded.samples(), expected.as_slice(), "n = {}", n);

            // left fold agrees with pairwise concat
            let pairwise = clips[1..n]
                .iter()
                .fold(clips[0].pcm.clone(), |acc, c| codec.concat(acc, &c.pcm).unwrap());
            assert_eq!(folded, pairwise);
        }
    }

    #[test]
    fn test_empty_clip_list() {
        let assembler = assembler();
        assert!(assembler.concatenate(&[]).unwrap().is_empty());
        assert!(matches!(
            assembler.assemble(&[], 2.0).unwrap_err(),
            CastError::EmptyInput("assemble")
        ));
    }

    #[test]
    fn test_assemble_keeps_duration() {
        // Three 1 s turns with 250 ms pauses each
        let clips: Vec<_> = (0..3).map(|i| clip(i, 1000, 1250)).collect();
        let track = assembler().assemble(&clips, 2.0).unwrap();

        assert_eq!(track.duration_ms(), 3750);
        assert_eq!(track.clip_count, 3);
        assert!(track.pcm.peak() > 1000);
    }

    #[test]
    fn test_export_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show").join("segment.wav");
        let assembler = assembler();
        let track = assembler.assemble(&[clip(0, 500, 1000)], 2.0).unwrap();

        let settings = ExportSettings::for_path(&path, Mp3Bitrate::Kbps192).unwrap();
        let report = assembler.export(&track, &path, &settings).unwrap();

        assert!(path.exists());
        assert_eq!(report.output_file, path);
        assert_eq!(report.format, ExportFormat::Wav);
        assert_eq!(report.segment_count, 1);
        assert_eq!(report.file_size_bytes, 44 + 24000 * 2);
        assert!((report.total_duration_secs - 1.0).abs() < 1e-9);
        // encode time, not track length
        assert!(report.export_ms < 1000 * 60);

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_failed_export_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show.mp3");
        std::fs::write(&path, b"previous episode").unwrap();

        let codec = PcmCodec::new(RATE, 1).with_ffmpeg("/nonexistent/ffmpeg");
        let assembler = TrackAssembler::new(Arc::new(codec));
        let track = assembler.assemble(&[clip(0, 500, 100)], 2.0).unwrap();
        let settings = ExportSettings::for_path(&path, Mp3Bitrate::Kbps192).unwrap();

        let err = assembler.export(&track, &path, &settings).unwrap_err();

        assert!(matches!(err, CastError::Export { path: ref failed, .. } if failed == &path));
        assert_eq!(std::fs::read(&path).unwrap(), b"previous episode");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_export_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show.wav");
        std::fs::write(&path, b"stale").unwrap();

        let assembler = assembler();
        let track = assembler.assemble(&[clip(0, 500, 1000)], 2.0).unwrap();
        let settings = ExportSettings::for_path(&path, Mp3Bitrate::Kbps192).unwrap();
        let report = assembler.export(&track, &path, &settings).unwrap();

        assert_eq!(report.file_size_bytes, 44 + 24000 * 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_staging_path_keeps_extension() {
        let staging = staging_path(Path::new("/tmp/out/show.MP3"));
        assert_eq!(staging.parent(), Some(Path::new("/tmp/out")));
        assert_eq!(staging.extension().unwrap(), "MP3");
        assert!(staging.file_name().unwrap().to_string_lossy().starts_with(".show."));
    }
}
