//! TTS Batch Synthesis - Convert script turns to audio clips
//!
//! This module drives the speech provider over a whole script:
//! - Voice lookup per speaker
//! - Bounded parallel synthesis with a per-call timeout
//! - Decoding into the pipeline PCM format
//! - A fixed pause appended after every turn
//! - Progress tracking
//!
//! Clips always come back in script order, whatever order the provider
//! answers in. The first failure cancels the remaining work.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::{JoinError, JoinSet};

use crate::audio_codec::{AudioCodec, Pcm};
use crate::error::{CastError, CastResult};
use crate::script_parser::{preview, Script, Speaker};
use crate::tts_engine::TextToSpeech;
use crate::voice_map::VoiceMap;

// ============================================================================
// DATA MODELS
// ============================================================================

/// Synthesis pacing and limits
#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    /// Silence appended after every turn
    pub pause_ms: u64,
    /// Maximum provider calls in flight
    pub max_concurrent_tasks: usize,
    /// Time budget for one provider call
    pub request_timeout: Duration,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            pause_ms: 250,
            max_concurrent_tasks: 4,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Decoded audio for one turn, trailing pause included
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Position of the turn in the script
    pub index: usize,
    pub speaker: Speaker,
    /// Length of the speech alone, without the pause
    pub speech_ms: u64,
    pub pcm: Pcm,
}

impl AudioClip {
    pub fn duration_ms(&self) -> u64 {
        self.pcm.duration_ms()
    }
}

/// Progress update during synthesis
#[derive(Debug, Clone)]
pub struct SynthesisProgress {
    /// Turns finished so far
    pub completed: usize,
    pub total: usize,
    /// Turn that just finished
    pub index: usize,
    pub speaker: Speaker,
    pub text_preview: String,
    /// Percentage complete (0-100)
    pub percentage: f64,
}

/// Progress callback type
pub type ProgressCallback = Arc<dyn Fn(SynthesisProgress) + Send + Sync>;

/// Everything a spawned task needs for one turn
struct TurnJob {
    index: usize,
    speaker: Speaker,
    speaker_name: String,
    voice_id: String,
    text: String,
}

// ============================================================================
// TURN SYNTHESIZER
// ============================================================================

/// Turns a parsed [`Script`] into ordered [`AudioClip`]s
pub struct TurnSynthesizer {
    engine: Arc<dyn TextToSpeech>,
    codec: Arc<dyn AudioCodec>,
    voices: VoiceMap,
    settings: SynthesisSettings,
    progress: Option<ProgressCallback>,
}

impl TurnSynthesizer {
    pub fn new(
        engine: Arc<dyn TextToSpeech>,
        codec: Arc<dyn AudioCodec>,
        voices: VoiceMap,
        settings: SynthesisSettings,
    ) -> Self {
        Self {
            engine,
            codec,
            voices,
            settings,
            progress: None,
        }
    }

    /// Report each finished turn to `callback`
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn engine_name(&self) -> &str {
        self.engine.engine_name()
    }

    /// Synthesize every turn of `script`, returning one clip per turn in script order.
    pub async fn synthesize(&self, script: &Script) -> CastResult<Vec<AudioClip>> {
        if script.is_empty() {
            return Err(CastError::EmptyInput("synthesize"));
        }

        let start_time = Instant::now();
        let total = script.len();
        let max_in_flight = self.settings.max_concurrent_tasks.max(1);
        log::info!(
            "Synthesizing {} turns with {} ({} in parallel)",
            total,
            self.engine.engine_name(),
            max_in_flight
        );

        let mut slots: Vec<Option<AudioClip>> = (0..total).map(|_| None).collect();
        let mut completed = 0usize;
        let mut join_set = JoinSet::new();

        for (index, turn) in script.iter().enumerate() {
            let job = TurnJob {
                index,
                speaker: turn.speaker,
                speaker_name: script.speakers.name(turn.speaker).to_string(),
                voice_id: self.voices.resolve(turn.speaker).to_string(),
                text: turn.clean_text.clone(),
            };
            let engine = self.engine.clone();
            let codec = self.codec.clone();
            let timeout = self.settings.request_timeout;
            let pause_ms = self.settings.pause_ms;

            join_set.spawn(async move {
                let index = job.index;
                let speaker_name = job.speaker_name.clone();
                Self::synthesize_turn(engine, codec, job, timeout, pause_ms)
                    .await
                    .map_err(|e| e.for_turn(index, &speaker_name))
            });

            // Limit concurrent tasks
            while join_set.len() >= max_in_flight {
                if let Some(joined) = join_set.join_next().await {
                    if let Err(e) = self.store(joined, script, &mut slots, &mut completed) {
                        join_set.abort_all();
                        return Err(e);
                    }
                }
            }
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = self.store(joined, script, &mut slots, &mut completed) {
                join_set.abort_all();
                return Err(e);
            }
        }

        let clips = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| CastError::Task(format!("turn {} produced no result", index)))
            })
            .collect::<CastResult<Vec<_>>>()?;

        log::info!(
            "Synthesized {} clips in {:.1}s",
            clips.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(clips)
    }

    /// Put a finished clip in its slot and report progress
    fn store(
        &self,
        joined: Result<CastResult<AudioClip>, JoinError>,
        script: &Script,
        slots: &mut [Option<AudioClip>],
        completed: &mut usize,
    ) -> CastResult<()> {
        let clip = joined.map_err(|e| CastError::Task(e.to_string()))??;
        let index = clip.index;
        let speaker = clip.speaker;
        log::debug!("Turn {} ({}) ready: {} ms", index, speaker, clip.duration_ms());
        slots[index] = Some(clip);
        *completed += 1;

        if let Some(callback) = &self.progress {
            let total = slots.len();
            callback(SynthesisProgress {
                completed: *completed,
                total,
                index,
                speaker,
                text_preview: preview(&script.turns[index].clean_text, 50),
                percentage: (*completed as f64 / total as f64) * 100.0,
            });
        }
        Ok(())
    }

    /// Synthesize, decode and pad a single turn
    async fn synthesize_turn(
        engine: Arc<dyn TextToSpeech>,
        codec: Arc<dyn AudioCodec>,
        job: TurnJob,
        timeout: Duration,
        pause_ms: u64,
    ) -> CastResult<AudioClip> {
        let payload = match tokio::time::timeout(timeout, engine.synthesize(&job.text, &job.voice_id)).await {
            Ok(result) => result?,
            Err(_) => return Err(CastError::Timeout(timeout)),
        };
        if payload.is_empty() {
            return Err(CastError::EmptyAudio {
                voice_id: job.voice_id,
            });
        }

        let format = engine.audio_format();
        let decoder = codec.clone();
        let speech = tokio::task::spawn_blocking(move || decoder.decode(&payload, format))
            .await
            .map_err(|e| CastError::Task(e.to_string()))??;
        if speech.is_empty() {
            return Err(CastError::EmptyAudio {
                voice_id: job.voice_id,
            });
        }

        let speech_ms = speech.duration_ms();
        let pcm = codec.concat(speech, &codec.silence(pause_ms))?;

        Ok(AudioClip {
            index: job.index,
            speaker: job.speaker,
            speech_ms,
            pcm,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_codec::{AudioFormat, PcmCodec};
    use crate::script_parser::ScriptParser;
    use crate::tts_engine::MockTts;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RATE: u32 = 24000;

    /// Engine answering `tN` with 100 ms of the constant sample `N`
    #[derive(Default)]
    struct ScriptedTts {
        delays_ms: HashMap<String, u64>,
        fail_on: Option<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TextToSpeech for ScriptedTts {
        async fn synthesize(&self, text: &str, _voice_id: &str) -> CastResult<Vec<u8>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = self.delays_ms.get(text).copied().unwrap_or(5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.as_deref() == Some(text) {
                return Err(CastError::Provider {
                    provider: "scripted",
                    status: 500,
                    body: "boom".to_string(),
                });
            }

            let marker: i16 = text[1..].parse().unwrap();
            let frames = RATE as usize / 10;
            Ok((0..frames).flat_map(|_| marker.to_le_bytes()).collect())
        }

        fn audio_format(&self) -> AudioFormat {
            AudioFormat::Pcm16 { sample_rate: RATE }
        }

        fn engine_name(&self) -> &str {
            "scripted"
        }
    }

    fn script(n: usize) -> Script {
        let raw: Vec<String> = (1..=n)
            .map(|i| format!("{}: t{}", if i % 2 == 1 { "A" } else { "B" }, i))
            .collect();
        ScriptParser::default().parse(&raw.join("\n"))
    }

    fn synthesizer(engine: Arc<dyn TextToSpeech>, settings: SynthesisSettings) -> TurnSynthesizer {
        TurnSynthesizer::new(
            engine,
            Arc::new(PcmCodec::new(RATE, 1)),
            VoiceMap::new("voice-a", "voice-b").unwrap(),
            settings,
        )
    }

    #[tokio::test]
    async fn test_clips_follow_script_order() {
        // Earlier turns answer last
        let delays_ms = (1..=5).map(|i| (format!("t{}", i), (6 - i) * 30)).collect();
        let engine = Arc::new(ScriptedTts {
            delays_ms,
            ..Default::default()
        });

        let clips = synthesizer(engine, SynthesisSettings::default())
            .synthesize(&script(5))
            .await
            .unwrap();

        assert_eq!(clips.len(), 5);
        for (i, clip) in clips.iter().enumerate() {
            assert_eq!(clip.index, i);
            assert_eq!(clip.pcm.samples()[0], i as i16 + 1);
        }
        assert_eq!(clips[0].speaker, Speaker::A);
        assert_eq!(clips[1].speaker, Speaker::B);
    }

    #[tokio::test]
    async fn test_pause_appended_to_every_clip() {
        let engine = Arc::new(ScriptedTts::default());
        let settings = SynthesisSettings {
            pause_ms: 250,
            ..Default::default()
        };

        let clips = synthesizer(engine, settings).synthesize(&script(3)).await.unwrap();

        for clip in &clips {
            assert_eq!(clip.speech_ms, 100);
            assert_eq!(clip.duration_ms(), 350);
            let tail = &clip.pcm.samples()[clip.pcm.samples().len() - 6000..];
            assert!(tail.iter().all(|&s| s == 0));
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let delays_ms = (1..=8).map(|i| (format!("t{}", i), 20)).collect();
        let engine = Arc::new(ScriptedTts {
            delays_ms,
            ..Default::default()
        });
        let settings = SynthesisSettings {
            max_concurrent_tasks: 2,
            ..Default::default()
        };

        let clips = synthesizer(engine.clone(), settings)
            .synthesize(&script(8))
            .await
            .unwrap();

        assert_eq!(clips.len(), 8);
        assert!(engine.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failure_names_the_turn() {
        let engine = Arc::new(ScriptedTts {
            fail_on: Some("t3".to_string()),
            ..Default::default()
        });

        let err = synthesizer(engine, SynthesisSettings::default())
            .synthesize(&script(5))
            .await
            .unwrap_err();

        assert_eq!(err.turn_index(), Some(2));
        match err {
            CastError::TurnFailed { speaker, source, .. } => {
                assert_eq!(speaker, "A");
                assert!(matches!(*source, CastError::Provider { status: 500, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_payload_is_synthesis_empty() {
        let engine = Arc::new(MockTts::new(RATE, 100).with_empty_for("t2"));

        let err = synthesizer(engine, SynthesisSettings::default())
            .synthesize(&script(3))
            .await
            .unwrap_err();

        assert!(matches!(err, CastError::SynthesisEmpty { index: 1, ref speaker } if speaker == "B"));
    }

    #[tokio::test]
    async fn test_timeout_is_reported_per_turn() {
        let delays_ms = [("t1".to_string(), 2000)].into_iter().collect();
        let engine = Arc::new(ScriptedTts {
            delays_ms,
            ..Default::default()
        });
        let settings = SynthesisSettings {
            request_timeout: Duration::from_millis(50),
            ..Default::default()
        };

        let err = synthesizer(engine, settings).synthesize(&script(2)).await.unwrap_err();

        match err {
            CastError::TurnFailed { index, source, .. } => {
                assert_eq!(index, 0);
                assert!(matches!(*source, CastError::Timeout(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_script_rejected() {
        let engine = Arc::new(MockTts::default());
        let empty = ScriptParser::default().parse("");

        let err = synthesizer(engine.clone(), SynthesisSettings::default())
            .synthesize(&empty)
            .await
            .unwrap_err();

        assert!(matches!(err, CastError::EmptyInput("synthesize")));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_voices_and_progress() {
        let engine = Arc::new(MockTts::new(RATE, 50));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let clips = synthesizer(engine.clone(), SynthesisSettings::default())
            .with_progress(Arc::new(move |p: SynthesisProgress| sink.lock().push(p.completed)))
            .synthesize(&script(4))
            .await
            .unwrap();

        assert_eq!(clips.len(), 4);
        assert_eq!(*seen.lock(), vec![1, 2, 3, 4]);

        let mut calls = engine.calls();
        calls.sort_by(|a, b| a.text.cmp(&b.text));
        let voices: Vec<_> = calls.iter().map(|c| c.voice_id.as_str()).collect();
        assert_eq!(voices, vec!["voice-a", "voice-b", "voice-a", "voice-b"]);
    }
}
