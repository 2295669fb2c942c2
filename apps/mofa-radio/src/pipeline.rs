//! Radio Pipeline - topic in, mastered two-host segment out
//!
//! Stages run strictly in sequence:
//! 1. Fetch reference text for the topic
//! 2. Render the prompt and generate a raw script
//! 3. Parse the script into turns
//! 4. Synthesize every turn (the only concurrent stage)
//! 5. Join, normalize and export the track
//!
//! Any failure ends the run and no output file is left behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Datelike;

use crate::audio_codec::{AudioCodec, AudioMetadata, ExportSettings, PcmCodec};
use crate::audio_mixer::{ExportReport, TrackAssembler};
use crate::config::{resolve_secret, RadioConfig, TtsProviderKind};
use crate::error::{CastError, CastResult};
use crate::reference_source::{ReferenceSource, WikipediaSource};
use crate::script_parser::{Script, ScriptParser};
use crate::script_templates::ScriptPrompt;
use crate::script_writer::{OpenAiScriptWriter, ScriptWriter};
use crate::text_normalizer::TextNormalizer;
use crate::tts_batch::{ProgressCallback, SynthesisSettings, TurnSynthesizer};
use crate::tts_engine::{ElevenLabsTts, MockTts, TextToSpeech};
use crate::voice_map::VoiceMap;

/// Length of each mock tone
const MOCK_TONE_MS: u64 = 1500;

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Script as generated or supplied
    pub raw_script: String,
    pub script: Script,
    pub export: ExportReport,
    /// Track length before export, pauses included
    pub track_duration_ms: u64,
    /// Wall time of the whole run
    pub elapsed_ms: u64,
}

/// The assembled pipeline with its collaborators
pub struct RadioPipeline {
    config: RadioConfig,
    source: Option<Arc<dyn ReferenceSource>>,
    writer: Option<Arc<dyn ScriptWriter>>,
    engine: Arc<dyn TextToSpeech>,
    codec: Arc<dyn AudioCodec>,
    progress: Option<ProgressCallback>,
}

impl RadioPipeline {
    /// Pipeline that can render scripts. Add a source and a writer to generate them.
    pub fn new(config: RadioConfig, engine: Arc<dyn TextToSpeech>, codec: Arc<dyn AudioCodec>) -> Self {
        Self {
            config,
            source: None,
            writer: None,
            engine,
            codec,
            progress: None,
        }
    }

    pub fn with_reference_source(mut self, source: Arc<dyn ReferenceSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_script_writer(mut self, writer: Arc<dyn ScriptWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Build the real adapters from configuration.
    ///
    /// With `generate` unset the Wikipedia and OpenAI clients are not created,
    /// so rendering an existing script needs no OpenAI key.
    pub fn from_config(config: RadioConfig, generate: bool) -> CastResult<Self> {
        config.validate()?;

        let codec: Arc<dyn AudioCodec> = Arc::new(PcmCodec::new(config.mixer.sample_rate, config.mixer.channels));
        let engine: Arc<dyn TextToSpeech> = match config.tts.provider {
            TtsProviderKind::Elevenlabs => {
                let api_key = resolve_secret(&config.tts.api_key)?;
                Arc::new(ElevenLabsTts::new(&config.tts, api_key)?)
            }
            TtsProviderKind::Mock => {
                log::warn!("Using mock TTS: the output will contain tones, not speech");
                Arc::new(MockTts::new(config.mixer.sample_rate, MOCK_TONE_MS))
            }
        };

        let mut pipeline = Self::new(config, engine, codec);
        if generate {
            let source = WikipediaSource::new(&pipeline.config.reference)?;
            let api_key = resolve_secret(&pipeline.config.script.api_key)?;
            let writer = OpenAiScriptWriter::new(&pipeline.config.script, api_key)?;
            pipeline = pipeline
                .with_reference_source(Arc::new(source))
                .with_script_writer(Arc::new(writer));
        }
        Ok(pipeline)
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    /// Parser configured with the speaker names, line policy and normalizer settings
    pub fn parser(&self) -> ScriptParser {
        let names = self.config.speakers.names();
        let normalizer = TextNormalizer::new(&names.tags())
            .with_collapse_whitespace(self.config.normalizer.collapse_whitespace);
        ScriptParser::new(names, self.config.speakers.policy()).with_normalizer(normalizer)
    }

    /// Fetch reference text and generate a raw script for `topic`
    pub async fn write_script(&self, topic: &str) -> CastResult<String> {
        let (source, writer) = match (&self.source, &self.writer) {
            (Some(source), Some(writer)) => (source, writer),
            _ => {
                return Err(CastError::Configuration(
                    "script generation needs a reference source and a script writer".to_string(),
                ))
            }
        };

        let reference = source.fetch(topic, self.config.reference.max_chars).await?;
        let prompt = ScriptPrompt::new(reference, &self.config.script, self.config.speakers.names());
        writer.generate(&prompt.render()).await
    }

    /// Parse, synthesize and export an existing script
    pub async fn run_script(&self, raw_script: &str, output: &Path, title: &str) -> CastResult<RunReport> {
        let start_time = Instant::now();
        let settings = self.export_settings(output, title)?;

        let script = self.parser().parse(raw_script);
        if script.is_empty() {
            return Err(CastError::EmptyInput("synthesize"));
        }
        for stats in script.speaker_stats() {
            log::info!(
                "Speaker {} ({}): {} turns, {} characters",
                stats.name,
                stats.speaker,
                stats.turn_count,
                stats.total_characters
            );
        }

        let voices = VoiceMap::new(&self.config.speakers.voice_a, &self.config.speakers.voice_b)?;
        let synthesis = SynthesisSettings {
            pause_ms: self.config.mixer.pause_ms,
            max_concurrent_tasks: self.config.tts.max_concurrent_tasks,
            request_timeout: Duration::from_secs(self.config.tts.request_timeout_secs),
        };
        let mut synthesizer = TurnSynthesizer::new(self.engine.clone(), self.codec.clone(), voices, synthesis);
        if let Some(callback) = &self.progress {
            synthesizer = synthesizer.with_progress(callback.clone());
        }
        let clips = synthesizer.synthesize(&script).await?;

        let assembler = TrackAssembler::new(self.codec.clone());
        let track = assembler.assemble(&clips, self.config.mixer.headroom_db)?;
        let export = assembler.export(&track, output, &settings)?;

        Ok(RunReport {
            raw_script: raw_script.to_string(),
            script,
            track_duration_ms: track.duration_ms(),
            export,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    /// Full run: topic to exported audio
    pub async fn run(&self, topic: &str, output: &Path) -> CastResult<RunReport> {
        self.check_output(output)?;

        let raw_script = self.write_script(topic).await?;
        self.run_script(&raw_script, output, topic.trim()).await
    }

    /// Fail early when `output` has no supported audio extension or the
    /// configured bitrate is invalid. Call before generating a script.
    pub fn check_output(&self, output: &Path) -> CastResult<()> {
        self.export_settings(output, "").map(|_| ())
    }

    /// Output path from configuration
    pub fn default_output(&self) -> PathBuf {
        self.config.output_path.clone()
    }

    fn export_settings(&self, output: &Path, title: &str) -> CastResult<ExportSettings> {
        let metadata = AudioMetadata {
            title: Some(title.to_string()).filter(|t| !t.is_empty()),
            artist: self.config.mixer.artist.clone(),
            album: self.config.mixer.album.clone(),
            year: Some(chrono::Local::now().year().to_string()),
            comment: Some(format!("Generated by mofa-radio {}", env!("CARGO_PKG_VERSION"))),
        };
        Ok(ExportSettings::for_path(output, self.config.mixer.bitrate()?)?.with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnattributedLines;
    use crate::script_parser::Speaker;

    fn pipeline(config: RadioConfig) -> RadioPipeline {
        let engine = Arc::new(MockTts::new(24000, 1000));
        let codec = Arc::new(PcmCodec::new(24000, 1));
        RadioPipeline::new(config, engine, codec)
    }

    #[test]
    fn test_parser_follows_config() {
        let mut config = RadioConfig::default();
        config.speakers.name_a = "Priya".to_string();
        config.speakers.name_b = "Rahul".to_string();
        config.speakers.unattributed = UnattributedLines::Drop;
        config.normalizer.collapse_whitespace = false;

        let script = pipeline(config).parser().parse("Priya: Wait… what?\nnarration\nRahul: Haan");
        assert_eq!(script.speaker_sequence(), vec![Speaker::A, Speaker::B]);
        assert_eq!(script.turns[0].clean_text, "Wait,  what?");
    }

    #[test]
    fn test_check_output() {
        let pipeline = pipeline(RadioConfig::default());
        assert!(pipeline.check_output(Path::new("out/show.mp3")).is_ok());
        assert!(pipeline.check_output(Path::new("show.WAV")).is_ok());
        for bad in ["show.ogg", "show", "show.mp3.txt"] {
            assert!(
                matches!(pipeline.check_output(Path::new(bad)), Err(CastError::Export { .. })),
                "{bad} accepted"
            );
        }
    }

    #[tokio::test]
    async fn test_write_script_needs_collaborators() {
        let err = pipeline(RadioConfig::default()).write_script("Chai").await.unwrap_err();
        assert!(matches!(err, CastError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_run_script_rejects_bad_extension_before_synthesis() {
        let engine = Arc::new(MockTts::new(24000, 100));
        let pipeline = RadioPipeline::new(RadioConfig::default(), engine.clone(), Arc::new(PcmCodec::new(24000, 1)));

        let err = pipeline
            .run_script("A: Hi", Path::new("show.ogg"), "Chai")
            .await
            .unwrap_err();

        assert!(matches!(err, CastError::Export { .. }));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_script_empty_script() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("show.wav");

        let err = pipeline(RadioConfig::default())
            .run_script("\n\n", &output, "Chai")
            .await
            .unwrap_err();

        assert!(matches!(err, CastError::EmptyInput(_)));
        assert!(!output.exists());
    }

    #[test]
    fn test_from_config_with_mock_engine() {
        let mut config = RadioConfig::default();
        config.tts.provider = TtsProviderKind::Mock;

        let pipeline = RadioPipeline::from_config(config, false).unwrap();
        assert!(pipeline.source.is_none());
        assert!(pipeline.writer.is_none());
        assert_eq!(pipeline.engine.engine_name(), "mock-tts");
    }
}
