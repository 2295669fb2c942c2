//! MoFA Radio - Turn a topic into a two-host Hinglish radio segment
//!
//! This app provides:
//! - Reference text lookup on Wikipedia
//! - LLM script generation with a Hinglish radio-host prompt
//! - Speaker parsing and speech-friendly text normalization
//! - Bounded parallel multi-voice TTS synthesis
//! - Ordered clip assembly, peak normalization and WAV/MP3 export

pub mod audio_codec;
pub mod audio_mixer;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod reference_source;
pub mod script_parser;
pub mod script_templates;
pub mod script_writer;
pub mod text_normalizer;
pub mod tts_batch;
pub mod tts_engine;
pub mod voice_map;

pub use error::{CastError, CastResult};

// Re-export script types
pub use script_parser::{
    Script, ScriptParser, Speaker, SpeakerNames, SpeakerStats, Turn, UnattributedPolicy,
};
pub use text_normalizer::{normalize, TextNormalizer};
pub use voice_map::VoiceMap;

// Re-export audio types
pub use audio_codec::{
    AudioCodec, AudioFormat, AudioMetadata, ExportFormat, ExportSettings, Mp3Bitrate, Pcm,
    PcmCodec,
};
pub use audio_mixer::{ExportReport, Track, TrackAssembler};
pub use tts_batch::{AudioClip, ProgressCallback, SynthesisProgress, SynthesisSettings, TurnSynthesizer};

// Re-export provider types
pub use reference_source::{ReferenceSource, WikipediaSource};
pub use script_templates::ScriptPrompt;
pub use script_writer::{OpenAiScriptWriter, ScriptWriter};
pub use tts_engine::{ElevenLabsTts, MockTts, TextToSpeech};

pub use config::RadioConfig;
pub use pipeline::{RadioPipeline, RunReport};
