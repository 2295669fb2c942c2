//! Voice assignment per speaker

use crate::error::{CastError, CastResult};
use crate::script_parser::Speaker;

/// Fixed speaker -> voice id mapping, total over both speakers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceMap {
    voice_a: String,
    voice_b: String,
}

impl VoiceMap {
    /// Build the map, rejecting blank voice ids.
    pub fn new(voice_a: impl Into<String>, voice_b: impl Into<String>) -> CastResult<Self> {
        let voice_a = voice_a.into().trim().to_string();
        let voice_b = voice_b.into().trim().to_string();

        for (speaker, voice) in [(Speaker::A, &voice_a), (Speaker::B, &voice_b)] {
            if voice.is_empty() {
                return Err(CastError::Configuration(format!(
                    "no voice configured for speaker {}",
                    speaker
                )));
            }
        }

        if voice_a == voice_b {
            log::warn!("Both speakers use voice '{}'", voice_a);
        }

        Ok(Self { voice_a, voice_b })
    }

    /// Voice id for a speaker
    pub fn resolve(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::A => &self.voice_a,
            Speaker::B => &self.voice_b,
        }
    }
}
