//! TTS Engines - Turn one line of text into encoded speech
//!
//! Engines return the provider payload untouched; decoding happens in the
//! audio codec so every engine can be swapped without touching the mixer.

use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client as HttpClient;
use serde::Serialize;

use crate::audio_codec::AudioFormat;
use crate::config::{TtsConfig, VoiceSettings};
use crate::error::{CastError, CastResult};

// ============================================================================
// TRAIT DEFINITIONS
// ============================================================================

/// Text-to-speech provider
#[async_trait::async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize `text` with `voice_id` and return the encoded audio payload.
    ///
    /// An empty payload is not an error at this level; callers decide.
    async fn synthesize(&self, text: &str, voice_id: &str) -> CastResult<Vec<u8>>;

    /// Encoding of the payloads returned by [`TextToSpeech::synthesize`]
    fn audio_format(&self) -> AudioFormat;

    /// Get engine name
    fn engine_name(&self) -> &str;
}

// ============================================================================
// ELEVENLABS
// ============================================================================

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_settings: Option<&'a VoiceSettings>,
}

/// ElevenLabs text-to-speech over HTTPS
#[derive(Debug)]
pub struct ElevenLabsTts {
    api_url: String,
    api_key: String,
    model_id: String,
    output_format: String,
    audio_format: AudioFormat,
    voice_settings: Option<VoiceSettings>,
    client: HttpClient,
}

impl ElevenLabsTts {
    /// Build the client. `api_key` must already be resolved.
    pub fn new(config: &TtsConfig, api_key: String) -> CastResult<Self> {
        let audio_format = AudioFormat::from_output_format(&config.output_format).ok_or_else(|| {
            CastError::Configuration(format!(
                "unsupported tts.output_format '{}'",
                config.output_format
            ))
        })?;

        let client = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            model_id: config.model_id.clone(),
            output_format: config.output_format.clone(),
            audio_format,
            voice_settings: config.voice_settings.clone(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl TextToSpeech for ElevenLabsTts {
    async fn synthesize(&self, text: &str, voice_id: &str) -> CastResult<Vec<u8>> {
        let url = format!("{}/{}", self.api_url, voice_id);
        let body = SpeechRequest {
            text,
            model_id: &self.model_id,
            voice_settings: self.voice_settings.as_ref(),
        };

        let response = self
            .client
            .post(&url)
            .query(&[("output_format", self.output_format.as_str())])
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CastError::Provider {
                provider: "elevenlabs",
                status: status.as_u16(),
                body,
            });
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(CastError::EmptyAudio {
                voice_id: voice_id.to_string(),
            });
        }

        log::debug!(
            "ElevenLabs: {} chars with voice {} -> {} bytes",
            text.chars().count(),
            voice_id,
            audio.len()
        );
        Ok(audio.to_vec())
    }

    fn audio_format(&self) -> AudioFormat {
        self.audio_format
    }

    fn engine_name(&self) -> &str {
        "elevenlabs"
    }
}

// ============================================================================
// MOCK TTS ENGINE (offline runs and tests)
// ============================================================================

/// One recorded call to [`MockTts`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub text: String,
    pub voice_id: String,
}

/// Offline engine that answers every line with a sine tone as raw PCM16
#[derive(Debug)]
pub struct MockTts {
    sample_rate: u32,
    duration_ms: u64,
    frequency: f64,
    empty_for: Option<String>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockTts {
    pub fn new(sample_rate: u32, duration_ms: u64) -> Self {
        Self {
            sample_rate,
            duration_ms,
            frequency: 440.0,
            empty_for: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Return an empty payload for any text containing `needle`
    pub fn with_empty_for(mut self, needle: impl Into<String>) -> Self {
        self.empty_for = Some(needle.into());
        self
    }

    /// Calls received so far, in arrival order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    fn tone(&self) -> Vec<u8> {
        let frames = (self.duration_ms * self.sample_rate as u64 / 1000) as usize;
        let amplitude = 32767.0 * 0.3;
        let mut bytes = Vec::with_capacity(frames * 2);

        for i in 0..frames {
            let t = i as f64 / self.sample_rate as f64;
            let decay = 1.0 - (i as f64 / frames as f64) * 0.5;
            let sample = (amplitude * decay * (2.0 * std::f64::consts::PI * self.frequency * t).sin()) as i16;
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

impl Default for MockTts {
    fn default() -> Self {
        Self::new(22050, 1000)
    }
}

#[async_trait::async_trait]
impl TextToSpeech for MockTts {
    async fn synthesize(&self, text: &str, voice_id: &str) -> CastResult<Vec<u8>> {
        self.calls.lock().push(MockCall {
            text: text.to_string(),
            voice_id: voice_id.to_string(),
        });

        if self.empty_for.as_deref().is_some_and(|needle| text.contains(needle)) {
            return Ok(Vec::new());
        }

        log::debug!("MockTts: {} chars -> {} ms tone", text.chars().count(), self.duration_ms);
        Ok(self.tone())
    }

    fn audio_format(&self) -> AudioFormat {
        AudioFormat::Pcm16 {
            sample_rate: self.sample_rate,
        }
    }

    fn engine_name(&self) -> &str {
        "mock-tts"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> TtsConfig {
        TtsConfig {
            api_url: format!("{}/v1/text-to-speech/", server.uri()),
            ..TtsConfig::default()
        }
    }

    #[tokio::test]
    async fn test_elevenlabs_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-a"))
            .and(query_param("output_format", "pcm_22050"))
            .and(header("xi-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "text": "Namaste dosto",
                "model_id": "eleven_multilingual_v2"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 0, 2, 0]))
            .expect(1)
            .mount(&server)
            .await;

        let tts = ElevenLabsTts::new(&config_for(&server), "test-key".to_string()).unwrap();
        let audio = tts.synthesize("Namaste dosto", "voice-a").await.unwrap();

        assert_eq!(audio, vec![1, 0, 2, 0]);
        assert_eq!(tts.audio_format(), AudioFormat::Pcm16 { sample_rate: 22050 });
    }

    #[tokio::test]
    async fn test_elevenlabs_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let tts = ElevenLabsTts::new(&config_for(&server), "bad".to_string()).unwrap();
        let err = tts.synthesize("hello", "voice-a").await.unwrap_err();

        match err {
            CastError::Provider { provider, status, body } => {
                assert_eq!(provider, "elevenlabs");
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_elevenlabs_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let tts = ElevenLabsTts::new(&config_for(&server), "key".to_string()).unwrap();
        let err = tts.synthesize("hello", "voice-b").await.unwrap_err();
        assert!(matches!(err, CastError::EmptyAudio { ref voice_id } if voice_id == "voice-b"));
    }

    #[test]
    fn test_unsupported_output_format() {
        let config = TtsConfig {
            output_format: "ogg_48000".to_string(),
            ..TtsConfig::default()
        };
        let err = ElevenLabsTts::new(&config, "key".to_string()).unwrap_err();
        assert!(matches!(err, CastError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_mock_tone_and_calls() {
        let tts = MockTts::new(16000, 500).with_empty_for("silent");

        let audio = tts.synthesize("hello", "voice-a").await.unwrap();
        assert_eq!(audio.len(), 8000 * 2);

        let empty = tts.synthesize("a silent line", "voice-b").await.unwrap();
        assert!(empty.is_empty());

        let calls = tts.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].voice_id, "voice-b");
        assert_eq!(tts.engine_name(), "mock-tts");
    }
}
