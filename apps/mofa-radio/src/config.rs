use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::audio_codec::Mp3Bitrate;
use crate::error::{CastError, CastResult};
use crate::script_parser::{Speaker, SpeakerNames, UnattributedPolicy};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "MOFA_RADIO_CONFIG";

/// Prefix for configuration overrides from the environment.
///
/// Nested keys use `__`, e.g. `MOFA_RADIO_TTS__MAX_CONCURRENT_TASKS=8`.
pub const ENV_PREFIX: &str = "MOFA_RADIO_";

const CONFIG_FILE_NAME: &str = "mofa_radio.toml";

/// Main configuration structure for the radio pipeline.
///
/// Built once at startup from a TOML file and `MOFA_RADIO_` environment
/// variables, validated, then passed explicitly to every component. Every
/// field has a working default.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RadioConfig {
    pub log_level: String,
    pub output_path: PathBuf,
    pub speakers: SpeakerConfig,
    pub normalizer: NormalizerConfig,
    pub reference: ReferenceConfig,
    pub script: ScriptConfig,
    pub tts: TtsConfig,
    pub mixer: MixerConfig,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            output_path: PathBuf::from("synthetic_radio_host.mp3"),
            speakers: SpeakerConfig::default(),
            normalizer: NormalizerConfig::default(),
            reference: ReferenceConfig::default(),
            script: ScriptConfig::default(),
            tts: TtsConfig::default(),
            mixer: MixerConfig::default(),
        }
    }
}

/// How lines without a speaker tag are handled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnattributedLines {
    /// Give them to `default_speaker`
    Assign,
    /// Skip them
    Drop,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SpeakerConfig {
    /// Tag of the first host in the script (`<name_a>: ...`)
    pub name_a: String,
    pub name_b: String,
    pub voice_a: String,
    pub voice_b: String,
    pub unattributed: UnattributedLines,
    pub default_speaker: Speaker,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            name_a: "A".to_string(),
            name_b: "B".to_string(),
            voice_a: "pNInz6obpgDQGcFmaJgB".to_string(),
            voice_b: "21m00Tcm4TlvDq8ikWAM".to_string(),
            unattributed: UnattributedLines::Assign,
            default_speaker: Speaker::A,
        }
    }
}

impl SpeakerConfig {
    pub fn names(&self) -> SpeakerNames {
        SpeakerNames::new(self.name_a.trim(), self.name_b.trim())
    }

    pub fn policy(&self) -> UnattributedPolicy {
        match self.unattributed {
            UnattributedLines::Assign => UnattributedPolicy::Assign(self.default_speaker),
            UnattributedLines::Drop => UnattributedPolicy::Drop,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Collapse whitespace runs to a single space
    pub collapse_whitespace: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            collapse_whitespace: true,
        }
    }
}

/// Reference article lookup (MediaWiki API)
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub api_url: String,
    pub user_agent: String,
    pub max_chars: usize,
    pub min_chars: usize,
    pub request_timeout_secs: u64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            api_url: "https://en.wikipedia.org/w/api.php".to_string(),
            user_agent: "SyntheticRadioHost/1.0".to_string(),
            max_chars: 2500,
            min_chars: 100,
            request_timeout_secs: 30,
        }
    }
}

/// Script writer (OpenAI-compatible chat completions)
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub api_url: String,
    /// Literal key or `env:VAR`
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub target_words: (u32, u32),
    pub target_turns: (u32, u32),
    pub request_timeout_secs: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: "env:OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.9,
            max_tokens: 1000,
            system_prompt: "You write conversational Indian Hinglish radio scripts.".to_string(),
            target_words: (260, 300),
            target_turns: (16, 18),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsProviderKind {
    Elevenlabs,
    /// Offline tone generator, no network access
    Mock,
}

/// Provider-specific voice shaping, passed through untouched
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    #[serde(default)]
    pub style: f32,
    #[serde(default = "default_speaker_boost")]
    pub use_speaker_boost: bool,
}

fn default_speaker_boost() -> bool {
    true
}

/// Speech synthesis
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TtsConfig {
    pub provider: TtsProviderKind,
    pub api_url: String,
    /// Literal key or `env:VAR`
    pub api_key: String,
    pub model_id: String,
    /// Provider output format; `pcm_<rate>` decodes without ffmpeg
    pub output_format: String,
    pub voice_settings: Option<VoiceSettings>,
    pub max_concurrent_tasks: usize,
    pub request_timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: TtsProviderKind::Elevenlabs,
            api_url: "https://api.elevenlabs.io/v1/text-to-speech".to_string(),
            api_key: "env:ELEVENLABS_API_KEY".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            output_format: "pcm_22050".to_string(),
            voice_settings: None,
            max_concurrent_tasks: 4,
            request_timeout_secs: 30,
        }
    }
}

/// Clip pacing, mastering and export
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct MixerConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Silence appended after every turn
    pub pause_ms: u64,
    /// Peak headroom for the final normalization pass
    pub headroom_db: f32,
    pub mp3_bitrate: u32,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            channels: 1,
            pause_ms: 250,
            headroom_db: 2.0,
            mp3_bitrate: 192,
            artist: Some("MoFA Radio".to_string()),
            album: None,
        }
    }
}

impl MixerConfig {
    pub fn bitrate(&self) -> CastResult<Mp3Bitrate> {
        Mp3Bitrate::from_kbps(self.mp3_bitrate).ok_or_else(|| {
            CastError::Configuration(format!(
                "unsupported mp3_bitrate {} (use 128, 192, 256 or 320)",
                self.mp3_bitrate
            ))
        })
    }
}

impl RadioConfig {
    /// Locate the configuration file.
    ///
    /// Order: explicit path, `MOFA_RADIO_CONFIG`, `./mofa_radio.toml`,
    /// `<config dir>/mofa-studio/mofa_radio.toml`. `None` means defaults only.
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }

        let mut user = dirs::config_dir()?;
        user.push("mofa-studio");
        user.push(CONFIG_FILE_NAME);
        user.exists().then_some(user)
    }

    /// Load and validate configuration from an optional TOML file plus environment.
    pub fn load(path: Option<&Path>) -> CastResult<Self> {
        let mut figment = Figment::new();

        if let Some(path) = path {
            if !path.exists() {
                return Err(CastError::Configuration(format!(
                    "config file not found at: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        let config: RadioConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| CastError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that every later stage relies on
    pub fn validate(&self) -> CastResult<()> {
        let invalid = |msg: String| Err(CastError::Configuration(msg));

        let names = self.speakers.names();
        for name in names.tags() {
            if name.is_empty() {
                return invalid("speaker names must not be blank".to_string());
            }
            if name.contains(':') {
                return invalid(format!("speaker name '{}' must not contain ':'", name));
            }
        }
        if names.a == names.b {
            return invalid(format!("both speakers are named '{}'", names.a));
        }
        if self.speakers.voice_a.trim().is_empty() || self.speakers.voice_b.trim().is_empty() {
            return invalid("both speakers need a voice id".to_string());
        }

        if self.reference.max_chars < self.reference.min_chars {
            return invalid(format!(
                "reference.max_chars ({}) is below reference.min_chars ({})",
                self.reference.max_chars, self.reference.min_chars
            ));
        }
        for (label, (low, high)) in [
            ("script.target_words", self.script.target_words),
            ("script.target_turns", self.script.target_turns),
        ] {
            if low > high {
                return invalid(format!("{} range is inverted: {}-{}", label, low, high));
            }
        }

        if self.tts.max_concurrent_tasks == 0 {
            return invalid("tts.max_concurrent_tasks must be at least 1".to_string());
        }
        if self.tts.request_timeout_secs == 0 {
            return invalid("tts.request_timeout_secs must be at least 1".to_string());
        }
        if self.mixer.sample_rate == 0 || !(1..=2).contains(&self.mixer.channels) {
            return invalid(format!(
                "unsupported mixer format: {} Hz, {} channels",
                self.mixer.sample_rate, self.mixer.channels
            ));
        }
        if !(0.0..=20.0).contains(&self.mixer.headroom_db) {
            return invalid(format!(
                "mixer.headroom_db {} is outside 0-20 dB",
                self.mixer.headroom_db
            ));
        }
        self.mixer.bitrate()?;

        Ok(())
    }
}

/// Resolve a secret that may reference the environment.
///
/// `"env:OPENAI_API_KEY"` reads that variable; anything else is used literally.
pub fn resolve_secret(value: &str) -> CastResult<String> {
    let resolved = match value.strip_prefix("env:") {
        Some(var) => std::env::var(var)
            .map_err(|_| CastError::Configuration(format!("environment variable {} not found", var)))?,
        None => value.to_string(),
    };

    let resolved = resolved.trim().to_string();
    if resolved.is_empty() {
        return Err(CastError::Configuration(format!("secret '{}' resolved to an empty string", value)));
    }

    let chars: Vec<char> = resolved.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        log::debug!("Resolved secret {} = {}...{}", value, head, tail);
    }
    Ok(resolved)
}
