//! Script templates for mofa-radio
//!
//! Builds the instruction handed to the script writer: length targets,
//! Hinglish radio style rules, the strict `<speaker>: ...` line format and
//! the reference text to talk about.

use crate::config::ScriptConfig;
use crate::script_parser::SpeakerNames;

/// Fillers the hosts are asked to use
const FILLERS: [&str; 6] = ["achcha", "umm", "arre", "haan", "yaar", "matlab"];

/// Prompt for one radio segment
#[derive(Debug, Clone)]
pub struct ScriptPrompt {
    pub reference_text: String,
    pub speakers: SpeakerNames,
    /// Inclusive word count range for the whole script
    pub target_words: (u32, u32),
    /// Inclusive range of dialogue turns, both hosts combined
    pub target_turns: (u32, u32),
}

impl ScriptPrompt {
    pub fn new(reference_text: impl Into<String>, config: &ScriptConfig, speakers: SpeakerNames) -> Self {
        Self {
            reference_text: reference_text.into(),
            speakers,
            target_words: config.target_words,
            target_turns: config.target_turns,
        }
    }

    /// Rough spoken length at 150 words per minute
    pub fn estimated_minutes(&self) -> f64 {
        let (min_words, max_words) = self.target_words;
        (min_words + max_words) as f64 / 2.0 / 150.0
    }

    /// Render the full prompt text
    pub fn render(&self) -> String {
        let (min_words, max_words) = self.target_words;
        let (min_turns, max_turns) = self.target_turns;
        let [a, b] = self.speakers.tags();
        let fillers = FILLERS
            .iter()
            .map(|f| format!("\"{}\"", f))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "You are a creative Indian radio show script writer.

TASK:
Generate a natural-sounding Hinglish (Hindi + English mix) conversation
between two radio hosts ({a} and {b}) based on the topic below.

HARD CONSTRAINTS (VERY IMPORTANT):
- Total length: {min_words}-{max_words} words (about {minutes:.0} minutes of speech)
- Exactly {min_turns}-{max_turns} dialogue turns total ({a} + {b} combined)
- Each line should sound spoken, not written

STYLE RULES:
- Use casual Hinglish, not pure Hindi or English
- Frequently use fillers like: {fillers}
- Add light interruptions, incomplete sentences, and informal reactions
- Add occasional laughter cues like \"(laughs)\" or \"(chuckles)\"
- Avoid formal explanations or Wikipedia-style narration
- Keep sentences short and conversational

FORMAT (STRICT):
{a}: ...
{b}: ...
{a}: ...
{b}: ...

TOPIC:
{topic}
",
            minutes = self.estimated_minutes().max(1.0),
            topic = self.reference_text.trim(),
        )
    }
}
