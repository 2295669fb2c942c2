//! Script Parser - Split a generated dialogue script into speaker turns
//!
//! The script writer is asked for one line per turn in the form
//! `<speaker>: text`. Model output is only semi-structured, so the parser:
//! - skips blank lines
//! - attributes each line by an exact `<name>:` prefix
//! - applies the [`UnattributedPolicy`] to lines without a known prefix
//! - normalizes every line and drops the ones that end up empty
//!
//! Turn order always equals line order.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::text_normalizer::TextNormalizer;

// ============================================================================
// DATA MODELS
// ============================================================================

/// One of the two radio hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    A,
    B,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::A => write!(f, "A"),
            Speaker::B => write!(f, "B"),
        }
    }
}

/// Display names of the two speakers, as they appear in the script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerNames {
    pub a: String,
    pub b: String,
}

impl SpeakerNames {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
        }
    }

    /// Script name of a speaker
    pub fn name(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::A => &self.a,
            Speaker::B => &self.b,
        }
    }

    /// Both names, A first
    pub fn tags(&self) -> [&str; 2] {
        [&self.a, &self.b]
    }
}

impl Default for SpeakerNames {
    fn default() -> Self {
        Self::new("A", "B")
    }
}

/// What to do with a line that carries no known speaker prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnattributedPolicy {
    /// Give the line to a fixed speaker and synthesize it
    Assign(Speaker),
    /// Skip the line
    Drop,
}

impl Default for UnattributedPolicy {
    fn default() -> Self {
        UnattributedPolicy::Assign(Speaker::A)
    }
}

/// One attributed, cleaned line of dialogue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// 1-based line number in the raw script
    pub line_number: usize,
    pub speaker: Speaker,
    /// Line as written, including tag and cues
    pub raw_text: String,
    /// Normalized text sent to the synthesizer, never empty
    pub clean_text: String,
}

/// Per-speaker statistics for a parsed script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeakerStats {
    pub speaker: Speaker,
    pub name: String,
    pub turn_count: usize,
    pub total_characters: usize,
}

/// Ordered turns of one script. Insertion order is speaking order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub turns: Vec<Turn>,
    pub speakers: SpeakerNames,
}

impl Script {
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    /// Speaker of every turn, in order
    pub fn speaker_sequence(&self) -> Vec<Speaker> {
        self.turns.iter().map(|t| t.speaker).collect()
    }

    /// Total characters that will be synthesized
    pub fn total_characters(&self) -> usize {
        self.turns.iter().map(|t| t.clean_text.chars().count()).sum()
    }

    /// Statistics for each speaker that has at least one turn, A first
    pub fn speaker_stats(&self) -> Vec<SpeakerStats> {
        let mut stats: HashMap<Speaker, SpeakerStats> = HashMap::new();

        for turn in &self.turns {
            let entry = stats.entry(turn.speaker).or_insert_with(|| SpeakerStats {
                speaker: turn.speaker,
                name: self.speakers.name(turn.speaker).to_string(),
                turn_count: 0,
                total_characters: 0,
            });
            entry.turn_count += 1;
            entry.total_characters += turn.clean_text.chars().count();
        }

        [Speaker::A, Speaker::B]
            .into_iter()
            .filter_map(|speaker| stats.remove(&speaker))
            .collect()
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// Parser for `<speaker>: text` dialogue scripts
#[derive(Debug, Clone)]
pub struct ScriptParser {
    names: SpeakerNames,
    policy: UnattributedPolicy,
    normalizer: TextNormalizer,
}

impl ScriptParser {
    /// Create a parser with a normalizer bound to the same speaker names
    pub fn new(names: SpeakerNames, policy: UnattributedPolicy) -> Self {
        let normalizer = TextNormalizer::new(&names.tags());
        Self {
            names,
            policy,
            normalizer,
        }
    }

    /// Replace the normalizer, e.g. to change whitespace handling
    pub fn with_normalizer(mut self, normalizer: TextNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn policy(&self) -> UnattributedPolicy {
        self.policy
    }

    /// Parse a raw script into ordered turns. May return an empty script.
    pub fn parse(&self, raw_script: &str) -> Script {
        let mut turns = Vec::new();
        let mut dropped_unattributed = 0usize;
        let mut dropped_empty = 0usize;

        for (index, line) in raw_script.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let speaker = match self.detect_speaker(line) {
                Some(speaker) => speaker,
                None => match self.policy {
                    UnattributedPolicy::Assign(speaker) => {
                        log::debug!("Line {} has no speaker tag, assigning to {}", index + 1, speaker);
                        speaker
                    }
                    UnattributedPolicy::Drop => {
                        log::debug!("Dropping unattributed line {}: {}", index + 1, preview(line, 40));
                        dropped_unattributed += 1;
                        continue;
                    }
                },
            };

            let clean_text = self.normalizer.normalize(line);
            if clean_text.is_empty() {
                log::warn!("Skipping empty line {}", index + 1);
                dropped_empty += 1;
                continue;
            }

            turns.push(Turn {
                line_number: index + 1,
                speaker,
                raw_text: line.to_string(),
                clean_text,
            });
        }

        log::info!(
            "Parsed script: {} turns ({} unattributed and {} empty lines dropped)",
            turns.len(),
            dropped_unattributed,
            dropped_empty
        );

        Script {
            turns,
            speakers: self.names.clone(),
        }
    }

    /// Exact, case-sensitive `<name>:` prefix match on a trimmed line
    fn detect_speaker(&self, line: &str) -> Option<Speaker> {
        [Speaker::A, Speaker::B].into_iter().find(|&speaker| {
            line.strip_prefix(self.names.name(speaker))
                .is_some_and(|rest| rest.starts_with(':'))
        })
    }
}

impl Default for ScriptParser {
    fn default() -> Self {
        Self::new(SpeakerNames::default(), UnattributedPolicy::default())
    }
}

/// Char-safe preview of a line for log output
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

// ============================================================================
// TESTS
// ============================================================================
