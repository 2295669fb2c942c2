//! Text Normalizer - Make one script line safe for speech synthesis
//!
//! Applied to every dialogue line before it reaches the TTS provider:
//! - Strip the leading speaker tag (`A: ...`)
//! - Turn laughter cues like `(laughs)` into a spoken "haha"
//! - Replace the ellipsis character with a soft comma pause
//! - Collapse `!!!` / `??` / `!?` runs into a single `!`
//! - Collapse whitespace runs (optional) and trim
//!
//! Normalizing an already normalized line returns it unchanged.

use once_cell::sync::Lazy;
use regex::Regex;

static LAUGHTER_CUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\((?:laughs?|chuckles?)\)").expect("laughter pattern"));

static REPEATED_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[!?]{2,}").expect("punctuation pattern"));

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Spoken replacement for laughter cues
const LAUGHTER_TOKEN: &str = " haha ";

/// Spoken replacement for the ellipsis character
const ELLIPSIS_PAUSE: &str = ", ";

/// Normalizer bound to the configured speaker tags
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    speaker_tags: Vec<String>,
    collapse_whitespace: bool,
}

impl TextNormalizer {
    /// Create a normalizer that strips the given speaker tags.
    ///
    /// Blank tags are ignored. Whitespace collapsing is enabled.
    pub fn new<S: AsRef<str>>(speaker_tags: &[S]) -> Self {
        let speaker_tags = speaker_tags
            .iter()
            .map(|tag| tag.as_ref().trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();

        Self {
            speaker_tags,
            collapse_whitespace: true,
        }
    }

    /// Enable or disable whitespace collapsing.
    ///
    /// With collapsing disabled, spacing from the source line and from the
    /// substitutions is kept as-is (only the ends are trimmed).
    pub fn with_collapse_whitespace(mut self, collapse: bool) -> Self {
        self.collapse_whitespace = collapse;
        self
    }

    /// Normalize one raw script line. An empty result means "drop this turn".
    ///
    /// Collapsing can turn a near-miss like `Host  A:` into a configured tag,
    /// so passes repeat until the text stops changing. Every pass that changes
    /// the text makes it shorter in bytes.
    pub fn normalize(&self, line: &str) -> String {
        let mut text = self.normalize_pass(line);
        loop {
            let next = self.normalize_pass(&text);
            if next == text {
                return text;
            }
            text = next;
        }
    }

    fn normalize_pass(&self, line: &str) -> String {
        let line = self.strip_speaker_tags(line.trim());
        if line.is_empty() {
            return String::new();
        }

        let text = LAUGHTER_CUE.replace_all(line, LAUGHTER_TOKEN);
        let text = text.replace('…', ELLIPSIS_PAUSE);
        let text = REPEATED_PUNCTUATION.replace_all(&text, "!");

        let text = if self.collapse_whitespace {
            WHITESPACE_RUN.replace_all(&text, " ").into_owned()
        } else {
            text.into_owned()
        };

        text.trim().to_string()
    }

    /// Remove every leading `<tag>:` prefix, together with the whitespace after it.
    fn strip_speaker_tags<'a>(&self, mut line: &'a str) -> &'a str {
        'strip: loop {
            for tag in &self.speaker_tags {
                if let Some(rest) = line.strip_prefix(tag.as_str()) {
                    if let Some(rest) = rest.strip_prefix(':') {
                        line = rest.trim_start();
                        continue 'strip;
                    }
                }
            }
            return line;
        }
    }

    /// Configured speaker tags
    pub fn speaker_tags(&self) -> &[String] {
        &self.speaker_tags
    }
}

/// Normalize a line with a throwaway normalizer for the given speaker tags.
pub fn normalize<S: AsRef<str>>(line: &str, speaker_tags: &[S]) -> String {
    TextNormalizer::new(speaker_tags).normalize(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAGS: [&str; 2] = ["A", "B"];

    #[test]
    fn test_remove_speaker_tags() {
        assert_eq!(normalize("A: Hello world", &TAGS), "Hello world");
        assert_eq!(normalize("B: Test message", &TAGS), "Test message");
        assert_eq!(normalize("A:   Multiple spaces", &TAGS), "Multiple spaces");
        assert_eq!(normalize("  A:  Test  ", &TAGS), "Test");
    }

    #[test]
    fn test_unconfigured_tag_left_in_place() {
        assert_eq!(normalize("C: not a host", &TAGS), "C: not a host");
        assert_eq!(normalize("Note: aside", &TAGS), "Note: aside");
        assert_eq!(normalize("Just a regular line", &TAGS), "Just a regular line");
    }

    #[test]
    fn test_custom_speaker_names() {
        let tags = ["Priya", "Rahul"];
        assert_eq!(normalize("Priya: Arre yaar", &tags), "Arre yaar");
        assert_eq!(normalize("Rahul:haan", &tags), "haan");
        assert_eq!(normalize("A: stays", &tags), "A: stays");
    }

    #[test]
    fn test_laughter_cues() {
        let result = normalize("A: funny (laughs)", &TAGS);
        assert!(result.contains("haha"));
        assert!(!result.contains("A:"));
        assert!(!result.contains("(laughs)"));

        assert!(normalize("B: Interesting (chuckles)", &TAGS).contains("haha"));
        assert!(normalize("A: Funny (LAUGHS)", &TAGS).contains("haha"));
        assert!(normalize("B: Hilarious (Chuckles)", &TAGS).contains("haha"));
        assert!(normalize("A: ok (laugh)", &TAGS).contains("haha"));

        let twice = normalize("A: (laughs) test (chuckles) more", &TAGS);
        assert_eq!(twice, "haha test haha more");
        assert_eq!(twice.matches("haha").count(), 2);
    }

    #[test]
    fn test_punctuation_collapse() {
        assert_eq!(normalize("A: Wow!!!", &TAGS), "Wow!");
        assert_eq!(normalize("B: Really??", &TAGS), "Really!");
        assert_eq!(normalize("B: What?!", &TAGS), "What!");
        assert_eq!(normalize("A: Fine!", &TAGS), "Fine!");
    }

    #[test]
    fn test_ellipsis_keeps_source_spacing() {
        let normalizer = TextNormalizer::new(&TAGS).with_collapse_whitespace(false);
        assert_eq!(normalizer.normalize("A: Wait… what?"), "Wait,  what?");
    }

    #[test]
    fn test_ellipsis_with_collapse() {
        assert_eq!(normalize("A: Wait… what?", &TAGS), "Wait, what?");
        assert_eq!(normalize("A: Hmm…", &TAGS), "Hmm,");
    }

    #[test]
    fn test_complex_line() {
        let result = normalize("A: Arre yaar (laughs)… that's amazing!!!", &TAGS);
        assert_eq!(result, "Arre yaar haha , that's amazing!");
        assert!(!result.contains("!!!"));
        assert!(!result.contains('…'));
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(normalize("", &TAGS), "");
        assert_eq!(normalize("   ", &TAGS), "");
        assert_eq!(normalize("A:", &TAGS), "");
        assert_eq!(normalize("B:    ", &TAGS), "");
    }

    #[test]
    fn test_idempotence() {
        let corpus = [
            "A: Hello world",
            "A: B: nested tags",
            "A:B:A: stacked",
            "A: Wait… what?",
            "…A: leading ellipsis",
            "(laughs)A: cue first",
            "A: ((laughs)) doubled parens",
            "A: (laugh(laughs)s) tangled",
            "B: !?!? mixed ?? runs !!",
            "A: tabs\tand\nnewlines   everywhere",
            "C: unknown speaker… (CHUCKLES)!!",
            "   ",
            "A:",
            "plain text",
            "A: ends with ellipsis…",
            "B: \u{00a0}non-breaking\u{00a0}\u{00a0}space",
        ];

        for collapse in [true, false] {
            let normalizer = TextNormalizer::new(&TAGS).with_collapse_whitespace(collapse);
            for input in corpus {
                let once = normalizer.normalize(input);
                let twice = normalizer.normalize(&once);
                assert_eq!(once, twice, "not idempotent for {input:?} (collapse={collapse})");
            }
        }
    }

    #[test]
    fn test_idempotence_when_collapsing_forms_a_tag() {
        let cases: [(&[&str], &str, &str); 4] = [
            (&["Host A", "Host B"], "Host  A: hello there", "hello there"),
            (&["Host A", "Host B"], "Host\tB:  hi", "hi"),
            (&["Wow!", "B"], "Wow!!: hello", "hello"),
            (&["Huh!", "B"], "Huh?!?: okay", "okay"),
        ];

        for (tags, input, expected) in cases {
            let normalizer = TextNormalizer::new(tags);
            let once = normalizer.normalize(input);
            assert_eq!(once, expected, "tags {tags:?}");
            assert_eq!(normalizer.normalize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_near_miss_kept_without_collapse() {
        let normalizer = TextNormalizer::new(&["Host A", "Host B"]).with_collapse_whitespace(false);
        let once = normalizer.normalize("Host  A: hello");
        assert_eq!(once, "Host  A: hello");
        assert_eq!(normalizer.normalize(&once), once);
    }
}
