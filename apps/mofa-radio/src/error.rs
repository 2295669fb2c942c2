//! Error taxonomy shared by every stage of the radio pipeline
//!
//! Upstream problems (missing article, blank script) carry the offending
//! identifier, per-turn problems carry the turn index and speaker, and the
//! terminal export step carries the destination path.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate
pub type CastResult<T> = Result<T, CastError>;

/// Errors that can occur while turning a topic into a radio segment
#[derive(Debug, Error)]
pub enum CastError {
    /// No reference article exists for the requested title
    #[error("reference article not found: {title}")]
    NotFound { title: String },

    /// The reference article is below the minimum usable length
    #[error("reference article '{title}' too short: {length} characters (minimum {minimum})")]
    TooShort {
        title: String,
        length: usize,
        minimum: usize,
    },

    /// The script writer returned blank output
    #[error("generated script is empty")]
    EmptyGeneration,

    /// The speech provider returned a zero-length payload
    #[error("speech provider returned no audio for voice {voice_id}")]
    EmptyAudio { voice_id: String },

    /// A turn produced no audio data
    #[error("no audio data received for turn {index} ({speaker})")]
    SynthesisEmpty { index: usize, speaker: String },

    /// A turn failed for any other reason
    #[error("turn {index} ({speaker}) failed: {source}")]
    TurnFailed {
        index: usize,
        speaker: String,
        #[source]
        source: Box<CastError>,
    },

    /// There are no turns or clips to work on
    #[error("nothing to {0}: input is empty")]
    EmptyInput(&'static str),

    /// Invalid or incomplete configuration, detected at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Writing the final track failed
    #[error("failed to export {}: {reason}", .path.display())]
    Export { path: PathBuf, reason: String },

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A provider answered with a non-success status
    #[error("{provider} returned HTTP {status}: {body}")]
    Provider {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// An external call exceeded its time budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Decoding or transforming audio failed
    #[error("audio codec error: {0}")]
    Codec(String),

    /// A background task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(String),
}

impl CastError {
    /// Index of the turn this error is attributed to, if any
    pub fn turn_index(&self) -> Option<usize> {
        match self {
            CastError::SynthesisEmpty { index, .. } | CastError::TurnFailed { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }

    /// Wrap a collaborator failure with the turn it happened on.
    ///
    /// Empty payloads are reported as [`CastError::SynthesisEmpty`] whether the
    /// provider flagged them itself or the caller noticed.
    pub fn for_turn(self, index: usize, speaker: &str) -> Self {
        match self {
            CastError::EmptyAudio { .. } => CastError::SynthesisEmpty {
                index,
                speaker: speaker.to_string(),
            },
            err @ (CastError::SynthesisEmpty { .. } | CastError::TurnFailed { .. }) => err,
            other => CastError::TurnFailed {
                index,
                speaker: speaker.to_string(),
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_audio_becomes_synthesis_empty() {
        let err = CastError::EmptyAudio {
            voice_id: "voice".to_string(),
        }
        .for_turn(2, "B");

        assert!(matches!(err, CastError::SynthesisEmpty { index: 2, .. }));
        assert_eq!(err.turn_index(), Some(2));
    }

    #[test]
    fn test_other_errors_are_wrapped_once() {
        let err = CastError::Timeout(Duration::from_secs(3))
            .for_turn(4, "A")
            .for_turn(9, "B");

        assert_eq!(err.turn_index(), Some(4));
        assert!(err.to_string().contains("turn 4 (A)"));
    }

    #[test]
    fn test_export_message_names_path() {
        let err = CastError::Export {
            path: PathBuf::from("/nope/out.wav"),
            reason: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to export /nope/out.wav: permission denied"
        );
    }
}
