//! Speech decoder interface
//!
//! The acoustic decoder is an external component. The engine hands it a
//! grammar, streams raw audio into it and polls its best hypothesis.

use crate::Result;

/// The decoder's current best transcription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hypothesis {
    pub text: String,
    /// Decoder score; smaller magnitude is more confident
    pub score: i32,
}

impl Hypothesis {
    /// Create a hypothesis
    #[must_use]
    pub fn new(text: impl Into<String>, score: i32) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

/// A grammar-driven speech decoder
pub trait Decoder: Send {
    /// Replace the active grammar
    ///
    /// # Errors
    ///
    /// Returns error if the decoder rejects the grammar
    fn set_grammar(&mut self, grammar: &str) -> Result<()>;

    /// Begin a new utterance
    ///
    /// # Errors
    ///
    /// Returns error if the decoder cannot start
    fn start_utterance(&mut self) -> Result<()>;

    /// Finish the current utterance
    ///
    /// # Errors
    ///
    /// Returns error if the decoder fails to finalize
    fn end_utterance(&mut self) -> Result<()>;

    /// Feed 16-bit mono samples
    ///
    /// # Errors
    ///
    /// Returns error if the decoder fails on the audio
    fn feed(&mut self, samples: &[i16]) -> Result<()>;

    /// Best hypothesis for the audio fed since the utterance started
    fn hypothesis(&self) -> Option<Hypothesis>;

    /// Whether `word` is in the decoder's dictionary
    fn contains_word(&self, word: &str) -> bool;
}
