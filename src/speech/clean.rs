//! Removal of glyphs the speech engine cannot pronounce.

use regex::Regex;

use crate::speech::error::SpeechResult;

/// Emoji and pictograph ranges stripped before synthesis.
const EMOJI_PATTERN: &str = concat!(
    "[",
    "\u{01F600}-\u{01F64F}",
    "\u{01F300}-\u{01F5FF}",
    "\u{01F680}-\u{01F6FF}",
    "\u{01F1E0}-\u{01F1FF}",
    "\u{002700}-\u{0027BF}",
    "\u{01F900}-\u{01F9FF}",
    "\u{002600}-\u{0026FF}",
    "]+",
);

/// Compiled emoji filter.
#[derive(Clone, Debug)]
pub struct EmojiFilter {
    pattern: Regex,
}

impl EmojiFilter {
    /// Compile the filter.
    ///
    /// # Errors
    /// Returns an error if the pattern fails to compile.
    pub fn new() -> SpeechResult<Self> {
        Ok(Self {
            pattern: Regex::new(EMOJI_PATTERN)?,
        })
    }

    /// Strip emoji from `text`.
    #[must_use]
    pub fn clean(&self, text: &str) -> String {
        self.pattern.replace_all(text, "").into_owned()
    }
}
