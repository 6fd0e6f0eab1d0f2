//! Wake word matching.
//!
//! Recognition backends differ in how they punctuate and space their output
//! ("你好，" vs "你好" vs "你 好"), so both the configured phrases and the
//! recognized text are reduced to their letters and digits before comparing.

use std::collections::HashSet;
use tracing::debug;

/// Strips punctuation, symbols and whitespace and lowercases what remains.
///
/// CJK ideographs count as alphabetic and are kept as-is.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// The configured wake phrases, stored normalized. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct WakeWordSet {
    words: HashSet<String>,
}

impl WakeWordSet {
    /// Builds the set from configured phrases. Phrases that normalize to an
    /// empty string are dropped, otherwise a bare "," would match everything.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: HashSet<String> = phrases
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .filter(|w| !w.is_empty())
            .collect();
        debug!(wake_words = ?words, "wake words loaded");
        Self { words }
    }

    /// Exact match of the normalized text against any wake phrase.
    pub fn matches(&self, text: &str) -> bool {
        let normalized = normalize(text);
        !normalized.is_empty() && self.words.contains(&normalized)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_ascii_and_cjk_punctuation() {
        assert_eq!(normalize("你好,"), "你好");
        assert_eq!(normalize("你好，小智！"), "你好小智");
        assert_eq!(normalize(" 你 好 。"), "你好");
        assert_eq!(normalize("Hey, Jarvis!"), "heyjarvis");
        assert_eq!(normalize("……"), "");
    }

    #[test]
    fn match_ignores_punctuation_and_spacing() {
        let set = WakeWordSet::new(["你好", "你好小智", "Hey Jarvis"]);

        assert!(set.matches("你好,"));
        assert!(set.matches("你好 小智。"));
        assert!(set.matches("hey jarvis"));
        assert!(set.matches("HEY-JARVIS?"));
    }

    #[test]
    fn match_is_exact_after_normalization() {
        let set = WakeWordSet::new(["你好"]);

        assert!(!set.matches("你好啊"));
        assert!(!set.matches("帮我查天气"));
        assert!(!set.matches(""));
    }

    #[test]
    fn configured_phrases_are_normalized_too() {
        let set = WakeWordSet::new(["你好，小智。", "  ", "!!"]);

        assert_eq!(set.len(), 1);
        assert!(set.matches("你好小智"));
        assert!(!set.matches("!!"));
    }
}
