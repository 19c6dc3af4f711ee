//! Reply policies applied to every accepted narrative reply.
//!
//! Three independent checks, all configured through [`SanitizerConfig`]:
//!
//! 1. Partial comprehension: a character who does not know the local
//!    dialect only half-understands replies that contain a dialect cue.
//! 2. Review: banned proper nouns and text that looks like the wrong
//!    language are reported so the caller can ask for one rewrite.
//! 3. Quick-reply options are pulled out of bullet lines.
//!
//! Nothing here talks to the completion service; the regeneration request
//! itself is issued by the orchestrator.

use crate::config::SanitizerConfig;
use crate::types::Character;

/// Accented vowels whose presence marks text as (probably) Italian.
const ACCENTED_VOWELS: &[char] = &[
    'à', 'è', 'é', 'ì', 'í', 'ò', 'ó', 'ù', 'ú', 'À', 'È', 'É', 'Ì', 'Í', 'Ò', 'Ó', 'Ù', 'Ú',
];

/// Outcome of [`Sanitizer::review`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Review {
    /// Banned names found, in block-list order.
    pub banned: Vec<String>,
    /// The text looks like it is not written in the reply language.
    pub wrong_language: bool,
}

impl Review {
    /// Whether the reply should be rewritten once.
    #[must_use]
    pub fn needs_regeneration(&self) -> bool {
        !self.banned.is_empty() || self.wrong_language
    }

    /// Short description for logs and trace notes.
    #[must_use]
    pub fn reason(&self) -> String {
        match (self.banned.is_empty(), self.wrong_language) {
            (true, false) => "clean".to_string(),
            (true, true) => "wrong_language".to_string(),
            (false, false) => format!("banned: {}", self.banned.join(", ")),
            (false, true) => format!("banned: {}; wrong_language", self.banned.join(", ")),
        }
    }
}

/// Stateless policy checker.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    config: SanitizerConfig,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(SanitizerConfig::default())
    }
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
}

impl Sanitizer {
    /// Create a sanitizer with the given rules.
    #[must_use]
    pub fn new(config: SanitizerConfig) -> Self {
        Self { config }
    }

    /// The active rules.
    #[must_use]
    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    /// Whether `text` contains any dialect cue as a whole word.
    #[must_use]
    pub fn has_dialect_cue(&self, text: &str) -> bool {
        tokens(text).any(|t| {
            self.config
                .dialect_cues
                .iter()
                .any(|cue| t.eq_ignore_ascii_case(cue))
        })
    }

    /// Degrade `text` for a listener who does not know the dialect.
    ///
    /// Returns the text unchanged when the character knows the dialect or
    /// when no cue is present; otherwise the partial marker followed by the
    /// text with its ASCII vowels removed.
    #[must_use]
    pub fn apply_comprehension(&self, text: &str, character: &Character) -> String {
        if character.knows_language(&self.config.dialect_code) || !self.has_dialect_cue(text) {
            return text.to_string();
        }
        let degraded: String = text
            .chars()
            .filter(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'A' | 'E' | 'I' | 'O' | 'U'))
            .collect();
        format!("{}{degraded}", self.config.partial_marker)
    }

    /// Block-listed names present in `text` (whole word, case-insensitive).
    #[must_use]
    pub fn banned_names(&self, text: &str) -> Vec<String> {
        let words: Vec<String> = tokens(text).map(str::to_lowercase).collect();
        self.config
            .banned_names
            .iter()
            .filter(|name| {
                let name = name.to_lowercase();
                words.iter().any(|w| *w == name)
            })
            .cloned()
            .collect()
    }

    /// A foreign function word appears and no accented vowel does.
    #[must_use]
    pub fn looks_like_wrong_language(&self, text: &str) -> bool {
        if text.contains(ACCENTED_VOWELS) {
            return false;
        }
        tokens(text).any(|t| {
            self.config
                .foreign_function_words
                .iter()
                .any(|w| t.eq_ignore_ascii_case(w))
        })
    }

    /// Run both regeneration triggers.
    #[must_use]
    pub fn review(&self, text: &str) -> Review {
        Review {
            banned: self.banned_names(text),
            wrong_language: self.looks_like_wrong_language(text),
        }
    }

    /// Quick-reply choices: trimmed lines starting with `"- "`, bullet
    /// removed, empty entries skipped, at most `max_options`.
    #[must_use]
    pub fn extract_options(&self, text: &str) -> Vec<String> {
        text.lines()
            .filter_map(|line| line.trim().strip_prefix("- "))
            .map(str::trim)
            .filter(|option| !option.is_empty())
            .take(self.config.max_options)
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CharacterId, LanguageSkill};

    fn character(codes: &[&str]) -> Character {
        Character {
            id: CharacterId::from("c1"),
            name: "Jake".to_string(),
            languages: codes.iter().map(|c| LanguageSkill::new(*c, 3)).collect(),
        }
    }

    #[test]
    fn dialect_reply_degraded_for_outsider() {
        let s = Sanitizer::default();
        let out = s.apply_comprehension("Parla napoletano", &character(&["it"]));
        assert_eq!(out, "Capisci a metà: Prl nptln");
    }

    #[test]
    fn dialect_reply_untouched_for_speaker() {
        let s = Sanitizer::default();
        let text = "Parla napoletano";
        assert_eq!(s.apply_comprehension(text, &character(&["it", "nap"])), text);
    }

    #[test]
    fn no_cue_no_degradation() {
        let s = Sanitizer::default();
        let text = "Una voce risponde da lontano.";
        assert_eq!(s.apply_comprehension(text, &character(&["it"])), text);
    }

    #[test]
    fn nap_cue_must_be_a_whole_word() {
        let s = Sanitizer::default();
        assert!(s.has_dialect_cue("Dice qualcosa in NAP."));
        assert!(!s.has_dialect_cue("Uno snap di dita."));
    }

    #[test]
    fn banned_names_are_whole_word_and_case_insensitive() {
        let s = Sanitizer::default();
        assert_eq!(s.banned_names("Incontri RICK al ponte."), vec!["Rick".to_string()]);
        assert!(s.banned_names("Un carolingio, un trick.").is_empty());
    }

    #[test]
    fn english_without_accents_is_wrong_language() {
        let s = Sanitizer::default();
        assert!(s.looks_like_wrong_language("You see the gate and the guards."));
        assert!(!s.looks_like_wrong_language("Vedi il cancello e le guardie."));
    }

    #[test]
    fn accents_override_function_words() {
        let s = Sanitizer::default();
        assert!(!s.looks_like_wrong_language("Il bar \"The Rose\" è chiuso."));
    }

    #[test]
    fn clean_reply_needs_no_regeneration() {
        let s = Sanitizer::default();
        let review = s.review("La sentinella ti osserva. Cosa fai?");
        assert!(!review.needs_regeneration());
        assert_eq!(review.reason(), "clean");
    }

    #[test]
    fn flagged_reply_reports_reason() {
        let s = Sanitizer::default();
        let review = s.review("Negan is here.");
        assert!(review.needs_regeneration());
        assert_eq!(review.reason(), "banned: Negan; wrong_language");
    }

    #[test]
    fn options_from_bullets_capped() {
        let s = Sanitizer::default();
        let text = "Scegli:\n- uno\n  - due\n-tre\n- \n- quattro\n- cinque\n- sei\n- sette\n- otto";
        let options = s.extract_options(text);
        assert_eq!(options, vec!["uno", "due", "quattro", "cinque", "sei", "sette"]);
    }
}
