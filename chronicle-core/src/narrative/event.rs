//! Event records held by the chain.

use super::text::truncate_with_ellipsis;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a stored summary, in characters.
pub const MAX_SUMMARY_LEN: usize = 250;

/// Maximum length of a stored hook, in characters.
pub const MAX_HOOK_LEN: usize = 150;

/// Emotional register of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalTone {
    #[default]
    Neutral,
    Tense,
    Tragic,
    Hopeful,
    Triumphant,
    Mysterious,
}

lazy_static! {
    /// Keyword sets per tone, in tie-break order.
    static ref TONE_KEYWORDS: Vec<(EmotionalTone, Regex)> = vec![
        (
            EmotionalTone::Tragic,
            Regex::new(r"\b(?:died|death|dead|slain|killed|murdered|assassinated|executed|mourned|mourning|grief|funeral|tragedy|tragic|sorrow|wept|perished|loss)\b").unwrap(),
        ),
        (
            EmotionalTone::Tense,
            Regex::new(r"\b(?:war|threat|threatened|conspiracy|betrayal|betrayed|siege|danger|fear|feared|tension|rebellion|plot|plotted|unrest|uneasy|enemies)\b").unwrap(),
        ),
        (
            EmotionalTone::Triumphant,
            Regex::new(r"\b(?:victory|victorious|triumph|triumphant|won|conquered|celebrated|celebration|glory|crowned|defeated)\b").unwrap(),
        ),
        (
            EmotionalTone::Hopeful,
            Regex::new(r"\b(?:hope|hopeful|peace|alliance|rebuild|rebuilt|healing|promise|renewal|reunited|prosper|prosperity)\b").unwrap(),
        ),
        (
            EmotionalTone::Mysterious,
            Regex::new(r"\b(?:mystery|mysterious|unknown|strange|secret|secrets|hidden|omen|omens|whisper|whispers|vanished|prophecy)\b").unwrap(),
        ),
    ];
}

impl EmotionalTone {
    /// Get the display name for this tone.
    pub fn name(&self) -> &'static str {
        match self {
            EmotionalTone::Neutral => "neutral",
            EmotionalTone::Tense => "tense",
            EmotionalTone::Tragic => "tragic",
            EmotionalTone::Hopeful => "hopeful",
            EmotionalTone::Triumphant => "triumphant",
            EmotionalTone::Mysterious => "mysterious",
        }
    }

    /// Classify prose by counting tone keywords.
    ///
    /// The tone with the most hits wins; ties go to the earlier tone in
    /// tragic, tense, triumphant, hopeful, mysterious order. No hits at all is
    /// neutral.
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        let mut best = (EmotionalTone::Neutral, 0);
        for (tone, pattern) in TONE_KEYWORDS.iter() {
            let hits = pattern.find_iter(&lower).count();
            if hits > best.1 {
                best = (*tone, hits);
            }
        }
        best.0
    }
}

impl fmt::Display for EmotionalTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One generated event and what was derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_number: u32,
    content: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub consequences: Vec<String>,
    #[serde(default)]
    pub affected_characters: Vec<String>,
    #[serde(default)]
    pub emotional_tone: EmotionalTone,
    #[serde(default)]
    pub hook: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_number: u32, content: impl Into<String>) -> Self {
        Self {
            event_number,
            content: content.into(),
            summary: String::new(),
            consequences: Vec::new(),
            affected_characters: Vec::new(),
            emotional_tone: EmotionalTone::Neutral,
            hook: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// The generated text. Never changes after creation.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_summary(&mut self, summary: &str) {
        self.summary = truncate_with_ellipsis(summary.trim(), MAX_SUMMARY_LEN);
    }

    pub fn set_hook(&mut self, hook: &str) {
        self.hook = truncate_with_ellipsis(hook.trim(), MAX_HOOK_LEN);
    }

    pub fn add_consequence(&mut self, consequence: &str) {
        let consequence = consequence.trim();
        if !consequence.is_empty() && !self.consequences.iter().any(|c| c == consequence) {
            self.consequences.push(consequence.to_string());
        }
    }

    /// Record a character as involved. Keeps insertion order, ignores repeats.
    pub fn add_affected_character(&mut self, name: &str) {
        if !self.affected_characters.iter().any(|n| n == name) {
            self.affected_characters.push(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affected_characters_are_a_set() {
        let mut event = Event::new(1, "text");
        event.add_affected_character("Queen Lyra");
        event.add_affected_character("King Alaric");
        event.add_affected_character("Queen Lyra");
        assert_eq!(event.affected_characters, vec!["Queen Lyra", "King Alaric"]);
    }

    #[test]
    fn test_caps() {
        let mut event = Event::new(1, "text");
        event.set_summary(&"a".repeat(400));
        assert_eq!(event.summary.chars().count(), MAX_SUMMARY_LEN);
        assert!(event.summary.ends_with("..."));

        event.set_hook(&"b".repeat(151));
        assert_eq!(event.hook.chars().count(), MAX_HOOK_LEN);
    }

    #[test]
    fn test_tone_classification() {
        assert_eq!(
            EmotionalTone::classify("King Alaric was slain and the realm mourned."),
            EmotionalTone::Tragic
        );
        assert_eq!(
            EmotionalTone::classify("The siege tightened and fear spread through the war camp."),
            EmotionalTone::Tense
        );
        assert_eq!(
            EmotionalTone::classify("Strange omens appeared over the hidden vale."),
            EmotionalTone::Mysterious
        );
        assert_eq!(EmotionalTone::classify("They ate bread."), EmotionalTone::Neutral);
    }
}
