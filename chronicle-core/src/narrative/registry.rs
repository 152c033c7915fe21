//! Character lifecycle registry.
//!
//! The registry is an arena of [`Character`] records keyed by canonical name
//! (see [`normalize`]), plus an index from canonical key to every display
//! spelling seen for that character. Fuzzy resolution and dead-character
//! validation both run against that index.

use super::character::{Character, CharacterRole, CharacterStatus};
use super::detector::{LifecycleChange, LifecycleKind};
use super::names::{is_honorific, name_tokens, normalize};
use super::text::{collapse_whitespace, contains_word};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

lazy_static! {
    /// Capitalized multi-word spans, treated as mentioned entities.
    static ref ENTITY_SPAN: Regex = Regex::new(r"\b[A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)+\b").unwrap();
}

/// Tokens that carry no identity on their own ("the", "of", ...).
const FILLER_TOKENS: &[&str] = &["the", "a", "an", "of", "and", "in", "on", "at", "when", "as"];

/// Result of checking text for references to dead characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageCheck {
    /// True when no deceased character is referenced.
    pub is_valid: bool,
    /// One entry per referenced dead character: `"{name} (died in Event {n})"`.
    pub violations: Vec<String>,
}

/// Diagnostic comparison of mentioned entities against tracked characters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyScore {
    /// Harmonic mean of coverage and precision, in `0.0..=1.0`.
    pub score: f64,
    /// Fraction of tracked characters mentioned in the text.
    pub coverage: f64,
    /// Fraction of mentioned entities that are tracked characters.
    pub precision: f64,
    /// Display names of tracked characters found in the text.
    pub tracked_mentioned: Vec<String>,
    /// Mentioned entities that do not resolve to a tracked character.
    pub untracked_entities: Vec<String>,
}

impl ConsistencyScore {
    fn empty() -> Self {
        Self {
            score: 0.0,
            coverage: 0.0,
            precision: 0.0,
            tracked_mentioned: Vec::new(),
            untracked_entities: Vec::new(),
        }
    }
}

/// Owns every character of one narrative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterRegistry {
    /// Canonical key -> character.
    roster: BTreeMap<String, Character>,
    /// Canonical key -> display spellings seen.
    name_variations: BTreeMap<String, Vec<String>>,
    /// Event currently being processed.
    current_event_num: u32,
}

impl CharacterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current event number.
    pub fn current_event(&self) -> u32 {
        self.current_event_num
    }

    /// Move the event cursor used by kills and revivals.
    pub fn set_current_event(&mut self, event_num: u32) {
        self.current_event_num = event_num;
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    // =========================================================================
    // Roster Management
    // =========================================================================

    /// Add a character, or return the existing one with the same canonical key.
    ///
    /// A new spelling of an existing character is recorded as a variant.
    pub fn add_character(
        &mut self,
        name: &str,
        role: CharacterRole,
        event_num: u32,
    ) -> &Character {
        let display_name = collapse_whitespace(name);
        let key = normalize(&display_name);

        let variants = self.name_variations.entry(key.clone()).or_default();
        if !variants.contains(&display_name) {
            variants.push(display_name.clone());
        }

        self.roster.entry(key).or_insert_with(|| {
            debug!(name = %display_name, %role, event = event_num, "registered character");
            Character::new(display_name.clone(), role, event_num)
        })
    }

    /// Exact lookup by canonical key. No fuzzy matching.
    pub fn get_character(&self, name: &str) -> Option<&Character> {
        self.roster.get(&normalize(name))
    }

    fn get_character_mut(&mut self, name: &str) -> Option<&mut Character> {
        self.roster.get_mut(&normalize(name))
    }

    /// Check whether a tracked character is alive.
    pub fn is_character_alive(&self, name: &str) -> bool {
        self.get_character(name).is_some_and(Character::is_alive)
    }

    /// All characters, ordered by first appearance then name.
    pub fn characters(&self) -> Vec<&Character> {
        let mut characters: Vec<_> = self.roster.values().collect();
        characters.sort_by(|a, b| {
            a.first_appearance
                .cmp(&b.first_appearance)
                .then_with(|| a.name.cmp(&b.name))
        });
        characters
    }

    /// Characters currently alive.
    pub fn get_active_characters(&self) -> Vec<&Character> {
        self.characters()
            .into_iter()
            .filter(|c| c.status == CharacterStatus::Alive)
            .collect()
    }

    /// Characters currently dead.
    pub fn get_deceased_characters(&self) -> Vec<&Character> {
        self.characters()
            .into_iter()
            .filter(|c| c.status == CharacterStatus::Dead)
            .collect()
    }

    /// Display spellings recorded for a character.
    pub fn name_variants(&self, name: &str) -> &[String] {
        self.name_variations
            .get(&normalize(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    // =========================================================================
    // Lifecycle Transitions
    // =========================================================================

    /// Mark a character dead at the current event.
    ///
    /// Returns false when the character is unknown or already dead; in that
    /// case nothing is changed.
    pub fn kill_character(&mut self, name: &str, cause: &str) -> bool {
        let event = self.current_event_num;
        self.kill_at(name, cause, event)
    }

    /// Revive a dead character at the current event.
    ///
    /// Returns false when the character is unknown or not dead.
    pub fn revive_character(&mut self, name: &str, reason: &str) -> bool {
        let event = self.current_event_num;
        self.revive_at(name, reason, event)
    }

    fn kill_at(&mut self, name: &str, cause: &str, event: u32) -> bool {
        match self.get_character_mut(name) {
            Some(character) if character.is_alive() => {
                character.kill(event, cause);
                info!(name = %character.name, event, "character died");
                true
            }
            Some(character) => {
                debug!(name = %character.name, status = %character.status, "kill ignored");
                false
            }
            None => false,
        }
    }

    fn revive_at(&mut self, name: &str, reason: &str, event: u32) -> bool {
        match self.get_character_mut(name) {
            Some(character) if character.is_dead() => {
                character.revive(event, reason);
                info!(name = %character.name, event, "character revived");
                true
            }
            Some(character) => {
                debug!(name = %character.name, status = %character.status, "revival ignored");
                false
            }
            None => false,
        }
    }

    /// Apply detected lifecycle changes, returning the ones that took effect.
    pub fn apply_changes(&mut self, changes: &[LifecycleChange]) -> Vec<LifecycleChange> {
        let mut applied = Vec::new();
        for change in changes {
            let accepted = match change.kind {
                LifecycleKind::Death => {
                    self.kill_at(&change.character, &change.detail, change.event_number)
                }
                LifecycleKind::Revival => {
                    self.revive_at(&change.character, &change.detail, change.event_number)
                }
            };
            if accepted {
                applied.push(change.clone());
            }
        }
        applied
    }

    /// Update the last mentioned event of a character.
    pub fn record_mention(&mut self, name: &str, event_num: u32) -> bool {
        match self.get_character_mut(name) {
            Some(character) => {
                character.touch(event_num);
                true
            }
            None => false,
        }
    }

    /// Append a notable action to a character's log.
    pub fn record_action(&mut self, name: &str, action: &str) -> bool {
        let event = self.current_event_num;
        match self.get_character_mut(name) {
            Some(character) => {
                character.add_action(action, event);
                true
            }
            None => false,
        }
    }

    /// Record how one character relates to another.
    pub fn add_relationship(&mut self, name: &str, other: &str, relation: &str) -> bool {
        match self.get_character_mut(name) {
            Some(character) => {
                character
                    .relationships
                    .insert(other.to_string(), relation.to_string());
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Name Resolution
    // =========================================================================

    /// Exact lookup, then fuzzy lookup.
    pub fn resolve(&self, name: &str) -> Option<&Character> {
        self.get_character(name).or_else(|| self.find_fuzzy(name))
    }

    /// Resolve a partial or variant name against the variant index.
    ///
    /// Tries word-boundary containment in either direction first, then shared
    /// name tokens (honorifics ignored). A query that matches more than one
    /// character resolves to nothing.
    pub fn find_fuzzy(&self, name: &str) -> Option<&Character> {
        let query = collapse_whitespace(&name.to_lowercase());
        let query_tokens = identity_tokens(name);
        if query.is_empty() || query_tokens.is_empty() {
            return None;
        }

        let contained: BTreeSet<&String> = self
            .name_variations
            .iter()
            .filter(|(key, variants)| {
                let key_matches = !identity_tokens(key).is_empty() && contains_word(&query, key);
                key_matches
                    || variants.iter().any(|variant| {
                        let variant = variant.to_lowercase();
                        contains_word(&variant, &query) || contains_word(&query, &variant)
                    })
            })
            .map(|(key, _)| key)
            .collect();

        if let Some(character) = self.unique_match(name, &contained) {
            return Some(character);
        }
        if !contained.is_empty() {
            return None;
        }

        let overlapping: BTreeSet<&String> = self
            .roster
            .iter()
            .filter(|(key, _)| {
                identity_tokens(key)
                    .iter()
                    .any(|token| query_tokens.contains(token))
            })
            .map(|(key, _)| key)
            .collect();

        self.unique_match(name, &overlapping)
    }

    fn unique_match(&self, query: &str, keys: &BTreeSet<&String>) -> Option<&Character> {
        match keys.len() {
            1 => keys.iter().next().and_then(|key| self.roster.get(*key)),
            0 => None,
            _ => {
                debug!(query, candidates = ?keys, "ambiguous fuzzy match skipped");
                None
            }
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check that no dead character's recorded name appears in `text`.
    pub fn validate_character_usage(&self, text: &str) -> UsageCheck {
        self.usage_check(text, None)
    }

    /// Like [`validate_character_usage`](Self::validate_character_usage), but
    /// ignores characters who died in `event_num` itself, since the text that
    /// kills a character necessarily names them.
    pub fn validate_event_text(&self, text: &str, event_num: u32) -> UsageCheck {
        self.usage_check(text, Some(event_num))
    }

    fn usage_check(&self, text: &str, dying_in: Option<u32>) -> UsageCheck {
        let mut violations = Vec::new();

        for character in self.get_deceased_characters() {
            if dying_in.is_some() && character.death_event == dying_in {
                continue;
            }
            let fallback = [character.name.clone()];
            let variants = self
                .name_variations
                .get(&normalize(&character.name))
                .map(Vec::as_slice)
                .unwrap_or(&fallback);

            if variants.iter().any(|v| !v.is_empty() && text.contains(v.as_str())) {
                let died_in = character
                    .death_event
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "?".to_string());
                violations.push(format!("{} (died in Event {died_in})", character.name));
            }
        }

        UsageCheck {
            is_valid: violations.is_empty(),
            violations,
        }
    }

    /// Compare capitalized entities in `text` against tracked characters.
    ///
    /// Diagnostic only. Returns a zero score when nothing is tracked.
    pub fn calculate_entity_consistency(&self, text: &str) -> ConsistencyScore {
        if self.roster.is_empty() {
            return ConsistencyScore::empty();
        }

        let text_lower = text.to_lowercase();
        let tracked_mentioned: Vec<String> = self
            .characters()
            .into_iter()
            .filter(|character| {
                let key = normalize(&character.name);
                let by_key = !identity_tokens(&key).is_empty() && contains_word(&text_lower, &key);
                by_key
                    || self.name_variants(&character.name).iter().any(|variant| {
                        contains_word(&text_lower, &variant.to_lowercase())
                    })
            })
            .map(|character| character.name.clone())
            .collect();

        let mentioned: BTreeSet<String> = ENTITY_SPAN
            .find_iter(text)
            .map(|m| strip_leading_filler(m.as_str()))
            .filter(|span| !span.is_empty())
            .collect();

        let mut tracked_entities = 0usize;
        let mut untracked_entities = Vec::new();
        for entity in &mentioned {
            if self.resolve(entity).is_some() {
                tracked_entities += 1;
            } else {
                untracked_entities.push(entity.clone());
            }
        }

        let coverage = tracked_mentioned.len() as f64 / self.roster.len() as f64;
        let precision = if mentioned.is_empty() {
            if tracked_mentioned.is_empty() {
                0.0
            } else {
                1.0
            }
        } else {
            tracked_entities as f64 / mentioned.len() as f64
        };
        let score = if coverage + precision == 0.0 {
            0.0
        } else {
            2.0 * coverage * precision / (coverage + precision)
        };

        ConsistencyScore {
            score,
            coverage,
            precision,
            tracked_mentioned,
            untracked_entities,
        }
    }

    /// Verify invariants of a deserialized registry.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (key, character) in &self.roster {
            if key.is_empty() {
                return Err(format!("character '{}' has an empty key", character.name));
            }
            if normalize(&character.name) != *key {
                return Err(format!(
                    "character '{}' is stored under key '{key}'",
                    character.name
                ));
            }
            if character.is_dead() && character.death_event.is_none() {
                return Err(format!(
                    "character '{}' is dead without a death event",
                    character.name
                ));
            }
        }
        if let Some(orphan) = self
            .name_variations
            .keys()
            .find(|key| !self.roster.contains_key(*key))
        {
            return Err(format!("name variants recorded for unknown key '{orphan}'"));
        }
        Ok(())
    }

    // =========================================================================
    // Context Building
    // =========================================================================

    /// Plain-text roster for prompt assembly. Empty when nothing is tracked.
    pub fn roster_summary(&self) -> String {
        let active = self.get_active_characters();
        let deceased = self.get_deceased_characters();

        if active.is_empty() && deceased.is_empty() {
            return String::new();
        }

        let mut summary = String::from("CHARACTER ROSTER:\n\n");

        if active.is_empty() {
            summary.push_str("ACTIVE CHARACTERS: None yet\n");
        } else {
            summary.push_str("ACTIVE CHARACTERS (alive, can appear in story):\n");
            for character in active {
                summary.push_str(&format!("  • {} ({})", character.name, character.role));
                if let Some(action) = character.last_action() {
                    summary.push_str(&format!(" - Last action: {action}"));
                }
                summary.push('\n');
            }
        }

        summary.push('\n');

        if deceased.is_empty() {
            summary.push_str("DECEASED CHARACTERS: None\n");
        } else {
            summary.push_str("DECEASED CHARACTERS (cannot appear unless revived in-universe):\n");
            for character in deceased {
                summary.push_str(&format!(
                    "  • {} - {}\n",
                    character.name,
                    character.last_action().unwrap_or("Deceased")
                ));
            }
        }

        summary
    }
}

/// Normalized name tokens minus honorifics and filler words.
fn identity_tokens(name: &str) -> Vec<String> {
    name_tokens(name)
        .into_iter()
        .filter(|t| !FILLER_TOKENS.contains(&t.as_str()) && !is_honorific(t))
        .collect()
}

fn strip_leading_filler(span: &str) -> String {
    let words: Vec<&str> = span.split_whitespace().collect();
    let first_kept = words
        .iter()
        .position(|w| !FILLER_TOKENS.contains(&w.to_lowercase().as_str()))
        .unwrap_or(words.len());
    words[first_kept..].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[&str]) -> CharacterRegistry {
        let mut registry = CharacterRegistry::new();
        for name in names {
            registry.add_character(name, CharacterRole::Main, 1);
        }
        registry
    }

    #[test]
    fn test_registration_is_logged_with_display_name() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let mut registry = CharacterRegistry::new();
            registry.add_character("  Queen   Lyra ", CharacterRole::Main, 1);
            assert_eq!(registry.get_character("Lyra").unwrap().name, "Queen Lyra");
            assert_eq!(registry.name_variants("Lyra"), ["Queen Lyra"]);
        });
    }

    #[test]
    fn test_add_and_get() {
        let mut registry = CharacterRegistry::new();
        let added = registry.add_character("King Alaric", CharacterRole::Main, 1);
        assert_eq!(added.name, "King Alaric");

        let found = registry.get_character("king alaric").unwrap();
        assert_eq!(found.status, CharacterStatus::Alive);
        assert_eq!(found.first_appearance, 1);
        assert!(registry.get_character("Alaric").is_some());
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut registry = CharacterRegistry::new();
        registry.add_character("King Alaric", CharacterRole::Main, 1);
        let again = registry.add_character("Alaric", CharacterRole::Minor, 5);
        assert_eq!(again.name, "King Alaric");
        assert_eq!(again.role, CharacterRole::Main);
        assert_eq!(again.first_appearance, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.name_variants("Alaric"), ["King Alaric", "Alaric"]);
    }

    #[test]
    fn test_kill_is_idempotent() {
        let mut registry = registry_with(&["King Alaric"]);
        registry.set_current_event(2);
        assert!(registry.kill_character("King Alaric", "a hidden blade"));

        registry.set_current_event(3);
        assert!(!registry.kill_character("King Alaric", "again"));

        let alaric = registry.get_character("King Alaric").unwrap();
        assert_eq!(alaric.death_event, Some(2));
        assert_eq!(alaric.notable_actions.len(), 1);
        assert!(!registry.kill_character("Nobody", "nothing"));
    }

    #[test]
    fn test_revive_requires_dead_character() {
        let mut registry = registry_with(&["Queen Lyra"]);
        assert!(!registry.revive_character("Queen Lyra", "miracle"));
        assert!(!registry.revive_character("Ghost", "miracle"));
        assert!(registry.get_character("Queen Lyra").unwrap().notable_actions.is_empty());

        registry.set_current_event(2);
        registry.kill_character("Queen Lyra", "fever");
        registry.set_current_event(4);
        assert!(registry.revive_character("Lyra", "via phoenix"));

        let lyra = registry.get_character("Queen Lyra").unwrap();
        assert!(lyra.is_alive());
        assert_eq!(lyra.death_event, Some(2));
        assert_eq!(lyra.revival_event, Some(4));
    }

    #[test]
    fn test_active_and_deceased() {
        let mut registry = registry_with(&["King Alaric", "Queen Lyra", "Lord Kaelen"]);
        registry.kill_character("Lord Kaelen", "duel");
        let active: Vec<_> = registry
            .get_active_characters()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(active, vec!["King Alaric", "Queen Lyra"]);
        assert_eq!(registry.get_deceased_characters()[0].name, "Lord Kaelen");
        assert!(!registry.is_character_alive("Kaelen"));
    }

    #[test]
    fn test_validate_character_usage() {
        let mut registry = registry_with(&["King Alaric", "Queen Lyra"]);
        let clean = registry.validate_character_usage("King Alaric rode north.");
        assert!(clean.is_valid);
        assert!(clean.violations.is_empty());

        registry.set_current_event(2);
        registry.kill_character("King Alaric", "ambush");
        registry.add_character("Alaric", CharacterRole::Main, 3);

        let check = registry.validate_character_usage("Only Alaric could answer.");
        assert!(!check.is_valid);
        assert_eq!(check.violations, vec!["King Alaric (died in Event 2)"]);

        let same_event = registry.validate_event_text("King Alaric fell.", 2);
        assert!(same_event.is_valid);
    }

    #[test]
    fn test_fuzzy_matching() {
        let registry = registry_with(&["Queen Lyra", "King Alaric", "Lord Theron"]);
        assert_eq!(registry.find_fuzzy("Lyra").unwrap().name, "Queen Lyra");
        assert_eq!(
            registry.find_fuzzy("Through King Alaric").unwrap().name,
            "King Alaric"
        );
        // Titles alone never identify anyone.
        assert!(registry.find_fuzzy("King").is_none());
        assert!(registry.find_fuzzy("The").is_none());
        assert!(registry.find_fuzzy("Mira").is_none());
    }

    #[test]
    fn test_fuzzy_ambiguity_resolves_to_nothing() {
        let registry = registry_with(&["Lyra Stormborn", "Lyra Ashveil"]);
        assert!(registry.find_fuzzy("Lyra").is_none());
        assert_eq!(
            registry.resolve("Lyra Ashveil").unwrap().name,
            "Lyra Ashveil"
        );
    }

    #[test]
    fn test_entity_consistency() {
        let empty = CharacterRegistry::new();
        assert_eq!(empty.calculate_entity_consistency("King Alaric ruled.").score, 0.0);

        let registry = registry_with(&["King Alaric", "Queen Lyra"]);
        let full = registry
            .calculate_entity_consistency("King Alaric and Queen Lyra ruled together.");
        assert!((full.score - 1.0).abs() < 1e-9);

        let partial = registry
            .calculate_entity_consistency("King Alaric met the Iron Council at Stone Gate.");
        assert!((partial.coverage - 0.5).abs() < 1e-9);
        assert!(partial.precision < 1.0);
        assert!(partial.score > 0.0 && partial.score < 1.0);
        assert!(partial.untracked_entities.contains(&"Iron Council".to_string()));
    }

    #[test]
    fn test_roster_summary() {
        let mut registry = registry_with(&["King Alaric", "Queen Lyra"]);
        assert!(CharacterRegistry::new().roster_summary().is_empty());

        registry.set_current_event(2);
        registry.kill_character("King Alaric", "a hidden blade");
        let summary = registry.roster_summary();
        assert!(summary.contains("• Queen Lyra (main)"));
        assert!(summary.contains("• King Alaric - Died: a hidden blade (Event 2)"));
    }

    #[test]
    fn test_invariants() {
        let mut registry = registry_with(&["King Alaric"]);
        assert!(registry.check_invariants().is_ok());

        registry
            .roster
            .get_mut("alaric")
            .unwrap()
            .status = CharacterStatus::Dead;
        assert!(registry.check_invariants().is_err());
    }
}
