//! Heuristic character extraction.
//!
//! Proposes the characters introduced by an opening event. Candidates are
//! capitalized spans of one to four words. Spans containing place, faction,
//! event, abstraction or scientific vocabulary are dropped, and the rest are
//! scored:
//!
//! | Signal | Weight |
//! | --- | --- |
//! | leading honorific title | +3 |
//! | two or more words | +2 |
//! | human action verb within 40 bytes | +2 |
//! | possessive form | +1 |
//! | each repeat mention (capped) | +1, max +3 |
//!
//! Only candidates scoring at least [`MIN_SCORE`] are proposed.

use super::character::CharacterRole;
use super::names::normalize;
use super::sentences::split_sentences;
use super::text::{collapse_whitespace, excerpt, word_positions};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Lowest score a candidate needs to be proposed.
pub const MIN_SCORE: u32 = 3;

/// Proposal cap when the caller gives none.
pub const DEFAULT_MAX_CHARACTERS: usize = 20;

/// Words that never start or continue a name.
const FUNCTION_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "were", "been", "be", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "must", "can", "this", "that", "these",
    "those", "i", "you", "he", "she", "it", "we", "they", "his", "her", "their", "its", "our",
    "what", "which", "who", "when", "where", "why", "how", "then", "there", "here", "after",
    "before", "during", "while", "meanwhile", "following", "through", "yet", "so", "if", "once",
    "now", "soon", "later", "year", "years", "event", "events", "age", "era", "period",
    "century", "centuries", "ae", "chapter",
];

/// Titles that mark a span as a person.
const CHARACTER_TITLES: &[&str] = &[
    "king", "queen", "prince", "princess", "lord", "lady", "sir", "emperor", "empress", "duke",
    "duchess", "count", "countess", "baron", "baroness", "knight", "general", "captain",
    "commander",
];

const GEOGRAPHIC_TERMS: &[&str] = &[
    "kingdom", "realm", "empire", "city", "town", "village", "forest", "mountain", "mountains",
    "river", "valley", "plain", "plains", "desert", "ocean", "sea", "lake", "island", "isles",
    "castle", "fortress", "keep", "temple", "woods", "peak", "peaks", "creek", "hills", "harbor",
    "harbour", "port", "gate", "gates", "tower", "citadel", "bridge", "road", "coast", "bay",
    "marsh", "swamp", "north", "south", "east", "west", "northern", "southern", "eastern",
    "western", "land", "lands",
];

const FACTION_TERMS: &[&str] = &[
    "order", "guild", "council", "army", "legion", "league", "alliance", "clan", "tribe",
    "house", "brotherhood", "sisterhood", "riders", "knights", "guard", "church", "cult",
    "faction", "rebels", "federation", "republic", "company", "court", "senate", "assembly",
    "circle", "covenant",
];

const EVENT_TERMS: &[&str] = &[
    "battle", "war", "treaty", "pact", "rebellion", "revolt", "uprising", "fire", "plague",
    "rot", "disease", "catastrophe", "disaster", "siege", "festival", "coronation", "founding",
    "expansion", "turmoil", "rebirth", "collapse", "storm", "flood", "famine", "massacre",
    "reckoning", "conquest", "crusade",
];

const ABSTRACTION_TERMS: &[&str] = &[
    "throne", "crown", "codex", "blade", "sword", "weapon", "chronicle", "prophecy", "dawn",
    "dusk", "fate", "destiny", "light", "darkness", "shadow", "shadows", "hope", "death",
    "peace", "magic", "faith", "truth",
];

const SCIENTIFIC_TERMS: &[&str] = &[
    "theory", "principle", "equation", "law", "effect", "syndrome", "protocol", "algorithm",
    "quantum", "physics", "chemistry", "biology", "engine", "reactor", "virus",
];

lazy_static! {
    static ref CAPITALIZED_SPAN: Regex = Regex::new(r"\b[A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)*").unwrap();
    static ref TOKEN: Regex = Regex::new(r"[A-Z][a-z]+").unwrap();
    static ref ACTION_VERB: Regex = Regex::new(
        r"(?i)\b(?:said|says|declared|commanded|ordered|decreed|proclaimed|led|leads|ruled|rules|fought|fights|killed|slew|rode|spoke|speaks|fled|married|betrayed|founded|marched|wept|mourned|vowed|swore|returned|arrived|struck|sent|built|crowned|defeated|conquered|rallied|rallies|summoned|whispered|shouted|cried|refused|agreed|signed|raised|gathered|attacked|defended|escaped|discovered|ascended|abdicated|negotiated|plotted|died|perished)\b"
    )
    .unwrap();
    static ref IMPORTANCE: Vec<Regex> = vec![
        Regex::new(r"\b(?:king|queen|emperor|empress|lord|lady|prince|princess|ruler|sovereign|monarch)\b").unwrap(),
        Regex::new(r"\b(?:leader|commander|general|captain|chief)\b").unwrap(),
        Regex::new(r"\b(?:declared|commanded|ordered|decreed|proclaimed|conquered|defeated|ruled)\b").unwrap(),
        Regex::new(r"\b(?:led|founded|established|created|destroyed|killed|assassinated)\b").unwrap(),
    ];
    static ref HOLDINGS: Regex =
        Regex::new(r"^\s+(?:army|forces|kingdom|empire|followers|allies)\b").unwrap();
}

fn is_function_word(word: &str) -> bool {
    FUNCTION_WORDS.contains(&word.to_lowercase().as_str())
}

fn is_title(word: &str) -> bool {
    CHARACTER_TITLES.contains(&word.to_lowercase().as_str())
}

/// Check whether a word belongs to a vocabulary that never names a person.
fn is_non_person_term(word: &str) -> bool {
    let lower = word.to_lowercase();
    [
        GEOGRAPHIC_TERMS,
        FACTION_TERMS,
        EVENT_TERMS,
        ABSTRACTION_TERMS,
        SCIENTIFIC_TERMS,
    ]
    .iter()
    .any(|vocabulary| vocabulary.contains(&lower.as_str()))
}

fn has_possessive(rest: &str) -> bool {
    rest.starts_with("'s") || rest.starts_with("’s")
}

/// A character proposed from prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedCharacter {
    pub name: String,
    pub role: CharacterRole,
    pub score: u32,
}

/// Strategy seam for proposing characters from an opening event.
pub trait CharacterProposer {
    /// Propose up to `max` characters (default 20), best first.
    fn propose_characters(&self, text: &str, max: Option<usize>) -> Vec<ProposedCharacter>;
}

/// Scoring-based [`CharacterProposer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl CharacterProposer for HeuristicExtractor {
    fn propose_characters(&self, text: &str, max: Option<usize>) -> Vec<ProposedCharacter> {
        scored_candidates(text, max)
            .into_iter()
            .map(|(name, score)| ProposedCharacter {
                role: determine_character_role(&name, text),
                name,
                score,
            })
            .collect()
    }
}

#[derive(Debug)]
struct Candidate {
    display: String,
    order: usize,
    has_title: bool,
    near_action: bool,
    possessive: bool,
}

impl Candidate {
    fn score(&self, mentions: usize) -> u32 {
        let mut score = 0;
        if self.has_title {
            score += 3;
        }
        if self.display.split_whitespace().count() >= 2 {
            score += 2;
        }
        if self.near_action {
            score += 2;
        }
        if self.possessive {
            score += 1;
        }
        score + mentions.saturating_sub(1).min(3) as u32
    }
}

/// Extract likely character names from `text`, best first.
pub fn extract_characters_from_text(text: &str, max_characters: Option<usize>) -> Vec<String> {
    scored_candidates(text, max_characters)
        .into_iter()
        .map(|(name, _)| name)
        .collect()
}

fn scored_candidates(text: &str, max_characters: Option<usize>) -> Vec<(String, u32)> {
    let mut candidates: HashMap<String, Candidate> = HashMap::new();

    for sentence in split_sentences(text) {
        let lead = sentence
            .find(|c: char| c.is_alphanumeric())
            .unwrap_or_default();

        for span in CAPITALIZED_SPAN.find_iter(&sentence) {
            let tokens: Vec<(usize, usize, &str)> = TOKEN
                .find_iter(span.as_str())
                .map(|t| (span.start() + t.start(), span.start() + t.end(), t.as_str()))
                .collect();

            let Some(first) = tokens.iter().position(|(_, _, w)| !is_function_word(w)) else {
                continue;
            };
            let mut kept = &tokens[first..];
            if let Some(cut) = kept.iter().position(|(_, _, w)| is_function_word(w)) {
                kept = &kept[..cut];
            }
            kept = &kept[..kept.len().min(4)];
            let (Some(&(start, _, head)), Some(&(_, end, _))) = (kept.first(), kept.last()) else {
                continue;
            };

            if kept.iter().all(|(_, _, w)| is_title(w)) {
                continue;
            }
            let has_title = is_title(head);
            if kept.len() == 1 && start == lead {
                continue;
            }
            if let Some((_, _, term)) = kept.iter().find(|(_, _, w)| is_non_person_term(w)) {
                trace!(span = span.as_str(), term, "span excluded by vocabulary");
                continue;
            }

            let display = collapse_whitespace(&sentence[start..end]);
            let near_action = ACTION_VERB.is_match(excerpt(&sentence, start.saturating_sub(40), end + 40));
            let possessive = has_possessive(&sentence[end..]);

            let order = candidates.len();
            let candidate = candidates.entry(normalize(&display)).or_insert_with(|| Candidate {
                display: display.clone(),
                order,
                has_title,
                near_action,
                possessive,
            });
            candidate.has_title |= has_title;
            candidate.near_action |= near_action;
            candidate.possessive |= possessive;
            if display.chars().count() > candidate.display.chars().count() {
                candidate.display = display;
            }
        }
    }

    let text_lower = text.to_lowercase();
    let mut scored: Vec<(String, u32, usize)> = candidates
        .into_iter()
        .filter_map(|(key, candidate)| {
            let mentions = word_positions(&text_lower, &candidate.display.to_lowercase())
                .len()
                .max(word_positions(&text_lower, &key).len());
            let score = candidate.score(mentions);
            if score < MIN_SCORE {
                trace!(name = %candidate.display, score, "candidate below threshold");
                return None;
            }
            Some((candidate.display, score, candidate.order))
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.2.cmp(&b.2)));
    scored.truncate(max_characters.unwrap_or(DEFAULT_MAX_CHARACTERS));
    debug!(count = scored.len(), "character candidates accepted");

    scored
        .into_iter()
        .map(|(name, score, _)| (name, score))
        .collect()
}

/// Classify how central `name` is to `text`.
pub fn determine_character_role(name: &str, text: &str) -> CharacterRole {
    let text_lower = text.to_lowercase();
    let name_lower = collapse_whitespace(&name.to_lowercase());
    let key = normalize(name);

    let by_name = word_positions(&text_lower, &name_lower);
    let by_key = word_positions(&text_lower, &key);
    let (mentions, mention_len) = if by_key.len() > by_name.len() {
        (by_key, key.len())
    } else {
        (by_name, name_lower.len())
    };
    if mentions.is_empty() {
        return CharacterRole::Minor;
    }

    let near = |pos: usize| mentions.iter().any(|&m| m.abs_diff(pos) < 50);

    let keyword_hits: usize = IMPORTANCE
        .iter()
        .map(|pattern| {
            pattern
                .find_iter(&text_lower)
                .filter(|m| near(m.start()))
                .count()
        })
        .sum();

    let mut possessive = false;
    let mut agency = 0;
    for &pos in &mentions {
        let rest = &text_lower[pos + mention_len..];
        if has_possessive(rest) {
            possessive = true;
            agency += 1;
        }
        if HOLDINGS.is_match(rest) {
            agency += 1;
        }
    }

    let importance = keyword_hits + agency;
    let has_title = name.split_whitespace().next().is_some_and(is_title);
    let near_action = ACTION_VERB
        .find_iter(&text_lower)
        .any(|m| near(m.start()));

    let count = mentions.len();
    if count >= 5 || importance >= 3 || (has_title && possessive) || (has_title && count >= 3) {
        CharacterRole::Main
    } else if count >= 2 || importance >= 1 || near_action {
        CharacterRole::Supporting
    } else {
        CharacterRole::Minor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factions_are_not_characters() {
        let names = extract_characters_from_text(
            "The Dragon Riders swept over the valley. King Aldric rallied his guard at dawn.",
            None,
        );
        assert_eq!(names, vec!["King Aldric"]);
    }

    #[test]
    fn test_variants_merge_and_rank() {
        let text = "Queen Lyra Stormborn summoned Mira Vance. Lyra Stormborn spoke first, \
                    and Mira Vance listened. Later, Theron arrived at Stone Harbor.";
        let names = extract_characters_from_text(text, None);
        assert_eq!(names, vec!["Queen Lyra Stormborn", "Mira Vance"]);

        let capped = extract_characters_from_text(text, Some(1));
        assert_eq!(capped, vec!["Queen Lyra Stormborn"]);
    }

    #[test]
    fn test_title_alone_is_not_a_name() {
        let names = extract_characters_from_text("The old King watched the Queen leave.", None);
        assert!(names.is_empty());
    }

    #[test]
    fn test_role_by_mentions() {
        let text = "King Aldric spoke. Aldric ruled. Aldric wept. Aldric rode. Aldric slept.";
        assert_eq!(determine_character_role("King Aldric", text), CharacterRole::Main);

        let text = "Mira Vance arrived. Hours passed in silence. Mira Vance left.";
        assert_eq!(determine_character_role("Mira Vance", text), CharacterRole::Supporting);

        let text = "A stranger named Pell watched from the crowd.";
        assert_eq!(determine_character_role("Pell", text), CharacterRole::Minor);
    }

    #[test]
    fn test_title_with_possessive_is_main() {
        let text = "In the north, King Theron's banners rose.";
        assert_eq!(determine_character_role("King Theron", text), CharacterRole::Main);
    }

    #[test]
    fn test_proposer_assigns_roles() {
        let proposed = HeuristicExtractor::new().propose_characters(
            "Queen Lyra declared war. Queen Lyra commanded her generals, and Queen Lyra's word was law.",
            None,
        );
        assert_eq!(proposed.len(), 1);
        assert_eq!(proposed[0].name, "Queen Lyra");
        assert_eq!(proposed[0].role, CharacterRole::Main);
        assert!(proposed[0].score >= MIN_SCORE);
    }
}
