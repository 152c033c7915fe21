//! Lifecycle event detection.
//!
//! Scans the prose of one event for deaths and revivals of tracked
//! characters. Detection is read-only: it returns [`LifecycleChange`]s and
//! leaves mutation to [`CharacterRegistry::apply_changes`].
//!
//! Every sentence goes through two stages. Exclusion filters first (hedged,
//! hypothetical or failed phrasing voids the whole sentence), then tiered
//! pattern rules. Medium-confidence death rules also need a death keyword in
//! the same sentence. The revival pass only runs when the event as a whole
//! contains a revival keyword.

use super::character::CharacterStatus;
use super::names::normalize;
use super::registry::CharacterRegistry;
use super::sentences::split_sentences;
use super::text::{excerpt, truncate_with_ellipsis};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, trace};

/// A capitalized name of one or more words, captured case-sensitively.
const NAME: &str = r"([A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)*)";

/// Possessive suffix, straight or curly apostrophe.
const POSSESSIVE: &str = r"(?:'|’)s";

/// Keywords that must appear somewhere in an event before any revival is considered.
const REVIVAL_KEYWORDS: &[&str] = &[
    "revive",
    "revived",
    "resurrect",
    "resurrected",
    "resurrection",
    "brought back",
    "bring back",
    "brings back",
    "return from death",
    "returned from dead",
    "returns from death",
    "return from the dead",
    "returned from the dead",
    "returns from the dead",
    "came back from the dead",
    "come back from the dead",
    "comes back from the dead",
    "came back to life",
    "come back to life",
    "comes back to life",
    "return to life",
    "returned to life",
    "returns to life",
    "reborn",
    "rebirth",
    "rise from the dead",
    "rose from the dead",
    "risen from",
    "rise from the grave",
    "rises from the grave",
    "rose from the grave",
    "rises from the dead",
    "rise from the ashes",
    "not dead",
    "wasn't dead",
    "wasn’t dead",
    "was not dead",
    "not actually dead",
    "not really dead",
    "not truly dead",
    "presumed dead",
    "thought dead",
    "believed dead",
    "weren't dead",
    "still alive",
    "survived",
    "alive after all",
    "miracle",
    "divine intervention",
    "necromancy",
    "phoenix",
    "restored to life",
    "restoration",
    "reviving",
    "resurrecting",
];

/// Revival mechanisms, checked in order, with the reason text they produce.
const MECHANISMS: &[(&str, &str)] = &[
    ("magic", "via magic"),
    ("spell", "via spell"),
    ("ritual", "via ritual"),
    ("necromancy", "via necromancy"),
    ("phoenix", "via phoenix"),
    ("miracle", "via miracle"),
    ("divine intervention", "via divine intervention"),
    ("healed", "healed"),
    ("cured", "cured"),
    ("saved", "saved"),
    ("resurrected", "resurrected"),
    ("not dead", "was not actually dead"),
    ("survived", "survived"),
    ("false death", "false death"),
    ("faked death", "faked death"),
];

/// Whether a detected change is a death or a revival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Death,
    Revival,
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleKind::Death => write!(f, "death"),
            LifecycleKind::Revival => write!(f, "revival"),
        }
    }
}

/// How strongly the matching rule indicates the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
}

/// A proposed death or revival of a tracked character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleChange {
    /// Display name of the resolved character.
    pub character: String,
    pub kind: LifecycleKind,
    /// Event the change belongs to.
    pub event_number: u32,
    /// Cause of death or revival reason, written to the audit log.
    pub detail: String,
    pub confidence: Confidence,
    /// The sentence the change was detected in, shortened.
    pub evidence: String,
}

/// Strategy seam for lifecycle detection.
///
/// Implementations must not assume the changes they return will be applied.
pub trait LifecycleDetector {
    /// Detect deaths and revivals of characters tracked in `registry`.
    fn detect_lifecycle_events(
        &self,
        event_number: u32,
        text: &str,
        registry: &CharacterRegistry,
    ) -> Vec<LifecycleChange>;
}

/// Phrase that voids a sentence for one pass.
struct Exclusion {
    pattern: Regex,
    /// When this also matches, the exclusion does not apply.
    unless: Option<Regex>,
}

impl Exclusion {
    fn new(pattern: &str) -> Self {
        Self {
            pattern: Regex::new(pattern).unwrap(),
            unless: None,
        }
    }

    fn unless(pattern: &str, unless: &str) -> Self {
        Self {
            pattern: Regex::new(pattern).unwrap(),
            unless: Some(Regex::new(unless).unwrap()),
        }
    }

    fn applies(&self, sentence_lower: &str) -> bool {
        self.pattern.is_match(sentence_lower)
            && !self
                .unless
                .as_ref()
                .is_some_and(|unless| unless.is_match(sentence_lower))
    }
}

/// Pattern capturing a character name in group 1.
struct PatternRule {
    pattern: Regex,
    confidence: Confidence,
    /// Matched against the text right after the whole match; a hit drops it.
    veto_after: Option<Regex>,
}

impl PatternRule {
    fn high(pattern: &str) -> Self {
        Self {
            pattern: Regex::new(pattern).unwrap(),
            confidence: Confidence::High,
            veto_after: None,
        }
    }

    fn medium(pattern: &str) -> Self {
        Self {
            confidence: Confidence::Medium,
            ..Self::high(pattern)
        }
    }

    fn vetoed_by(mut self, veto: &str) -> Self {
        self.veto_after = Some(Regex::new(veto).unwrap());
        self
    }

    /// Captured names with their byte offset in `sentence`.
    fn names_in(&self, sentence: &str) -> Vec<(String, usize)> {
        self.pattern
            .captures_iter(sentence)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1)?;
                if let Some(veto) = &self.veto_after {
                    if veto.is_match(&sentence[whole.end()..]) {
                        trace!(name = name.as_str(), "match vetoed by following words");
                        return None;
                    }
                }
                Some((name.as_str().trim().to_string(), name.start()))
            })
            .collect()
    }
}

lazy_static! {
    static ref DEATH_EXCLUSIONS: Vec<Exclusion> = vec![
        Exclusion::new(r"\b(?:almost|nearly)\s+(?:died|killed|perished)"),
        Exclusion::new(r"\b(?:could|would|should|might|may)\s+have\s+(?:died|perished|been\s+killed)"),
        Exclusion::new(
            r"\b(?:threatened|threatening|wanted|wants|trying|tried|attempted|attempting|failed|fails|plot|plotted|plotting|plan|planned|planning|vowed|vows|swore|sought|seeks)\s+to\s+(?:kill|murder|assassinate|slay)"
        ),
        Exclusion::unless(
            r"\bdeath\s+(?:threat|wish|sentence)",
            r"\bdeath\s+(?:threat|wish|sentence)s?\s+(?:was\s+)?(?:carried\s+out|executed)",
        ),
        Exclusion::new(r"\b(?:fake|faked|false|staged)\s+(?:death|dying)"),
        Exclusion::new(r"\b(?:pretend|pretended|feign|feigned)\s+(?:death|to\s+die|dead)"),
        Exclusion::new(r"\bnear-death"),
        Exclusion::new(r"\b(?:cheat|cheated|escape|escaped|avoid|avoided|evade|evaded)\s+death"),
        Exclusion::unless(
            r"\bdeath\s+of\s+(?:the|a|an)\s+",
            r"\bdeath\s+of\s+(?:the|a|an)\s+(?:character|person|leader|king|queen|emperor)",
        ),
    ];

    static ref DEATH_RULES: Vec<PatternRule> = vec![
        PatternRule::high(&format!(
            r"\b{NAME}\s+(?i:was|were|is|are)\s+(?i:killed|slain|murdered|executed|assassinated|beheaded|hanged|burned\s+alive|crucified)\b"
        )),
        PatternRule::high(&format!(r"\b{NAME}\s+(?i:died|dies|perished|perishes|expired)\b")),
        PatternRule::high(&format!(r"\b{NAME}\s+(?i:succumbed|succumbs)\b"))
            .vetoed_by(r"^\s+(?i:to\s+(?:temptation|sleep|exhaustion|despair|fear|pressure|doubt|greed|madness))"),
        PatternRule::high(&format!(r"\b{NAME}\s+(?i:fell)\b")).vetoed_by(
            r"^[ \t]+(?i:silent|quiet|still|asleep|ill|sick|in\s+(?:love|battle|combat|war|the\s+siege|the\s+fight)|battle|combat|war|into|back|behind|apart|from|off|over|down|out|short|prey|for|upon|on|under|to\s+(?:his|her|their)\s+knees|to\s+the\s+ground)\b"
        ),
        PatternRule::high(&format!(
            r"\b{NAME}\s+(?i:passed\s+away|passes\s+away|met\s+(?:his|her|their)\s+(?:death|end|demise))"
        )),
        PatternRule::high(&format!(
            r"\b(?i:death|demise|execution|assassination|killing|murder|slaying|passing)\s+(?i:of)\s+{NAME}"
        ))
        .vetoed_by(&format!(r"^{POSSESSIVE}\b")),
        PatternRule::high(&format!(
            r"\b{NAME}{POSSESSIVE}\s+(?i:death|demise|execution|assassination|passing|murder)\b"
        )),
        PatternRule::high(&format!(
            r"\b{NAME}\s+(?i:sacrificed|sacrifices|sacrificing)\s+(?i:herself|himself|themselves|(?:her|his|their)\s+life)"
        )),
        PatternRule::high(&format!(r"\b{NAME}\s+(?i:gave|gives|giving)\s+(?i:her|his|their)\s+life")),
        PatternRule::high(&format!(
            r"\b(?i:killed|kills|slew|slays|murdered|murders|executed|executes|assassinated|assassinates)\s+{NAME}"
        ))
        .vetoed_by(&format!(r"^{POSSESSIVE}\b")),
        PatternRule::medium(&format!(
            r"\b{NAME}\s+(?i:fell|falls)\s+(?i:in\s+)?(?i:battle|combat|war|the\s+siege|the\s+fight)"
        )),
        PatternRule::medium(&format!(
            r"\b{NAME}\s+(?i:was|were)\s+(?i:struck\s+down|cut\s+down)\s+(?i:by|in)\b"
        )),
        PatternRule::medium(&format!(
            r"\b{NAME}\s+(?i:succumbs?|succumbed)\s+(?i:to)\s+(?i:(?:his|her|their)\s+)?(?i:wounds|injuries|illness|disease|poison|age)"
        )),
        PatternRule::medium(&format!(
            r"\b{NAME}\s+(?i:drew|draws|takes|took)\s+(?i:her|his|their)\s+(?i:final|last)\s+(?i:breath)"
        )),
        PatternRule::medium(&format!(r"\b{NAME}\s+(?i:breathed|breathes)\s+(?i:her|his|their)\s+(?i:last)")),
        PatternRule::medium(&format!(
            r"\b(?i:loss|mourning|grief|funeral)\s+(?i:of|for|over)\s+{NAME}"
        )),
    ];

    /// Required alongside a medium-confidence death match.
    static ref DEATH_KEYWORD: Regex = Regex::new(
        r"\b(?:death|die|died|dies|dying|dead|kill\w*|murder\w*|slay\w*|slain|perish\w*|fatal\w*|demise|succumb\w*|funeral|final\s+breath|last\s+breath|breathed\s+(?:his|her|their)\s+last)\b"
    )
    .unwrap();

    static ref CAUSE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\b(?:killed|slain|murdered|assassinated|executed|beheaded|struck\s+down|cut\s+down)\s+(?:by|in|with)\s+([^.!?;,]{5,50})").unwrap(),
        Regex::new(r"(?i)\bdied\s+(?:from|of|in)\s+([^.!?;,]{5,50})").unwrap(),
        Regex::new(r"(?i)\bsuccumbed\s+to\s+([^.!?;,]{5,50})").unwrap(),
        Regex::new(r"(?i)\b(?:execution|assassination)\s+(?:by|of)\s+([^.!?;,]{5,50})").unwrap(),
    ];

    static ref REVIVAL_EXCLUSIONS: Vec<Exclusion> = vec![
        Exclusion::new(r"\b(?:will|could|might|should|would|cannot|can't|can’t|may)\s+(?:be\s+)?(?:revive|resurrect)"),
        Exclusion::new(
            r"\b(?:unable|failed|fails|attempting|attempted|trying|tried|hope|hoped|hoping|plan|planned|planning|vowed|sought|seeks|wished|wishes|longed)\s+to\s+(?:revive|resurrect|bring\s+back)"
        ),
        Exclusion::new(r"\b(?:ritual|spell|rite|way)\s+to\s+(?:revive|resurrect|bring\s+back)"),
    ];

    static ref REVIVAL_RULES: Vec<PatternRule> = vec![
        PatternRule::high(&format!(
            r"\b{NAME}\s+(?i:was|were|is|are)\s+(?i:revived|resurrected|reborn|restored\s+to\s+life)\b"
        )),
        PatternRule::high(&format!(
            r"\b{NAME}\s+(?i:was|were|is|are)\s+(?i:brought\s+back)\s+(?i:to\s+life|from\s+(?:the\s+)?dead)"
        )),
        PatternRule::high(&format!(
            r"\b(?i:revive|revives|revived|resurrect|resurrects|resurrected)\s+{NAME}"
        ))
        .vetoed_by(&format!(r"^{POSSESSIVE}\b")),
        PatternRule::high(&format!(
            r"\b(?i:bring|brings|brought)\s+{NAME}\s+(?i:back)\s+(?i:to\s+life|from\s+(?:the\s+)?dead)"
        )),
        PatternRule::high(&format!(
            r"\b(?i:bring|brings|brought)\s+(?i:back)\s+{NAME}\s+(?i:to\s+life|from\s+(?:the\s+)?dead)"
        )),
        PatternRule::high(&format!(
            r"\b{NAME}\s+(?i:returns?|returned|comes?\s+back|came\s+back)\s+(?i:from\s+(?:the\s+)?dead|to\s+life)"
        )),
        PatternRule::high(&format!(
            r"\b{NAME}\s+(?i:rise|rises|rose|risen|had\s+risen)\s+(?i:from)\s+(?i:the\s+)?(?i:dead|grave)"
        )),
        PatternRule::high(&format!(r"\b(?i:resurrection|rebirth|revival)\s+(?i:of)\s+{NAME}")),
        PatternRule::high(&format!(r"\b{NAME}{POSSESSIVE}\s+(?i:resurrection|rebirth|revival)\b")),
        PatternRule::high(&format!(
            r"\b{NAME}\s+(?i:wasn't|wasn’t|was\s+not|weren't|weren’t|were\s+not)\s+(?i:(?:actually|really|truly)\s+)?(?i:dead)\b"
        )),
        PatternRule::high(&format!(
            r"\b{NAME}\s+(?i:had\s+)?(?i:survived)\s+(?i:the\s+)?(?i:death|execution|attack|fall)\b"
        )),
        PatternRule::high(&format!(
            r"\b(?i:thought|believed|presumed|declared|pronounced)\s+(?i:dead)[,\s]+{NAME}\s+(?i:emerged|appeared|returned|reappeared|was\s+found\s+alive)"
        )),
    ];
}

/// Check the event-level revival gate.
pub fn has_revival_context(text: &str) -> bool {
    let lower = text.to_lowercase();
    REVIVAL_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Derive a cause of death from the sentence a death was found in.
///
/// Uses the first matching cause phrase ("killed by ...", "died of ..."),
/// otherwise a window from 30 bytes before the name to 50 after it. May be
/// empty, which the registry logs as unknown causes.
pub fn extract_death_cause(sentence: &str, name_start: usize) -> String {
    for pattern in CAUSE_PATTERNS.iter() {
        if let Some(cause) = pattern.captures(sentence).and_then(|caps| caps.get(1)) {
            let cause = cause.as_str().trim();
            if !cause.is_empty() {
                return cause.to_string();
            }
        }
    }

    let window = excerpt(sentence, name_start.saturating_sub(30), name_start + 50);
    if window.is_empty() || window.ends_with(&['.', '!', '?'][..]) {
        window.to_string()
    } else {
        format!("{window}...")
    }
}

/// Derive a revival reason from mechanism keywords, or the text around the name.
pub fn extract_revival_reason(sentence: &str, name_start: usize) -> String {
    let lower = sentence.to_lowercase();
    for (keyword, description) in MECHANISMS {
        if let Some(pos) = lower.find(keyword) {
            let window = excerpt(sentence, pos.saturating_sub(30), pos + 70);
            return format!("{description} - {}", truncate_with_ellipsis(window, 80));
        }
    }

    let window = excerpt(sentence, name_start.saturating_sub(30), name_start + 70);
    format!("Revived - {}", truncate_with_ellipsis(window, 80))
}

/// Rule-based [`LifecycleDetector`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternDetector;

impl PatternDetector {
    pub fn new() -> Self {
        Self
    }

    fn detect_deaths(
        &self,
        event_number: u32,
        sentences: &[String],
        registry: &CharacterRegistry,
        overlay: &mut BTreeMap<String, CharacterStatus>,
    ) -> Vec<LifecycleChange> {
        let mut changes = Vec::new();
        let mut processed = BTreeSet::new();

        for sentence in sentences {
            let lower = sentence.to_lowercase();
            if let Some(exclusion) = DEATH_EXCLUSIONS.iter().find(|e| e.applies(&lower)) {
                debug!(
                    sentence = %truncate_with_ellipsis(sentence, 80),
                    exclusion = exclusion.pattern.as_str(),
                    "death pass skipped sentence"
                );
                continue;
            }
            let has_death_keyword = DEATH_KEYWORD.is_match(&lower);

            for rule in DEATH_RULES.iter() {
                if rule.confidence == Confidence::Medium && !has_death_keyword {
                    continue;
                }
                for (name, name_start) in rule.names_in(sentence) {
                    let Some(character) = registry.resolve(&name) else {
                        trace!(%name, "death mention is not a tracked character");
                        continue;
                    };
                    let key = normalize(&character.name);
                    if processed.contains(&key) {
                        continue;
                    }
                    let status = overlay.get(&key).copied().unwrap_or(character.status);
                    if status != CharacterStatus::Alive {
                        debug!(name = %character.name, %status, "death match on non-living character");
                        continue;
                    }

                    debug!(
                        name = %character.name,
                        event = event_number,
                        confidence = ?rule.confidence,
                        "death detected"
                    );
                    processed.insert(key.clone());
                    overlay.insert(key, CharacterStatus::Dead);
                    changes.push(LifecycleChange {
                        character: character.name.clone(),
                        kind: LifecycleKind::Death,
                        event_number,
                        detail: extract_death_cause(sentence, name_start),
                        confidence: rule.confidence,
                        evidence: truncate_with_ellipsis(sentence, 100),
                    });
                }
            }
        }

        changes
    }

    fn detect_revivals(
        &self,
        event_number: u32,
        sentences: &[String],
        registry: &CharacterRegistry,
        overlay: &mut BTreeMap<String, CharacterStatus>,
    ) -> Vec<LifecycleChange> {
        let mut changes = Vec::new();
        let mut processed = BTreeSet::new();

        for sentence in sentences {
            let lower = sentence.to_lowercase();
            if REVIVAL_EXCLUSIONS.iter().any(|e| e.applies(&lower)) {
                debug!(sentence = %truncate_with_ellipsis(sentence, 80), "revival pass skipped sentence");
                continue;
            }

            for rule in REVIVAL_RULES.iter() {
                for (name, name_start) in rule.names_in(sentence) {
                    let Some(character) = registry.resolve(&name) else {
                        trace!(%name, "revival mention is not a tracked character");
                        continue;
                    };
                    let key = normalize(&character.name);
                    if processed.contains(&key) {
                        continue;
                    }
                    let status = overlay.get(&key).copied().unwrap_or(character.status);
                    if status != CharacterStatus::Dead {
                        debug!(name = %character.name, %status, "revival match on character who is not dead");
                        continue;
                    }

                    debug!(name = %character.name, event = event_number, "revival detected");
                    processed.insert(key.clone());
                    overlay.insert(key, CharacterStatus::Alive);
                    changes.push(LifecycleChange {
                        character: character.name.clone(),
                        kind: LifecycleKind::Revival,
                        event_number,
                        detail: extract_revival_reason(sentence, name_start),
                        confidence: rule.confidence,
                        evidence: truncate_with_ellipsis(sentence, 100),
                    });
                }
            }
        }

        changes
    }
}

impl LifecycleDetector for PatternDetector {
    fn detect_lifecycle_events(
        &self,
        event_number: u32,
        text: &str,
        registry: &CharacterRegistry,
    ) -> Vec<LifecycleChange> {
        let sentences = split_sentences(text);
        // Statuses as they stand after the changes found so far in this event.
        let mut overlay = BTreeMap::new();

        let mut changes = self.detect_deaths(event_number, &sentences, registry, &mut overlay);

        if has_revival_context(text) {
            changes.extend(self.detect_revivals(event_number, &sentences, registry, &mut overlay));
        } else {
            trace!(event = event_number, "no revival keywords, revival pass skipped");
        }

        changes
    }
}
