//! Narrative state tracking.
//!
//! Keeps an incrementally generated chronology consistent: who is alive, who
//! died when, and which plot threads are still open.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        EventChain                                 │
//! │  events (append-only) · open threads (FIFO cap) · current tone    │
//! │                                                                   │
//! │   analyze_event ──► LifecycleDetector ──► Vec<LifecycleChange>    │
//! │        │                  (reads)                 │               │
//! │        ▼                                          ▼               │
//! │   apply_analysis ─────────────────────► CharacterRegistry         │
//! │                                          roster (key → Character) │
//! │                                          variants (key → names)   │
//! └───────────────────────────────────────────────────────────────────┘
//!
//!   CharacterProposer ──► names for the opening event
//!   normalize()        ──► canonical key used by every lookup
//! ```

mod chain;
mod character;
mod detector;
mod event;
mod extraction;
mod names;
mod registry;
mod sentences;
mod text;

pub use chain::{EventAnalysis, EventChain, DEFAULT_MAX_OPEN_THREADS};
pub use character::{Character, CharacterRole, CharacterStatus};
pub use detector::{
    extract_death_cause, extract_revival_reason, has_revival_context, Confidence,
    LifecycleChange, LifecycleDetector, LifecycleKind, PatternDetector,
};
pub use event::{EmotionalTone, Event, MAX_HOOK_LEN, MAX_SUMMARY_LEN};
pub use extraction::{
    determine_character_role, extract_characters_from_text, CharacterProposer,
    HeuristicExtractor, ProposedCharacter, DEFAULT_MAX_CHARACTERS, MIN_SCORE,
};
pub use names::{is_honorific, name_tokens, normalize, HONORIFICS};
pub use registry::{CharacterRegistry, ConsistencyScore, UsageCheck};
pub use sentences::split_sentences;
