//! Causal event chain.
//!
//! Holds the events of one narrative in order, the open plot threads they
//! left behind and the running emotional tone. Analysis of an event is split
//! in two: [`EventChain::analyze_event`] derives everything without touching
//! any state, and [`EventChain::apply_analysis`] writes the result into the
//! chain and the registry.

use super::detector::{LifecycleChange, LifecycleDetector};
use super::event::{EmotionalTone, Event, MAX_HOOK_LEN};
use super::registry::CharacterRegistry;
use super::sentences::split_sentences;
use super::text::{truncate_chars, truncate_with_ellipsis};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default cap on open threads.
pub const DEFAULT_MAX_OPEN_THREADS: usize = 5;

const MAX_CONSEQUENCES: usize = 3;
const MAX_CONSEQUENCE_LEN: usize = 100;

lazy_static! {
    /// Lines holding only a date marker, like `**1 AE:**`.
    static ref DATE_LINE: Regex = Regex::new(r"^\*?\*?\d+\s+\w+:?\*?\*?$").unwrap();

    static ref CONSEQUENCE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\bthis\s+(?:would|will|could)\s+lead\s+to\s+(.+?)[.!?]").unwrap(),
        Regex::new(r"(?i)\bhowever[,\s]+(.+?)[.!?]").unwrap(),
        Regex::new(r"(?i)\bbut\s+(.+?)[.!?]").unwrap(),
        Regex::new(r"(?i)\b(?:this|which)\s+sets?\s+the\s+stage\s+for\s+(.+?)[.!?]").unwrap(),
        Regex::new(r"(?i)\b(?:leaving|creating|causing)\s+(.+?)[.!?]").unwrap(),
    ];
}

fn default_max_open_threads() -> usize {
    DEFAULT_MAX_OPEN_THREADS
}

/// Lines of prose with headings, blank lines and date markers removed.
fn prose_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with('#') && !line.starts_with("**"))
        .filter(|line| !DATE_LINE.is_match(line))
}

/// Everything derived from one event, not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct EventAnalysis {
    pub event_number: u32,
    pub summary: String,
    pub consequences: Vec<String>,
    pub hook: String,
    pub tone: EmotionalTone,
    /// Lifecycle changes proposed by the detector.
    pub changes: Vec<LifecycleChange>,
    /// Tracked characters named in the event.
    pub mentioned: Vec<String>,
}

/// Ordered events plus the threads and tone they carry forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventChain {
    events: Vec<Event>,
    open_threads: Vec<String>,
    current_tone: EmotionalTone,
    #[serde(default = "default_max_open_threads")]
    max_open_threads: usize,
}

impl Default for EventChain {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChain {
    pub fn new() -> Self {
        Self::with_max_open_threads(DEFAULT_MAX_OPEN_THREADS)
    }

    pub fn with_max_open_threads(max_open_threads: usize) -> Self {
        Self {
            events: Vec::new(),
            open_threads: Vec::new(),
            current_tone: EmotionalTone::Neutral,
            max_open_threads,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn open_threads(&self) -> &[String] {
        &self.open_threads
    }

    pub fn current_tone(&self) -> EmotionalTone {
        self.current_tone
    }

    pub fn max_open_threads(&self) -> usize {
        self.max_open_threads
    }

    /// Change the thread cap. Takes effect at the next cleanup.
    pub fn set_max_open_threads(&mut self, max: usize) {
        self.max_open_threads = max;
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Append a new event.
    ///
    /// Numbers are expected to increase; a number that does not is logged
    /// and still appended.
    pub fn add_event(&mut self, event_number: u32, content: &str) -> &mut Event {
        if let Some(last) = self.events.last() {
            if event_number <= last.event_number {
                warn!(
                    event_number,
                    last = last.event_number,
                    "event appended out of order"
                );
            }
        }
        self.events.push(Event::new(event_number, content));
        let index = self.events.len() - 1;
        &mut self.events[index]
    }

    /// Find an event by number. The latest one wins if numbers repeat.
    pub fn get_event(&self, event_number: u32) -> Option<&Event> {
        self.events
            .iter()
            .rev()
            .find(|e| e.event_number == event_number)
    }

    fn get_event_mut(&mut self, event_number: u32) -> Option<&mut Event> {
        self.events
            .iter_mut()
            .rev()
            .find(|e| e.event_number == event_number)
    }

    pub fn last_event(&self) -> Option<&Event> {
        self.events.last()
    }

    /// The last `n` events, oldest first.
    pub fn last_n_events(&self, n: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    // =========================================================================
    // Threads
    // =========================================================================

    /// Add an open thread. Blank and duplicate threads are ignored.
    pub fn add_open_thread(&mut self, thread: &str) {
        let thread = thread.trim();
        if !thread.is_empty() && !self.open_threads.iter().any(|t| t == thread) {
            self.open_threads.push(thread.to_string());
        }
    }

    /// Remove a thread. Returns false if it was not open.
    pub fn resolve_thread(&mut self, thread: &str) -> bool {
        let thread = thread.trim();
        match self.open_threads.iter().position(|t| t == thread) {
            Some(index) => {
                self.open_threads.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drop the oldest threads until at most `max` remain.
    pub fn clear_stale_threads(&mut self, max: usize) {
        if self.open_threads.len() > max {
            let excess = self.open_threads.len() - max;
            self.open_threads.drain(..excess);
            debug!(evicted = excess, "stale threads evicted");
        }
    }

    // =========================================================================
    // Derivation
    // =========================================================================

    /// One or two opening sentences of the first paragraph, at most 250 characters.
    pub fn extract_summary_from_event(content: &str) -> String {
        let mut paragraph: Vec<&str> = Vec::new();
        for line in prose_lines(content) {
            paragraph.push(line);
            if paragraph.join(" ").chars().count() > 50 {
                break;
            }
        }
        let text = paragraph.join(" ");

        let picked: Vec<String> = split_sentences(&text)
            .into_iter()
            .take(3)
            .filter(|s| s.chars().count() > 20)
            .take(2)
            .collect();

        if picked.is_empty() {
            return truncate_with_ellipsis(&text, 150);
        }
        truncate_with_ellipsis(&picked.join(" "), 250)
    }

    /// Clauses that leave something open, like "but the north would not kneel".
    pub fn extract_consequences_from_event(content: &str) -> Vec<String> {
        let mut consequences: Vec<String> = Vec::new();
        for pattern in CONSEQUENCE_PATTERNS.iter() {
            for caps in pattern.captures_iter(content) {
                let Some(clause) = caps.get(1) else {
                    continue;
                };
                let clause = clause.as_str().trim();
                if clause.chars().count() <= 10 {
                    continue;
                }
                let clause = truncate_chars(clause, MAX_CONSEQUENCE_LEN);
                if !consequences.contains(&clause) {
                    consequences.push(clause);
                }
            }
        }
        consequences.truncate(MAX_CONSEQUENCES);
        consequences
    }

    /// The last substantive sentence, which sets up what comes next.
    pub fn extract_hook_from_event(content: &str) -> String {
        prose_lines(content)
            .flat_map(split_sentences)
            .filter(|s| s.chars().count() > 20)
            .last()
            .map(|s| truncate_with_ellipsis(&s, MAX_HOOK_LEN))
            .unwrap_or_default()
    }

    /// Derive summary, threads, hook, tone and lifecycle changes for an event.
    ///
    /// Touches neither the chain nor the registry. `None` if no event has
    /// that number.
    pub fn analyze_event(
        &self,
        event_number: u32,
        registry: &CharacterRegistry,
        detector: &dyn LifecycleDetector,
    ) -> Option<EventAnalysis> {
        let event = self.get_event(event_number)?;
        let content = event.content();

        Some(EventAnalysis {
            event_number,
            summary: Self::extract_summary_from_event(content),
            consequences: Self::extract_consequences_from_event(content),
            hook: Self::extract_hook_from_event(content),
            tone: EmotionalTone::classify(content),
            changes: detector.detect_lifecycle_events(event_number, content, registry),
            mentioned: registry.calculate_entity_consistency(content).tracked_mentioned,
        })
    }

    /// Write an analysis into the chain and the registry.
    ///
    /// Returns the lifecycle changes the registry accepted.
    pub fn apply_analysis(
        &mut self,
        analysis: EventAnalysis,
        registry: &mut CharacterRegistry,
    ) -> Vec<LifecycleChange> {
        registry.set_current_event(analysis.event_number);
        let applied = registry.apply_changes(&analysis.changes);
        for name in &analysis.mentioned {
            registry.record_mention(name, analysis.event_number);
        }

        let Some(event) = self.get_event_mut(analysis.event_number) else {
            warn!(event = analysis.event_number, "analysis for unknown event dropped");
            return applied;
        };
        if event.summary.is_empty() {
            event.set_summary(&analysis.summary);
        }
        event.set_hook(&analysis.hook);
        event.emotional_tone = analysis.tone;
        for change in &applied {
            event.add_affected_character(&change.character);
        }
        for name in &analysis.mentioned {
            event.add_affected_character(name);
        }
        for consequence in &analysis.consequences {
            event.add_consequence(consequence);
        }

        for consequence in &analysis.consequences {
            self.add_open_thread(consequence);
        }
        self.current_tone = analysis.tone;

        debug!(
            event = analysis.event_number,
            changes = applied.len(),
            threads = self.open_threads.len(),
            tone = %analysis.tone,
            "event analyzed"
        );
        applied
    }

    /// Analyze an event, apply the result, then evict stale threads.
    pub fn analyze_event_and_update(
        &mut self,
        event_number: u32,
        registry: &mut CharacterRegistry,
        detector: &dyn LifecycleDetector,
    ) -> Vec<LifecycleChange> {
        let Some(analysis) = self.analyze_event(event_number, registry, detector) else {
            warn!(event = event_number, "no such event to analyze");
            return Vec::new();
        };
        let applied = self.apply_analysis(analysis, registry);
        self.clear_stale_threads(self.max_open_threads);
        applied
    }

    // =========================================================================
    // Context Rendering
    // =========================================================================

    /// Recent events formatted as input for the next generation.
    pub fn get_causation_context(&self, num_events: usize) -> String {
        let recent = self.last_n_events(num_events);
        if recent.is_empty() {
            return "This is the first event. Establish the initial scenario.".to_string();
        }

        let mut context = String::from("PREVIOUS EVENTS (must influence the next event):\n\n");
        for event in recent {
            context.push_str(&format!("Event {}:\n", event.event_number));
            let summary = if event.summary.is_empty() {
                "No summary yet"
            } else {
                &event.summary
            };
            context.push_str(&format!("  Summary: {summary}\n"));
            if !event.affected_characters.is_empty() {
                context.push_str(&format!(
                    "  Characters involved: {}\n",
                    event.affected_characters.join(", ")
                ));
            }
            if !event.consequences.is_empty() {
                context.push_str(&format!(
                    "  Open threads: {}\n",
                    event.consequences.join(", ")
                ));
            }
            if !event.hook.is_empty() {
                context.push_str(&format!("  Hook: {}\n", event.hook));
            }
            context.push_str(&format!("  Tone: {}\n\n", event.emotional_tone));
        }
        context
    }

    /// Numbered list of open threads.
    pub fn open_threads_prompt(&self) -> String {
        if self.open_threads.is_empty() {
            return "No open threads yet. You may introduce new ones.".to_string();
        }
        let mut prompt = String::from("OPEN PLOT THREADS (address at least one):\n");
        for (i, thread) in self.open_threads.iter().enumerate() {
            prompt.push_str(&format!("  {}. {thread}\n", i + 1));
        }
        prompt
    }

    /// One line per event with the characters involved.
    pub fn chain_summary(&self) -> String {
        if self.events.is_empty() {
            return "No events in chain yet.".to_string();
        }
        let mut summary = format!("EVENT CHAIN ({} events):\n\n", self.events.len());
        for event in &self.events {
            summary.push_str(&format!("Event {}: {}\n", event.event_number, event.summary));
            if !event.affected_characters.is_empty() {
                summary.push_str(&format!(
                    "  → Characters: {}\n",
                    event.affected_characters.join(", ")
                ));
            }
        }
        summary.push_str(&format!("\nOpen threads: {}\n", self.open_threads.len()));
        summary
    }

    /// Verify invariants of a deserialized chain.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.max_open_threads == 0 {
            return Err("max_open_threads must be positive".to_string());
        }
        if self.open_threads.len() > self.max_open_threads {
            return Err(format!(
                "{} open threads exceed the cap of {}",
                self.open_threads.len(),
                self.max_open_threads
            ));
        }
        if let Some(event) = self.events.iter().find(|e| e.hook.chars().count() > MAX_HOOK_LEN) {
            return Err(format!("event {} has an oversized hook", event.event_number));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::character::{CharacterRole, CharacterStatus};
    use crate::narrative::detector::PatternDetector;

    #[test]
    fn test_summary_skips_headings_and_dates() {
        let content = "## The Fall of Alaric\n**12 AE:**\n\
                       King Alaric was assassinated by a hidden blade in the great hall. \
                       The court fled in terror. Nobody spoke.";
        let summary = EventChain::extract_summary_from_event(content);
        assert_eq!(
            summary,
            "King Alaric was assassinated by a hidden blade in the great hall. The court fled in terror."
        );
    }

    #[test]
    fn test_summary_fallback_and_cap() {
        assert_eq!(EventChain::extract_summary_from_event("Short. Tiny."), "Short. Tiny.");

        let long = format!("{}.", "word ".repeat(120));
        let summary = EventChain::extract_summary_from_event(&long);
        assert_eq!(summary.chars().count(), 250);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_consequence_extraction() {
        let content = "The treaty was signed, but the northern lords refused to kneel. \
                       This would lead to a bitter winter of unrest. However, the queen said nothing.";
        let consequences = EventChain::extract_consequences_from_event(content);
        assert_eq!(
            consequences,
            vec![
                "a bitter winter of unrest",
                "the queen said nothing",
                "the northern lords refused to kneel",
            ]
        );
    }

    #[test]
    fn test_threads_fifo_eviction() {
        let mut chain = EventChain::new();
        for i in 1..=8 {
            chain.add_open_thread(&format!("thread {i}"));
        }
        chain.add_open_thread("thread 8");
        chain.add_open_thread("   ");
        chain.clear_stale_threads(5);
        assert_eq!(
            chain.open_threads(),
            ["thread 4", "thread 5", "thread 6", "thread 7", "thread 8"]
        );

        assert!(chain.resolve_thread("thread 6"));
        assert!(!chain.resolve_thread("thread 1"));
        assert_eq!(chain.open_threads().len(), 4);
    }

    #[test]
    fn test_hook_is_last_substantive_sentence() {
        let hook = EventChain::extract_hook_from_event(
            "The war ended. Yet in the east, a new power was rising in the shadows. Silence.",
        );
        assert_eq!(hook, "Yet in the east, a new power was rising in the shadows.");
    }

    #[test]
    fn test_out_of_order_events_are_kept() {
        let mut chain = EventChain::new();
        chain.add_event(2, "second");
        chain.add_event(1, "first");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.last_event().unwrap().event_number, 1);
        assert_eq!(chain.last_n_events(5).len(), 2);
        assert_eq!(chain.get_event(2).unwrap().content(), "second");
    }

    #[test]
    fn test_causation_context() {
        let mut chain = EventChain::new();
        assert_eq!(
            chain.get_causation_context(2),
            "This is the first event. Establish the initial scenario."
        );

        let event = chain.add_event(1, "text");
        event.set_summary("Alaric took the throne.");
        event.add_affected_character("King Alaric");
        event.set_hook("But rivals gathered.");

        let context = chain.get_causation_context(2);
        assert!(context.starts_with("PREVIOUS EVENTS"));
        assert!(context.contains("Event 1:\n  Summary: Alaric took the throne.\n"));
        assert!(context.contains("  Characters involved: King Alaric\n"));
        assert!(context.contains("  Hook: But rivals gathered.\n"));
    }

    #[test]
    fn test_analyze_is_pure_until_applied() {
        let mut registry = CharacterRegistry::new();
        registry.add_character("King Alaric", CharacterRole::Main, 1);
        let mut chain = EventChain::new();
        chain.add_event(2, "King Alaric was assassinated by a hidden blade.");

        let detector = PatternDetector::new();
        let analysis = chain.analyze_event(2, &registry, &detector).unwrap();
        assert_eq!(analysis.changes.len(), 1);
        assert!(registry.is_character_alive("King Alaric"));
        assert!(chain.get_event(2).unwrap().summary.is_empty());

        let applied = chain.apply_analysis(analysis, &mut registry);
        assert_eq!(applied.len(), 1);
        let alaric = registry.get_character("King Alaric").unwrap();
        assert_eq!(alaric.status, CharacterStatus::Dead);
        assert_eq!(alaric.death_event, Some(2));
        assert_eq!(
            chain.get_event(2).unwrap().affected_characters,
            vec!["King Alaric"]
        );
        assert_eq!(chain.current_tone(), EmotionalTone::Tragic);
    }

    #[test]
    fn test_analyze_and_update_caps_threads() {
        let mut registry = CharacterRegistry::new();
        let mut chain = EventChain::with_max_open_threads(2);
        for i in 1..=3 {
            chain.add_open_thread(&format!("old thread {i}"));
        }
        chain.add_event(1, "The harvest failed, leaving the villages hungry and restless.");
        chain.analyze_event_and_update(1, &mut registry, &PatternDetector::new());
        assert_eq!(
            chain.open_threads(),
            ["old thread 3", "the villages hungry and restless"]
        );
    }

    #[test]
    fn test_chain_summary() {
        let mut chain = EventChain::new();
        assert_eq!(chain.chain_summary(), "No events in chain yet.");
        chain.add_event(1, "text").set_summary("A beginning.");
        let summary = chain.chain_summary();
        assert!(summary.contains("EVENT CHAIN (1 events):"));
        assert!(summary.contains("Event 1: A beginning."));
        assert!(summary.ends_with("Open threads: 0\n"));
    }
}
