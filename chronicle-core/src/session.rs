//! ChronicleSession - one narrative's registry and event chain.
//!
//! The session owns exactly one [`CharacterRegistry`] and one [`EventChain`].
//! New events go through a stage/commit cycle: [`ChronicleSession::stage_event`]
//! runs extraction, detection and validation against copies of the state, and
//! [`ChronicleSession::commit`] swaps those copies in. A staged event that is
//! dropped leaves the session exactly as it was.

use crate::generator::{GenerationRequest, GeneratorError};
use crate::narrative::{
    CharacterProposer, CharacterRegistry, ConsistencyScore, EventChain, HeuristicExtractor,
    LifecycleChange, LifecycleDetector, PatternDetector, ProposedCharacter, UsageCheck,
    DEFAULT_MAX_CHARACTERS, DEFAULT_MAX_OPEN_THREADS,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Errors from ChronicleSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Generated text for event {0} is empty")]
    EmptyEvent(u32),

    #[error("Staged event {staged} is stale: the session expects event {expected}")]
    StaleStage { staged: u32, expected: u32 },

    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),
}

/// Configuration for a new chronicle session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Theme handed to the generator.
    pub theme: String,

    /// How many characters the opening event should introduce.
    pub target_characters: usize,

    /// Cap on open plot threads.
    pub max_open_threads: usize,

    /// Number of recent events included in the causation context.
    pub context_window: usize,

    /// Generation attempts per event before the last one is accepted anyway.
    pub max_attempts: u32,

    /// Cap on characters proposed from the opening event.
    pub max_proposed_characters: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("")
    }
}

impl SessionConfig {
    /// Create a new session config with a theme.
    pub fn new(theme: impl Into<String>) -> Self {
        Self {
            theme: theme.into(),
            target_characters: 5,
            max_open_threads: DEFAULT_MAX_OPEN_THREADS,
            context_window: 2,
            max_attempts: 3,
            max_proposed_characters: DEFAULT_MAX_CHARACTERS,
        }
    }

    /// Set the number of characters the opening event should introduce.
    pub fn with_target_characters(mut self, count: usize) -> Self {
        self.target_characters = count;
        self
    }

    /// Set the open thread cap.
    pub fn with_max_open_threads(mut self, max: usize) -> Self {
        self.max_open_threads = max.max(1);
        self
    }

    /// Set how many recent events feed the causation context.
    pub fn with_context_window(mut self, events: usize) -> Self {
        self.context_window = events;
        self
    }

    /// Set generation attempts per event.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the cap on proposed characters.
    pub fn with_max_proposed_characters(mut self, max: usize) -> Self {
        self.max_proposed_characters = max;
        self
    }
}

/// Bookkeeping about a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub theme: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Number of committed events.
    pub generation_count: u32,
    pub target_characters: usize,
}

impl SessionMetadata {
    fn new(config: &SessionConfig) -> Self {
        let now = Utc::now();
        Self {
            theme: config.theme.clone(),
            created_at: now,
            last_modified: now,
            generation_count: 0,
            target_characters: config.target_characters,
        }
    }
}

/// What happened when an event was processed.
#[derive(Debug, Clone, PartialEq)]
pub struct EventReport {
    pub event_number: u32,

    /// Characters registered from this event (opening event only).
    pub introduced: Vec<ProposedCharacter>,

    /// Lifecycle changes that took effect.
    pub changes: Vec<LifecycleChange>,

    /// References to characters who were already dead.
    pub usage: UsageCheck,

    /// Diagnostic entity consistency.
    pub consistency: ConsistencyScore,
}

impl EventReport {
    /// True when the event references no dead character.
    pub fn is_valid(&self) -> bool {
        self.usage.is_valid
    }
}

/// An analyzed event that has not been committed yet.
#[derive(Debug, Clone)]
pub struct StagedEvent {
    /// Number of events in the session when staging began.
    base_len: usize,
    registry: CharacterRegistry,
    chain: EventChain,
    report: EventReport,
}

impl StagedEvent {
    pub fn event_number(&self) -> u32 {
        self.report.event_number
    }

    pub fn report(&self) -> &EventReport {
        &self.report
    }

    /// The registry as it would be after commit.
    pub fn registry(&self) -> &CharacterRegistry {
        &self.registry
    }

    /// The chain as it would be after commit.
    pub fn chain(&self) -> &EventChain {
        &self.chain
    }
}

/// A single chronicle: one registry, one chain, one config.
pub struct ChronicleSession {
    session_id: String,
    metadata: SessionMetadata,
    config: SessionConfig,
    registry: CharacterRegistry,
    chain: EventChain,
    proposer: Box<dyn CharacterProposer + Send + Sync>,
    detector: Box<dyn LifecycleDetector + Send + Sync>,
}

impl std::fmt::Debug for ChronicleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChronicleSession")
            .field("session_id", &self.session_id)
            .field("metadata", &self.metadata)
            .field("characters", &self.registry.len())
            .field("events", &self.chain.len())
            .finish()
    }
}

impl ChronicleSession {
    /// Create an empty session with a generated id.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_id(format!("session_{}", Uuid::new_v4().simple()), config)
    }

    /// Create an empty session with a chosen id.
    pub fn with_id(session_id: impl Into<String>, config: SessionConfig) -> Self {
        let metadata = SessionMetadata::new(&config);
        let chain = EventChain::with_max_open_threads(config.max_open_threads);
        Self::from_parts(
            session_id.into(),
            metadata,
            config,
            CharacterRegistry::new(),
            chain,
        )
    }

    /// Reassemble a session from stored parts, with the default strategies.
    pub(crate) fn from_parts(
        session_id: String,
        metadata: SessionMetadata,
        config: SessionConfig,
        registry: CharacterRegistry,
        chain: EventChain,
    ) -> Self {
        Self {
            session_id,
            metadata,
            config,
            registry,
            chain,
            proposer: Box::new(HeuristicExtractor::new()),
            detector: Box::new(PatternDetector::new()),
        }
    }

    /// Replace the character proposal strategy.
    pub fn with_proposer(mut self, proposer: impl CharacterProposer + Send + Sync + 'static) -> Self {
        self.proposer = Box::new(proposer);
        self
    }

    /// Replace the lifecycle detection strategy.
    pub fn with_detector(mut self, detector: impl LifecycleDetector + Send + Sync + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &CharacterRegistry {
        &self.registry
    }

    /// Get a mutable reference to the registry.
    ///
    /// Use with caution - direct changes bypass event analysis.
    pub fn registry_mut(&mut self) -> &mut CharacterRegistry {
        &mut self.registry
    }

    pub fn chain(&self) -> &EventChain {
        &self.chain
    }

    /// Number the next event will get.
    pub fn next_event_number(&self) -> u32 {
        self.chain
            .last_event()
            .map(|e| e.event_number + 1)
            .unwrap_or(1)
    }

    /// Everything the generator needs for the next event.
    pub fn generation_request(&self, feedback: Vec<String>) -> GenerationRequest {
        GenerationRequest {
            theme: self.config.theme.clone(),
            event_number: self.next_event_number(),
            target_characters: self.config.target_characters,
            roster_summary: self.registry.roster_summary(),
            causation_context: self.chain.get_causation_context(self.config.context_window),
            open_threads_prompt: self.chain.open_threads_prompt(),
            feedback,
        }
    }

    /// Analyze generated text as the next event without changing the session.
    pub fn stage_event(&self, content: &str) -> Result<StagedEvent, SessionError> {
        let event_number = self.next_event_number();
        if content.trim().is_empty() {
            return Err(SessionError::EmptyEvent(event_number));
        }

        let mut registry = self.registry.clone();
        let mut chain = self.chain.clone();
        registry.set_current_event(event_number);

        let introduced = if chain.is_empty() {
            let proposed = self
                .proposer
                .propose_characters(content, Some(self.config.max_proposed_characters));
            for character in &proposed {
                registry.add_character(&character.name, character.role, event_number);
            }
            debug!(count = proposed.len(), "characters introduced by opening event");
            proposed
        } else {
            Vec::new()
        };

        chain.add_event(event_number, content);
        let changes =
            chain.analyze_event_and_update(event_number, &mut registry, self.detector.as_ref());
        let usage = registry.validate_event_text(content, event_number);
        let consistency = registry.calculate_entity_consistency(content);

        Ok(StagedEvent {
            base_len: self.chain.len(),
            registry,
            chain,
            report: EventReport {
                event_number,
                introduced,
                changes,
                usage,
                consistency,
            },
        })
    }

    /// Make a staged event part of the session.
    ///
    /// Fails if the session moved on since the event was staged.
    pub fn commit(&mut self, staged: StagedEvent) -> Result<EventReport, SessionError> {
        let expected = self.next_event_number();
        if staged.base_len != self.chain.len() || staged.event_number() != expected {
            return Err(SessionError::StaleStage {
                staged: staged.event_number(),
                expected,
            });
        }

        self.registry = staged.registry;
        self.chain = staged.chain;
        self.metadata.generation_count += 1;
        self.metadata.last_modified = Utc::now();

        info!(
            session = %self.session_id,
            event = staged.report.event_number,
            changes = staged.report.changes.len(),
            valid = staged.report.is_valid(),
            "event committed"
        );
        Ok(staged.report)
    }

    /// Stage and commit in one step.
    pub fn record_event(&mut self, content: &str) -> Result<EventReport, SessionError> {
        let staged = self.stage_event(content)?;
        self.commit(staged)
    }

    /// Human-readable overview of the session.
    pub fn session_summary(&self) -> String {
        let theme = if self.metadata.theme.is_empty() {
            "Not set"
        } else {
            &self.metadata.theme
        };
        format!(
            "SESSION: {}\n\
             Theme: {theme}\n\
             Created: {}\n\
             Last Modified: {}\n\
             Generations: {}\n\
             \n\
             Characters: {} total\n  \
             - Active: {}\n  \
             - Deceased: {}\n\
             \n\
             Events: {}\n\
             Open Threads: {}",
            self.session_id,
            self.metadata.created_at.to_rfc3339(),
            self.metadata.last_modified.to_rfc3339(),
            self.metadata.generation_count,
            self.registry.len(),
            self.registry.get_active_characters().len(),
            self.registry.get_deceased_characters().len(),
            self.chain.len(),
            self.chain.open_threads().len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::{CharacterRole, CharacterStatus};

    #[test]
    fn test_session_config() {
        let config = SessionConfig::new("Fall of the Iron Crown")
            .with_target_characters(3)
            .with_max_open_threads(4)
            .with_context_window(3)
            .with_max_attempts(0);

        assert_eq!(config.theme, "Fall of the Iron Crown");
        assert_eq!(config.target_characters, 3);
        assert_eq!(config.max_open_threads, 4);
        assert_eq!(config.context_window, 3);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.max_proposed_characters, DEFAULT_MAX_CHARACTERS);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: SessionConfig = serde_json::from_str(r#"{"theme": "Ashes"}"#).unwrap();
        assert_eq!(config.theme, "Ashes");
        assert_eq!(config.max_open_threads, DEFAULT_MAX_OPEN_THREADS);
    }

    #[test]
    fn test_opening_event_introduces_characters() {
        let mut session = ChronicleSession::new(SessionConfig::new("Court intrigue"));
        let report = session
            .record_event(
                "King Alaric declared a new law. Queen Lyra opposed King Alaric's decree, \
                 but the court sided with King Alaric.",
            )
            .unwrap();

        assert_eq!(report.event_number, 1);
        let names: Vec<_> = report.introduced.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"King Alaric"));
        assert!(names.contains(&"Queen Lyra"));
        assert!(session.registry().is_character_alive("Alaric"));
        assert_eq!(session.metadata().generation_count, 1);
        assert_eq!(session.next_event_number(), 2);
    }

    #[test]
    fn test_dropping_staged_event_leaves_session_untouched() {
        let mut session = ChronicleSession::new(SessionConfig::default());
        session
            .registry_mut()
            .add_character("King Alaric", CharacterRole::Main, 1);
        session.record_event("King Alaric held court.").unwrap();

        let registry_before = session.registry().clone();
        let staged = session
            .stage_event("King Alaric was assassinated by a hidden blade.")
            .unwrap();
        assert_eq!(staged.report().changes.len(), 1);
        assert_eq!(
            staged.registry().get_character("Alaric").unwrap().status,
            CharacterStatus::Dead
        );
        drop(staged);

        assert_eq!(session.registry(), &registry_before);
        assert_eq!(session.chain().len(), 1);
    }

    #[test]
    fn test_stale_stage_is_rejected() {
        let mut session = ChronicleSession::new(SessionConfig::default());
        let first = session.stage_event("The realm was quiet for a long while.").unwrap();
        let second = session.stage_event("The realm stayed quiet for another age.").unwrap();

        session.commit(first).unwrap();
        let err = session.commit(second).unwrap_err();
        assert!(matches!(
            err,
            SessionError::StaleStage {
                staged: 1,
                expected: 2
            }
        ));
    }

    #[test]
    fn test_empty_event_is_an_error() {
        let session = ChronicleSession::new(SessionConfig::default());
        assert!(matches!(
            session.stage_event("   \n "),
            Err(SessionError::EmptyEvent(1))
        ));
    }

    #[test]
    fn test_generation_request() {
        let mut session = ChronicleSession::new(SessionConfig::new("Ashes").with_target_characters(4));
        let request = session.generation_request(Vec::new());
        assert_eq!(request.event_number, 1);
        assert_eq!(request.target_characters, 4);
        assert!(request.roster_summary.is_empty());
        assert!(request.causation_context.starts_with("This is the first event"));

        session
            .registry_mut()
            .add_character("Queen Lyra", CharacterRole::Main, 1);
        let request = session.generation_request(vec!["King Alaric (died in Event 2)".into()]);
        assert!(request.roster_summary.contains("Queen Lyra"));
        assert_eq!(request.feedback.len(), 1);
    }

    #[test]
    fn test_session_summary() {
        let session = ChronicleSession::with_id("session_test", SessionConfig::new("Ashes"));
        let summary = session.session_summary();
        assert!(summary.starts_with("SESSION: session_test\nTheme: Ashes\n"));
        assert!(summary.contains("Characters: 0 total\n  - Active: 0\n  - Deceased: 0"));
        assert!(summary.ends_with("Open Threads: 0"));
    }
}
