//! Testing utilities for chronicle sessions.
//!
//! This module provides tools for integration testing:
//! - `ScriptedGenerator` for deterministic generation without a model
//! - `TestHarness` for scripted event sequences
//! - Assertion helpers for verifying character state

use crate::generator::{GenerationRequest, GeneratorError, NarrativeGenerator};
use crate::narrative::{CharacterRole, CharacterStatus};
use crate::session::{ChronicleSession, EventReport, SessionConfig};
use async_trait::async_trait;
use std::collections::VecDeque;

/// A generator that returns scripted events in order.
///
/// Every request it receives is recorded so tests can inspect the context
/// and feedback that were sent.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    responses: VecDeque<String>,
    requests: Vec<GenerationRequest>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            requests: Vec::new(),
        }
    }

    /// Add a response to the queue.
    pub fn queue_response(&mut self, text: impl Into<String>) {
        self.responses.push_back(text.into());
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> &[GenerationRequest] {
        &self.requests
    }

    pub fn remaining(&self) -> usize {
        self.responses.len()
    }
}

#[async_trait]
impl NarrativeGenerator for ScriptedGenerator {
    async fn generate(&mut self, request: &GenerationRequest) -> Result<String, GeneratorError> {
        self.requests.push(request.clone());
        self.responses.pop_front().ok_or(GeneratorError::Exhausted)
    }
}

/// Test harness for running event sequences against a session.
pub struct TestHarness {
    /// The session under test.
    pub session: ChronicleSession,
}

impl TestHarness {
    /// Create a harness with an empty session.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::new("Test Chronicle"))
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            session: ChronicleSession::with_id("session_test", config),
        }
    }

    /// Register a character directly, as if introduced in event 1.
    pub fn with_character(mut self, name: &str, role: CharacterRole) -> Self {
        self.session.registry_mut().add_character(name, role, 1);
        self
    }

    /// Record the next event.
    ///
    /// Panics if the session rejects the text.
    #[track_caller]
    pub fn event(&mut self, text: &str) -> EventReport {
        match self.session.record_event(text) {
            Ok(report) => report,
            Err(e) => panic!("Event was rejected: {e}"),
        }
    }

    /// Current status of a character, if tracked.
    pub fn status(&self, name: &str) -> Option<CharacterStatus> {
        self.session
            .registry()
            .get_character(name)
            .map(|c| c.status)
    }

    pub fn character_count(&self) -> usize {
        self.session.registry().len()
    }

    pub fn event_count(&self) -> usize {
        self.session.chain().len()
    }

    /// Names of everyone currently dead.
    pub fn deceased(&self) -> Vec<String> {
        self.session
            .registry()
            .get_deceased_characters()
            .into_iter()
            .map(|c| c.name.clone())
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert that the registry tracks a character with the given name.
#[track_caller]
pub fn assert_tracked(harness: &TestHarness, name: &str) {
    assert!(
        harness.status(name).is_some(),
        "Expected character '{name}' to be tracked"
    );
}

/// Assert that a character is tracked and alive.
#[track_caller]
pub fn assert_alive(harness: &TestHarness, name: &str) {
    assert_eq!(
        harness.status(name),
        Some(CharacterStatus::Alive),
        "Expected '{name}' to be alive"
    );
}

/// Assert that a character is tracked and dead.
#[track_caller]
pub fn assert_dead(harness: &TestHarness, name: &str) {
    assert_eq!(
        harness.status(name),
        Some(CharacterStatus::Dead),
        "Expected '{name}' to be dead"
    );
}

/// Assert that a character died in the given event.
#[track_caller]
pub fn assert_died_in(harness: &TestHarness, name: &str, event: u32) {
    let death_event = harness
        .session
        .registry()
        .get_character(name)
        .and_then(|c| c.death_event);
    assert_eq!(
        death_event,
        Some(event),
        "Expected '{name}' to have died in event {event}"
    );
}

/// Assert that a report flagged exactly these violations.
#[track_caller]
pub fn assert_violations(report: &EventReport, expected: &[&str]) {
    assert_eq!(
        report.usage.violations, expected,
        "Unexpected violations for event {}",
        report.event_number
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_generator_records_requests() {
        let mut generator = ScriptedGenerator::new(["First.", "Second."]);
        let session = ChronicleSession::new(SessionConfig::new("Ashes"));

        let request = session.generation_request(Vec::new());
        assert_eq!(generator.generate(&request).await.unwrap(), "First.");
        assert_eq!(generator.generate(&request).await.unwrap(), "Second.");
        assert!(matches!(
            generator.generate(&request).await,
            Err(GeneratorError::Exhausted)
        ));
        assert_eq!(generator.requests().len(), 3);
        assert_eq!(generator.requests()[0].theme, "Ashes");
    }

    #[test]
    fn test_harness_flow() {
        let mut harness = TestHarness::new()
            .with_character("King Alaric", CharacterRole::Main)
            .with_character("Queen Lyra", CharacterRole::Main);

        harness.event("King Alaric and Queen Lyra held court together.");
        let report = harness.event("King Alaric was slain by an assassin's blade.");

        assert_eq!(report.changes.len(), 1);
        assert_dead(&harness, "King Alaric");
        assert_died_in(&harness, "Alaric", 2);
        assert_alive(&harness, "Queen Lyra");
        assert_eq!(harness.deceased(), vec!["King Alaric"]);
        assert_eq!(harness.event_count(), 2);
    }
}
