//! Text generation seam and the driver that feeds generated events into a session.
//!
//! The engine never talks to a model itself. Anything that can turn a
//! [`GenerationRequest`] into prose implements [`NarrativeGenerator`], and
//! [`Chronicler`] handles the rest: it stages each attempt, asks for a rewrite
//! when the text brings back a dead character, and commits the result.

use crate::session::{ChronicleSession, EventReport, SessionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Errors reported by a generator.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Generation failed: {0}")]
    Failed(String),

    #[error("Generator has no more output")]
    Exhausted,
}

/// Everything a generator needs to write the next event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub theme: String,
    pub event_number: u32,
    pub target_characters: usize,
    /// Active and deceased characters. Empty before the first event.
    pub roster_summary: String,
    /// Summaries and hooks of the most recent events.
    pub causation_context: String,
    pub open_threads_prompt: String,
    /// Problems with the previous attempt at this event, if any.
    pub feedback: Vec<String>,
}

impl GenerationRequest {
    /// True when this request follows a rejected attempt.
    pub fn is_retry(&self) -> bool {
        !self.feedback.is_empty()
    }
}

/// Produces the prose for one event.
#[async_trait]
pub trait NarrativeGenerator: Send {
    async fn generate(&mut self, request: &GenerationRequest) -> Result<String, GeneratorError>;
}

/// Result of driving one event through a [`Chronicler`].
#[derive(Debug, Clone)]
pub struct ChronicleOutcome {
    pub report: EventReport,
    /// Generation calls made for this event.
    pub attempts: u32,
    /// False when every attempt referenced a dead character and the last one was kept.
    pub clean: bool,
}

/// Drives a generator against a session, one event at a time.
pub struct Chronicler<G> {
    generator: G,
    session: ChronicleSession,
}

impl<G: NarrativeGenerator> Chronicler<G> {
    pub fn new(generator: G, session: ChronicleSession) -> Self {
        Self { generator, session }
    }

    pub fn session(&self) -> &ChronicleSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ChronicleSession {
        &mut self.session
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn into_parts(self) -> (G, ChronicleSession) {
        (self.generator, self.session)
    }

    /// Generate, check and commit the next event.
    ///
    /// Attempts whose text references a dead character are retried with the
    /// violations as feedback, up to the configured attempt limit. If none is
    /// clean the last staged attempt is committed anyway. Blank output counts
    /// as a failed attempt.
    pub async fn next_event(&mut self) -> Result<ChronicleOutcome, SessionError> {
        let max_attempts = self.session.config().max_attempts.max(1);
        let mut feedback = Vec::new();
        let mut fallback = None;

        for attempt in 1..=max_attempts {
            let request = self.session.generation_request(std::mem::take(&mut feedback));
            let text = self.generator.generate(&request).await?;

            let staged = match self.session.stage_event(&text) {
                Ok(staged) => staged,
                Err(SessionError::EmptyEvent(event)) => {
                    warn!(event, attempt, "generator returned an empty event");
                    feedback = vec!["The previous attempt was empty.".to_string()];
                    continue;
                }
                Err(e) => return Err(e),
            };

            if staged.report().is_valid() {
                let report = self.session.commit(staged)?;
                return Ok(ChronicleOutcome {
                    report,
                    attempts: attempt,
                    clean: true,
                });
            }

            warn!(
                event = staged.event_number(),
                attempt,
                violations = ?staged.report().usage.violations,
                "generated event references dead characters"
            );
            feedback = staged
                .report()
                .usage
                .violations
                .iter()
                .map(|v| format!("Dead character referenced: {v}"))
                .collect();
            fallback = Some(staged);
        }

        match fallback {
            Some(staged) => {
                info!(
                    event = staged.event_number(),
                    "no clean attempt, keeping the last one"
                );
                let report = self.session.commit(staged)?;
                Ok(ChronicleOutcome {
                    report,
                    attempts: max_attempts,
                    clean: false,
                })
            }
            None => Err(SessionError::EmptyEvent(self.session.next_event_number())),
        }
    }

    /// Generate `count` events in a row.
    pub async fn run(&mut self, count: usize) -> Result<Vec<ChronicleOutcome>, SessionError> {
        let mut outcomes = Vec::with_capacity(count);
        for _ in 0..count {
            outcomes.push(self.next_event().await?);
        }
        Ok(outcomes)
    }
}
