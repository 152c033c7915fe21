//! Character records tracked by the registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Lifecycle status of a character.
///
/// `Missing` and `Unknown` are reserved: they can be stored and loaded, but no
/// registry transition produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterStatus {
    Alive,
    Dead,
    Missing,
    Unknown,
}

impl CharacterStatus {
    /// Get the display name for this status.
    pub fn name(&self) -> &'static str {
        match self {
            CharacterStatus::Alive => "alive",
            CharacterStatus::Dead => "dead",
            CharacterStatus::Missing => "missing",
            CharacterStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CharacterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How central a character is to the narrative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterRole {
    #[serde(alias = "protagonist", alias = "antagonist")]
    Main,
    #[default]
    Supporting,
    Minor,
}

impl CharacterRole {
    /// Get the display name for this role.
    pub fn name(&self) -> &'static str {
        match self {
            CharacterRole::Main => "main",
            CharacterRole::Supporting => "supporting",
            CharacterRole::Minor => "minor",
        }
    }
}

impl std::fmt::Display for CharacterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CharacterRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" | "protagonist" | "antagonist" => Ok(CharacterRole::Main),
            "supporting" => Ok(CharacterRole::Supporting),
            "minor" => Ok(CharacterRole::Minor),
            other => Err(format!("unknown character role: {other}")),
        }
    }
}

/// A named character and its lifecycle history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Display name as first introduced.
    pub name: String,
    /// Current lifecycle status.
    pub status: CharacterStatus,
    /// Narrative role.
    pub role: CharacterRole,
    /// Event in which the character first appeared.
    pub first_appearance: u32,
    /// Most recent event that mentioned the character.
    pub last_mentioned: u32,
    /// Event of the most recent death. Not cleared by a revival.
    pub death_event: Option<u32>,
    /// Event of the most recent revival.
    pub revival_event: Option<u32>,
    /// Append-only audit log of deaths, revivals and other notable actions.
    #[serde(default)]
    pub notable_actions: Vec<String>,
    /// Relationships to other characters, by name.
    #[serde(default)]
    pub relationships: BTreeMap<String, String>,
}

impl Character {
    /// Create a new, living character.
    pub fn new(name: impl Into<String>, role: CharacterRole, event_num: u32) -> Self {
        Self {
            name: name.into(),
            status: CharacterStatus::Alive,
            role,
            first_appearance: event_num,
            last_mentioned: event_num,
            death_event: None,
            revival_event: None,
            notable_actions: Vec::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status == CharacterStatus::Alive
    }

    pub fn is_dead(&self) -> bool {
        self.status == CharacterStatus::Dead
    }

    /// Mark the character dead. Callers are responsible for the alive check.
    pub(crate) fn kill(&mut self, event_num: u32, cause: &str) {
        let cause = if cause.trim().is_empty() {
            "unknown causes"
        } else {
            cause.trim()
        };
        self.status = CharacterStatus::Dead;
        self.death_event = Some(event_num);
        self.last_mentioned = self.last_mentioned.max(event_num);
        self.notable_actions
            .push(format!("Died: {cause} (Event {event_num})"));
    }

    /// Bring the character back. Callers are responsible for the dead check.
    pub(crate) fn revive(&mut self, event_num: u32, reason: &str) {
        self.status = CharacterStatus::Alive;
        self.revival_event = Some(event_num);
        self.last_mentioned = self.last_mentioned.max(event_num);
        self.notable_actions
            .push(format!("Revived: {} (Event {event_num})", reason.trim()));
    }

    /// Update the last mentioned event.
    pub fn touch(&mut self, event_num: u32) {
        self.last_mentioned = self.last_mentioned.max(event_num);
    }

    /// Record a notable action.
    pub fn add_action(&mut self, action: &str, event_num: u32) {
        self.notable_actions
            .push(format!("{} (Event {event_num})", action.trim()));
    }

    /// The most recent audit log entry, if any.
    pub fn last_action(&self) -> Option<&str> {
        self.notable_actions.last().map(String::as_str)
    }

    /// Number of recorded deaths, counted from the audit log.
    pub fn death_count(&self) -> usize {
        self.notable_actions
            .iter()
            .filter(|a| a.starts_with("Died: "))
            .count()
    }
}
