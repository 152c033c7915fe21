//! Session persistence.
//!
//! Sessions are stored as pretty-printed JSON, one file per session, in a
//! directory managed by [`SessionStore`]. A record is checked before it is
//! handed back: wrong versions and broken registry or chain invariants are
//! errors, never a half-loaded session.

use crate::narrative::{CharacterRegistry, EventChain};
use crate::session::{ChronicleSession, SessionConfig, SessionMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Invalid session name: {0:?}")]
    InvalidName(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Corrupt session record: {0}")]
    Corrupt(String),
}

/// Current save file version.
pub const SAVE_VERSION: u32 = 1;

/// A stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    /// Save format version for compatibility checking.
    pub version: u32,

    pub saved_at: DateTime<Utc>,

    pub session_id: String,

    pub metadata: SessionMetadata,

    #[serde(default)]
    pub config: SessionConfig,

    pub characters: CharacterRegistry,

    pub chain: EventChain,
}

impl SavedSession {
    /// Snapshot a session.
    pub fn new(session: &ChronicleSession) -> Self {
        Self {
            version: SAVE_VERSION,
            saved_at: Utc::now(),
            session_id: session.session_id().to_string(),
            metadata: session.metadata().clone(),
            config: session.config().clone(),
            characters: session.registry().clone(),
            chain: session.chain().clone(),
        }
    }

    /// Parse and check a stored record.
    pub fn from_json(content: &str) -> Result<Self, PersistError> {
        let saved: Self = serde_json::from_str(content)?;

        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        saved
            .characters
            .check_invariants()
            .map_err(PersistError::Corrupt)?;
        saved.chain.check_invariants().map_err(PersistError::Corrupt)?;

        Ok(saved)
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Turn the record back into a live session with the default strategies.
    pub fn into_session(self) -> ChronicleSession {
        ChronicleSession::from_parts(
            self.session_id,
            self.metadata,
            self.config,
            self.characters,
            self.chain,
        )
    }
}

/// Listing entry for a stored session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub session_id: String,
    pub path: PathBuf,
    pub theme: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub generation_count: u32,
    pub events: usize,
    pub characters: usize,
}

/// Directory of saved sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save under the session id. Returns the file written.
    pub async fn save(&self, session: &ChronicleSession) -> Result<PathBuf, PersistError> {
        self.write(session, session.session_id()).await
    }

    /// Save under a custom name.
    pub async fn save_as(
        &self,
        session: &ChronicleSession,
        name: &str,
    ) -> Result<PathBuf, PersistError> {
        self.write(session, &sanitize(name)).await
    }

    async fn write(&self, session: &ChronicleSession, stem: &str) -> Result<PathBuf, PersistError> {
        let stem = checked_name(stem)?;
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{stem}.json"));
        let content = SavedSession::new(session).to_json()?;
        fs::write(&path, content).await?;
        info!(session = session.session_id(), path = %path.display(), "session saved");
        Ok(path)
    }

    /// Load a session by id or file stem.
    pub async fn load(&self, session_id: &str) -> Result<ChronicleSession, PersistError> {
        let path = self
            .locate(session_id)
            .await?
            .ok_or_else(|| PersistError::NotFound(session_id.to_string()))?;

        let content = fs::read_to_string(&path).await?;
        let saved = SavedSession::from_json(&content)?;
        debug!(
            session = %saved.session_id,
            events = saved.chain.len(),
            characters = saved.characters.len(),
            "session loaded"
        );
        Ok(saved.into_session())
    }

    /// All readable sessions, most recently modified first.
    pub async fn list(&self) -> Result<Vec<SessionInfo>, PersistError> {
        if !fs::try_exists(&self.dir).await? {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().map(|e| e == "json").unwrap_or(false) {
                continue;
            }

            let saved = match fs::read_to_string(&path).await {
                Ok(content) => SavedSession::from_json(&content),
                Err(e) => Err(e.into()),
            };
            match saved {
                Ok(saved) => sessions.push(SessionInfo {
                    session_id: saved.session_id,
                    path,
                    theme: saved.metadata.theme,
                    created_at: saved.metadata.created_at,
                    last_modified: saved.metadata.last_modified,
                    generation_count: saved.metadata.generation_count,
                    events: saved.chain.len(),
                    characters: saved.characters.len(),
                }),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable session"),
            }
        }

        sessions.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(sessions)
    }

    /// Delete a stored session. Returns false if there was nothing to delete.
    pub async fn delete(&self, session_id: &str) -> Result<bool, PersistError> {
        let session_id = checked_name(session_id)?;
        let path = self.dir.join(format!("{session_id}.json"));
        if !fs::try_exists(&path).await? {
            return Ok(false);
        }
        fs::remove_file(&path).await?;
        info!(session = session_id, "session deleted");
        Ok(true)
    }

    async fn locate(&self, session_id: &str) -> Result<Option<PathBuf>, PersistError> {
        let session_id = checked_name(session_id)?;
        for candidate in [
            self.dir.join(format!("{session_id}.json")),
            self.dir.join(session_id),
        ] {
            if fs::try_exists(&candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

/// A session name must stay a single file name inside the store directory.
fn checked_name(name: &str) -> Result<&str, PersistError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(name),
        _ => Err(PersistError::InvalidName(name.to_string())),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Plain-text report of a session: overview, roster and event chain.
pub fn readable_summary(session: &ChronicleSession) -> String {
    let rule = "=".repeat(60);
    let roster = session.registry().roster_summary();
    let roster = if roster.is_empty() {
        "No characters tracked yet."
    } else {
        roster.as_str()
    };

    format!(
        "{rule}\nSESSION SUMMARY: {id}\n{rule}\n\n{summary}\n\n\
         {rule}\nCHARACTER ROSTER\n{rule}\n\n{roster}\n\n\
         {rule}\nEVENT CHAIN\n{rule}\n\n{chain}\n",
        id = session.session_id(),
        summary = session.session_summary(),
        chain = session.chain().chain_summary(),
    )
}

/// Write [`readable_summary`] to a file.
pub async fn export_readable_summary(
    session: &ChronicleSession,
    path: impl AsRef<Path>,
) -> Result<(), PersistError> {
    fs::write(path, readable_summary(session)).await?;
    Ok(())
}
