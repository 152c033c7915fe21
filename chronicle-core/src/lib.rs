//! Narrative state tracking for incrementally generated chronologies.
//!
//! This crate provides:
//! - A character lifecycle registry with fuzzy name resolution
//! - A causal event chain with summaries, hooks and open plot threads
//! - Heuristic detection of introductions, deaths and revivals in prose
//! - Validation that flags dead characters reappearing
//! - Session persistence
//!
//! # Quick Start
//!
//! ```ignore
//! use chronicle_core::{ChronicleSession, Chronicler, SessionConfig, SessionStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::new("The Fall of the Iron Crown")
//!         .with_target_characters(4);
//!
//!     let mut chronicler = Chronicler::new(MyGenerator::new(), ChronicleSession::new(config));
//!
//!     let outcome = chronicler.next_event().await?;
//!     for change in &outcome.report.changes {
//!         println!("{} {}", change.character, change.kind);
//!     }
//!
//!     SessionStore::new("sessions").save(chronicler.session()).await?;
//!     Ok(())
//! }
//! ```

pub mod generator;
pub mod narrative;
pub mod persist;
pub mod session;
pub mod testing;

// Primary public API
pub use generator::{
    ChronicleOutcome, Chronicler, GenerationRequest, GeneratorError, NarrativeGenerator,
};
pub use narrative::{
    Character, CharacterRegistry, CharacterRole, CharacterStatus, EventChain, LifecycleChange,
    LifecycleKind,
};
pub use persist::{PersistError, SessionStore};
pub use session::{ChronicleSession, EventReport, SessionConfig, SessionError, StagedEvent};
pub use testing::{ScriptedGenerator, TestHarness};
