//! Sietch - a rules engine for a desert-planet strategy board game
//!
//! This crate provides the core game logic, including:
//! - Turn sequencing within a phase, with go-first/go-last overrides
//! - Per-faction force ledgers across locations, homeworlds and tanks
//! - Homeworld thresholds and alliance co-occupation
//! - Event application with rollback and deterministic replay
//!
//! # Rule revisions
//!
//! Logs carry a version number. Versions before
//! [`revision::CURRENT_PLAYER_RECOMPUTED_SINCE`] replay with the legacy turn
//! algorithm, which caches the current player between transitions; later
//! versions recompute it on every query.
//!
//! # Modules
//!
//! - [`faction`]: Factions, seats and per-faction rules
//! - [`map`]: Locations, territories and homeworlds
//! - [`battalion`]: A faction's forces at one location
//! - [`ledger`]: Force accounting and the death sequence
//! - [`revision`]: Rule revisions and their turn algorithms
//! - [`sequencer`]: Turn order within a phase
//! - [`events`]: Game events
//! - [`game`]: Game state and event application
//! - [`replay`]: Event logs

pub mod battalion;
pub mod error;
pub mod events;
pub mod faction;
pub mod game;
pub mod ledger;
pub mod map;
pub mod replay;
pub mod revision;
pub mod sequencer;

// Re-export commonly used types
pub use battalion::Battalion;
pub use error::{ErrorKind, RulesError, TokenKind};
pub use events::{GameEvent, Phase};
pub use faction::{Faction, Seat};
pub use game::{GameSetup, GameState, PlayerState};
pub use ledger::{DeathClock, ForceLedger, Tanks};
pub use map::{Homeworld, Location, LocationId, Map, Territory, TerritoryId, ThresholdMode};
pub use replay::{EventLog, ReplayError};
pub use revision::{RuleRevision, TurnRules, LATEST_VERSION};
pub use sequencer::{
    determine_first_player, Direction, Eligibility, SequenceStart, TurnModifier, TurnPosition,
    TurnSequencer,
};
