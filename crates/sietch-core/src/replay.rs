//! Event logs and deterministic replay.
//!
//! An [`EventLog`] is the persisted form of a game: a version number selecting
//! the rule revision, the setup, and every accepted event in order. Replaying
//! a log from its setup reconstructs the exact same state.

use crate::error::RulesError;
use crate::events::GameEvent;
use crate::game::{GameSetup, GameState};
use crate::revision::{RuleRevision, LATEST_VERSION};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Errors raised while loading or replaying a log
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Malformed event log: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Cannot set up game: {0}")]
    Setup(RulesError),

    #[error("Event {index} rejected: {source}")]
    Rejected {
        index: usize,
        #[source]
        source: RulesError,
    },
}

/// A recorded game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    pub game_id: Uuid,
    /// Rules version the game was recorded under
    pub version: u32,
    pub setup: GameSetup,
    #[serde(default)]
    pub events: Vec<GameEvent>,
}

impl EventLog {
    /// Start an empty log under the latest rules
    pub fn new(setup: GameSetup) -> Self {
        Self {
            game_id: Uuid::new_v4(),
            version: LATEST_VERSION,
            setup,
            events: Vec::new(),
        }
    }

    pub fn revision(&self) -> Result<RuleRevision, RulesError> {
        RuleRevision::from_version(self.version)
    }

    /// Fresh state for this log's setup and revision
    pub fn initial_state(&self) -> Result<GameState, RulesError> {
        GameState::new(&self.setup, self.revision()?)
    }

    /// Apply an event to a live game and append it to the log if accepted
    pub fn record(&mut self, game: &mut GameState, event: GameEvent) -> Result<(), RulesError> {
        game.apply_event(&event)?;
        self.events.push(event);
        Ok(())
    }

    /// Rebuild the final state from scratch
    pub fn replay(&self) -> Result<GameState, ReplayError> {
        self.replay_until(self.events.len())
    }

    /// Rebuild the state after the first `count` events
    pub fn replay_until(&self, count: usize) -> Result<GameState, ReplayError> {
        let mut game = self.initial_state().map_err(ReplayError::Setup)?;

        for (index, event) in self.events.iter().take(count).enumerate() {
            game.apply_event(event)
                .map_err(|source| ReplayError::Rejected { index, source })?;
        }

        info!(
            game_id = %self.game_id,
            version = self.version,
            events = game.events_applied(),
            "log replayed"
        );
        Ok(game)
    }

    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        let log: EventLog = serde_json::from_str(json)?;
        debug!(game_id = %log.game_id, events = log.events.len(), "log parsed");
        Ok(log)
    }

    pub fn to_json(&self) -> Result<String, ReplayError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
