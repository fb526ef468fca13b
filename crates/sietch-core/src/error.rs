//! Rejection reasons for ledger, sequencer and event operations.

use crate::faction::Faction;
use crate::map::{LocationId, TerritoryId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad category of a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Caller asked for something the state cannot satisfy; nothing changed
    InvalidOperation,
    /// An event was attributed to a player whose turn it is not
    IllegalTurn,
    /// Engine defect: a conservation or sparsity invariant broke
    InvariantViolation,
}

/// Errors that can occur when applying operations or events
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RulesError {
    #[error("{faction:?} has {available} {kind} at {location:?}, {requested} requested")]
    InsufficientForces {
        faction: Faction,
        location: LocationId,
        kind: TokenKind,
        requested: u32,
        available: u32,
    },

    #[error("{faction:?} has {available} forces in {territory:?}, {requested} requested")]
    InsufficientForcesInTerritory {
        faction: Faction,
        territory: TerritoryId,
        requested: u32,
        available: u32,
    },

    #[error("{faction:?} has {available} {kind} in the tanks, {requested} requested")]
    InsufficientTanks {
        faction: Faction,
        kind: TokenKind,
        requested: u32,
        available: u32,
    },

    #[error("No homeworld of {faction:?} holds {requested} {kind}")]
    NoReserve {
        faction: Faction,
        kind: TokenKind,
        requested: u32,
    },

    #[error("Unknown location {0:?}")]
    UnknownLocation(LocationId),

    #[error("Unknown territory {0:?}")]
    UnknownTerritory(TerritoryId),

    #[error("{0:?} is not a homeworld")]
    NotAHomeworld(LocationId),

    #[error("{0:?} is already linked to a territory")]
    AlreadyLinked(LocationId),

    #[error("{0:?} is not in this game")]
    UnknownFaction(Faction),

    #[error("{0:?} and {1:?} cannot form an alliance")]
    InvalidAlliance(Faction, Faction),

    #[error("{0:?} has no ally")]
    NotAllied(Faction),

    #[error("Invalid game setup: {0}")]
    InvalidSetup(String),

    #[error("No phase with ordered turns is active")]
    NoActiveSequence,

    #[error("Turn order overrides must be set before anyone plays this round")]
    RoundInProgress,

    #[error("Not {actual:?}'s turn (current: {expected:?})")]
    NotYourTurn {
        expected: Option<Faction>,
        actual: Faction,
    },

    #[error("{0:?} is not in the turn order")]
    NotInTurnOrder(Faction),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Unsupported event log version {0}")]
    UnsupportedVersion(u32),
}

impl RulesError {
    /// Map this error onto the rejection taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            RulesError::NotYourTurn { .. } | RulesError::NotInTurnOrder(_) => {
                ErrorKind::IllegalTurn
            }
            RulesError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            _ => ErrorKind::InvalidOperation,
        }
    }
}

/// Which of the two token pools an operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Regular,
    Elite,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Regular => write!(f, "regular forces"),
            TokenKind::Elite => write!(f, "elite forces"),
        }
    }
}
