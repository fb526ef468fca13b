//! Rule revisions.
//!
//! Event logs recorded under older rules must replay exactly as they played.
//! A [`RuleRevision`] is resolved once per game from the log's version number
//! into a [`TurnRules`] table, and the sequencer only ever calls through that
//! table.

use crate::error::RulesError;
use crate::faction::Faction;
use crate::sequencer::{self, Eligibility, TurnSequencer};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// First log version whose current player is recomputed from the played list
pub const CURRENT_PLAYER_RECOMPUTED_SINCE: u32 = 150;

/// Version written into newly created logs
pub const LATEST_VERSION: u32 = 163;

/// Rule variant a game was recorded under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleRevision {
    /// The current player is cached and only updated at turn transitions
    Legacy,
    /// The current player is derived from the played list on every query
    Current,
}

impl RuleRevision {
    /// Select the revision a log version was recorded under
    pub fn from_version(version: u32) -> Result<Self, RulesError> {
        match version {
            0 => Err(RulesError::UnsupportedVersion(version)),
            v if v < CURRENT_PLAYER_RECOMPUTED_SINCE => Ok(RuleRevision::Legacy),
            v if v <= LATEST_VERSION => Ok(RuleRevision::Current),
            v => Err(RulesError::UnsupportedVersion(v)),
        }
    }

    /// Resolve this revision into its algorithm table
    pub fn turn_rules(self) -> TurnRules {
        match self {
            RuleRevision::Legacy => TurnRules {
                revision: self,
                current_player: sequencer::cached_current_player,
                after_transition: sequencer::refresh_cached_current,
            },
            RuleRevision::Current => TurnRules {
                revision: self,
                current_player: sequencer::recomputed_current_player,
                after_transition: sequencer::clear_cached_current,
            },
        }
    }
}

type CurrentPlayerFn = fn(&TurnSequencer, &dyn Eligibility) -> Option<Faction>;
type TransitionFn = fn(&mut TurnSequencer, &dyn Eligibility);

/// Turn-order algorithms selected by a [`RuleRevision`]
#[derive(Clone, Copy)]
pub struct TurnRules {
    revision: RuleRevision,
    /// Who is to act now
    pub current_player: CurrentPlayerFn,
    /// Called after every turn transition (start, advance, next round)
    pub after_transition: TransitionFn,
}

impl TurnRules {
    pub fn revision(&self) -> RuleRevision {
        self.revision
    }
}

impl std::fmt::Debug for TurnRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TurnRules").field(&self.revision).finish()
    }
}

impl PartialEq for TurnRules {
    fn eq(&self, other: &Self) -> bool {
        self.revision == other.revision
    }
}

impl Eq for TurnRules {}

// Only the revision is stored; the table is rebuilt on load.
impl Serialize for TurnRules {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.revision.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TurnRules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RuleRevision::deserialize(deserializer).map(RuleRevision::turn_rules)
    }
}
