//! Game events.
//!
//! This module defines the typed records an event log is made of. Each event
//! is applied to a `GameState` as a whole or not at all.

use crate::faction::Faction;
use crate::map::{LocationId, TerritoryId};
use crate::sequencer::{Direction, TurnModifier};
use serde::{Deserialize, Serialize};

/// Phases of a game turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Storm,
    SpiceBlow,
    Bidding,
    Revival,
    ShipmentAndMove,
    Battle,
    Collection,
    Contemplate,
}

impl Phase {
    /// Whether drawing forces from reserves or moving them is restricted to
    /// the current player
    pub fn gates_force_placement(&self) -> bool {
        matches!(self, Phase::ShipmentAndMove)
    }

    /// Whether revivals are restricted to players in this round's order
    pub fn gates_revival(&self) -> bool {
        matches!(self, Phase::Revival)
    }
}

/// Everything that can happen to the turn order and the force ledgers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameEvent {
    // ==================== Turn Order ====================
    /// Enter a phase with ordered turns. Without an explicit starting player
    /// the storm position decides who starts.
    StartPhase {
        phase: Phase,
        direction: Direction,
        starting_player: Option<Faction>,
        #[serde(default)]
        start_next_to_starting_player: bool,
        #[serde(default)]
        modifier: Option<TurnModifier>,
    },
    /// Install or clear a go-first/go-last override for this round
    SetTurnModifier { modifier: Option<TurnModifier> },
    /// A player gains or loses the ability to take turns
    SetEligibility { faction: Faction, eligible: bool },
    /// The current player finishes their turn
    EndTurn { faction: Faction },
    /// Begin the next round of the active phase
    EndRound,
    /// Leave the active phase
    EndPhase,
    /// Move the storm forward by a number of sectors
    MoveStorm { sectors: u8 },

    // ==================== Forces ====================
    /// Place forces, drawn from a homeworld or fresh from outside the game
    AddForces {
        faction: Faction,
        location: LocationId,
        regular: u32,
        elite: u32,
        from_reserve: bool,
    },
    /// Take forces off a location
    RemoveForces {
        faction: Faction,
        location: LocationId,
        regular: u32,
        elite: u32,
    },
    MoveForces {
        faction: Faction,
        from: LocationId,
        to: LocationId,
        regular: u32,
        elite: u32,
    },
    KillForces {
        faction: Faction,
        location: LocationId,
        regular: u32,
        elite: u32,
        in_battle: bool,
    },
    /// Kill forces anywhere in a territory
    KillForcesInTerritory {
        faction: Faction,
        territory: TerritoryId,
        regular: u32,
        elite: u32,
        in_battle: bool,
    },
    /// Send forces in a territory back to their homeworlds
    ForcesToReserves {
        faction: Faction,
        territory: TerritoryId,
        regular: u32,
        elite: u32,
    },
    Revive {
        faction: Faction,
        regular: u32,
        elite: u32,
    },
    /// Remove forces permanently; they never reach the tanks
    RemoveFromGame {
        faction: Faction,
        location: LocationId,
        regular: u32,
        elite: u32,
    },

    // ==================== Alliances ====================
    FormAlliance { faction: Faction, ally: Faction },
    BreakAlliance { faction: Faction },
}

impl GameEvent {
    /// The player this event is attributed to, if any
    pub fn faction(&self) -> Option<Faction> {
        match self {
            GameEvent::SetEligibility { faction, .. }
            | GameEvent::EndTurn { faction }
            | GameEvent::AddForces { faction, .. }
            | GameEvent::RemoveForces { faction, .. }
            | GameEvent::MoveForces { faction, .. }
            | GameEvent::KillForces { faction, .. }
            | GameEvent::KillForcesInTerritory { faction, .. }
            | GameEvent::ForcesToReserves { faction, .. }
            | GameEvent::Revive { faction, .. }
            | GameEvent::RemoveFromGame { faction, .. }
            | GameEvent::FormAlliance { faction, .. }
            | GameEvent::BreakAlliance { faction } => Some(*faction),
            GameEvent::StartPhase { .. }
            | GameEvent::SetTurnModifier { .. }
            | GameEvent::EndRound
            | GameEvent::EndPhase
            | GameEvent::MoveStorm { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = GameEvent::KillForces {
            faction: Faction::Blue,
            location: LocationId(4),
            regular: 2,
            elite: 3,
            in_battle: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "KillForces");
        assert_eq!(json["faction"], "Blue");
        assert_eq!(json["location"], 4);
    }

    #[test]
    fn test_start_phase_defaults() {
        let event: GameEvent = serde_json::from_str(
            r#"{"type":"StartPhase","phase":"Bidding","direction":"Clockwise","starting_player":null}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            GameEvent::StartPhase {
                phase: Phase::Bidding,
                direction: Direction::Clockwise,
                starting_player: None,
                start_next_to_starting_player: false,
                modifier: None,
            }
        );
    }

    #[test]
    fn test_attribution() {
        assert_eq!(
            GameEvent::EndTurn {
                faction: Faction::Red
            }
            .faction(),
            Some(Faction::Red)
        );
        assert_eq!(GameEvent::EndRound.faction(), None);
    }
}
