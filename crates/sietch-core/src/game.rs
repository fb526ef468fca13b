//! Core game state.
//!
//! This module contains the `GameState` struct, which owns every faction's
//! force ledger and the turn order of the active phase, and applies events to
//! them one at a time.

use crate::error::{ErrorKind, RulesError, TokenKind};
use crate::events::{GameEvent, Phase};
use crate::faction::{Faction, Seat};
use crate::ledger::{DeathClock, ForceLedger};
use crate::map::{LocationId, Map, TerritoryId, TOTAL_SECTORS};
use crate::revision::{RuleRevision, TurnRules};
use crate::sequencer::{determine_first_player, SequenceStart, TurnSequencer};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, warn};

/// Seats around a standard table
pub const DEFAULT_TABLE_SEATS: u8 = 6;

fn default_table_seats() -> u8 {
    DEFAULT_TABLE_SEATS
}

/// How a game is set up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSetup {
    /// Factions in play
    pub factions: Vec<Faction>,
    /// Explicit seat per faction; drawn from `seed` when absent
    #[serde(default)]
    pub seats: Option<Vec<Seat>>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_table_seats")]
    pub table_seats: u8,
    /// Initial storm sector
    #[serde(default)]
    pub storm_sector: u8,
}

impl GameSetup {
    /// A setup with seats drawn from a seed
    pub fn new(factions: Vec<Faction>, seed: u64) -> Self {
        Self {
            factions,
            seats: None,
            seed,
            table_seats: DEFAULT_TABLE_SEATS,
            storm_sector: 0,
        }
    }

    /// A setup with explicit seats
    pub fn seated(factions: Vec<Faction>, seats: Vec<Seat>) -> Self {
        Self {
            seats: Some(seats),
            ..Self::new(factions, 0)
        }
    }

    fn validate(&self) -> Result<(), RulesError> {
        if self.factions.is_empty() {
            return Err(RulesError::InvalidSetup("no factions".into()));
        }
        let unique: BTreeSet<Faction> = self.factions.iter().copied().collect();
        if unique.len() != self.factions.len() {
            return Err(RulesError::InvalidSetup("duplicate faction".into()));
        }
        if self.factions.len() > usize::from(self.table_seats) {
            return Err(RulesError::InvalidSetup(format!(
                "{} factions at a table of {}",
                self.factions.len(),
                self.table_seats
            )));
        }
        if self.storm_sector >= TOTAL_SECTORS {
            return Err(RulesError::InvalidSetup(format!(
                "storm sector {} out of range",
                self.storm_sector
            )));
        }
        if let Some(seats) = &self.seats {
            let unique: BTreeSet<Seat> = seats.iter().copied().collect();
            if seats.len() != self.factions.len()
                || unique.len() != seats.len()
                || seats.iter().any(|s| *s >= self.table_seats)
            {
                return Err(RulesError::InvalidSetup(format!("invalid seats {:?}", seats)));
            }
        }
        Ok(())
    }

    /// Seat of each faction, in faction order
    fn assign_seats(&self) -> Vec<Seat> {
        match &self.seats {
            Some(seats) => seats.clone(),
            None => {
                let mut seats: Vec<Seat> = (0..self.table_seats).collect();
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
                seats.shuffle(&mut rng);
                seats.truncate(self.factions.len());
                seats
            }
        }
    }
}

/// A single player's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub faction: Faction,
    pub seat: Seat,
    pub ledger: ForceLedger,
}

/// The complete game state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    map: Map,
    /// Turn-order algorithms, resolved once from the rule revision
    rules: TurnRules,
    table_seats: u8,
    players: Vec<PlayerState>,
    phase: Option<Phase>,
    sequencer: Option<TurnSequencer>,
    /// Players currently unable to take turns
    ineligible: BTreeSet<Faction>,
    /// Symmetric ally relation
    alliances: BTreeMap<Faction, Faction>,
    storm_sector: u8,
    death_clock: DeathClock,
    events_applied: u64,
}

impl GameState {
    /// Create a game on the standard map with every faction's starting forces
    /// on its homeworlds
    pub fn new(setup: &GameSetup, revision: RuleRevision) -> Result<Self, RulesError> {
        setup.validate()?;
        let map = Map::standard(&setup.factions)?;

        let players = setup
            .factions
            .iter()
            .zip(setup.assign_seats())
            .map(|(&faction, seat)| -> Result<PlayerState, RulesError> {
                let mut ledger = ForceLedger::new(faction, &map);
                let (regular, elite) = faction.starting_forces();
                deposit_starting_forces(&mut ledger, &map, TokenKind::Regular, regular)?;
                deposit_starting_forces(&mut ledger, &map, TokenKind::Elite, elite)?;
                Ok(PlayerState {
                    faction,
                    seat,
                    ledger,
                })
            })
            .collect::<Result<Vec<_>, RulesError>>()?;

        debug!(?revision, factions = ?setup.factions, "game created");

        Ok(Self {
            map,
            rules: revision.turn_rules(),
            table_seats: setup.table_seats,
            players,
            phase: None,
            sequencer: None,
            ineligible: BTreeSet::new(),
            alliances: BTreeMap::new(),
            storm_sector: setup.storm_sector,
            death_clock: DeathClock::new(),
            events_applied: 0,
        })
    }

    // ==================== Queries ====================

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn revision(&self) -> RuleRevision {
        self.rules.revision()
    }

    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    /// Get a player by faction
    pub fn player(&self, faction: Faction) -> Result<&PlayerState, RulesError> {
        self.players
            .iter()
            .find(|p| p.faction == faction)
            .ok_or(RulesError::UnknownFaction(faction))
    }

    pub fn ledger(&self, faction: Faction) -> Result<&ForceLedger, RulesError> {
        self.player(faction).map(|p| &p.ledger)
    }

    /// Phase with ordered turns, if one is active
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn sequencer(&self) -> Option<&TurnSequencer> {
        self.sequencer.as_ref()
    }

    pub fn storm_sector(&self) -> u8 {
        self.storm_sector
    }

    pub fn death_clock(&self) -> DeathClock {
        self.death_clock
    }

    /// Number of events applied since setup
    pub fn events_applied(&self) -> u64 {
        self.events_applied
    }

    pub fn is_eligible(&self, faction: Faction) -> bool {
        !self.ineligible.contains(&faction)
    }

    /// The player to act now
    pub fn current_player(&self) -> Option<Faction> {
        let eligible = |f: Faction| self.is_eligible(f);
        self.sequencer.as_ref()?.current_player(&eligible)
    }

    /// This round's eligible players in turn order
    pub fn players_in_order(&self) -> Vec<Faction> {
        let eligible = |f: Faction| self.is_eligible(f);
        self.sequencer
            .as_ref()
            .map(|seq| seq.players_in_order(&eligible))
            .unwrap_or_default()
    }

    pub fn ally_of(&self, faction: Faction) -> Option<Faction> {
        self.alliances.get(&faction).copied()
    }

    /// Whether a faction occupies a location, counting a co-occupying ally
    pub fn occupies(&self, faction: Faction, location: LocationId) -> Result<bool, RulesError> {
        self.map.location(location)?;
        let ledger = self.ledger(faction)?;
        let ally = self
            .ally_of(faction)
            .map(|ally| self.ledger(ally))
            .transpose()?;
        Ok(ledger.occupies_with(location, ally))
    }

    pub fn has_high_threshold(&self, faction: Faction, world: LocationId) -> Result<bool, RulesError> {
        self.ledger(faction)?.has_high_threshold(&self.map, world)
    }

    pub fn has_low_threshold(&self, faction: Faction, world: LocationId) -> Result<bool, RulesError> {
        self.ledger(faction)?.has_low_threshold(&self.map, world)
    }

    /// Every faction's (regular, elite) forces at a location
    pub fn forces_at(&self, location: LocationId) -> Vec<(Faction, u32, u32)> {
        self.players
            .iter()
            .filter_map(|p| {
                let b = p.ledger.battalion(location)?;
                Some((p.faction, b.regular, b.elite))
            })
            .collect()
    }

    /// A faction's (regular, elite) forces in a territory
    pub fn forces_in_territory(
        &self,
        faction: Faction,
        territory: TerritoryId,
    ) -> Result<(u32, u32), RulesError> {
        self.ledger(faction)?.forces_in_territory(&self.map, territory)
    }

    /// Verify every ledger's invariants
    pub fn check_invariants(&self) -> Result<(), RulesError> {
        self.players.iter().try_for_each(|p| p.ledger.check_invariants())
    }

    // ==================== Events ====================

    /// Apply one event. On any error the state is left exactly as it was.
    pub fn apply_event(&mut self, event: &GameEvent) -> Result<(), RulesError> {
        let faction = event.faction();
        let mut next = self.clone();
        let result = next
            .apply_unchecked(event)
            .and_then(|()| next.check_invariants());

        match result {
            Ok(()) => {
                next.events_applied += 1;
                *self = next;
                debug!(?faction, ?event, current = ?self.current_player(), "event applied");
                Ok(())
            }
            Err(err) => {
                if err.kind() == ErrorKind::InvariantViolation {
                    error!(?faction, ?event, %err, "event broke an invariant");
                } else {
                    warn!(?faction, ?event, %err, "event rejected");
                }
                Err(err)
            }
        }
    }

    fn apply_unchecked(&mut self, event: &GameEvent) -> Result<(), RulesError> {
        match event {
            // ==================== Turn Order ====================
            GameEvent::StartPhase {
                phase,
                direction,
                starting_player,
                start_next_to_starting_player,
                modifier,
            } => {
                let starting_player = match starting_player {
                    Some(faction) => self.player(*faction)?.faction,
                    None => self.storm_first_player()?,
                };
                if let Some(m) = modifier {
                    self.player(m.player)?;
                }
                let seated: Vec<(Faction, Seat)> =
                    self.players.iter().map(|p| (p.faction, p.seat)).collect();
                let start = SequenceStart {
                    direction: *direction,
                    starting_player,
                    start_next_to_starting_player: *start_next_to_starting_player,
                    modifier: *modifier,
                };

                let ineligible = &self.ineligible;
                let eligible = |f: Faction| !ineligible.contains(&f);
                let sequencer = TurnSequencer::start(self.rules, &seated, &start, &eligible)?;

                self.sequencer = Some(sequencer);
                self.phase = Some(*phase);
            }

            GameEvent::SetTurnModifier { modifier } => {
                if let Some(m) = modifier {
                    self.player(m.player)?;
                }
                let ineligible = &self.ineligible;
                let eligible = |f: Faction| !ineligible.contains(&f);
                self.sequencer
                    .as_mut()
                    .ok_or(RulesError::NoActiveSequence)?
                    .set_modifier(*modifier, &eligible)?;
            }

            GameEvent::SetEligibility { faction, eligible } => {
                self.player(*faction)?;
                if *eligible {
                    self.ineligible.remove(faction);
                } else {
                    self.ineligible.insert(*faction);
                }
            }

            GameEvent::EndTurn { faction } => {
                let ineligible = &self.ineligible;
                let eligible = |f: Faction| !ineligible.contains(&f);
                let sequencer = self
                    .sequencer
                    .as_mut()
                    .ok_or(RulesError::NoActiveSequence)?;
                sequencer.ensure_turn(*faction, &eligible)?;
                sequencer.advance(&eligible);
            }

            GameEvent::EndRound => {
                let ineligible = &self.ineligible;
                let eligible = |f: Faction| !ineligible.contains(&f);
                self.sequencer
                    .as_mut()
                    .ok_or(RulesError::NoActiveSequence)?
                    .next_round(&eligible);
            }

            GameEvent::EndPhase => {
                if self.sequencer.is_none() {
                    return Err(RulesError::NoActiveSequence);
                }
                self.sequencer = None;
                self.phase = None;
                self.ineligible.clear();
            }

            GameEvent::MoveStorm { sectors } => {
                self.storm_sector = ((u16::from(self.storm_sector) + u16::from(*sectors))
                    % u16::from(TOTAL_SECTORS)) as u8;
            }

            // ==================== Forces ====================
            GameEvent::AddForces {
                faction,
                location,
                regular,
                elite,
                from_reserve,
            } => {
                if *from_reserve {
                    self.ensure_may_place(*faction)?;
                }
                let ledger = ledger_mut(&mut self.players, *faction)?;
                ledger.add_regular(&self.map, *location, *regular, *from_reserve)?;
                ledger.add_elite(&self.map, *location, *elite, *from_reserve)?;
            }

            GameEvent::RemoveForces {
                faction,
                location,
                regular,
                elite,
            } => {
                let ledger = ledger_mut(&mut self.players, *faction)?;
                ledger.remove_regular(&self.map, *location, *regular)?;
                ledger.remove_elite(&self.map, *location, *elite)?;
            }

            GameEvent::MoveForces {
                faction,
                from,
                to,
                regular,
                elite,
            } => {
                self.ensure_may_place(*faction)?;
                ledger_mut(&mut self.players, *faction)?
                    .move_forces(&self.map, *from, *to, *regular, *elite)?;
            }

            GameEvent::KillForces {
                faction,
                location,
                regular,
                elite,
                in_battle,
            } => {
                ledger_mut(&mut self.players, *faction)?.kill(
                    &self.map,
                    *location,
                    *regular,
                    *elite,
                    *in_battle,
                    &mut self.death_clock,
                )?;
            }

            GameEvent::KillForcesInTerritory {
                faction,
                territory,
                regular,
                elite,
                in_battle,
            } => {
                ledger_mut(&mut self.players, *faction)?.kill_forces_in_territory(
                    &self.map,
                    *territory,
                    *regular,
                    *elite,
                    *in_battle,
                    &mut self.death_clock,
                )?;
            }

            GameEvent::ForcesToReserves {
                faction,
                territory,
                regular,
                elite,
            } => {
                ledger_mut(&mut self.players, *faction)?
                    .forces_to_reserves(&self.map, *territory, *regular, *elite)?;
            }

            GameEvent::Revive {
                faction,
                regular,
                elite,
            } => {
                self.ensure_may_revive(*faction)?;
                let ledger = ledger_mut(&mut self.players, *faction)?;
                ledger.revive(&self.map, *regular)?;
                ledger.revive_elite(&self.map, *elite)?;
            }

            GameEvent::RemoveFromGame {
                faction,
                location,
                regular,
                elite,
            } => {
                ledger_mut(&mut self.players, *faction)?
                    .remove_from_game(&self.map, *location, *regular, *elite)?;
            }

            // ==================== Alliances ====================
            GameEvent::FormAlliance { faction, ally } => {
                self.player(*faction)?;
                self.player(*ally)?;
                if faction == ally
                    || self.alliances.contains_key(faction)
                    || self.alliances.contains_key(ally)
                {
                    return Err(RulesError::InvalidAlliance(*faction, *ally));
                }
                self.alliances.insert(*faction, *ally);
                self.alliances.insert(*ally, *faction);
            }

            GameEvent::BreakAlliance { faction } => {
                let ally = self
                    .alliances
                    .remove(faction)
                    .ok_or(RulesError::NotAllied(*faction))?;
                self.alliances.remove(&ally);
            }
        }

        Ok(())
    }

    // ==================== Helper Methods ====================

    fn storm_first_player(&self) -> Result<Faction, RulesError> {
        let seat = determine_first_player(self.storm_sector, self.table_seats, |seat| {
            self.players.iter().any(|p| p.seat == seat)
        })
        .ok_or_else(|| RulesError::InvalidSetup("no occupied seat".into()))?;

        self.players
            .iter()
            .find(|p| p.seat == seat)
            .map(|p| p.faction)
            .ok_or_else(|| RulesError::InvalidSetup(format!("seat {} is empty", seat)))
    }

    /// Shipping and moving are turn-gated in phases that say so
    fn ensure_may_place(&self, faction: Faction) -> Result<(), RulesError> {
        match (self.phase, &self.sequencer) {
            (Some(phase), Some(sequencer)) if phase.gates_force_placement() => {
                let eligible = |f: Faction| self.is_eligible(f);
                sequencer.ensure_turn(faction, &eligible)
            }
            _ => Ok(()),
        }
    }

    /// Revivals are limited to players in the round's order where gated
    fn ensure_may_revive(&self, faction: Faction) -> Result<(), RulesError> {
        match (self.phase, &self.sequencer) {
            (Some(phase), Some(sequencer)) if phase.gates_revival() => {
                let eligible = |f: Faction| self.is_eligible(f);
                sequencer.ensure_in_order(faction, &eligible)
            }
            _ => Ok(()),
        }
    }
}

fn ledger_mut(players: &mut [PlayerState], faction: Faction) -> Result<&mut ForceLedger, RulesError> {
    players
        .iter_mut()
        .find(|p| p.faction == faction)
        .map(|p| &mut p.ledger)
        .ok_or(RulesError::UnknownFaction(faction))
}

fn deposit_starting_forces(
    ledger: &mut ForceLedger,
    map: &Map,
    kind: TokenKind,
    amount: u32,
) -> Result<(), RulesError> {
    if amount == 0 {
        return Ok(());
    }
    let faction = ledger.faction();
    let world = map.reserve_world(faction, kind).ok_or(RulesError::NoReserve {
        faction,
        kind,
        requested: amount,
    })?;
    match kind {
        TokenKind::Regular => ledger.add_regular(map, world, amount, false),
        TokenKind::Elite => ledger.add_elite(map, world, amount, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::{Direction, TurnModifier, TurnPosition};
    use pretty_assertions::assert_eq;

    fn four_player(revision: RuleRevision) -> GameState {
        let setup = GameSetup::seated(
            vec![Faction::Green, Faction::Black, Faction::Blue, Faction::Red],
            vec![0, 2, 3, 5],
        );
        GameState::new(&setup, revision).unwrap()
    }

    fn start(phase: Phase, starting_player: Option<Faction>) -> GameEvent {
        GameEvent::StartPhase {
            phase,
            direction: Direction::Clockwise,
            starting_player,
            start_next_to_starting_player: false,
            modifier: None,
        }
    }

    fn loc(game: &GameState, name: &str) -> LocationId {
        game.map().find_location(name).unwrap()
    }

    #[test]
    fn test_new_game_deposits_starting_forces() {
        let game = four_player(RuleRevision::Current);
        let red = game.ledger(Faction::Red).unwrap();
        assert_eq!(red.regular_in(loc(&game, "Kaitain")), 15);
        assert_eq!(red.elite_in(loc(&game, "Salusa Secundus")), 5);
        assert!(game
            .has_high_threshold(Faction::Red, loc(&game, "Salusa Secundus"))
            .unwrap());
        game.check_invariants().unwrap();
    }

    #[test]
    fn test_setup_validation() {
        let dup = GameSetup::new(vec![Faction::Green, Faction::Green], 1);
        assert!(GameState::new(&dup, RuleRevision::Current).is_err());

        let bad_seats = GameSetup::seated(vec![Faction::Green, Faction::Black], vec![1, 1]);
        assert!(GameState::new(&bad_seats, RuleRevision::Current).is_err());

        let too_many = GameSetup {
            table_seats: 2,
            ..GameSetup::new(vec![Faction::Green, Faction::Black, Faction::Red], 1)
        };
        assert!(GameState::new(&too_many, RuleRevision::Current).is_err());

        let empty = GameSetup::new(vec![], 1);
        assert!(GameState::new(&empty, RuleRevision::Current).is_err());
    }

    #[test]
    fn test_seeded_seats_are_reproducible() {
        let setup = GameSetup::new(Faction::ALL[..5].to_vec(), 42);
        let a = GameState::new(&setup, RuleRevision::Current).unwrap();
        let b = GameState::new(&setup, RuleRevision::Current).unwrap();
        assert_eq!(a, b);

        let seats: BTreeSet<Seat> = a.players().iter().map(|p| p.seat).collect();
        assert_eq!(seats.len(), 5);
        assert!(seats.iter().all(|s| *s < DEFAULT_TABLE_SEATS));
    }

    #[test]
    fn test_storm_decides_first_player() {
        let mut game = four_player(RuleRevision::Current);
        // ceil(7 * 6 / 18) = 3, which Blue occupies
        game.apply_event(&GameEvent::MoveStorm { sectors: 7 }).unwrap();
        game.apply_event(&start(Phase::Bidding, None)).unwrap();
        assert_eq!(game.current_player(), Some(Faction::Blue));

        // ceil(10 * 6 / 18) = 4 is empty, so seat 5
        game.apply_event(&GameEvent::MoveStorm { sectors: 3 }).unwrap();
        game.apply_event(&start(Phase::Bidding, None)).unwrap();
        assert_eq!(game.current_player(), Some(Faction::Red));
    }

    #[test]
    fn test_storm_wraps() {
        let mut game = four_player(RuleRevision::Current);
        game.apply_event(&GameEvent::MoveStorm { sectors: 17 }).unwrap();
        game.apply_event(&GameEvent::MoveStorm { sectors: 3 }).unwrap();
        assert_eq!(game.storm_sector(), 2);
    }

    #[test]
    fn test_end_turn_by_wrong_player_rejected() {
        let mut game = four_player(RuleRevision::Current);
        game.apply_event(&start(Phase::Bidding, Some(Faction::Black)))
            .unwrap();

        let before = game.clone();
        let err = game
            .apply_event(&GameEvent::EndTurn {
                faction: Faction::Green,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalTurn);
        assert_eq!(game, before);

        game.apply_event(&GameEvent::EndTurn {
            faction: Faction::Black,
        })
        .unwrap();
        assert_eq!(game.current_player(), Some(Faction::Blue));
        assert_eq!(game.events_applied(), 2);
    }

    #[test]
    fn test_partial_event_rolls_back() {
        let mut game = four_player(RuleRevision::Current);
        let arrakeen = loc(&game, "Arrakeen");
        let before = game.clone();

        // Regulars are available, elites are not: nothing may change
        let err = game
            .apply_event(&GameEvent::AddForces {
                faction: Faction::Green,
                location: arrakeen,
                regular: 5,
                elite: 1,
                from_reserve: true,
            })
            .unwrap_err();
        assert!(matches!(err, RulesError::NoReserve { .. }));
        assert_eq!(game, before);
    }

    #[test]
    fn test_shipment_is_turn_gated() {
        let mut game = four_player(RuleRevision::Current);
        let carthag = loc(&game, "Carthag");
        game.apply_event(&start(Phase::ShipmentAndMove, Some(Faction::Green)))
            .unwrap();

        let ship = |faction| GameEvent::AddForces {
            faction,
            location: carthag,
            regular: 3,
            elite: 0,
            from_reserve: true,
        };
        assert_eq!(
            game.apply_event(&ship(Faction::Black)).unwrap_err().kind(),
            ErrorKind::IllegalTurn
        );
        game.apply_event(&ship(Faction::Green)).unwrap();
        assert_eq!(game.forces_at(carthag), vec![(Faction::Green, 3, 0)]);
    }

    #[test]
    fn test_revival_requires_turn_order_membership() {
        let mut game = four_player(RuleRevision::Current);
        let carthag = loc(&game, "Carthag");
        game.apply_event(&GameEvent::AddForces {
            faction: Faction::Black,
            location: carthag,
            regular: 2,
            elite: 0,
            from_reserve: true,
        })
        .unwrap();
        game.apply_event(&GameEvent::KillForces {
            faction: Faction::Black,
            location: carthag,
            regular: 2,
            elite: 0,
            in_battle: true,
        })
        .unwrap();
        game.apply_event(&GameEvent::SetEligibility {
            faction: Faction::Black,
            eligible: false,
        })
        .unwrap();
        game.apply_event(&start(Phase::Revival, Some(Faction::Green)))
            .unwrap();

        let revive = GameEvent::Revive {
            faction: Faction::Black,
            regular: 1,
            elite: 0,
        };
        assert_eq!(
            game.apply_event(&revive).unwrap_err(),
            RulesError::NotInTurnOrder(Faction::Black)
        );

        game.apply_event(&GameEvent::SetEligibility {
            faction: Faction::Black,
            eligible: true,
        })
        .unwrap();
        game.apply_event(&revive).unwrap();
        assert_eq!(game.ledger(Faction::Black).unwrap().tanks().regular, 1);
    }

    #[test]
    fn test_death_clock_threads_through_kills() {
        let mut game = four_player(RuleRevision::Current);
        let carthag = loc(&game, "Carthag");
        for faction in [Faction::Green, Faction::Red] {
            game.apply_event(&GameEvent::AddForces {
                faction,
                location: carthag,
                regular: 1,
                elite: 0,
                from_reserve: true,
            })
            .unwrap();
        }
        for faction in [Faction::Red, Faction::Green] {
            game.apply_event(&GameEvent::KillForces {
                faction,
                location: carthag,
                regular: 1,
                elite: 0,
                in_battle: true,
            })
            .unwrap();
        }
        let red = game.ledger(Faction::Red).unwrap().tanks().last_killed_at;
        let green = game.ledger(Faction::Green).unwrap().tanks().last_killed_at;
        assert_eq!((red, green), (Some(0), Some(1)));
        assert_eq!(game.death_clock().peek(), 2);
    }

    #[test]
    fn test_alliances_and_occupancy() {
        let setup = GameSetup::seated(vec![Faction::Pink, Faction::Green, Faction::Black], vec![0, 1, 2]);
        let mut game = GameState::new(&setup, RuleRevision::Current).unwrap();
        let arrakeen = loc(&game, "Arrakeen");
        game.apply_event(&GameEvent::AddForces {
            faction: Faction::Green,
            location: arrakeen,
            regular: 2,
            elite: 0,
            from_reserve: true,
        })
        .unwrap();

        assert!(!game.occupies(Faction::Pink, arrakeen).unwrap());
        game.apply_event(&GameEvent::FormAlliance {
            faction: Faction::Pink,
            ally: Faction::Green,
        })
        .unwrap();
        assert!(game.occupies(Faction::Pink, arrakeen).unwrap());
        assert_eq!(game.ally_of(Faction::Green), Some(Faction::Pink));

        assert_eq!(
            game.apply_event(&GameEvent::FormAlliance {
                faction: Faction::Black,
                ally: Faction::Green,
            }),
            Err(RulesError::InvalidAlliance(Faction::Black, Faction::Green))
        );

        game.apply_event(&GameEvent::BreakAlliance {
            faction: Faction::Green,
        })
        .unwrap();
        assert!(!game.occupies(Faction::Pink, arrakeen).unwrap());
        assert_eq!(game.ally_of(Faction::Pink), None);
    }

    #[test]
    fn test_modifier_and_phase_lifecycle() {
        let mut game = four_player(RuleRevision::Legacy);
        assert_eq!(
            game.apply_event(&GameEvent::EndRound),
            Err(RulesError::NoActiveSequence)
        );

        game.apply_event(&start(Phase::Bidding, Some(Faction::Green)))
            .unwrap();
        game.apply_event(&GameEvent::SetTurnModifier {
            modifier: Some(TurnModifier {
                player: Faction::Green,
                position: TurnPosition::Last,
            }),
        })
        .unwrap();
        assert_eq!(
            game.players_in_order(),
            vec![Faction::Black, Faction::Blue, Faction::Red, Faction::Green]
        );

        // Turns are taken in the listed order
        for faction in game.players_in_order() {
            game.apply_event(&GameEvent::EndTurn { faction }).unwrap();
        }
        assert_eq!(game.sequencer().unwrap().fully_circled(), 1);

        let late = GameEvent::SetTurnModifier {
            modifier: Some(TurnModifier {
                player: Faction::Red,
                position: TurnPosition::First,
            }),
        };
        let before = game.clone();
        assert_eq!(game.apply_event(&late), Err(RulesError::RoundInProgress));
        assert_eq!(game, before);

        game.apply_event(&GameEvent::EndPhase).unwrap();
        assert_eq!(game.phase(), None);
        assert_eq!(game.current_player(), None);
        assert!(game.players_in_order().is_empty());
    }

    #[test]
    fn test_unknown_faction_rejected() {
        let mut game = four_player(RuleRevision::Current);
        assert_eq!(
            game.apply_event(&GameEvent::SetEligibility {
                faction: Faction::Cyan,
                eligible: false,
            }),
            Err(RulesError::UnknownFaction(Faction::Cyan))
        );
    }
}
