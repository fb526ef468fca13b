//! Turn order within a phase.
//!
//! A [`TurnSequencer`] owns the seat rotation of one phase: who went first,
//! who has played this round, how many rounds and full laps have passed, and
//! any go-first/go-last override for the round.
//!
//! Which players may act is not stored here. Every query takes an
//! [`Eligibility`] supplied by the caller, so the same sequencer follows
//! players dropping in and out of eligibility between turns. Every scan is
//! bounded to one lap of seats and yields `None` when nobody is eligible.

use crate::error::RulesError;
use crate::faction::{Faction, Seat};
use crate::map::TOTAL_SECTORS;
use crate::revision::TurnRules;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rotation direction around the seats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Ascending seat numbers
    Clockwise,
    /// Descending seat numbers
    CounterClockwise,
}

impl Direction {
    pub fn sign(&self) -> i32 {
        match self {
            Direction::Clockwise => 1,
            Direction::CounterClockwise => -1,
        }
    }
}

/// Where a turn-order override moves its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPosition {
    First,
    Last,
}

/// A go-first or go-last override for one round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnModifier {
    pub player: Faction,
    pub position: TurnPosition,
}

/// Caller-supplied predicate deciding who may take a turn
pub trait Eligibility {
    fn is_eligible(&self, faction: Faction) -> bool;
}

impl<F: Fn(Faction) -> bool> Eligibility for F {
    fn is_eligible(&self, faction: Faction) -> bool {
        self(faction)
    }
}

/// How a phase opens its turn order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStart {
    pub direction: Direction,
    pub starting_player: Faction,
    /// Begin with the eligible player after `starting_player`
    pub start_next_to_starting_player: bool,
    pub modifier: Option<TurnModifier>,
}

/// In-progress turn order of one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSequencer {
    rules: TurnRules,
    /// Players ordered by `direction * seat`
    seats: Vec<Faction>,
    first_player: Faction,
    played: Vec<Faction>,
    round: u32,
    fully_circled: u32,
    modifier: Option<TurnModifier>,
    /// Current player as last stored by the legacy algorithm
    cached_current: Option<Faction>,
}

impl TurnSequencer {
    /// Open the turn order of a phase
    pub fn start(
        rules: TurnRules,
        players: &[(Faction, Seat)],
        start: &SequenceStart,
        eligible: &dyn Eligibility,
    ) -> Result<Self, RulesError> {
        let mut ordered = players.to_vec();
        ordered.sort_by_key(|(_, seat)| start.direction.sign() * i32::from(*seat));
        let seats: Vec<Faction> = ordered.into_iter().map(|(f, _)| f).collect();

        if !seats.contains(&start.starting_player) {
            return Err(RulesError::NotInTurnOrder(start.starting_player));
        }

        let mut sequencer = Self {
            rules,
            seats,
            first_player: start.starting_player,
            played: Vec::new(),
            round: 0,
            fully_circled: 0,
            modifier: start.modifier,
            cached_current: None,
        };

        if start.start_next_to_starting_player && sequencer.eligible_count(eligible) > 1 {
            if let Some(next) = sequencer.next_eligible_after(sequencer.first_player, eligible) {
                sequencer.first_player = next;
            }
        }

        sequencer.resolve_first_player(eligible);
        (sequencer.rules.after_transition)(&mut sequencer, eligible);
        debug!(
            revision = ?sequencer.rules.revision(),
            first = ?sequencer.first_player,
            "turn order started"
        );
        Ok(sequencer)
    }

    pub fn rules(&self) -> TurnRules {
        self.rules
    }

    /// Seats in rotation order
    pub fn seats(&self) -> &[Faction] {
        &self.seats
    }

    pub fn first_player(&self) -> Faction {
        self.first_player
    }

    /// Players who have taken a turn this round, in order
    pub fn played(&self) -> &[Faction] {
        &self.played
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// Number of times the turn has come back around to the first player
    pub fn fully_circled(&self) -> u32 {
        self.fully_circled
    }

    pub fn modifier(&self) -> Option<TurnModifier> {
        self.modifier
    }

    /// Install or clear a go-first/go-last override for this round.
    ///
    /// An override can only be installed before anyone has played this
    /// round. The first player is resolved again so a go-last target does
    /// not open the round.
    pub fn set_modifier(
        &mut self,
        modifier: Option<TurnModifier>,
        eligible: &dyn Eligibility,
    ) -> Result<(), RulesError> {
        if modifier.is_some() && !self.played.is_empty() {
            return Err(RulesError::RoundInProgress);
        }
        self.modifier = modifier;
        self.resolve_first_player(eligible);
        (self.rules.after_transition)(self, eligible);
        Ok(())
    }

    /// The player to act now, if anyone is eligible
    pub fn current_player(&self, eligible: &dyn Eligibility) -> Option<Faction> {
        (self.rules.current_player)(self, eligible)
    }

    /// Record the current player's turn and move on.
    ///
    /// Returns the player whose turn was consumed.
    pub fn advance(&mut self, eligible: &dyn Eligibility) -> Option<Faction> {
        let current = self.current_player(eligible)?;
        self.played.push(current);

        if self.eligible_count(eligible) == 0 {
            self.played.clear();
        }

        (self.rules.after_transition)(self, eligible);

        if self.current_player(eligible) == Some(self.first_player) {
            self.fully_circled += 1;
        }

        debug!(played = ?current, next = ?self.current_player(eligible), "turn advanced");
        Some(current)
    }

    /// Start a new round with the next eligible first player
    pub fn next_round(&mut self, eligible: &dyn Eligibility) {
        if let Some(next) = self.next_eligible_after(self.first_player, eligible) {
            self.first_player = next;
        }
        self.played.clear();
        self.round += 1;
        self.modifier = None;

        (self.rules.after_transition)(self, eligible);
        debug!(round = self.round, first = ?self.first_player, "new round");
    }

    /// Eligible players from the first player onward, with any override
    /// spliced to the front or back
    pub fn players_in_order(&self, eligible: &dyn Eligibility) -> Vec<Faction> {
        let Some(start) = self.index_of(self.first_player) else {
            return Vec::new();
        };
        let n = self.seats.len();
        let mut order: Vec<Faction> = (0..n)
            .map(|i| self.seats[(start + i) % n])
            .filter(|f| eligible.is_eligible(*f))
            .collect();

        if let Some(modifier) = self.modifier {
            if order.len() > 1 {
                if let Some(pos) = order.iter().position(|f| *f == modifier.player) {
                    let player = order.remove(pos);
                    match modifier.position {
                        TurnPosition::First => order.insert(0, player),
                        TurnPosition::Last => order.push(player),
                    }
                }
            }
        }
        order
    }

    /// Whether `a` sits before `b` counting from the first player
    pub fn is_before(&self, a: Faction, b: Faction) -> Result<bool, RulesError> {
        Ok(self.offset_from_first(a)? < self.offset_from_first(b)?)
    }

    /// Reject an event from anyone but the current player
    pub fn ensure_turn(&self, faction: Faction, eligible: &dyn Eligibility) -> Result<(), RulesError> {
        let expected = self.current_player(eligible);
        if expected != Some(faction) {
            return Err(RulesError::NotYourTurn {
                expected,
                actual: faction,
            });
        }
        Ok(())
    }

    /// Reject an event from a player outside this round's order
    pub fn ensure_in_order(
        &self,
        faction: Faction,
        eligible: &dyn Eligibility,
    ) -> Result<(), RulesError> {
        if !self.players_in_order(eligible).contains(&faction) {
            return Err(RulesError::NotInTurnOrder(faction));
        }
        Ok(())
    }

    // ==================== Helpers ====================

    fn index_of(&self, faction: Faction) -> Option<usize> {
        self.seats.iter().position(|f| *f == faction)
    }

    fn offset_from_first(&self, faction: Faction) -> Result<usize, RulesError> {
        let n = self.seats.len();
        let first = self
            .index_of(self.first_player)
            .ok_or(RulesError::NotInTurnOrder(self.first_player))?;
        let index = self
            .index_of(faction)
            .ok_or(RulesError::NotInTurnOrder(faction))?;
        Ok((index + n - first) % n)
    }

    /// Move the first player forward past ineligible seats and, in a
    /// contested round, past a go-last target
    fn resolve_first_player(&mut self, eligible: &dyn Eligibility) {
        let contested = self.eligible_count(eligible) > 1;
        for _ in 0..self.seats.len() {
            let candidate = self.first_player;
            let goes_last = contested && self.is_targeted(candidate, TurnPosition::Last);
            if eligible.is_eligible(candidate) && !goes_last {
                break;
            }
            match self.next_eligible_after(candidate, eligible) {
                Some(next) => self.first_player = next,
                None => break,
            }
        }
    }

    fn eligible_count(&self, eligible: &dyn Eligibility) -> usize {
        self.seats
            .iter()
            .filter(|f| eligible.is_eligible(**f))
            .count()
    }

    /// First eligible seat strictly after `faction`, wrapping back to it
    fn next_eligible_after(&self, faction: Faction, eligible: &dyn Eligibility) -> Option<Faction> {
        let start = self.index_of(faction)?;
        let n = self.seats.len();
        (1..=n)
            .map(|i| self.seats[(start + i) % n])
            .find(|f| eligible.is_eligible(*f))
    }

    /// First eligible seat at or after `faction`
    fn first_eligible_from(&self, faction: Faction, eligible: &dyn Eligibility) -> Option<Faction> {
        let start = self.index_of(faction)?;
        let n = self.seats.len();
        (0..n)
            .map(|i| self.seats[(start + i) % n])
            .find(|f| eligible.is_eligible(*f))
    }

    fn is_targeted(&self, faction: Faction, position: TurnPosition) -> bool {
        self.modifier
            .is_some_and(|m| m.player == faction && m.position == position)
    }

    /// The go-first target, when it applies to an otherwise contested round
    fn go_first_override(&self, eligible: &dyn Eligibility) -> Option<Faction> {
        let modifier = self.modifier?;
        let applies = modifier.position == TurnPosition::First
            && eligible.is_eligible(modifier.player)
            && self.eligible_count(eligible) > 1;
        applies.then_some(modifier.player)
    }
}

// ==================== Current player algorithms ====================

/// Legacy: read the value stored at the last transition
pub(crate) fn cached_current_player(
    sequencer: &TurnSequencer,
    _eligible: &dyn Eligibility,
) -> Option<Faction> {
    sequencer.cached_current
}

/// Legacy: store the current player at a transition point
pub(crate) fn refresh_cached_current(sequencer: &mut TurnSequencer, eligible: &dyn Eligibility) {
    sequencer.cached_current = match sequencer.played.last() {
        None => sequencer
            .go_first_override(eligible)
            .or_else(|| sequencer.first_eligible_from(sequencer.first_player, eligible)),
        Some(last) => sequencer.next_eligible_after(*last, eligible),
    };
}

/// Current: derive the current player from the played list
pub(crate) fn recomputed_current_player(
    sequencer: &TurnSequencer,
    eligible: &dyn Eligibility,
) -> Option<Faction> {
    match sequencer.played.last() {
        None => sequencer
            .go_first_override(eligible)
            .or_else(|| sequencer.first_eligible_from(sequencer.first_player, eligible)),
        Some(last) => sequencer.next_eligible_after(*last, eligible),
    }
}

/// Current: nothing is stored between transitions
pub(crate) fn clear_cached_current(sequencer: &mut TurnSequencer, _eligible: &dyn Eligibility) {
    sequencer.cached_current = None;
}

/// Seat that starts a phase given the storm position.
///
/// Starts at `ceil(storm_sector * seat_count / TOTAL_SECTORS) mod seat_count`
/// and scans forward for the first occupied seat.
pub fn determine_first_player(
    storm_sector: u8,
    seat_count: u8,
    occupied: impl Fn(Seat) -> bool,
) -> Option<Seat> {
    if seat_count == 0 {
        return None;
    }
    let sectors = u32::from(TOTAL_SECTORS);
    let start = (u32::from(storm_sector) * u32::from(seat_count)).div_ceil(sectors)
        % u32::from(seat_count);

    (0..u32::from(seat_count))
        .map(|i| ((start + i) % u32::from(seat_count)) as Seat)
        .find(|seat| occupied(*seat))
}
