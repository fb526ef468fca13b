//! Per-faction force accounting.
//!
//! A [`ForceLedger`] tracks one faction's regular and elite tokens across every
//! location it occupies plus its tanks (killed tokens awaiting revival).
//!
//! Every primitive validates before it mutates, so a rejected call leaves the
//! ledger untouched. Battalions are kept sparse: an entry exists only while it
//! holds at least one token.
//!
//! The ledger keeps a conservation baseline per token type. Direct deposits
//! (not drawn from reserves) raise it, raw removals and removals from the game
//! lower it, and every other operation (reserve draws, moves, kills, revivals)
//! must leave `on board + in tanks == baseline` intact.

use crate::battalion::Battalion;
use crate::error::{RulesError, TokenKind};
use crate::faction::Faction;
use crate::map::{LocationId, Map, TerritoryId, ThresholdMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Monotonic "time of death" source threaded through event processing.
///
/// A tick is consumed only when something is actually killed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathClock {
    next: u64,
}

impl DeathClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume and return the next sequence number
    pub fn tick(&mut self) -> u64 {
        let tick = self.next;
        self.next += 1;
        tick
    }

    /// The sequence number the next kill will receive
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Killed tokens awaiting revival
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tanks {
    pub regular: u32,
    pub elite: u32,
    /// Death sequence number of the most recent kill
    pub last_killed_at: Option<u64>,
}

impl Tanks {
    fn get(&self, kind: TokenKind) -> u32 {
        match kind {
            TokenKind::Regular => self.regular,
            TokenKind::Elite => self.elite,
        }
    }
}

/// One faction's forces across locations and tanks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceLedger {
    faction: Faction,
    battalions: BTreeMap<LocationId, Battalion>,
    tanks: Tanks,
    /// Tokens of both kinds killed in battle, for win-condition checks
    killed_in_battle: u32,
    removed_regular: u32,
    removed_elite: u32,
    baseline_regular: u32,
    baseline_elite: u32,
    /// High-threshold flags of latched homeworlds
    latched_high: BTreeMap<LocationId, bool>,
}

impl ForceLedger {
    /// Create an empty ledger; latched homeworlds of this faction start low
    pub fn new(faction: Faction, map: &Map) -> Self {
        let latched_high = map
            .homeworlds_of(faction)
            .filter(|l| {
                l.homeworld
                    .as_ref()
                    .is_some_and(|hw| hw.mode == ThresholdMode::Latched)
            })
            .map(|l| (l.id, false))
            .collect();

        Self {
            faction,
            battalions: BTreeMap::new(),
            tanks: Tanks::default(),
            killed_in_battle: 0,
            removed_regular: 0,
            removed_elite: 0,
            baseline_regular: 0,
            baseline_elite: 0,
            latched_high,
        }
    }

    /// The faction this ledger belongs to
    pub fn faction(&self) -> Faction {
        self.faction
    }

    // ==================== Queries ====================

    /// The battalion at a location, if any tokens are there
    pub fn battalion(&self, location: LocationId) -> Option<&Battalion> {
        self.battalions.get(&location)
    }

    /// All non-empty battalions, ordered by location
    pub fn battalions(&self) -> impl Iterator<Item = &Battalion> + '_ {
        self.battalions.values()
    }

    /// Regular tokens at a location
    pub fn regular_in(&self, location: LocationId) -> u32 {
        self.count(location, TokenKind::Regular)
    }

    /// Elite tokens at a location
    pub fn elite_in(&self, location: LocationId) -> u32 {
        self.count(location, TokenKind::Elite)
    }

    /// Tokens of both kinds at a location
    pub fn forces_in(&self, location: LocationId) -> u32 {
        self.battalions.get(&location).map_or(0, Battalion::total)
    }

    /// Tokens on a territory's locations, as (regular, elite)
    pub fn forces_in_territory(
        &self,
        map: &Map,
        territory: TerritoryId,
    ) -> Result<(u32, u32), RulesError> {
        let territory = map.territory(territory)?;
        Ok(territory
            .locations
            .iter()
            .fold((0, 0), |(regular, elite), loc| {
                (regular + self.regular_in(*loc), elite + self.elite_in(*loc))
            }))
    }

    /// Total tokens of one kind on locations (board and homeworlds)
    pub fn total_placed(&self, kind: TokenKind) -> u32 {
        self.battalions.values().map(|b| b.get(kind)).sum()
    }

    pub fn tanks(&self) -> &Tanks {
        &self.tanks
    }

    pub fn killed_in_battle(&self) -> u32 {
        self.killed_in_battle
    }

    /// Tokens permanently removed from the game, as (regular, elite)
    pub fn removed_from_game(&self) -> (u32, u32) {
        (self.removed_regular, self.removed_elite)
    }

    /// Whether this faction has combat-capable presence at a location
    pub fn occupies(&self, location: LocationId) -> bool {
        self.battalions
            .get(&location)
            .is_some_and(|b| b.combat_strength() > 0)
    }

    /// Occupancy including an ally's presence, when the two factions form a
    /// co-occupation alliance
    pub fn occupies_with(&self, location: LocationId, ally: Option<&ForceLedger>) -> bool {
        if self.occupies(location) {
            return true;
        }
        match ally {
            Some(ally) => self.faction.co_occupies_with(ally.faction) && ally.occupies(location),
            None => false,
        }
    }

    /// Whether one of this faction's homeworlds is at high threshold
    pub fn has_high_threshold(&self, map: &Map, world: LocationId) -> Result<bool, RulesError> {
        let homeworld = map.homeworld(world)?;
        if homeworld.faction != self.faction {
            return Err(RulesError::NotAHomeworld(world));
        }
        match homeworld.mode {
            ThresholdMode::Compared => Ok(self.forces_in(world) >= homeworld.threshold),
            ThresholdMode::Latched => Ok(self.latched_high.get(&world).copied().unwrap_or(false)),
        }
    }

    /// Whether one of this faction's homeworlds is at low threshold
    pub fn has_low_threshold(&self, map: &Map, world: LocationId) -> Result<bool, RulesError> {
        self.has_high_threshold(map, world).map(|high| !high)
    }

    // ==================== Primitives ====================

    /// Add regular tokens to a location, optionally drawing them from a homeworld
    pub fn add_regular(
        &mut self,
        map: &Map,
        location: LocationId,
        amount: u32,
        from_reserve: bool,
    ) -> Result<(), RulesError> {
        self.add(map, location, TokenKind::Regular, amount, from_reserve)
    }

    /// Add elite tokens to a location, optionally drawing them from a homeworld
    pub fn add_elite(
        &mut self,
        map: &Map,
        location: LocationId,
        amount: u32,
        from_reserve: bool,
    ) -> Result<(), RulesError> {
        self.add(map, location, TokenKind::Elite, amount, from_reserve)
    }

    /// Remove regular tokens from a location; overdraw is rejected
    pub fn remove_regular(
        &mut self,
        map: &Map,
        location: LocationId,
        amount: u32,
    ) -> Result<(), RulesError> {
        self.remove(map, location, TokenKind::Regular, amount)
    }

    /// Remove elite tokens from a location; overdraw is rejected
    pub fn remove_elite(
        &mut self,
        map: &Map,
        location: LocationId,
        amount: u32,
    ) -> Result<(), RulesError> {
        self.remove(map, location, TokenKind::Elite, amount)
    }

    /// Move regular tokens between two locations
    pub fn move_regular(
        &mut self,
        map: &Map,
        from: LocationId,
        to: LocationId,
        amount: u32,
    ) -> Result<(), RulesError> {
        self.move_forces(map, from, to, amount, 0)
    }

    /// Move elite tokens between two locations
    pub fn move_elite(
        &mut self,
        map: &Map,
        from: LocationId,
        to: LocationId,
        amount: u32,
    ) -> Result<(), RulesError> {
        self.move_forces(map, from, to, 0, amount)
    }

    /// Move both kinds of tokens between two locations in one step
    pub fn move_forces(
        &mut self,
        map: &Map,
        from: LocationId,
        to: LocationId,
        regular: u32,
        elite: u32,
    ) -> Result<(), RulesError> {
        map.location(from)?;
        map.location(to)?;
        self.ensure_available(from, TokenKind::Regular, regular)?;
        self.ensure_available(from, TokenKind::Elite, elite)?;

        self.debit(from, TokenKind::Regular, regular);
        self.debit(from, TokenKind::Elite, elite);
        self.credit(to, TokenKind::Regular, regular);
        self.credit(to, TokenKind::Elite, elite);
        self.refresh_latch(map, from);
        self.refresh_latch(map, to);

        debug!(faction = ?self.faction, ?from, ?to, regular, elite, "forces moved");
        Ok(())
    }

    /// Kill tokens at a location, sending them to the tanks.
    ///
    /// Elites of a faction whose elites do not fight are credited to the
    /// regular tanks counter.
    pub fn kill(
        &mut self,
        map: &Map,
        location: LocationId,
        regular: u32,
        elite: u32,
        in_battle: bool,
        clock: &mut DeathClock,
    ) -> Result<(), RulesError> {
        map.location(location)?;
        self.ensure_available(location, TokenKind::Regular, regular)?;
        self.ensure_available(location, TokenKind::Elite, elite)?;

        self.kill_unstamped(map, location, regular, elite, in_battle);
        self.stamp_death(regular + elite, clock);
        Ok(())
    }

    /// Revive regular tokens from the tanks to their reserve homeworld
    pub fn revive(&mut self, map: &Map, amount: u32) -> Result<(), RulesError> {
        self.revive_kind(map, TokenKind::Regular, amount)
    }

    /// Revive elite tokens from the tanks to their reserve homeworld
    pub fn revive_elite(&mut self, map: &Map, amount: u32) -> Result<(), RulesError> {
        self.revive_kind(map, TokenKind::Elite, amount)
    }

    /// Permanently remove tokens from a location.
    ///
    /// Unlike the other mutations this does not recompute a latched
    /// homeworld threshold.
    pub fn remove_from_game(
        &mut self,
        map: &Map,
        location: LocationId,
        regular: u32,
        elite: u32,
    ) -> Result<(), RulesError> {
        map.location(location)?;
        self.ensure_available(location, TokenKind::Regular, regular)?;
        self.ensure_available(location, TokenKind::Elite, elite)?;

        self.debit(location, TokenKind::Regular, regular);
        self.debit(location, TokenKind::Elite, elite);
        self.removed_regular += regular;
        self.removed_elite += elite;
        self.lower_baseline(TokenKind::Regular, regular);
        self.lower_baseline(TokenKind::Elite, elite);

        debug!(faction = ?self.faction, ?location, regular, elite, "forces removed from game");
        Ok(())
    }

    // ==================== Territory batch operations ====================

    /// Kill tokens anywhere in a territory, draining its locations in
    /// ascending blow-amount order
    pub fn kill_forces_in_territory(
        &mut self,
        map: &Map,
        territory: TerritoryId,
        regular: u32,
        elite: u32,
        in_battle: bool,
        clock: &mut DeathClock,
    ) -> Result<(), RulesError> {
        let plan = self.plan_drain(map, territory, regular, elite)?;
        for (location, r, e) in plan {
            self.kill_unstamped(map, location, r, e, in_battle);
        }
        self.stamp_death(regular + elite, clock);
        Ok(())
    }

    /// Send tokens in a territory back to their reserve homeworlds, draining
    /// locations in ascending blow-amount order
    pub fn forces_to_reserves(
        &mut self,
        map: &Map,
        territory: TerritoryId,
        regular: u32,
        elite: u32,
    ) -> Result<(), RulesError> {
        let regular_world = self.reserve_for(map, TokenKind::Regular, regular)?;
        let elite_world = self.reserve_for(map, TokenKind::Elite, elite)?;
        let plan = self.plan_drain(map, territory, regular, elite)?;

        for (location, r, e) in plan {
            self.debit(location, TokenKind::Regular, r);
            self.debit(location, TokenKind::Elite, e);
            self.refresh_latch(map, location);
        }
        if let Some(world) = regular_world {
            self.credit(world, TokenKind::Regular, regular);
            self.refresh_latch(map, world);
        }
        if let Some(world) = elite_world {
            self.credit(world, TokenKind::Elite, elite);
            self.refresh_latch(map, world);
        }

        debug!(faction = ?self.faction, ?territory, regular, elite, "forces returned to reserves");
        Ok(())
    }

    // ==================== Invariants ====================

    /// Verify sparsity and conservation
    pub fn check_invariants(&self) -> Result<(), RulesError> {
        if let Some(empty) = self.battalions.values().find(|b| b.is_empty()) {
            return Err(RulesError::InvariantViolation(format!(
                "{:?} keeps an empty battalion at {:?}",
                self.faction, empty.location
            )));
        }

        let regular = self.total_placed(TokenKind::Regular) + self.tanks.regular;
        let elite = self.total_placed(TokenKind::Elite) + self.tanks.elite;

        if self.faction.elites_fight() {
            if regular != self.baseline_regular || elite != self.baseline_elite {
                return Err(RulesError::InvariantViolation(format!(
                    "{:?} holds {}/{} regular/elite forces, expected {}/{}",
                    self.faction, regular, elite, self.baseline_regular, self.baseline_elite
                )));
            }
        } else if regular + elite != self.baseline_regular + self.baseline_elite {
            // Non-combat elites enter the regular tanks, so only the sum is conserved
            return Err(RulesError::InvariantViolation(format!(
                "{:?} holds {} forces, expected {}",
                self.faction,
                regular + elite,
                self.baseline_regular + self.baseline_elite
            )));
        }
        Ok(())
    }

    // ==================== Helpers ====================

    fn count(&self, location: LocationId, kind: TokenKind) -> u32 {
        self.battalions.get(&location).map_or(0, |b| b.get(kind))
    }

    fn ensure_available(
        &self,
        location: LocationId,
        kind: TokenKind,
        amount: u32,
    ) -> Result<(), RulesError> {
        let available = self.count(location, kind);
        if available < amount {
            return Err(RulesError::InsufficientForces {
                faction: self.faction,
                location,
                kind,
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    /// Debit a pre-validated amount, dropping the battalion once empty
    fn debit(&mut self, location: LocationId, kind: TokenKind, amount: u32) {
        if amount == 0 {
            return;
        }
        let emptied = match self.battalions.get_mut(&location) {
            Some(battalion) => {
                let removed = battalion.try_remove(kind, amount);
                debug_assert!(
                    removed,
                    "debit of {amount} {kind:?} at {location:?} exceeds the battalion"
                );
                battalion.is_empty()
            }
            None => {
                debug_assert!(false, "debit of {amount} {kind:?} at empty {location:?}");
                false
            }
        };
        if emptied {
            self.battalions.remove(&location);
        }
    }

    fn credit(&mut self, location: LocationId, kind: TokenKind, amount: u32) {
        if amount == 0 {
            return;
        }
        let faction = self.faction;
        self.battalions
            .entry(location)
            .or_insert_with(|| Battalion::new(faction, location))
            .add(kind, amount);
    }

    /// Recompute the flag of a latched homeworld of this faction
    fn refresh_latch(&mut self, map: &Map, location: LocationId) {
        let Ok(homeworld) = map.homeworld(location) else {
            return;
        };
        if homeworld.mode != ThresholdMode::Latched || homeworld.faction != self.faction {
            return;
        }
        let high = self.forces_in(location) >= homeworld.threshold;
        self.latched_high.insert(location, high);
    }

    fn add(
        &mut self,
        map: &Map,
        location: LocationId,
        kind: TokenKind,
        amount: u32,
        from_reserve: bool,
    ) -> Result<(), RulesError> {
        map.location(location)?;

        if from_reserve {
            let source = map
                .homeworlds_of(self.faction)
                .map(|l| l.id)
                .find(|id| self.count(*id, kind) >= amount)
                .ok_or(RulesError::NoReserve {
                    faction: self.faction,
                    kind,
                    requested: amount,
                })?;
            self.debit(source, kind, amount);
            self.refresh_latch(map, source);
        } else {
            match kind {
                TokenKind::Regular => self.baseline_regular += amount,
                TokenKind::Elite => self.baseline_elite += amount,
            }
        }

        self.credit(location, kind, amount);
        self.refresh_latch(map, location);

        debug!(faction = ?self.faction, ?location, ?kind, amount, from_reserve, "forces added");
        Ok(())
    }

    fn remove(
        &mut self,
        map: &Map,
        location: LocationId,
        kind: TokenKind,
        amount: u32,
    ) -> Result<(), RulesError> {
        map.location(location)?;
        self.ensure_available(location, kind, amount)?;

        self.debit(location, kind, amount);
        self.lower_baseline(kind, amount);
        self.refresh_latch(map, location);

        debug!(faction = ?self.faction, ?location, ?kind, amount, "forces removed");
        Ok(())
    }

    /// Lower the baseline for tokens leaving the game.
    ///
    /// Revived non-combat elites return as regulars, so that faction can hold
    /// more regulars than its regular baseline; any shortfall is taken from
    /// the elite baseline, which keeps the conserved sum exact.
    fn lower_baseline(&mut self, kind: TokenKind, amount: u32) {
        let (own, other) = match kind {
            TokenKind::Regular => (&mut self.baseline_regular, &mut self.baseline_elite),
            TokenKind::Elite => (&mut self.baseline_elite, &mut self.baseline_regular),
        };
        let taken = (*own).min(amount);
        *own -= taken;
        *other = other.saturating_sub(amount - taken);
    }

    /// Apply a pre-validated kill without consuming a death tick
    fn kill_unstamped(
        &mut self,
        map: &Map,
        location: LocationId,
        regular: u32,
        elite: u32,
        in_battle: bool,
    ) {
        self.debit(location, TokenKind::Regular, regular);
        self.debit(location, TokenKind::Elite, elite);

        if self.faction.elites_fight() {
            self.tanks.regular += regular;
            self.tanks.elite += elite;
        } else {
            self.tanks.regular += regular + elite;
        }
        if in_battle {
            self.killed_in_battle += regular + elite;
        }
        self.refresh_latch(map, location);

        debug!(faction = ?self.faction, ?location, regular, elite, in_battle, "forces killed");
    }

    fn stamp_death(&mut self, killed: u32, clock: &mut DeathClock) {
        if killed > 0 {
            self.tanks.last_killed_at = Some(clock.tick());
        }
    }

    fn revive_kind(&mut self, map: &Map, kind: TokenKind, amount: u32) -> Result<(), RulesError> {
        let available = self.tanks.get(kind);
        if available < amount {
            return Err(RulesError::InsufficientTanks {
                faction: self.faction,
                kind,
                requested: amount,
                available,
            });
        }
        let Some(world) = self.reserve_for(map, kind, amount)? else {
            return Ok(());
        };

        match kind {
            TokenKind::Regular => self.tanks.regular -= amount,
            TokenKind::Elite => self.tanks.elite -= amount,
        }
        self.credit(world, kind, amount);
        self.refresh_latch(map, world);

        debug!(faction = ?self.faction, ?world, ?kind, amount, "forces revived");
        Ok(())
    }

    /// The reserve homeworld for a token type, required only when `amount > 0`
    fn reserve_for(
        &self,
        map: &Map,
        kind: TokenKind,
        amount: u32,
    ) -> Result<Option<LocationId>, RulesError> {
        if amount == 0 {
            return Ok(None);
        }
        map.reserve_world(self.faction, kind)
            .map(Some)
            .ok_or(RulesError::NoReserve {
                faction: self.faction,
                kind,
                requested: amount,
            })
    }

    /// Split a territory-wide request into per-location amounts, rejecting it
    /// if the territory as a whole cannot cover it
    fn plan_drain(
        &self,
        map: &Map,
        territory: TerritoryId,
        regular: u32,
        elite: u32,
    ) -> Result<Vec<(LocationId, u32, u32)>, RulesError> {
        let order = map.drain_order(territory)?;
        let (have_regular, have_elite) = self.forces_in_territory(map, territory)?;
        if have_regular < regular || have_elite < elite {
            return Err(RulesError::InsufficientForcesInTerritory {
                faction: self.faction,
                territory,
                requested: regular + elite,
                available: have_regular.min(regular) + have_elite.min(elite),
            });
        }

        let mut plan = Vec::new();
        let (mut regular_left, mut elite_left) = (regular, elite);
        for location in order {
            if regular_left == 0 && elite_left == 0 {
                break;
            }
            let r = self.regular_in(location).min(regular_left);
            let e = self.elite_in(location).min(elite_left);
            if r + e > 0 {
                plan.push((location, r, e));
                regular_left -= r;
                elite_left -= e;
            }
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn setup(faction: Faction) -> (Map, ForceLedger) {
        let map = Map::standard(&[faction]).unwrap();
        let mut ledger = ForceLedger::new(faction, &map);
        let (regular, elite) = faction.starting_forces();
        let regular_world = map.reserve_world(faction, TokenKind::Regular).unwrap();
        let elite_world = map.reserve_world(faction, TokenKind::Elite).unwrap();
        ledger.add_regular(&map, regular_world, regular, false).unwrap();
        ledger.add_elite(&map, elite_world, elite, false).unwrap();
        (map, ledger)
    }

    fn loc(map: &Map, name: &str) -> LocationId {
        map.find_location(name).unwrap()
    }

    #[test]
    fn test_add_from_reserve_debits_homeworld() {
        let (map, mut ledger) = setup(Faction::Green);
        let caladan = loc(&map, "Caladan");
        let arrakeen = loc(&map, "Arrakeen");

        ledger.add_regular(&map, arrakeen, 10, true).unwrap();

        assert_eq!(ledger.regular_in(arrakeen), 10);
        assert_eq!(ledger.regular_in(caladan), 10);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_reserve_draw_never_splits() {
        let mut map = Map::new();
        let first = map.add_homeworld(
            "First",
            crate::map::Homeworld {
                faction: Faction::Green,
                threshold: 2,
                holds_regular: true,
                holds_elite: true,
                mode: ThresholdMode::Compared,
            },
        );
        let second = map.add_homeworld(
            "Second",
            crate::map::Homeworld {
                faction: Faction::Green,
                threshold: 2,
                holds_regular: true,
                holds_elite: false,
                mode: ThresholdMode::Compared,
            },
        );
        let field = map.add_location("Field", Some(3), 0);

        let mut ledger = ForceLedger::new(Faction::Green, &map);
        ledger.add_regular(&map, first, 3, false).unwrap();
        ledger.add_regular(&map, second, 5, false).unwrap();

        ledger.add_regular(&map, field, 4, true).unwrap();
        assert_eq!(ledger.regular_in(first), 3);
        assert_eq!(ledger.regular_in(second), 1);
        assert_eq!(ledger.regular_in(field), 4);

        // 3 + 1 would cover 4, but one call never splits across homeworlds
        let before = ledger.clone();
        let err = ledger.add_regular(&map, field, 4, true).unwrap_err();
        assert!(matches!(err, RulesError::NoReserve { requested: 4, .. }));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_remove_overdraw_rejected() {
        let (map, mut ledger) = setup(Faction::Black);
        let arrakeen = loc(&map, "Arrakeen");
        ledger.add_regular(&map, arrakeen, 3, true).unwrap();

        let before = ledger.clone();
        let err = ledger.remove_regular(&map, arrakeen, 4).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidOperation);
        assert_eq!(ledger, before);

        ledger.remove_regular(&map, arrakeen, 3).unwrap();
        assert!(ledger.battalion(arrakeen).is_none());
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_unknown_location_rejected() {
        let (map, mut ledger) = setup(Faction::Black);
        let err = ledger
            .add_regular(&map, LocationId(9999), 1, true)
            .unwrap_err();
        assert_eq!(err, RulesError::UnknownLocation(LocationId(9999)));
    }

    #[test]
    fn test_move_is_atomic() {
        let (map, mut ledger) = setup(Faction::Yellow);
        let tabr = loc(&map, "Sietch Tabr");
        let flat = loc(&map, "The Great Flat");
        ledger.add_regular(&map, tabr, 4, true).unwrap();
        ledger.add_elite(&map, tabr, 1, true).unwrap();

        let before = ledger.clone();
        assert!(ledger.move_forces(&map, tabr, flat, 4, 2).is_err());
        assert_eq!(ledger, before);

        ledger.move_forces(&map, tabr, flat, 4, 1).unwrap();
        assert!(ledger.battalion(tabr).is_none());
        assert_eq!(ledger.forces_in(flat), 5);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_kill_routes_advisors_to_regular_tanks() {
        let (map, mut ledger) = setup(Faction::Blue);
        let arrakeen = loc(&map, "Arrakeen");
        let mut clock = DeathClock::new();
        ledger.add_regular(&map, arrakeen, 2, true).unwrap();
        ledger.add_elite(&map, arrakeen, 3, true).unwrap();

        ledger.kill(&map, arrakeen, 2, 3, true, &mut clock).unwrap();

        assert_eq!(ledger.tanks().regular, 5);
        assert_eq!(ledger.tanks().elite, 0);
        assert_eq!(ledger.killed_in_battle(), 5);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_kill_routes_fighting_elites_to_elite_tanks() {
        let (map, mut ledger) = setup(Faction::Red);
        let carthag = loc(&map, "Carthag");
        let mut clock = DeathClock::new();
        ledger.add_regular(&map, carthag, 2, true).unwrap();
        ledger.add_elite(&map, carthag, 3, true).unwrap();

        ledger.kill(&map, carthag, 2, 3, true, &mut clock).unwrap();

        assert_eq!(ledger.tanks().regular, 2);
        assert_eq!(ledger.tanks().elite, 3);
        assert_eq!(ledger.tanks().last_killed_at, Some(0));
        assert_eq!(clock.peek(), 1);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_kill_outside_battle_not_counted() {
        let (map, mut ledger) = setup(Faction::Green);
        let carthag = loc(&map, "Carthag");
        let mut clock = DeathClock::new();
        ledger.add_regular(&map, carthag, 2, true).unwrap();

        ledger.kill(&map, carthag, 2, 0, false, &mut clock).unwrap();
        assert_eq!(ledger.killed_in_battle(), 0);
        assert_eq!(ledger.tanks().regular, 2);
    }

    #[test]
    fn test_empty_kill_consumes_no_tick() {
        let (map, mut ledger) = setup(Faction::Green);
        let carthag = loc(&map, "Carthag");
        let mut clock = DeathClock::new();

        ledger.kill(&map, carthag, 0, 0, false, &mut clock).unwrap();
        assert_eq!(clock.peek(), 0);
        assert_eq!(ledger.tanks().last_killed_at, None);
    }

    #[test]
    fn test_revive_returns_to_reserve_world() {
        let (map, mut ledger) = setup(Faction::Red);
        let carthag = loc(&map, "Carthag");
        let kaitain = loc(&map, "Kaitain");
        let salusa = loc(&map, "Salusa Secundus");
        let mut clock = DeathClock::new();
        ledger.add_regular(&map, carthag, 3, true).unwrap();
        ledger.add_elite(&map, carthag, 2, true).unwrap();
        ledger.kill(&map, carthag, 3, 2, true, &mut clock).unwrap();

        ledger.revive(&map, 2).unwrap();
        ledger.revive_elite(&map, 1).unwrap();

        assert_eq!(ledger.regular_in(kaitain), 14);
        assert_eq!(ledger.elite_in(salusa), 4);
        assert_eq!(ledger.tanks().regular, 1);
        assert_eq!(ledger.tanks().elite, 1);

        let err = ledger.revive(&map, 2).unwrap_err();
        assert!(matches!(err, RulesError::InsufficientTanks { available: 1, .. }));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_occupancy() {
        let (map, mut blue) = setup(Faction::Blue);
        let arrakeen = loc(&map, "Arrakeen");

        blue.add_elite(&map, arrakeen, 1, true).unwrap();
        assert!(!blue.occupies(arrakeen), "advisors alone do not occupy");

        blue.add_regular(&map, arrakeen, 1, true).unwrap();
        assert!(blue.occupies(arrakeen));
    }

    #[test]
    fn test_co_occupation_alliance() {
        let map = Map::standard(&[Faction::Pink, Faction::Green, Faction::Black]).unwrap();
        let carthag = loc(&map, "Carthag");
        let mut pink = ForceLedger::new(Faction::Pink, &map);
        let mut green = ForceLedger::new(Faction::Green, &map);
        let black = ForceLedger::new(Faction::Black, &map);

        green.add_regular(&map, carthag, 1, false).unwrap();

        assert!(!pink.occupies(carthag));
        assert!(pink.occupies_with(carthag, Some(&green)));
        assert!(!pink.occupies_with(carthag, None));
        assert!(!black.occupies_with(carthag, Some(&green)));

        let arrakeen = loc(&map, "Arrakeen");
        pink.add_regular(&map, arrakeen, 1, false).unwrap();
        assert!(!green.occupies(arrakeen));
        assert!(green.occupies_with(arrakeen, Some(&pink)));
    }

    #[test]
    fn test_compared_threshold() {
        let (map, mut ledger) = setup(Faction::Green);
        let caladan = loc(&map, "Caladan");
        let arrakeen = loc(&map, "Arrakeen");

        assert!(ledger.has_high_threshold(&map, caladan).unwrap());
        ledger.add_regular(&map, arrakeen, 11, true).unwrap();
        assert!(ledger.has_low_threshold(&map, caladan).unwrap());
        assert_eq!(
            ledger.has_high_threshold(&map, arrakeen).unwrap_err(),
            RulesError::NotAHomeworld(arrakeen)
        );
    }

    #[test]
    fn test_foreign_homeworld_rejected() {
        let map = Map::standard(&[Faction::Green, Faction::Black]).unwrap();
        let ledger = ForceLedger::new(Faction::Green, &map);
        let giedi = loc(&map, "Giedi Prime");
        assert!(ledger.has_high_threshold(&map, giedi).is_err());
    }

    #[test]
    fn test_latched_threshold_tracks_mutations() {
        let (map, mut ledger) = setup(Faction::Red);
        let salusa = loc(&map, "Salusa Secundus");
        let carthag = loc(&map, "Carthag");

        assert!(ledger.has_high_threshold(&map, salusa).unwrap());
        ledger.move_elite(&map, salusa, carthag, 4).unwrap();
        assert!(ledger.has_low_threshold(&map, salusa).unwrap());
        ledger.move_elite(&map, carthag, salusa, 1).unwrap();
        assert!(ledger.has_high_threshold(&map, salusa).unwrap());
    }

    #[test]
    fn test_latched_threshold_diverges_from_count() {
        let (map, mut ledger) = setup(Faction::Red);
        let salusa = loc(&map, "Salusa Secundus");
        let kaitain = loc(&map, "Kaitain");
        let threshold = map.homeworld(salusa).unwrap().threshold;

        ledger.remove_from_game(&map, salusa, 0, 4).unwrap();

        // One elite left, below a threshold of two, yet the flag still reads high
        assert!(ledger.forces_in(salusa) < threshold);
        assert!(ledger.has_high_threshold(&map, salusa).unwrap());

        // Mutations elsewhere leave the flag alone
        ledger.move_regular(&map, kaitain, loc(&map, "Carthag"), 1).unwrap();
        assert!(ledger.has_high_threshold(&map, salusa).unwrap());

        // A listed mutation at the world recomputes it
        ledger.add_regular(&map, salusa, 0, false).unwrap();
        assert!(ledger.has_low_threshold(&map, salusa).unwrap());
    }

    #[test]
    fn test_remove_from_game_adjusts_baseline() {
        let (map, mut ledger) = setup(Faction::Green);
        let caladan = loc(&map, "Caladan");

        ledger.remove_from_game(&map, caladan, 3, 0).unwrap();
        assert_eq!(ledger.removed_from_game(), (3, 0));
        assert_eq!(ledger.regular_in(caladan), 17);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_removing_revived_elites_as_regulars() {
        let (map, mut ledger) = setup(Faction::Blue);
        let wallach = loc(&map, "Wallach IX");
        let mut clock = DeathClock::new();

        ledger.kill(&map, wallach, 0, 4, false, &mut clock).unwrap();
        ledger.revive(&map, 4).unwrap();
        assert_eq!(ledger.regular_in(wallach), 20);

        // More regulars than were ever deposited as regulars
        ledger.remove_regular(&map, wallach, 18).unwrap();
        ledger.remove_from_game(&map, wallach, 2, 0).unwrap();
        assert!(ledger.battalion(wallach).is_none());
        ledger.check_invariants().unwrap();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "exceeds the battalion")]
    fn test_unvalidated_debit_overdraw_panics() {
        let (map, mut ledger) = setup(Faction::Green);
        let arrakeen = loc(&map, "Arrakeen");
        ledger.add_regular(&map, arrakeen, 2, true).unwrap();
        ledger.debit(arrakeen, TokenKind::Regular, 3);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "at empty")]
    fn test_unvalidated_debit_of_empty_location_panics() {
        let (map, mut ledger) = setup(Faction::Green);
        let arrakeen = loc(&map, "Arrakeen");
        ledger.debit(arrakeen, TokenKind::Elite, 1);
    }

    #[test]
    fn test_kill_in_territory_drains_low_blow_amount_first() {
        let (map, mut ledger) = setup(Faction::Green);
        let erg = map.find_territory("Habbanya Erg").unwrap();
        let low = loc(&map, "Habbanya Erg (16)");
        let high = loc(&map, "Habbanya Erg (15)");
        let mut clock = DeathClock::new();
        ledger.add_regular(&map, low, 2, true).unwrap();
        ledger.add_regular(&map, high, 3, true).unwrap();

        ledger
            .kill_forces_in_territory(&map, erg, 4, 0, true, &mut clock)
            .unwrap();

        assert!(ledger.battalion(low).is_none());
        assert_eq!(ledger.regular_in(high), 1);
        assert_eq!(ledger.tanks().regular, 4);
        assert_eq!(clock.peek(), 1);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_territory_overdraw_rejected() {
        let (map, mut ledger) = setup(Faction::Green);
        let erg = map.find_territory("Habbanya Erg").unwrap();
        ledger
            .add_regular(&map, loc(&map, "Habbanya Erg (16)"), 2, true)
            .unwrap();
        let mut clock = DeathClock::new();

        let before = ledger.clone();
        let err = ledger
            .kill_forces_in_territory(&map, erg, 3, 0, false, &mut clock)
            .unwrap_err();
        assert!(matches!(
            err,
            RulesError::InsufficientForcesInTerritory { requested: 3, available: 2, .. }
        ));
        assert_eq!(ledger, before);
        assert_eq!(clock.peek(), 0);
    }

    #[test]
    fn test_forces_to_reserves() {
        let (map, mut ledger) = setup(Faction::Grey);
        let gap = map.find_territory("Old Gap").unwrap();
        let ix = loc(&map, "Ix");
        let underground = loc(&map, "Ix Underground");
        ledger.add_regular(&map, loc(&map, "Old Gap (9)"), 3, true).unwrap();
        ledger.add_elite(&map, loc(&map, "Old Gap (8)"), 2, true).unwrap();

        ledger.forces_to_reserves(&map, gap, 3, 2).unwrap();

        assert_eq!(ledger.forces_in_territory(&map, gap).unwrap(), (0, 0));
        assert_eq!(ledger.regular_in(ix), 13);
        assert_eq!(ledger.elite_in(underground), 7);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_clone_does_not_alias() {
        let (map, mut ledger) = setup(Faction::Green);
        let arrakeen = loc(&map, "Arrakeen");
        let snapshot = ledger.clone();

        ledger.add_regular(&map, arrakeen, 5, true).unwrap();

        assert_eq!(snapshot.forces_in(arrakeen), 0);
        assert_ne!(snapshot, ledger);
    }
}
