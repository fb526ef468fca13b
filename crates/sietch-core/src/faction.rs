//! Factions and seats.
//!
//! This module contains:
//! - The fixed roster of playable factions
//! - Per-faction force rules (starting counts, elite combat capability)
//! - Recognition of the co-occupation alliance

use serde::{Deserialize, Serialize};

/// A player's fixed position in turn-order space (0..N-1)
pub type Seat = u8;

/// One of the playable sides, identified by colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Faction {
    Green,
    Black,
    Yellow,
    Red,
    Orange,
    /// Elites are advisors: present on the board but never in combat
    Blue,
    Grey,
    Purple,
    Brown,
    White,
    /// Allies of this faction co-occupy locations with it
    Pink,
    Cyan,
}

impl Faction {
    /// All factions in roster order
    pub const ALL: [Faction; 12] = [
        Faction::Green,
        Faction::Black,
        Faction::Yellow,
        Faction::Red,
        Faction::Orange,
        Faction::Blue,
        Faction::Grey,
        Faction::Purple,
        Faction::Brown,
        Faction::White,
        Faction::Pink,
        Faction::Cyan,
    ];

    /// Whether this faction's elite tokens count as combat-capable presence
    pub fn elites_fight(&self) -> bool {
        !matches!(self, Faction::Blue)
    }

    /// Standard (regular, elite) token pool at game start
    pub fn starting_forces(&self) -> (u32, u32) {
        match self {
            Faction::Yellow => (17, 3),
            Faction::Red => (15, 5),
            Faction::Blue => (16, 4),
            Faction::Grey => (13, 7),
            Faction::Cyan => (18, 2),
            _ => (20, 0),
        }
    }

    /// Whether an alliance between these two factions lets each count the
    /// other's presence as its own occupation
    pub fn co_occupies_with(&self, ally: Faction) -> bool {
        *self != ally && (*self == Faction::Pink || ally == Faction::Pink)
    }
}
