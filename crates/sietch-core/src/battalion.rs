//! A faction's token pool at one location.

use crate::error::TokenKind;
use crate::faction::Faction;
use crate::map::LocationId;
use serde::{Deserialize, Serialize};

/// Regular and elite token counts of one faction at one location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battalion {
    pub faction: Faction,
    pub location: LocationId,
    pub regular: u32,
    pub elite: u32,
}

impl Battalion {
    /// Create an empty battalion
    pub fn new(faction: Faction, location: LocationId) -> Self {
        Self {
            faction,
            location,
            regular: 0,
            elite: 0,
        }
    }

    /// Total tokens of both kinds
    pub fn total(&self) -> u32 {
        self.regular + self.elite
    }

    /// Whether no tokens are left
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Count of one token kind
    pub fn get(&self, kind: TokenKind) -> u32 {
        match kind {
            TokenKind::Regular => self.regular,
            TokenKind::Elite => self.elite,
        }
    }

    /// Add tokens of one kind
    pub fn add(&mut self, kind: TokenKind, amount: u32) {
        match kind {
            TokenKind::Regular => self.regular += amount,
            TokenKind::Elite => self.elite += amount,
        }
    }

    /// Remove tokens of one kind, returning false (and changing nothing)
    /// if not enough are present
    pub fn try_remove(&mut self, kind: TokenKind, amount: u32) -> bool {
        let count = match kind {
            TokenKind::Regular => &mut self.regular,
            TokenKind::Elite => &mut self.elite,
        };
        if *count < amount {
            return false;
        }
        *count -= amount;
        true
    }

    /// Tokens that count toward combat-capable presence
    pub fn combat_strength(&self) -> u32 {
        if self.faction.elites_fight() {
            self.total()
        } else {
            self.regular
        }
    }
}
