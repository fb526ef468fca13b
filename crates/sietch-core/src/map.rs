//! Locations, territories and homeworlds.
//!
//! This module contains:
//! - Stable integer handles for locations and territories
//! - The `Map` arena that owns both and links them by index
//! - Homeworld data (owner, threshold, reserve roles)
//! - The standard setup map
//!
//! Locations and territories never hold references to each other. A location
//! is created first, then linked to its territory with [`Map::link`], which
//! records the index on both sides.

use crate::error::{RulesError, TokenKind};
use crate::faction::Faction;
use serde::{Deserialize, Serialize};

/// Number of storm sectors around the board
pub const TOTAL_SECTORS: u8 = 18;

/// Handle of a location in a [`Map`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId(pub usize);

/// Handle of a territory in a [`Map`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TerritoryId(pub usize);

/// How a homeworld's high/low threshold state is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdMode {
    /// Compare the current count to the threshold on every query
    Compared,
    /// Keep a flag that is recomputed only by mutations touching this world
    Latched,
}

/// Off-board reserve belonging to one faction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Homeworld {
    /// Owning faction
    pub faction: Faction,
    /// Count at or above which the world is at high threshold
    pub threshold: u32,
    /// Revived regular forces return here
    pub holds_regular: bool,
    /// Revived elite forces return here
    pub holds_elite: bool,
    pub mode: ThresholdMode,
}

impl Homeworld {
    /// Whether this world is the reserve for the given token type
    pub fn holds(&self, kind: TokenKind) -> bool {
        match kind {
            TokenKind::Regular => self.holds_regular,
            TokenKind::Elite => self.holds_elite,
        }
    }
}

/// A placeable slot: a battlefield cell or a homeworld
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    /// Storm sector, if the location lies on the board
    pub sector: Option<u8>,
    /// Fixed tie-break key used when draining a territory
    pub blow_amount: u32,
    /// Territory this location belongs to, once linked
    pub territory: Option<TerritoryId>,
    /// Present for homeworlds only
    pub homeworld: Option<Homeworld>,
}

impl Location {
    /// Whether this location is a homeworld
    pub fn is_homeworld(&self) -> bool {
        self.homeworld.is_some()
    }
}

/// A named board region made up of one or more locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Territory {
    pub id: TerritoryId,
    pub name: String,
    pub is_stronghold: bool,
    /// Locations linked to this territory, in link order
    pub locations: Vec<LocationId>,
}

/// Arena holding every territory and location of a game
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Map {
    territories: Vec<Territory>,
    locations: Vec<Location>,
}

impl Map {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a territory with no locations yet
    pub fn add_territory(&mut self, name: impl Into<String>, is_stronghold: bool) -> TerritoryId {
        let id = TerritoryId(self.territories.len());
        self.territories.push(Territory {
            id,
            name: name.into(),
            is_stronghold,
            locations: Vec::new(),
        });
        id
    }

    /// Register an unlinked battlefield location
    pub fn add_location(
        &mut self,
        name: impl Into<String>,
        sector: Option<u8>,
        blow_amount: u32,
    ) -> LocationId {
        let id = LocationId(self.locations.len());
        self.locations.push(Location {
            id,
            name: name.into(),
            sector,
            blow_amount,
            territory: None,
            homeworld: None,
        });
        id
    }

    /// Register a homeworld; homeworlds are never linked to a territory
    pub fn add_homeworld(&mut self, name: impl Into<String>, homeworld: Homeworld) -> LocationId {
        let id = LocationId(self.locations.len());
        self.locations.push(Location {
            id,
            name: name.into(),
            sector: None,
            blow_amount: 0,
            territory: None,
            homeworld: Some(homeworld),
        });
        id
    }

    /// Link a location to a territory, recording the index on both sides
    pub fn link(&mut self, location: LocationId, territory: TerritoryId) -> Result<(), RulesError> {
        let loc = self
            .locations
            .get(location.0)
            .ok_or(RulesError::UnknownLocation(location))?;
        if loc.is_homeworld() {
            return Err(RulesError::InvalidSetup(format!(
                "homeworld {} cannot belong to a territory",
                loc.name
            )));
        }
        if loc.territory.is_some() {
            return Err(RulesError::AlreadyLinked(location));
        }
        let terr = self
            .territories
            .get_mut(territory.0)
            .ok_or(RulesError::UnknownTerritory(territory))?;

        terr.locations.push(location);
        self.locations[location.0].territory = Some(territory);
        Ok(())
    }

    /// Look up a location
    pub fn location(&self, id: LocationId) -> Result<&Location, RulesError> {
        self.locations.get(id.0).ok_or(RulesError::UnknownLocation(id))
    }

    /// Look up a territory
    pub fn territory(&self, id: TerritoryId) -> Result<&Territory, RulesError> {
        self.territories
            .get(id.0)
            .ok_or(RulesError::UnknownTerritory(id))
    }

    /// Look up a homeworld's data
    pub fn homeworld(&self, id: LocationId) -> Result<&Homeworld, RulesError> {
        self.location(id)?
            .homeworld
            .as_ref()
            .ok_or(RulesError::NotAHomeworld(id))
    }

    /// All locations in registration order
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// All territories in registration order
    pub fn territories(&self) -> &[Territory] {
        &self.territories
    }

    /// Find a location by exact name
    pub fn find_location(&self, name: &str) -> Option<LocationId> {
        self.locations.iter().find(|l| l.name == name).map(|l| l.id)
    }

    /// Find a territory by exact name
    pub fn find_territory(&self, name: &str) -> Option<TerritoryId> {
        self.territories.iter().find(|t| t.name == name).map(|t| t.id)
    }

    /// A faction's homeworlds in registration order
    pub fn homeworlds_of(&self, faction: Faction) -> impl Iterator<Item = &Location> + '_ {
        self.locations.iter().filter(move |l| {
            l.homeworld
                .as_ref()
                .is_some_and(|hw| hw.faction == faction)
        })
    }

    /// The homeworld that receives revived tokens of the given type
    pub fn reserve_world(&self, faction: Faction, kind: TokenKind) -> Option<LocationId> {
        self.homeworlds_of(faction)
            .find(|l| l.homeworld.as_ref().is_some_and(|hw| hw.holds(kind)))
            .map(|l| l.id)
    }

    /// A territory's locations in draining order: ascending blow amount,
    /// then registration order
    pub fn drain_order(&self, territory: TerritoryId) -> Result<Vec<LocationId>, RulesError> {
        let mut ids = self.territory(territory)?.locations.clone();
        ids.sort_by_key(|id| (self.locations[id.0].blow_amount, *id));
        Ok(ids)
    }

    /// Build the standard board plus homeworlds for the given factions
    pub fn standard(factions: &[Faction]) -> Result<Self, RulesError> {
        let mut map = Map::new();

        for &(name, stronghold, cells) in STANDARD_TERRITORIES {
            let territory = map.add_territory(name, stronghold);
            for &(sector, blow_amount) in cells {
                let location = if cells.len() == 1 {
                    map.add_location(name, Some(sector), blow_amount)
                } else {
                    map.add_location(format!("{} ({})", name, sector), Some(sector), blow_amount)
                };
                map.link(location, territory)?;
            }
        }

        for &faction in factions {
            for (name, homeworld) in standard_homeworlds(faction) {
                map.add_homeworld(name, homeworld);
            }
        }

        Ok(map)
    }
}

/// (name, stronghold, [(sector, blow amount)])
type TerritorySpec = (&'static str, bool, &'static [(u8, u32)]);

const STANDARD_TERRITORIES: &[TerritorySpec] = &[
    ("Arrakeen", true, &[(9, 0)]),
    ("Carthag", true, &[(10, 0)]),
    ("Sietch Tabr", true, &[(13, 0)]),
    ("Habbanya Sietch", true, &[(16, 0)]),
    ("Tuek's Sietch", true, &[(4, 0)]),
    ("Imperial Basin", false, &[(8, 0), (9, 0), (10, 0)]),
    ("The Great Flat", false, &[(14, 10)]),
    ("Habbanya Erg", false, &[(15, 8), (16, 0)]),
    ("Old Gap", false, &[(8, 6), (9, 0), (10, 0)]),
    ("Red Chasm", false, &[(6, 8)]),
    ("Funeral Plain", false, &[(14, 6)]),
    ("Rock Outcroppings", false, &[(12, 6), (13, 0)]),
    ("Polar Sink", false, &[(0, 0)]),
];

fn standard_homeworlds(faction: Faction) -> Vec<(&'static str, Homeworld)> {
    let both = |threshold| Homeworld {
        faction,
        threshold,
        holds_regular: true,
        holds_elite: true,
        mode: ThresholdMode::Compared,
    };
    let regular = |threshold| Homeworld {
        faction,
        threshold,
        holds_regular: true,
        holds_elite: false,
        mode: ThresholdMode::Compared,
    };
    let elite = |threshold, mode| Homeworld {
        faction,
        threshold,
        holds_regular: false,
        holds_elite: true,
        mode,
    };

    match faction {
        Faction::Green => vec![("Caladan", both(10))],
        Faction::Black => vec![("Giedi Prime", both(7))],
        Faction::Yellow => vec![("Southern Hemisphere", both(9))],
        Faction::Red => vec![
            ("Kaitain", regular(5)),
            ("Salusa Secundus", elite(2, ThresholdMode::Latched)),
        ],
        Faction::Orange => vec![("Junction", both(6))],
        Faction::Blue => vec![("Wallach IX", both(11))],
        Faction::Grey => vec![
            ("Ix", regular(5)),
            ("Ix Underground", elite(3, ThresholdMode::Compared)),
        ],
        Faction::Purple => vec![("Tleilax", both(7))],
        Faction::Brown => vec![("Tupile", both(8))],
        Faction::White => vec![("Richese", both(8))],
        Faction::Pink => vec![("Ecaz", both(10))],
        Faction::Cyan => vec![("Grumman", both(9))],
    }
}
