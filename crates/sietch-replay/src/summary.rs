//! Human-readable report of a replayed game.

use serde::Serialize;
use sietch_core::{EventLog, Faction, GameState, Phase, RuleRevision};
use std::fmt;
use uuid::Uuid;

/// One player's line in the report
#[derive(Debug, Serialize)]
pub struct PlayerSummary {
    pub faction: Faction,
    pub seat: u8,
    pub eligible: bool,
    pub ally: Option<Faction>,
    /// (location name, regular, elite)
    pub forces: Vec<(String, u32, u32)>,
    pub tanks: (u32, u32),
    pub removed: (u32, u32),
    pub killed_in_battle: u32,
}

/// Turn order and force positions after a replay
#[derive(Debug, Serialize)]
pub struct Summary {
    pub game_id: Uuid,
    pub revision: RuleRevision,
    pub events_applied: u64,
    pub storm_sector: u8,
    pub phase: Option<Phase>,
    pub round: Option<u32>,
    pub current_player: Option<Faction>,
    pub turn_order: Vec<Faction>,
    pub players: Vec<PlayerSummary>,
}

impl Summary {
    pub fn new(log: &EventLog, game: &GameState) -> Self {
        let map = game.map();
        let players = game
            .players()
            .iter()
            .map(|p| {
                let forces = p
                    .ledger
                    .battalions()
                    .map(|b| {
                        let name = map
                            .location(b.location)
                            .map(|l| l.name.clone())
                            .unwrap_or_else(|_| format!("{:?}", b.location));
                        (name, b.regular, b.elite)
                    })
                    .collect();
                let tanks = p.ledger.tanks();
                PlayerSummary {
                    faction: p.faction,
                    seat: p.seat,
                    eligible: game.is_eligible(p.faction),
                    ally: game.ally_of(p.faction),
                    forces,
                    tanks: (tanks.regular, tanks.elite),
                    removed: p.ledger.removed_from_game(),
                    killed_in_battle: p.ledger.killed_in_battle(),
                }
            })
            .collect();

        Self {
            game_id: log.game_id,
            revision: game.revision(),
            events_applied: game.events_applied(),
            storm_sector: game.storm_sector(),
            phase: game.phase(),
            round: game.sequencer().map(|s| s.round()),
            current_player: game.current_player(),
            turn_order: game.players_in_order(),
            players,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Game {} ({:?} rules)", self.game_id, self.revision)?;
        writeln!(
            f,
            "{} events applied, storm in sector {}",
            self.events_applied, self.storm_sector
        )?;

        match (self.phase, self.round) {
            (Some(phase), Some(round)) => {
                writeln!(f, "Phase {:?}, round {}", phase, round + 1)?;
                let order: Vec<String> = self.turn_order.iter().map(|p| format!("{:?}", p)).collect();
                writeln!(f, "Turn order: {}", order.join(" -> "))?;
                match self.current_player {
                    Some(player) => writeln!(f, "Current player: {:?}", player)?,
                    None => writeln!(f, "Current player: none")?,
                }
            }
            _ => writeln!(f, "No phase in progress")?,
        }

        for player in &self.players {
            writeln!(f)?;
            write!(f, "{:?} (seat {})", player.faction, player.seat)?;
            if !player.eligible {
                write!(f, " [ineligible]")?;
            }
            if let Some(ally) = player.ally {
                write!(f, " allied with {:?}", ally)?;
            }
            writeln!(f)?;
            for (name, regular, elite) in &player.forces {
                writeln!(f, "  {:<24} {:>3} regular {:>3} elite", name, regular, elite)?;
            }
            writeln!(
                f,
                "  tanks {}/{}, removed {}/{}, killed in battle {}",
                player.tanks.0,
                player.tanks.1,
                player.removed.0,
                player.removed.1,
                player.killed_in_battle
            )?;
        }
        Ok(())
    }
}
