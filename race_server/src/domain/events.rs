// Race milestones produced by the simulation systems during a tick.

use crate::domain::state::{Item, PlayerId};

#[derive(Debug, Clone, PartialEq)]
pub enum RaceEvent {
    /// First forward crossing of the finish line.
    LapStarted { player_id: PlayerId, total_laps: u32 },
    LapCompleted {
        player_id: PlayerId,
        lap: u32,
        total_laps: u32,
    },
    /// Finish line crossed with checkpoints still owed this lap.
    InvalidFinish {
        player_id: PlayerId,
        remaining: usize,
        next_checkpoint: usize,
    },
    CheckpointPassed {
        player_id: PlayerId,
        /// 1-based count of checkpoints passed this lap.
        checkpoint: usize,
        total: usize,
        lap: u32,
    },
    BoostActivated { player_id: PlayerId, level: u8 },
    ItemPicked { player_id: PlayerId, item: Item },
    ItemUsed { player_id: PlayerId, item: Item },
    /// Final lap completed; the room assigns the finishing position.
    Finished { player_id: PlayerId, finish_time: u64 },
}

impl RaceEvent {
    pub fn player_id(&self) -> PlayerId {
        match *self {
            RaceEvent::LapStarted { player_id, .. }
            | RaceEvent::LapCompleted { player_id, .. }
            | RaceEvent::InvalidFinish { player_id, .. }
            | RaceEvent::CheckpointPassed { player_id, .. }
            | RaceEvent::BoostActivated { player_id, .. }
            | RaceEvent::ItemPicked { player_id, .. }
            | RaceEvent::ItemUsed { player_id, .. }
            | RaceEvent::Finished { player_id, .. } => player_id,
        }
    }
}
