// Gameplay tuning, kept apart from runtime/server configuration.

pub mod boost;
pub mod collision;
pub mod kart;
pub mod race;

pub use boost::{BoostLevel, BoostTuning};
pub use collision::{KartCollisionTuning, WallTuning};
pub use kart::KartTuning;
pub use race::{ItemTuning, RaceTuning};

/// Every tuning table a room needs to simulate a race.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tuning {
    pub kart: KartTuning,
    pub boost: BoostTuning,
    pub walls: WallTuning,
    pub karts: KartCollisionTuning,
    pub race: RaceTuning,
    pub items: ItemTuning,
}
