// Domain layer: core simulation types and rules.

pub mod errors;
pub mod events;
pub mod geometry;
pub mod state;
pub mod systems;
pub mod track;
pub mod tuning;

pub use errors::{RoomError, TrackError};
pub use events::RaceEvent;
pub use state::{InputState, Item, KartSnapshot, Player, PlayerId};
pub use track::{Track, TrackCatalog};
pub use tuning::Tuning;
