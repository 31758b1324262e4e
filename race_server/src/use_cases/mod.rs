// Use cases layer: room workflows for the race server.

pub mod game;
pub mod lobby;
pub mod room;
pub mod types;

pub use lobby::{JoinedRoom, RoomHandle, RoomRegistry};
pub use room::Room;
pub use types::{
    Audience, LobbyPlayer, Outbound, RaceSnapshot, RoomCommand, RoomEvent, RoomPhase,
    RoomSettings, RoomSummary,
};
