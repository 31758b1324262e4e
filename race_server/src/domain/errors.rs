// Domain-level errors for room workflows and track data.

use std::fmt;

/// Reasons a room request is rejected. Nothing is mutated when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    RoomFull,
    RoomNotFound,
    AlreadyStarted,
    NotHost,
    NotAllReady,
    NotInLobby,
    UnknownMap,
    NotInRoom,
    /// The room was torn down while the request was in flight.
    RoomClosed,
}

impl RoomError {
    /// Stable message sent back to the requesting client.
    pub fn reason(self) -> &'static str {
        match self {
            RoomError::RoomFull => "room is full",
            RoomError::RoomNotFound => "room not found",
            RoomError::AlreadyStarted => "race already started",
            RoomError::NotHost => "only the host can do that",
            RoomError::NotAllReady => "not every player is ready",
            RoomError::NotInLobby => "only allowed in the lobby",
            RoomError::UnknownMap => "unknown map",
            RoomError::NotInRoom => "not in a room",
            RoomError::RoomClosed => "room closed",
        }
    }
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

#[derive(Debug)]
pub enum TrackError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackError::Io(e) => write!(f, "failed to read track: {e}"),
            TrackError::Parse(e) => write!(f, "failed to parse track: {e}"),
            TrackError::Invalid(reason) => write!(f, "invalid track: {reason}"),
        }
    }
}

impl From<std::io::Error> for TrackError {
    fn from(e: std::io::Error) -> Self {
        TrackError::Io(e)
    }
}

impl From<serde_json::Error> for TrackError {
    fn from(e: serde_json::Error) -> Self {
        TrackError::Parse(e)
    }
}
