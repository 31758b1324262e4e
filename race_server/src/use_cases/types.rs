// Use-case level inputs/outputs crossing the room task boundary.

use crate::domain::systems::ranking::RaceResult;
use crate::domain::{InputState, KartSnapshot, PlayerId, RaceEvent, RoomError, Track};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Runtime settings shared by every room the registry spawns.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Maximum players per room.
    pub capacity: usize,
    /// Capacity for inbound room commands.
    pub command_channel_capacity: usize,
    /// Capacity for broadcast room events and snapshots.
    pub broadcast_capacity: usize,
    /// Fixed tick interval for the race loop.
    pub tick_interval: Duration,
    /// Physics runs during the countdown; the race clock starts when it elapses.
    pub start_countdown: Duration,
    /// Delay between the results screen and the rematch vote.
    pub results_delay: Duration,
    /// How long players have to vote for a rematch.
    pub rematch_window: Duration,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            capacity: 8,
            command_channel_capacity: 1024,
            broadcast_capacity: 128,
            tick_interval: Duration::from_millis(1000 / 60),
            start_countdown: Duration::from_millis(8800),
            results_delay: Duration::from_secs(3),
            rematch_window: Duration::from_secs(10),
        }
    }
}

/// Requests from a session to its room task, applied in arrival order.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        player_id: PlayerId,
        pseudo: String,
        color: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Leave { player_id: PlayerId },
    SetReady { player_id: PlayerId },
    HostStart { player_id: PlayerId },
    SelectMap { player_id: PlayerId, map_id: String },
    ChangeColor { player_id: PlayerId, color: String },
    Input {
        player_id: PlayerId,
        input: InputState,
        use_item: bool,
    },
    VoteRematch { player_id: PlayerId },
    LeaveResults { player_id: PlayerId },
}

impl RoomCommand {
    pub fn player_id(&self) -> PlayerId {
        match self {
            RoomCommand::Join { player_id, .. }
            | RoomCommand::Leave { player_id }
            | RoomCommand::SetReady { player_id }
            | RoomCommand::HostStart { player_id }
            | RoomCommand::SelectMap { player_id, .. }
            | RoomCommand::ChangeColor { player_id, .. }
            | RoomCommand::Input { player_id, .. }
            | RoomCommand::VoteRematch { player_id }
            | RoomCommand::LeaveResults { player_id } => *player_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Lobby,
    /// Physics is running; the race clock is held until the countdown elapses.
    Starting,
    Racing,
    /// Results are out; the rematch vote has not opened yet.
    Ended,
    RematchPending,
}

impl RoomPhase {
    /// Phases in which the tick loop runs.
    pub fn is_simulating(self) -> bool {
        matches!(self, RoomPhase::Starting | RoomPhase::Racing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoomPhase::Lobby => "lobby",
            RoomPhase::Starting => "starting",
            RoomPhase::Racing => "racing",
            RoomPhase::Ended => "ended",
            RoomPhase::RematchPending => "rematch_pending",
        }
    }
}

/// Who should receive a room event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Room,
    Player(PlayerId),
    AllExcept(PlayerId),
}

impl Audience {
    pub fn includes(self, player_id: PlayerId) -> bool {
        match self {
            Audience::Room => true,
            Audience::Player(id) => id == player_id,
            Audience::AllExcept(id) => id != player_id,
        }
    }
}

/// Lobby view of a player.
#[derive(Debug, Clone, PartialEq)]
pub struct LobbyPlayer {
    pub id: PlayerId,
    pub pseudo: String,
    pub color: String,
    pub ready: bool,
    pub is_host: bool,
}

#[derive(Debug, Clone)]
pub enum RoomEvent {
    Joined {
        room_id: Arc<str>,
        private: bool,
        is_host: bool,
        player_id: PlayerId,
        map_id: String,
    },
    PlayerJoined { player_id: PlayerId, pseudo: String },
    PlayerLeft { player_id: PlayerId },
    PlayersUpdate {
        players: Vec<LobbyPlayer>,
        host_id: Option<PlayerId>,
        can_start: bool,
    },
    HostChanged { host_id: PlayerId },
    MapSelected { map_id: String },
    ColorChanged { player_id: PlayerId, color: String },
    /// Carries the full track geometry for the race.
    GameStarted { track: Arc<Track>, countdown_ms: u64 },
    /// The countdown elapsed and the race clock is running.
    RaceClockStarted,
    TimeWarning { remaining_ms: u64 },
    /// Per-player race milestone (lap, checkpoint, boost, item).
    Progress(RaceEvent),
    PlayerFinished {
        player_id: PlayerId,
        pseudo: String,
        finish_time: u64,
        position: usize,
    },
    RaceEnded { results: Vec<RaceResult>, race_time: u64 },
    RematchOpened { window_ms: u64 },
    RematchVote {
        player_id: PlayerId,
        votes: usize,
        total: usize,
    },
    RematchStarting { map_id: String },
    ReturnToLobby,
    Kicked { reason: &'static str },
    Rejected { reason: &'static str },
}

/// A room event plus the players it is addressed to.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub audience: Audience,
    pub event: RoomEvent,
}

impl Outbound {
    pub fn room(event: RoomEvent) -> Self {
        Self {
            audience: Audience::Room,
            event,
        }
    }

    pub fn to(player_id: PlayerId, event: RoomEvent) -> Self {
        Self {
            audience: Audience::Player(player_id),
            event,
        }
    }

    pub fn all_except(player_id: PlayerId, event: RoomEvent) -> Self {
        Self {
            audience: Audience::AllExcept(player_id),
            event,
        }
    }
}

/// Per-tick race state handed to the broadcast layer.
#[derive(Debug, Clone)]
pub struct RaceSnapshot {
    pub karts: Vec<KartSnapshot>,
    pub total_checkpoints: usize,
    pub laps_to_win: u32,
    /// Elapsed race clock; 0 during the countdown.
    pub game_time: u64,
    pub max_time: Option<u64>,
    pub remaining_time: Option<u64>,
}

/// Coarse room state published for the registry and the room listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub room_id: Arc<str>,
    pub private: bool,
    pub phase: RoomPhase,
    pub players: usize,
    pub capacity: usize,
    /// Ids of the players currently in the room.
    pub members: Vec<PlayerId>,
    /// Set once the room task has exited; no further joins are possible.
    pub closed: bool,
}

impl RoomSummary {
    pub fn has_member(&self, player_id: PlayerId) -> bool {
        !self.closed && self.members.contains(&player_id)
    }

    pub fn is_joinable(&self) -> bool {
        !self.closed && self.phase == RoomPhase::Lobby && self.players < self.capacity
    }
}

