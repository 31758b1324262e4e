// Wire protocol DTOs and conversions for public race server messages.
// Every message is `{"type": ..., "data": ...}`; payload fields are camelCase.

use crate::domain::systems::ranking::RaceResult;
use crate::domain::{InputState, Item, KartSnapshot, RaceEvent, Track};
use crate::use_cases::{LobbyPlayer, RaceSnapshot, RoomEvent, RoomSummary};
use serde::{Deserialize, Serialize};

/// Longest display name kept, in characters.
pub const MAX_PSEUDO_LEN: usize = 20;
/// Longest color tag kept, in characters.
pub const MAX_COLOR_LEN: usize = 32;
pub const DEFAULT_PSEUDO: &str = "Player";
pub const DEFAULT_COLOR: &str = "red";

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    // Room entry; only accepted while the connection is not in a room.
    Join {
        #[serde(default)]
        pseudo: String,
        #[serde(default)]
        color: String,
    },
    CreatePrivateRoom {
        #[serde(default)]
        pseudo: String,
        #[serde(default)]
        color: String,
    },
    JoinByCode {
        code: String,
        #[serde(default)]
        pseudo: String,
        #[serde(default)]
        color: String,
    },
    // Lobby.
    SetReady,
    HostStart,
    SelectMap {
        map_id: String,
    },
    ChangeColor {
        color: String,
    },
    // Race.
    Input(PlayerInputDto),
    // Results.
    VoteRematch,
    LeaveResults,
}

/// Held directional keys plus a one-shot item use.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerInputDto {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub use_item: bool,
}

impl From<PlayerInputDto> for InputState {
    fn from(input: PlayerInputDto) -> Self {
        Self {
            up: input.up,
            down: input.down,
            left: input.left,
            right: input.right,
        }
    }
}

/// Trims and caps a display name; blank names fall back to a default.
pub fn sanitize_pseudo(raw: &str) -> String {
    let pseudo: String = raw.trim().chars().take(MAX_PSEUDO_LEN).collect();
    if pseudo.is_empty() {
        DEFAULT_PSEUDO.to_string()
    } else {
        pseudo
    }
}

pub fn sanitize_color(raw: &str) -> String {
    let color: String = raw.trim().chars().take(MAX_COLOR_LEN).collect();
    if color.is_empty() {
        DEFAULT_COLOR.to_string()
    } else {
        color
    }
}

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    // Lobby.
    Joined {
        room_id: String,
        private: bool,
        is_host: bool,
        player_id: String,
        map_id: String,
    },
    PlayerJoined {
        player_id: String,
        pseudo: String,
    },
    PlayerLeft {
        player_id: String,
    },
    PlayersUpdate {
        players: Vec<LobbyPlayerDto>,
        host_id: Option<String>,
        can_start: bool,
    },
    HostChanged {
        host_id: String,
    },
    MapSelected {
        map_id: String,
    },
    ColorChanged {
        player_id: String,
        color: String,
    },
    // Race lifecycle.
    GameStarted {
        countdown_ms: u64,
    },
    MapData(Track),
    RaceStarted,
    GameState(GameStateDto),
    TimeWarning {
        remaining_ms: u64,
    },
    // Per-player progress.
    LapStarted {
        total_laps: u32,
    },
    LapCompleted {
        lap: u32,
        total_laps: u32,
    },
    InvalidFinish {
        remaining: usize,
        next_checkpoint: usize,
    },
    CheckpointPassed {
        checkpoint: usize,
        total: usize,
        lap: u32,
    },
    BoostActivated {
        level: u8,
    },
    ItemPicked {
        item: &'static str,
    },
    ItemUsed {
        item: &'static str,
    },
    PlayerFinished {
        player_id: String,
        pseudo: String,
        finish_time: u64,
        position: usize,
    },
    RaceEnded {
        results: Vec<RaceResultDto>,
        race_time: u64,
    },
    // Rematch.
    RematchOpened {
        window_ms: u64,
    },
    RematchVote {
        player_id: String,
        votes: usize,
        total: usize,
    },
    RematchStarting {
        map_id: String,
    },
    ReturnToLobby,
    Kicked {
        reason: &'static str,
    },
    Error {
        reason: &'static str,
    },
}

impl ServerMessage {
    /// Wire messages for one room event. A race start also ships the track geometry.
    pub fn from_event(event: &RoomEvent) -> Vec<ServerMessage> {
        let msg = match event {
            RoomEvent::Joined {
                room_id,
                private,
                is_host,
                player_id,
                map_id,
            } => ServerMessage::Joined {
                room_id: room_id.to_string(),
                private: *private,
                is_host: *is_host,
                player_id: player_id.to_string(),
                map_id: map_id.clone(),
            },
            RoomEvent::PlayerJoined { player_id, pseudo } => ServerMessage::PlayerJoined {
                player_id: player_id.to_string(),
                pseudo: pseudo.clone(),
            },
            RoomEvent::PlayerLeft { player_id } => ServerMessage::PlayerLeft {
                player_id: player_id.to_string(),
            },
            RoomEvent::PlayersUpdate {
                players,
                host_id,
                can_start,
            } => ServerMessage::PlayersUpdate {
                players: players.iter().map(LobbyPlayerDto::from).collect(),
                host_id: host_id.map(|id| id.to_string()),
                can_start: *can_start,
            },
            RoomEvent::HostChanged { host_id } => ServerMessage::HostChanged {
                host_id: host_id.to_string(),
            },
            RoomEvent::MapSelected { map_id } => ServerMessage::MapSelected {
                map_id: map_id.clone(),
            },
            RoomEvent::ColorChanged { player_id, color } => ServerMessage::ColorChanged {
                player_id: player_id.to_string(),
                color: color.clone(),
            },
            RoomEvent::GameStarted {
                track,
                countdown_ms,
            } => {
                return vec![
                    ServerMessage::GameStarted {
                        countdown_ms: *countdown_ms,
                    },
                    ServerMessage::MapData(track.as_ref().clone()),
                ];
            }
            RoomEvent::RaceClockStarted => ServerMessage::RaceStarted,
            RoomEvent::TimeWarning { remaining_ms } => ServerMessage::TimeWarning {
                remaining_ms: *remaining_ms,
            },
            RoomEvent::Progress(event) => return progress_message(event).into_iter().collect(),
            RoomEvent::PlayerFinished {
                player_id,
                pseudo,
                finish_time,
                position,
            } => ServerMessage::PlayerFinished {
                player_id: player_id.to_string(),
                pseudo: pseudo.clone(),
                finish_time: *finish_time,
                position: *position,
            },
            RoomEvent::RaceEnded { results, race_time } => ServerMessage::RaceEnded {
                results: results.iter().map(RaceResultDto::from).collect(),
                race_time: *race_time,
            },
            RoomEvent::RematchOpened { window_ms } => ServerMessage::RematchOpened {
                window_ms: *window_ms,
            },
            RoomEvent::RematchVote {
                player_id,
                votes,
                total,
            } => ServerMessage::RematchVote {
                player_id: player_id.to_string(),
                votes: *votes,
                total: *total,
            },
            RoomEvent::RematchStarting { map_id } => ServerMessage::RematchStarting {
                map_id: map_id.clone(),
            },
            RoomEvent::ReturnToLobby => ServerMessage::ReturnToLobby,
            RoomEvent::Kicked { reason } => ServerMessage::Kicked { reason: *reason },
            RoomEvent::Rejected { reason } => ServerMessage::Error { reason: *reason },
        };
        vec![msg]
    }
}

/// Progress milestones addressed to one player. Finishes go out room-wide via
/// `RoomEvent::PlayerFinished` instead.
fn progress_message(event: &RaceEvent) -> Option<ServerMessage> {
    let msg = match *event {
        RaceEvent::LapStarted { total_laps, .. } => ServerMessage::LapStarted { total_laps },
        RaceEvent::LapCompleted {
            lap, total_laps, ..
        } => ServerMessage::LapCompleted { lap, total_laps },
        RaceEvent::InvalidFinish {
            remaining,
            next_checkpoint,
            ..
        } => ServerMessage::InvalidFinish {
            remaining,
            next_checkpoint,
        },
        RaceEvent::CheckpointPassed {
            checkpoint,
            total,
            lap,
            ..
        } => ServerMessage::CheckpointPassed {
            checkpoint,
            total,
            lap,
        },
        RaceEvent::BoostActivated { level, .. } => ServerMessage::BoostActivated { level },
        RaceEvent::ItemPicked { item, .. } => ServerMessage::ItemPicked {
            item: item_name(item),
        },
        RaceEvent::ItemUsed { item, .. } => ServerMessage::ItemUsed {
            item: item_name(item),
        },
        RaceEvent::Finished { .. } => return None,
    };
    Some(msg)
}

fn item_name(item: Item) -> &'static str {
    match item {
        Item::Boost => "boost",
        Item::Slow => "slow",
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPlayerDto {
    pub id: String,
    pub pseudo: String,
    pub color: String,
    pub ready: bool,
    pub is_host: bool,
}

impl From<&LobbyPlayer> for LobbyPlayerDto {
    fn from(p: &LobbyPlayer) -> Self {
        Self {
            id: p.id.to_string(),
            pseudo: p.pseudo.clone(),
            color: p.color.clone(),
            ready: p.ready,
            is_host: p.is_host,
        }
    }
}

/// Per-tick race state sent to every player in the room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateDto {
    pub players: Vec<KartStateDto>,
    pub total_checkpoints: usize,
    pub laps_to_win: u32,
    pub game_time: u64,
    pub max_time: Option<u64>,
    pub remaining_time: Option<u64>,
}

impl From<RaceSnapshot> for GameStateDto {
    fn from(snapshot: RaceSnapshot) -> Self {
        Self {
            players: snapshot.karts.iter().map(KartStateDto::from).collect(),
            total_checkpoints: snapshot.total_checkpoints,
            laps_to_win: snapshot.laps_to_win,
            game_time: snapshot.game_time,
            max_time: snapshot.max_time,
            remaining_time: snapshot.remaining_time,
        }
    }
}

/// Flattened kart state for wire transmission in game state updates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KartStateDto {
    pub id: String,
    pub pseudo: String,
    pub color: String,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub speed: f32,
    pub lap: u32,
    pub position: usize,
    pub item: Option<&'static str>,
    pub finished: bool,
    pub finish_time: Option<u64>,
    pub race_time: u64,
    pub next_checkpoint: usize,
    pub has_started: bool,
    pub is_boosting: bool,
}

impl From<&KartSnapshot> for KartStateDto {
    fn from(k: &KartSnapshot) -> Self {
        Self {
            id: k.id.to_string(),
            pseudo: k.pseudo.clone(),
            color: k.color.clone(),
            x: k.x,
            y: k.y,
            angle: k.angle,
            speed: k.speed,
            lap: k.lap,
            position: k.rank,
            item: k.item.map(item_name),
            finished: k.finished,
            finish_time: k.finish_time,
            race_time: k.race_time,
            next_checkpoint: k.next_checkpoint,
            has_started: k.has_started_lap,
            is_boosting: k.boosting,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceResultDto {
    pub id: String,
    pub pseudo: String,
    pub color: String,
    pub finished: bool,
    pub finish_time: Option<u64>,
    pub lap: u32,
    pub position: usize,
    pub dnf: bool,
    pub final_position: usize,
}

impl From<&RaceResult> for RaceResultDto {
    fn from(r: &RaceResult) -> Self {
        Self {
            id: r.player_id.to_string(),
            pseudo: r.pseudo.clone(),
            color: r.color.clone(),
            finished: r.finished,
            finish_time: r.finish_time,
            lap: r.lap,
            position: r.position,
            dnf: r.dnf,
            final_position: r.final_position,
        }
    }
}

/// Open room row for `GET /rooms`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListingDto {
    pub room_id: String,
    pub players: usize,
    pub capacity: usize,
    pub phase: &'static str,
}

impl From<&RoomSummary> for RoomListingDto {
    fn from(s: &RoomSummary) -> Self {
        Self {
            room_id: s.room_id.to_string(),
            players: s.players,
            capacity: s.capacity,
            phase: s.phase.as_str(),
        }
    }
}

/// Catalog row for `GET /maps`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapListingDto {
    pub id: String,
    pub name: String,
    pub laps: u32,
}

impl From<&Track> for MapListingDto {
    fn from(t: &Track) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            laps: t.race_settings.laps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn when_client_sends_input_then_missing_keys_default_to_released() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "Input", "data": {"up": true, "useItem": true}}))
                .expect("parse");

        let ClientMessage::Input(input) = msg else {
            panic!("expected input");
        };
        assert!(input.up && input.use_item);
        assert!(!input.down && !input.left && !input.right);
    }

    #[test]
    fn when_client_sends_unit_commands_then_data_may_be_omitted() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "VoteRematch"})).expect("parse");
        assert!(matches!(msg, ClientMessage::VoteRematch));

        let msg: ClientMessage = serde_json::from_value(
            json!({"type": "JoinByCode", "data": {"code": "ab12cd", "pseudo": "Zed"}}),
        )
        .expect("parse");
        match msg {
            ClientMessage::JoinByCode { code, pseudo, color } => {
                assert_eq!(code, "ab12cd");
                assert_eq!(pseudo, "Zed");
                assert!(color.is_empty());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn when_pseudo_is_blank_or_long_then_it_is_normalized() {
        assert_eq!(sanitize_pseudo("   "), DEFAULT_PSEUDO);
        assert_eq!(sanitize_pseudo("  Ann  "), "Ann");
        assert_eq!(sanitize_pseudo(&"x".repeat(50)).chars().count(), MAX_PSEUDO_LEN);
        assert_eq!(sanitize_color(""), DEFAULT_COLOR);
    }

    #[test]
    fn when_race_starts_then_map_data_follows_the_start_message() {
        let event = RoomEvent::GameStarted {
            track: std::sync::Arc::new(Track::builtin_oval()),
            countdown_ms: 8_800,
        };

        let msgs = ServerMessage::from_event(&event);
        let wire: Vec<serde_json::Value> = msgs
            .iter()
            .map(|m| serde_json::to_value(m).expect("serialize"))
            .collect();

        assert_eq!(wire[0], json!({"type": "GameStarted", "data": {"countdownMs": 8800}}));
        assert_eq!(wire[1]["type"], "MapData");
        assert_eq!(wire[1]["data"]["id"], "oval");
    }

    #[test]
    fn when_player_ids_are_sent_then_they_are_strings() {
        let msgs = ServerMessage::from_event(&RoomEvent::HostChanged {
            host_id: 9_007_199_254_740_993,
        });
        let wire = serde_json::to_value(&msgs[0]).expect("serialize");
        assert_eq!(wire["data"]["hostId"], "9007199254740993");
    }
}
