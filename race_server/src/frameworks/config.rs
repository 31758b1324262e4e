use crate::use_cases::RoomSettings;
use std::{env, path::PathBuf, time::Duration};

// Runtime/server constants (not gameplay tuning).

pub fn http_port() -> u16 {
    env::var("RACE_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000)
}

pub fn http_host() -> String {
    env::var("RACE_SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

pub fn maps_dir() -> PathBuf {
    env::var("MAPS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("maps"))
}

pub fn default_map_id() -> String {
    env::var("DEFAULT_MAP_ID").unwrap_or_else(|_| "lava_track".to_string())
}

pub const COMMAND_CHANNEL_CAPACITY: usize = 1024;
pub const ROOM_BROADCAST_CAPACITY: usize = 128;
pub const ROOM_CAPACITY: usize = 8;

pub const TICK_INTERVAL: Duration = Duration::from_millis(1000 / 60);
// Physics runs during the countdown so karts can rev on the grid.
pub const START_COUNTDOWN: Duration = Duration::from_millis(8800);
pub const RESULTS_DELAY: Duration = Duration::from_secs(3);
pub const REMATCH_WINDOW: Duration = Duration::from_secs(10);

pub fn room_settings() -> RoomSettings {
    RoomSettings {
        capacity: ROOM_CAPACITY,
        command_channel_capacity: COMMAND_CHANNEL_CAPACITY,
        broadcast_capacity: ROOM_BROADCAST_CAPACITY,
        tick_interval: TICK_INTERVAL,
        start_countdown: START_COUNTDOWN,
        results_delay: RESULTS_DELAY,
        rematch_window: REMATCH_WINDOW,
    }
}
