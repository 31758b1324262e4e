// Domain-level racer state plus the snapshot handed to the broadcast layer.

use crate::domain::geometry::Point;
use crate::domain::track::SpawnPoint;
use std::collections::HashMap;

pub type PlayerId = u64;

/// Latest directional intents from the client; overwritten by every input message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item {
    Boost,
    Slow,
}

#[derive(Debug, Clone, Default)]
pub struct BoostState {
    pub active: bool,
    /// 0 when not boosting, otherwise 1..=max level.
    pub level: u8,
    pub expires_at: u64,
    pub cooldown_ms: f32,
    /// Booster the kart is still straddling; it cannot re-trigger until released.
    pub last_booster: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RaceProgress {
    pub lap: u32,
    pub next_checkpoint: usize,
    /// Set by the first forward crossing of the finish line.
    pub has_started_lap: bool,
    pub finished: bool,
    /// `None` while racing, and for karts that were force-finished (DNF).
    pub finish_time: Option<u64>,
    pub race_time: u64,
    pub rank: usize,
    pub checkpoint_crossed_at: HashMap<usize, u64>,
    pub finish_line_crossed_at: Option<u64>,
}

impl RaceProgress {
    pub fn is_dnf(&self) -> bool {
        self.finished && self.finish_time.is_none()
    }

    /// Started a lap or finished; used to decide when a race is over.
    pub fn has_progress(&self) -> bool {
        self.finished || self.lap > 0
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub pseudo: String,
    pub color: String,
    pub ready: bool,

    pub x: f32,
    pub y: f32,
    pub prev_x: f32,
    pub prev_y: f32,
    /// Heading in radians; 0 points along +x.
    pub angle: f32,
    /// Signed scalar speed along the heading; negative when reversing.
    pub speed: f32,

    pub input: InputState,
    pub use_item_pending: bool,
    pub item: Option<Item>,

    pub boost: BoostState,
    pub race: RaceProgress,
}

impl Player {
    pub fn new(id: PlayerId, pseudo: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id,
            pseudo: pseudo.into(),
            color: color.into(),
            ready: false,
            x: 100.0,
            y: 300.0,
            prev_x: 100.0,
            prev_y: 300.0,
            angle: 0.0,
            speed: 0.0,
            input: InputState::default(),
            use_item_pending: false,
            item: None,
            boost: BoostState::default(),
            race: RaceProgress::default(),
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn prev_position(&self) -> Point {
        Point::new(self.prev_x, self.prev_y)
    }

    pub fn heading(&self) -> (f32, f32) {
        (self.angle.cos(), self.angle.sin())
    }

    pub fn velocity(&self) -> (f32, f32) {
        let (hx, hy) = self.heading();
        (hx * self.speed, hy * self.speed)
    }

    /// Clears per-race state while keeping identity and lobby flags.
    pub fn reset_race_state(&mut self) {
        self.speed = 0.0;
        self.input = InputState::default();
        self.use_item_pending = false;
        self.item = None;
        self.boost = BoostState::default();
        self.race = RaceProgress::default();
    }

    /// Puts the kart on the grid for a new race.
    pub fn place_on_grid(&mut self, spawn: SpawnPoint) {
        self.reset_race_state();
        self.x = spawn.x;
        self.y = spawn.y;
        self.prev_x = spawn.x;
        self.prev_y = spawn.y;
        self.angle = spawn.heading();
    }
}

#[derive(Debug, Clone)]
pub struct KartSnapshot {
    pub id: PlayerId,
    pub pseudo: String,
    pub color: String,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub speed: f32,
    pub lap: u32,
    pub rank: usize,
    pub item: Option<Item>,
    pub finished: bool,
    pub finish_time: Option<u64>,
    pub race_time: u64,
    pub next_checkpoint: usize,
    pub has_started_lap: bool,
    pub boosting: bool,
}

impl From<&Player> for KartSnapshot {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id,
            pseudo: p.pseudo.clone(),
            color: p.color.clone(),
            x: p.x,
            y: p.y,
            angle: p.angle,
            speed: p.speed,
            lap: p.race.lap,
            rank: p.race.rank,
            item: p.item,
            finished: p.race.finished,
            finish_time: p.race.finish_time,
            race_time: p.race.race_time,
            next_checkpoint: p.race.next_checkpoint,
            has_started_lap: p.race.has_started_lap,
            boosting: p.boost.active,
        }
    }
}
