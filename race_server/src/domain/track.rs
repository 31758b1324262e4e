// Track geometry as exported by the map editor. Read-only during a race.

use crate::domain::errors::TrackError;
use crate::domain::geometry::{Point, Segment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceSettings {
    pub laps: u32,
    /// Hard race time limit in milliseconds; 0 disables it.
    pub max_time: u64,
    /// Elapsed time at which a single warning is emitted; 0 disables it.
    pub max_time_warning: u64,
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self {
            laps: 3,
            max_time: 300_000,
            max_time_warning: 240_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub x: f32,
    pub y: f32,
    /// Heading in degrees.
    #[serde(default)]
    pub angle: f32,
}

impl SpawnPoint {
    pub fn heading(&self) -> f32 {
        self.angle.to_radians()
    }
}

/// Used when a track defines no spawn points.
pub const FALLBACK_SPAWN: SpawnPoint = SpawnPoint {
    x: 400.0,
    y: 500.0,
    angle: 0.0,
};

/// A track boundary polyline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub points: Vec<Point>,
    /// Closed curves also have a segment from the last point back to the first.
    #[serde(default)]
    pub closed: bool,
}

impl Curve {
    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        let len = self.points.len();
        let count = match (self.closed, len) {
            (_, 0 | 1) => 0,
            (true, _) => len,
            (false, _) => len - 1,
        };
        (0..count).map(move |i| Segment::between(self.points[i], self.points[(i + 1) % len]))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_width")]
    pub width: f32,
    #[serde(default = "default_height")]
    pub height: f32,
    #[serde(default)]
    pub race_settings: RaceSettings,
    #[serde(default)]
    pub spawn_points: Vec<SpawnPoint>,
    #[serde(default)]
    pub continuous_curves: Vec<Curve>,
    #[serde(default)]
    pub checkpoints: Vec<Segment>,
    #[serde(default)]
    pub finish_line: Option<Segment>,
    #[serde(default)]
    pub boosters: Vec<Segment>,
    #[serde(default)]
    pub items: Vec<Segment>,
}

fn default_width() -> f32 {
    1280.0
}

fn default_height() -> f32 {
    720.0
}

impl Track {
    pub fn from_json(text: &str) -> Result<Self, TrackError> {
        let track: Track = serde_json::from_str(text)?;
        track.validate()?;
        Ok(track)
    }

    pub fn validate(&self) -> Result<(), TrackError> {
        if self.id.trim().is_empty() {
            return Err(TrackError::Invalid("missing id".to_string()));
        }
        if !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
        {
            return Err(TrackError::Invalid("bad dimensions".to_string()));
        }
        if self.race_settings.laps == 0 {
            return Err(TrackError::Invalid("laps must be at least 1".to_string()));
        }
        let settings = self.race_settings;
        if settings.max_time > 0
            && settings.max_time_warning > 0
            && settings.max_time_warning >= settings.max_time
        {
            return Err(TrackError::Invalid(
                "time warning must come before the time limit".to_string(),
            ));
        }
        for (i, curve) in self.continuous_curves.iter().enumerate() {
            if curve.points.len() < 2 {
                return Err(TrackError::Invalid(format!("curve {i} has fewer than 2 points")));
            }
            if !curve.points.iter().all(|p| p.is_finite()) {
                return Err(TrackError::Invalid(format!("curve {i} has non-finite points")));
            }
        }
        let lines = self
            .checkpoints
            .iter()
            .chain(self.finish_line.iter())
            .chain(self.boosters.iter())
            .chain(self.items.iter());
        for line in lines {
            if !line.is_finite() {
                return Err(TrackError::Invalid("non-finite line".to_string()));
            }
        }
        if !self
            .spawn_points
            .iter()
            .all(|s| s.x.is_finite() && s.y.is_finite() && s.angle.is_finite())
        {
            return Err(TrackError::Invalid("non-finite spawn point".to_string()));
        }
        Ok(())
    }

    /// Every boundary segment in curve order, then segment order.
    pub fn wall_segments(&self) -> impl Iterator<Item = Segment> + '_ {
        self.continuous_curves.iter().flat_map(Curve::segments)
    }

    /// Spawn point for the `index`-th player, cycling when players outnumber spawns.
    pub fn spawn_for(&self, index: usize) -> SpawnPoint {
        if self.spawn_points.is_empty() {
            return FALLBACK_SPAWN;
        }
        self.spawn_points[index % self.spawn_points.len()]
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// A small rectangular oval driven clockwise (screen coordinates), always available.
    pub fn builtin_oval() -> Self {
        let rect = |x0: f32, y0: f32, x1: f32, y1: f32| Curve {
            points: vec![
                Point::new(x0, y0),
                Point::new(x1, y0),
                Point::new(x1, y1),
                Point::new(x0, y1),
            ],
            closed: true,
        };

        let mut spawn_points = Vec::new();
        for x in [560.0, 500.0, 440.0, 380.0] {
            for y in [100.0, 190.0] {
                spawn_points.push(SpawnPoint { x, y, angle: 0.0 });
            }
        }

        Self {
            id: "oval".to_string(),
            name: "Oval".to_string(),
            width: 1280.0,
            height: 720.0,
            race_settings: RaceSettings::default(),
            spawn_points,
            continuous_curves: vec![
                rect(40.0, 40.0, 1240.0, 680.0),
                rect(300.0, 250.0, 980.0, 470.0),
            ],
            checkpoints: vec![
                Segment::new(980.0, 360.0, 1240.0, 360.0),
                Segment::new(640.0, 470.0, 640.0, 680.0),
                Segment::new(300.0, 360.0, 40.0, 360.0),
            ],
            finish_line: Some(Segment::new(640.0, 250.0, 640.0, 40.0)),
            boosters: vec![
                Segment::new(800.0, 60.0, 800.0, 230.0),
                Segment::new(500.0, 490.0, 500.0, 660.0),
            ],
            items: vec![Segment::new(900.0, 480.0, 900.0, 670.0)],
        }
    }
}

/// Id of the track that is always available.
pub const BUILTIN_TRACK_ID: &str = "oval";

/// Tracks rooms may race on, keyed by id.
#[derive(Debug, Clone)]
pub struct TrackCatalog {
    tracks: BTreeMap<String, Arc<Track>>,
    default_id: String,
}

impl TrackCatalog {
    /// Builds a catalog that always contains the built-in oval. An unknown `default_id`
    /// falls back to the oval.
    pub fn new(tracks: impl IntoIterator<Item = Track>, default_id: &str) -> Self {
        let mut map: BTreeMap<String, Arc<Track>> = tracks
            .into_iter()
            .map(|t| (t.id.clone(), Arc::new(t)))
            .collect();
        map.entry(BUILTIN_TRACK_ID.to_string())
            .or_insert_with(|| Arc::new(Track::builtin_oval()));

        let default_id = if map.contains_key(default_id) {
            default_id.to_string()
        } else {
            BUILTIN_TRACK_ID.to_string()
        };
        Self {
            tracks: map,
            default_id,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Track>> {
        self.tracks.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tracks.contains_key(id)
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    /// Track for `id`, or the default one when `id` is not in the catalog.
    pub fn resolve(&self, id: &str) -> Arc<Track> {
        self.get(id)
            .or_else(|| self.get(&self.default_id))
            .unwrap_or_else(|| Arc::new(Track::builtin_oval()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values().map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl Default for TrackCatalog {
    fn default() -> Self {
        Self::new(std::iter::empty(), BUILTIN_TRACK_ID)
    }
}
