// 2D geometry helpers shared by the collision and race-progress systems.

use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

/// Below this cross-product magnitude two segments are treated as parallel.
const PARALLEL_EPSILON: f32 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(self, other: Point) -> f32 {
        self.distance_sq(other).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f32; 2]> for Point {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// A two-point line as stored in track files (`{x1, y1, x2, y2}`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Segment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Segment {
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn between(a: Point, b: Point) -> Self {
        Self::new(a.x, a.y, b.x, b.y)
    }

    pub fn start(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    pub fn end(&self) -> Point {
        Point::new(self.x2, self.y2)
    }

    pub fn delta(&self) -> (f32, f32) {
        (self.x2 - self.x1, self.y2 - self.y1)
    }

    pub fn length_sq(&self) -> f32 {
        let (dx, dy) = self.delta();
        dx * dx + dy * dy
    }

    pub fn is_finite(&self) -> bool {
        self.start().is_finite() && self.end().is_finite()
    }
}

/// Projection of a point onto the infinite line through a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Position along the segment; `0..=1` means between the endpoints.
    pub t: f32,
    pub point: Point,
}

impl Projection {
    pub fn on_segment(&self) -> bool {
        (0.0..=1.0).contains(&self.t)
    }
}

/// Projects `p` onto the line through `seg` without clamping.
///
/// A zero-length segment projects everything onto its start point with `t = 0`.
pub fn project_onto_line(p: Point, seg: Segment) -> Projection {
    let len_sq = seg.length_sq();
    if len_sq == 0.0 {
        return Projection {
            t: 0.0,
            point: seg.start(),
        };
    }

    let (dx, dy) = seg.delta();
    let t = ((p.x - seg.x1) * dx + (p.y - seg.y1) * dy) / len_sq;
    Projection {
        t,
        point: Point::new(seg.x1 + t * dx, seg.y1 + t * dy),
    }
}

/// Closest point to `p` that lies on `seg` (projection clamped to the endpoints).
pub fn closest_point_on_segment(p: Point, seg: Segment) -> Point {
    let projection = project_onto_line(p, seg);
    let t = projection.t.clamp(0.0, 1.0);
    let (dx, dy) = seg.delta();
    Point::new(seg.x1 + t * dx, seg.y1 + t * dy)
}

/// Shortest distance from `p` to `seg`; degenerates to point distance for zero-length segments.
pub fn distance_to_segment(p: Point, seg: Segment) -> f32 {
    p.distance(closest_point_on_segment(p, seg))
}

/// Standard parametric segment intersection test. Parallel and collinear segments never intersect.
pub fn segments_intersect(a: Segment, b: Segment) -> bool {
    let denom = (a.x1 - a.x2) * (b.y1 - b.y2) - (a.y1 - a.y2) * (b.x1 - b.x2);
    if denom.abs() < PARALLEL_EPSILON {
        return false;
    }

    let t = ((a.x1 - b.x1) * (b.y1 - b.y2) - (a.y1 - b.y1) * (b.x1 - b.x2)) / denom;
    let u = -((a.x1 - a.x2) * (a.y1 - b.y1) - (a.y1 - a.y2) * (a.x1 - b.x1)) / denom;

    (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)
}

/// Signed alignment of the movement `from -> to` with the line's leftward normal `(-dy, dx)`.
///
/// Positive means the line was crossed in its "forward" direction.
pub fn crossing_direction(from: Point, to: Point, line: Segment) -> f32 {
    let (dx, dy) = line.delta();
    let (nx, ny) = (-dy, dx);
    nx * (to.x - from.x) + ny * (to.y - from.y)
}

/// True when the movement `from -> to` crosses `line` in its forward direction.
pub fn crosses_forward(from: Point, to: Point, line: Segment) -> bool {
    segments_intersect(Segment::between(from, to), line) && crossing_direction(from, to, line) > 0.0
}

/// Wraps an angle into `(-PI, PI]`.
pub fn wrap_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}
