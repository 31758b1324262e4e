//! Gameplay tuning for wall and kart-vs-kart collisions.
//!
//! The thresholds are tuned for feel, not physical accuracy.

#[derive(Debug, Clone, Copy)]
pub struct WallTuning {
    /// Extra gap kept between the kart's radius and a wall.
    pub clearance: f32,

    /// Added to the penetration depth when pushing a kart out.
    pub push_margin: f32,

    /// Head-on when `velocity . normal` is below this and the kart is not parallel to the wall.
    pub head_on_dot: f32,
    pub head_on_wall_dot: f32,

    /// Glancing when `|velocity . normal|` is below this.
    pub glancing_dot: f32,

    pub bounce_factor: f32,
    pub bounce_push: f32,
    pub bounce_jitter: f32,

    pub slide_damping: f32,
    /// Fraction of the heading error toward the wall tangent corrected per tick.
    pub slide_blend: f32,

    pub graze_damping: f32,

    /// Speeds below this after a wall hit snap to zero.
    pub stop_speed: f32,
}

impl Default for WallTuning {
    fn default() -> Self {
        Self {
            clearance: 4.0,
            push_margin: 2.0,
            head_on_dot: -0.5,
            head_on_wall_dot: 0.5,
            glancing_dot: 0.7,
            bounce_factor: -0.2,
            bounce_push: 8.0,
            bounce_jitter: 0.2,
            slide_damping: 0.85,
            slide_blend: 0.3,
            graze_damping: 0.95,
            stop_speed: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KartCollisionTuning {
    /// Karts collide when closer than `radius * contact_factor`.
    pub contact_factor: f32,
    pub restitution: f32,
    pub jitter: f32,
}

impl Default for KartCollisionTuning {
    fn default() -> Self {
        Self {
            contact_factor: 1.4,
            restitution: 0.6,
            jitter: 0.1,
        }
    }
}
