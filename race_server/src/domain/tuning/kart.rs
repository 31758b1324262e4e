//! Gameplay tuning for kart handling.
//!
//! Speeds are in track units per nominal tick (1/60 s); angles in radians.

#[derive(Debug, Clone, Copy)]
pub struct KartTuning {
    /// Base top speed before any boost multiplier.
    pub max_speed: f32,

    /// Speed gained per tick while throttling.
    pub acceleration: f32,

    /// Base friction factor; driven karts keep `friction + 0.01`, coasting karts `friction - 0.02`.
    pub friction: f32,

    /// Heading change per tick at top speed.
    pub turn_speed: f32,

    /// Collision radius of a kart.
    pub radius: f32,

    /// Speeds below this snap to zero; steering is ignored below it too.
    pub stop_epsilon: f32,

    /// Reverse speed cap as a fraction of `max_speed`.
    pub reverse_ratio: f32,
}

impl KartTuning {
    pub fn driven_friction(&self) -> f32 {
        self.friction + 0.01
    }

    pub fn coasting_friction(&self) -> f32 {
        self.friction - 0.02
    }

    pub fn max_reverse_speed(&self) -> f32 {
        self.max_speed * self.reverse_ratio
    }
}

impl Default for KartTuning {
    fn default() -> Self {
        Self {
            max_speed: 4.0,
            acceleration: 0.2,
            friction: 0.98,
            turn_speed: 0.075,
            radius: 20.0,
            stop_epsilon: 0.1,
            reverse_ratio: 0.5,
        }
    }
}
