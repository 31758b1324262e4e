//! Gameplay tuning for speed boosters.

/// Multipliers applied while boosting at a given level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostLevel {
    pub speed_multiplier: f32,
    pub acceleration_multiplier: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct BoostTuning {
    /// Indexed by boost level; level 0 means "not boosting".
    pub levels: [BoostLevel; 4],

    /// How long a boost lasts after the most recent trigger.
    pub duration_ms: u64,

    /// Minimum time between two triggers.
    pub cooldown_ms: f32,

    /// Half-thickness of a booster strip.
    pub width: f32,

    /// Immediate speed impulse is `impulse_base + level * impulse_per_level`.
    pub impulse_base: f32,
    pub impulse_per_level: f32,

    /// Impulse is capped at `max_speed * (1 + level * cap_per_level)`.
    pub cap_per_level: f32,
}

impl BoostTuning {
    pub fn max_level(&self) -> u8 {
        (self.levels.len() - 1) as u8
    }

    pub fn level(&self, level: u8) -> BoostLevel {
        let idx = usize::from(level).min(self.levels.len() - 1);
        self.levels[idx]
    }

    /// Distance from a booster strip at which a kart of `kart_radius` triggers it.
    pub fn trigger_distance(&self, kart_radius: f32) -> f32 {
        self.width + kart_radius
    }

    /// Distance a kart must put between itself and the last booster before it can re-trigger it.
    pub fn release_distance(&self) -> f32 {
        self.width * 2.0
    }
}

impl Default for BoostTuning {
    fn default() -> Self {
        Self {
            levels: [
                BoostLevel {
                    speed_multiplier: 1.0,
                    acceleration_multiplier: 1.0,
                },
                BoostLevel {
                    speed_multiplier: 1.25,
                    acceleration_multiplier: 1.5,
                },
                BoostLevel {
                    speed_multiplier: 1.5,
                    acceleration_multiplier: 1.5,
                },
                BoostLevel {
                    speed_multiplier: 1.75,
                    acceleration_multiplier: 1.5,
                },
            ],
            duration_ms: 1500,
            cooldown_ms: 500.0,
            width: 5.0,
            impulse_base: 1.0,
            impulse_per_level: 0.5,
            cap_per_level: 0.25,
        }
    }
}
