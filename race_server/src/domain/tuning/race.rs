// Gameplay tuning for race progress and items.

#[derive(Debug, Clone, Copy)]
pub struct RaceTuning {
    /// Minimum time between two valid crossings of the same line by the same kart.
    pub crossing_debounce_ms: u64,
}

impl Default for RaceTuning {
    fn default() -> Self {
        Self {
            crossing_debounce_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ItemTuning {
    /// Factor applied to every rival's speed by a slow item.
    pub slow_factor: f32,
}

impl Default for ItemTuning {
    fn default() -> Self {
        Self {
            slow_factor: 0.5,
        }
    }
}
