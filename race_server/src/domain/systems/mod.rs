// Per-tick simulation stages. Each stage mutates player state in place.

pub mod boosters;
pub mod items;
pub mod karts;
pub mod kinematics;
pub mod progress;
pub mod ranking;
pub mod walls;

/// Timing for a single simulation step.
#[derive(Debug, Clone, Copy)]
pub struct TickStep {
    /// Room clock in milliseconds.
    pub now_ms: u64,
    /// Real time elapsed since the previous tick.
    pub dt_ms: f32,
    /// `dt` relative to the nominal tick; scales the position update.
    pub frame_scale: f32,
}

impl TickStep {
    /// Upper bound on `frame_scale` so a stalled room does not teleport karts.
    pub const MAX_FRAME_SCALE: f32 = 3.0;

    pub fn new(now_ms: u64, dt_ms: f32, nominal_dt_ms: f32) -> Self {
        let frame_scale = if nominal_dt_ms > 0.0 {
            (dt_ms / nominal_dt_ms).clamp(0.0, Self::MAX_FRAME_SCALE)
        } else {
            1.0
        };
        Self {
            now_ms,
            dt_ms,
            frame_scale,
        }
    }

    /// A step of exactly one nominal tick.
    pub fn nominal(now_ms: u64, nominal_dt_ms: f32) -> Self {
        Self {
            now_ms,
            dt_ms: nominal_dt_ms,
            frame_scale: 1.0,
        }
    }
}
