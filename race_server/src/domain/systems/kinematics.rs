use super::TickStep;
use crate::domain::state::Player;
use crate::domain::tuning::{BoostTuning, KartTuning};

/// Top speed for the kart's current boost state.
pub fn effective_max_speed(p: &Player, kart: &KartTuning, boost: &BoostTuning) -> f32 {
    if p.boost.active {
        kart.max_speed * boost.level(p.boost.level).speed_multiplier
    } else {
        kart.max_speed
    }
}

fn effective_acceleration(p: &Player, kart: &KartTuning, boost: &BoostTuning) -> f32 {
    if p.boost.active {
        kart.acceleration * boost.level(p.boost.level).acceleration_multiplier
    } else {
        kart.acceleration
    }
}

/// Integrates one tick of driving: boost expiry, intents, friction, clamps and movement.
pub fn tick_kart(
    p: &mut Player,
    step: TickStep,
    bounds: (f32, f32),
    kart: &KartTuning,
    boost: &BoostTuning,
) {
    p.prev_x = p.x;
    p.prev_y = p.y;

    if p.boost.active && step.now_ms > p.boost.expires_at {
        p.boost.active = false;
        p.boost.level = 0;
    }
    p.boost.cooldown_ms = (p.boost.cooldown_ms - step.dt_ms).max(0.0);

    let max_speed = effective_max_speed(p, kart, boost);
    let input = p.input;

    if input.up {
        let acceleration = effective_acceleration(p, kart, boost);
        p.speed = (p.speed + acceleration).min(max_speed);
        // Snap onto the cap instead of creeping toward it.
        if p.speed > max_speed * 0.98 {
            p.speed = max_speed;
        }
    }
    if input.down {
        if p.speed > 0.0 {
            p.speed = (p.speed - kart.acceleration * 2.0).max(0.0);
        } else {
            p.speed = (p.speed - kart.acceleration).max(-kart.max_reverse_speed());
        }
    }
    if input.left {
        steer(p, -1.0, kart);
    }
    if input.right {
        steer(p, 1.0, kart);
    }

    let driven = (input.up && p.speed > 0.0) || (input.down && p.speed < 0.0);
    p.speed *= if driven {
        kart.driven_friction()
    } else {
        kart.coasting_friction()
    };

    p.speed = p.speed.min(max_speed).max(-kart.max_reverse_speed());
    if p.speed.abs() < kart.stop_epsilon {
        p.speed = 0.0;
    }

    let (hx, hy) = p.heading();
    p.x += hx * p.speed * step.frame_scale;
    p.y += hy * p.speed * step.frame_scale;

    clamp_to_bounds(p, bounds, kart.radius);
}

fn steer(p: &mut Player, direction: f32, kart: &KartTuning) {
    if p.speed.abs() > kart.stop_epsilon {
        p.angle += direction * kart.turn_speed * (p.speed / kart.max_speed);
    }
}

fn clamp_to_bounds(p: &mut Player, (width, height): (f32, f32), radius: f32) {
    // max/min instead of clamp: a track narrower than a kart must not panic.
    p.x = p.x.max(radius).min(width - radius);
    p.y = p.y.max(radius).min(height - radius);
}
