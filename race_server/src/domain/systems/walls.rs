use crate::domain::geometry::{Point, Segment, closest_point_on_segment, wrap_angle};
use crate::domain::state::Player;
use crate::domain::tuning::{KartTuning, WallTuning};
use rand::Rng;

/// How a kart hit a wall, by impact angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallImpact {
    /// Driving into the wall: speed is inverted and damped.
    HeadOn,
    /// Shallow angle: the kart slides along the wall.
    Glancing,
    /// Nearly parallel: a small speed loss only.
    Graze,
}

/// Resolves at most one wall penetration per tick; the first violated segment wins.
pub fn resolve_walls<I, R>(
    p: &mut Player,
    walls: I,
    kart: &KartTuning,
    tuning: &WallTuning,
    rng: &mut R,
) -> Option<WallImpact>
where
    I: IntoIterator<Item = Segment>,
    R: Rng,
{
    let min_dist = kart.radius + tuning.clearance;
    let min_dist_sq = min_dist * min_dist;
    let pos = p.position();

    for wall in walls {
        if wall.length_sq() == 0.0 {
            continue;
        }
        let closest = closest_point_on_segment(pos, wall);
        let dist_sq = pos.distance_sq(closest);
        if dist_sq < min_dist_sq {
            return Some(respond(p, wall, closest, dist_sq, min_dist, kart, tuning, rng));
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn respond<R: Rng>(
    p: &mut Player,
    wall: Segment,
    closest: Point,
    dist_sq: f32,
    min_dist: f32,
    kart: &KartTuning,
    tuning: &WallTuning,
    rng: &mut R,
) -> WallImpact {
    let (wdx, wdy) = wall.delta();
    let wall_len = wall.length_sq().sqrt();
    let (wall_x, wall_y) = (wdx / wall_len, wdy / wall_len);

    // Collision normal points from the wall toward the kart.
    let dist = dist_sq.sqrt();
    let (nx, ny) = if dist > 0.0 {
        ((p.x - closest.x) / dist, (p.y - closest.y) / dist)
    } else {
        // Centre exactly on the wall: fall back to the wall's left normal.
        (-wall_y, wall_x)
    };

    let push = min_dist - dist + tuning.push_margin;
    p.x += nx * push;
    p.y += ny * push;

    let (vx, vy) = p.velocity();
    let dot = vx * nx + vy * ny;
    let (hx, hy) = p.heading();
    let wall_dot = (hx * wall_x + hy * wall_y).abs();

    let impact = if dot < tuning.head_on_dot && wall_dot < tuning.head_on_wall_dot {
        p.speed *= tuning.bounce_factor;
        p.x += nx * tuning.bounce_push;
        p.y += ny * tuning.bounce_push;
        p.angle += (rng.random::<f32>() - 0.5) * tuning.bounce_jitter;
        WallImpact::HeadOn
    } else if dot.abs() < tuning.glancing_dot {
        let along = vx * wall_x + vy * wall_y;
        let slide_x = wall_x * along * tuning.slide_damping;
        let slide_y = wall_y * along * tuning.slide_damping;
        p.speed = (slide_x * slide_x + slide_y * slide_y).sqrt();
        if p.speed > kart.stop_epsilon {
            let target = slide_y.atan2(slide_x);
            p.angle += wrap_angle(target - p.angle) * tuning.slide_blend;
        }
        WallImpact::Glancing
    } else {
        p.speed *= tuning.graze_damping;
        WallImpact::Graze
    };

    // Hard correction so a kart can never end a tick inside a wall.
    let (ex, ey) = (p.x - closest.x, p.y - closest.y);
    let final_sq = ex * ex + ey * ey;
    if final_sq < min_dist * min_dist {
        let final_dist = final_sq.sqrt();
        let (dir_x, dir_y) = if final_dist > 0.0 {
            (ex / final_dist, ey / final_dist)
        } else {
            (nx, ny)
        };
        let target = min_dist + tuning.push_margin;
        p.x = closest.x + dir_x * target;
        p.y = closest.y + dir_y * target;
    }

    if p.speed != 0.0 && p.speed.abs() < tuning.stop_speed {
        p.speed = 0.0;
    }

    impact
}
