use crate::domain::state::Player;
use crate::domain::tuning::{KartCollisionTuning, KartTuning};
use rand::Rng;

/// Pairwise kart-vs-kart collisions among everyone still racing.
///
/// Approximates a 2D elastic collision on the scalar speed model: good enough for feel.
pub fn resolve_kart_collisions<R: Rng>(
    players: &mut [Player],
    kart: &KartTuning,
    tuning: &KartCollisionTuning,
    rng: &mut R,
) -> usize {
    let active: Vec<usize> = players
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.race.finished)
        .map(|(i, _)| i)
        .collect();
    let contact = kart.radius * tuning.contact_factor;
    let mut hits = 0;

    for (a, &i) in active.iter().enumerate() {
        for &j in &active[a + 1..] {
            let (p1, p2) = pair_mut(players, i, j);
            let dx = p2.x - p1.x;
            let dy = p2.y - p1.y;
            let distance = (dx * dx + dy * dy).sqrt();
            if distance < contact {
                resolve_pair(p1, p2, dx, dy, distance, contact, kart, tuning, rng);
                hits += 1;
            }
        }
    }
    hits
}

/// Post-impulse velocity vectors, or `None` when the karts are already separating.
pub fn exchange_impulse(
    v1: (f32, f32),
    v2: (f32, f32),
    normal: (f32, f32),
    restitution: f32,
) -> Option<((f32, f32), (f32, f32))> {
    let (nx, ny) = normal;
    let relative_speed = (v2.0 - v1.0) * nx + (v2.1 - v1.1) * ny;
    if relative_speed > 0.0 {
        return None;
    }

    let impulse = -(1.0 + restitution) * relative_speed / 2.0;
    let (ix, iy) = (impulse * nx, impulse * ny);
    Some(((v1.0 - ix, v1.1 - iy), (v2.0 + ix, v2.1 + iy)))
}

#[allow(clippy::too_many_arguments)]
fn resolve_pair<R: Rng>(
    p1: &mut Player,
    p2: &mut Player,
    dx: f32,
    dy: f32,
    distance: f32,
    contact: f32,
    kart: &KartTuning,
    tuning: &KartCollisionTuning,
    rng: &mut R,
) {
    // Stacked karts: separate them along +x.
    let (dx, dy, distance) = if distance == 0.0 {
        (1.0, 0.0, 1.0)
    } else {
        (dx, dy, distance)
    };
    let normal = (dx / distance, dy / distance);

    let half_overlap = (contact - distance) * 0.5;
    p1.x -= normal.0 * half_overlap;
    p1.y -= normal.1 * half_overlap;
    p2.x += normal.0 * half_overlap;
    p2.y += normal.1 * half_overlap;

    let Some((v1, v2)) = exchange_impulse(p1.velocity(), p2.velocity(), normal, tuning.restitution)
    else {
        return;
    };

    p1.speed = rebuild_speed(v1, p1.speed, kart);
    p2.speed = rebuild_speed(v2, p2.speed, kart);

    p1.angle += (rng.random::<f32>() - 0.5) * tuning.jitter;
    p2.angle += (rng.random::<f32>() - 0.5) * tuning.jitter;
}

/// Magnitude of `v` carrying the sign of the pre-collision speed (0 stays 0).
///
/// Clamped to the same forward and reverse caps the kinematics enforce.
fn rebuild_speed(v: (f32, f32), previous: f32, kart: &KartTuning) -> f32 {
    let sign = if previous > 0.0 {
        1.0
    } else if previous < 0.0 {
        -1.0
    } else {
        0.0
    };
    ((v.0 * v.0 + v.1 * v.1).sqrt() * sign).clamp(-kart.max_reverse_speed(), kart.max_speed)
}

fn pair_mut(players: &mut [Player], i: usize, j: usize) -> (&mut Player, &mut Player) {
    debug_assert!(i < j);
    let (left, right) = players.split_at_mut(j);
    (&mut left[i], &mut right[0])
}
