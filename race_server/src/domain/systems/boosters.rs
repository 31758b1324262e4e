use crate::domain::events::RaceEvent;
use crate::domain::geometry::{Segment, distance_to_segment, project_onto_line};
use crate::domain::state::Player;
use crate::domain::tuning::{BoostTuning, KartTuning};
use tracing::debug;

/// Triggers at most one booster for this kart and tick.
pub fn check_boosters(
    p: &mut Player,
    boosters: &[Segment],
    now_ms: u64,
    kart: &KartTuning,
    boost: &BoostTuning,
) -> Option<RaceEvent> {
    let pos = p.position();

    // Forget the last booster once the kart is well clear of it.
    if let Some(idx) = p.boost.last_booster {
        let still_on_it = boosters
            .get(idx)
            .is_some_and(|seg| distance_to_segment(pos, *seg) <= boost.release_distance());
        if !still_on_it {
            p.boost.last_booster = None;
        }
    }

    if p.boost.cooldown_ms > 0.0 {
        return None;
    }

    let reach = boost.trigger_distance(kart.radius);
    for (idx, seg) in boosters.iter().enumerate() {
        if p.boost.last_booster == Some(idx) {
            continue;
        }
        // Must be alongside the strip, not past one of its ends.
        if distance_to_segment(pos, *seg) < reach && project_onto_line(pos, *seg).on_segment() {
            let level = activate_boost(p, now_ms, kart, boost);
            p.boost.last_booster = Some(idx);
            debug!(player_id = p.id, booster = idx, level, "boost activated");
            return Some(RaceEvent::BoostActivated {
                player_id: p.id,
                level,
            });
        }
    }
    None
}

/// Starts or escalates a boost and applies the immediate speed impulse. Returns the new level.
pub fn activate_boost(p: &mut Player, now_ms: u64, kart: &KartTuning, boost: &BoostTuning) -> u8 {
    if p.boost.active {
        p.boost.level = (p.boost.level + 1).min(boost.max_level());
    } else {
        p.boost.active = true;
        p.boost.level = 1;
    }
    p.boost.expires_at = now_ms + boost.duration_ms;
    p.boost.cooldown_ms = boost.cooldown_ms;

    let level = f32::from(p.boost.level);
    let impulse = boost.impulse_base + level * boost.impulse_per_level;
    let cap = kart.max_speed * (1.0 + level * boost.cap_per_level);
    p.speed = (p.speed + impulse).min(cap);

    p.boost.level
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vertical strip at x = 500 between y = 100 and y = 300.
    const BOOSTER: Segment = Segment::new(500.0, 100.0, 500.0, 300.0);

    fn kart_at(x: f32, y: f32) -> Player {
        let mut p = Player::new(9, "Booster", "yellow");
        p.x = x;
        p.y = y;
        p.speed = 3.0;
        p
    }

    #[test]
    fn when_kart_reaches_a_booster_at_level_zero_then_boost_starts_at_level_one() {
        let kart = KartTuning::default();
        let boost = BoostTuning::default();
        let mut p = kart_at(505.0, 200.0);

        let event = check_boosters(&mut p, &[BOOSTER], 10_000, &kart, &boost);

        assert_eq!(
            event,
            Some(RaceEvent::BoostActivated {
                player_id: 9,
                level: 1
            })
        );
        assert!(p.boost.active);
        assert_eq!(p.boost.level, 1);
        assert_eq!(p.boost.expires_at, 11_500);
        assert_eq!(p.boost.cooldown_ms, 500.0);
        assert_eq!(p.boost.last_booster, Some(0));
        // 3.0 + 1.5, capped at 4 * 1.25.
        assert!((p.speed - 4.5).abs() < 1e-5);
    }

    #[test]
    fn when_kart_is_past_the_end_of_the_strip_then_nothing_triggers() {
        let mut p = kart_at(505.0, 310.0);
        let event = check_boosters(
            &mut p,
            &[BOOSTER],
            0,
            &KartTuning::default(),
            &BoostTuning::default(),
        );
        assert_eq!(event, None);
        assert!(!p.boost.active);
    }

    #[test]
    fn when_kart_stays_on_the_same_booster_then_it_does_not_retrigger_until_it_leaves() {
        let kart = KartTuning::default();
        let boost = BoostTuning::default();
        let mut p = kart_at(505.0, 200.0);

        check_boosters(&mut p, &[BOOSTER], 10_000, &kart, &boost);
        // Cooldown has run out but the kart never left the strip.
        p.boost.cooldown_ms = 0.0;
        assert_eq!(check_boosters(&mut p, &[BOOSTER], 10_600, &kart, &boost), None);
        assert_eq!(p.boost.level, 1);

        // Just past twice the strip width the booster re-arms, and the kart is still in reach.
        p.x = 515.0;
        let event = check_boosters(&mut p, &[BOOSTER], 10_800, &kart, &boost);
        assert_eq!(
            event,
            Some(RaceEvent::BoostActivated {
                player_id: 9,
                level: 2
            })
        );
        assert_eq!(p.boost.expires_at, 12_300);
    }

    #[test]
    fn when_kart_is_within_twice_the_strip_width_then_booster_stays_latched() {
        let kart = KartTuning::default();
        let boost = BoostTuning::default();
        let mut p = kart_at(505.0, 200.0);

        check_boosters(&mut p, &[BOOSTER], 10_000, &kart, &boost);
        p.x = 509.0;
        check_boosters(&mut p, &[BOOSTER], 10_100, &kart, &boost);
        assert_eq!(p.boost.last_booster, Some(0));
    }

    #[test]
    fn when_cooldown_is_running_then_a_different_booster_is_ignored() {
        let kart = KartTuning::default();
        let boost = BoostTuning::default();
        let mut p = kart_at(505.0, 200.0);
        p.boost.cooldown_ms = 200.0;

        assert_eq!(check_boosters(&mut p, &[BOOSTER], 0, &kart, &boost), None);
    }

    #[test]
    fn when_boost_is_already_at_max_level_then_level_stays_capped() {
        let kart = KartTuning::default();
        let boost = BoostTuning::default();
        let mut p = kart_at(0.0, 0.0);
        p.boost.active = true;
        p.boost.level = 3;
        p.speed = 6.5;

        let level = activate_boost(&mut p, 0, &kart, &boost);

        assert_eq!(level, 3);
        assert!((p.speed - kart.max_speed * 1.75).abs() < 1e-5);
    }
}
