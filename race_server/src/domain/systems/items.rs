use super::boosters::activate_boost;
use crate::domain::events::RaceEvent;
use crate::domain::geometry::{Segment, segments_intersect};
use crate::domain::state::{Item, Player};
use crate::domain::tuning::{BoostTuning, ItemTuning, KartTuning};
use rand::Rng;

/// Grants a random item when an empty-handed kart drives through an item line.
pub fn check_item_pickup<R: Rng>(p: &mut Player, items: &[Segment], rng: &mut R) -> Option<RaceEvent> {
    if p.item.is_some() {
        return None;
    }
    let movement = Segment::between(p.prev_position(), p.position());
    if !items.iter().any(|line| segments_intersect(movement, *line)) {
        return None;
    }

    let item = if rng.random_bool(0.5) {
        Item::Boost
    } else {
        Item::Slow
    };
    p.item = Some(item);
    Some(RaceEvent::ItemPicked {
        player_id: p.id,
        item,
    })
}

/// Consumes a pending item use for `players[idx]`. A request with no item held is dropped.
pub fn use_item(
    players: &mut [Player],
    idx: usize,
    now_ms: u64,
    kart: &KartTuning,
    boost: &BoostTuning,
    tuning: &ItemTuning,
) -> Option<RaceEvent> {
    let user = players.get_mut(idx)?;
    if !std::mem::take(&mut user.use_item_pending) {
        return None;
    }
    let item = user.item.take()?;
    let user_id = user.id;

    match item {
        Item::Boost => {
            activate_boost(user, now_ms, kart, boost);
        }
        Item::Slow => {
            for rival in players
                .iter_mut()
                .filter(|other| other.id != user_id && !other.race.finished)
            {
                rival.speed *= tuning.slow_factor;
            }
        }
    }

    Some(RaceEvent::ItemUsed {
        player_id: user_id,
        item,
    })
}
