use crate::domain::events::RaceEvent;
use crate::domain::geometry::{Point, Segment, crosses_forward};
use crate::domain::state::Player;
use crate::domain::track::Track;
use crate::domain::tuning::RaceTuning;
use tracing::debug;

/// Detects finish-line and next-checkpoint crossings for one kart and advances its race state.
///
/// Expects `p.race.race_time` to be current for this tick; it becomes the finish time.
pub fn check_progress(
    p: &mut Player,
    track: &Track,
    now_ms: u64,
    tuning: &RaceTuning,
    events: &mut Vec<RaceEvent>,
) {
    if p.race.finished {
        return;
    }
    let from = p.prev_position();
    let to = p.position();
    let total_laps = track.race_settings.laps;
    let total_checkpoints = track.checkpoint_count();

    if let Some(finish) = track.finish_line {
        if debounce_elapsed(p.race.finish_line_crossed_at, now_ms, tuning)
            && crosses_forward(from, to, finish)
        {
            p.race.finish_line_crossed_at = Some(now_ms);
            events.push(cross_finish_line(p, total_laps, total_checkpoints));
            if p.race.finished {
                return;
            }
        }
    }

    if !p.race.has_started_lap {
        return;
    }
    if let Some(event) = check_next_checkpoint(p, track, from, to, now_ms, tuning) {
        events.push(event);
    }
}

fn debounce_elapsed(last: Option<u64>, now_ms: u64, tuning: &RaceTuning) -> bool {
    last.is_none_or(|at| now_ms.saturating_sub(at) >= tuning.crossing_debounce_ms)
}

fn cross_finish_line(p: &mut Player, total_laps: u32, total_checkpoints: usize) -> RaceEvent {
    let race = &mut p.race;

    // The finish line doubles as the start gate.
    if !race.has_started_lap {
        race.has_started_lap = true;
        race.lap = 1;
        race.next_checkpoint = 0;
        debug!(player_id = p.id, "lap 1 started");
        return RaceEvent::LapStarted {
            player_id: p.id,
            total_laps,
        };
    }

    if race.next_checkpoint < total_checkpoints {
        return RaceEvent::InvalidFinish {
            player_id: p.id,
            remaining: total_checkpoints - race.next_checkpoint,
            next_checkpoint: race.next_checkpoint,
        };
    }

    race.lap += 1;
    race.next_checkpoint = 0;
    if race.lap > total_laps {
        race.finished = true;
        race.finish_time = Some(race.race_time);
        race.lap = total_laps;
        debug!(player_id = p.id, finish_time = race.race_time, "finished");
        return RaceEvent::Finished {
            player_id: p.id,
            finish_time: race.race_time,
        };
    }

    debug!(player_id = p.id, lap = race.lap, total_laps, "lap completed");
    RaceEvent::LapCompleted {
        player_id: p.id,
        lap: race.lap,
        total_laps,
    }
}

fn check_next_checkpoint(
    p: &mut Player,
    track: &Track,
    from: Point,
    to: Point,
    now_ms: u64,
    tuning: &RaceTuning,
) -> Option<RaceEvent> {
    let index = p.race.next_checkpoint;
    let checkpoint: Segment = *track.checkpoints.get(index)?;

    let last = p.race.checkpoint_crossed_at.get(&index).copied();
    if !debounce_elapsed(last, now_ms, tuning) || !crosses_forward(from, to, checkpoint) {
        return None;
    }

    p.race.checkpoint_crossed_at.insert(index, now_ms);
    p.race.next_checkpoint += 1;
    Some(RaceEvent::CheckpointPassed {
        player_id: p.id,
        checkpoint: p.race.next_checkpoint,
        total: track.checkpoint_count(),
        lap: p.race.lap,
    })
}
