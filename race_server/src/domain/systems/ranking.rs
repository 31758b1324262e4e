use crate::domain::state::{Player, PlayerId};
use std::cmp::Ordering;

/// One row of the results table sent when a race ends.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceResult {
    pub player_id: PlayerId,
    pub pseudo: String,
    pub color: String,
    pub finished: bool,
    pub finish_time: Option<u64>,
    pub lap: u32,
    /// Live rank at the moment the race ended.
    pub position: usize,
    pub dnf: bool,
    pub final_position: usize,
}

/// Recomputes every kart's live rank (1-based).
///
/// Finished karts lead by finish time, then karts on track by progress, then karts that
/// have not crossed the start line yet, in join order.
pub fn update_live_ranks(players: &mut [Player]) {
    let mut finished: Vec<usize> = Vec::new();
    let mut racing: Vec<usize> = Vec::new();
    let mut waiting: Vec<usize> = Vec::new();
    for (idx, p) in players.iter().enumerate() {
        if p.race.finished {
            finished.push(idx);
        } else if p.race.has_started_lap {
            racing.push(idx);
        } else {
            waiting.push(idx);
        }
    }

    // Stable sorts keep join order on ties.
    finished.sort_by(|&a, &b| by_finish_time(&players[a], &players[b]));
    racing.sort_by(|&a, &b| {
        let (a, b) = (&players[a].race, &players[b].race);
        b.lap
            .cmp(&a.lap)
            .then(b.next_checkpoint.cmp(&a.next_checkpoint))
            .then(a.race_time.cmp(&b.race_time))
    });

    for (rank, idx) in finished.into_iter().chain(racing).chain(waiting).enumerate() {
        players[idx].race.rank = rank + 1;
    }
}

/// Number of karts that have finished; the rank announced for the latest finisher.
pub fn finish_position(players: &[Player]) -> usize {
    players.iter().filter(|p| p.race.finished).count()
}

/// Builds the final results table: timed finishers, then DNF, then karts still on track.
pub fn final_results(players: &[Player]) -> Vec<RaceResult> {
    let mut ordered: Vec<&Player> = players.iter().collect();
    ordered.sort_by(|a, b| {
        result_class(a).cmp(&result_class(b)).then_with(|| {
            if result_class(a) == 0 {
                by_finish_time(a, b)
            } else {
                // Falls back to the rank from the last tick, not current progress.
                b.race.lap.cmp(&a.race.lap).then(a.race.rank.cmp(&b.race.rank))
            }
        })
    });

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, p)| RaceResult {
            player_id: p.id,
            pseudo: p.pseudo.clone(),
            color: p.color.clone(),
            finished: p.race.finished,
            finish_time: p.race.finish_time,
            lap: p.race.lap,
            position: p.race.rank,
            dnf: p.race.is_dnf(),
            final_position: i + 1,
        })
        .collect()
}

fn result_class(p: &Player) -> u8 {
    match (p.race.finished, p.race.finish_time) {
        (true, Some(_)) => 0,
        (true, None) => 1,
        (false, _) => 2,
    }
}

fn by_finish_time(a: &Player, b: &Player) -> Ordering {
    match (a.race.finish_time, b.race.finish_time) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn racer(id: u64, lap: u32, next_checkpoint: usize, race_time: u64) -> Player {
        let mut p = Player::new(id, format!("Racer{id}"), "red");
        p.race.has_started_lap = lap > 0;
        p.race.lap = lap;
        p.race.next_checkpoint = next_checkpoint;
        p.race.race_time = race_time;
        p
    }

    fn finished(id: u64, finish_time: Option<u64>, lap: u32) -> Player {
        let mut p = racer(id, lap, 0, finish_time.unwrap_or(0));
        p.race.finished = true;
        p.race.finish_time = finish_time;
        p
    }

    fn ranks(players: &[Player]) -> Vec<(u64, usize)> {
        players.iter().map(|p| (p.id, p.race.rank)).collect()
    }

    #[test]
    fn when_laps_match_then_more_checkpoints_ranks_ahead_regardless_of_time() {
        let mut players = vec![racer(1, 2, 1, 10_000), racer(2, 2, 3, 90_000)];
        update_live_ranks(&mut players);
        assert_eq!(ranks(&players), vec![(1, 2), (2, 1)]);
    }

    #[test]
    fn when_progress_ties_then_lower_race_time_ranks_ahead() {
        let mut players = vec![racer(1, 1, 2, 5_000), racer(2, 1, 2, 4_000)];
        update_live_ranks(&mut players);
        assert_eq!(ranks(&players), vec![(1, 2), (2, 1)]);
    }

    #[test]
    fn when_some_karts_have_not_started_then_they_trail_in_join_order() {
        let mut players = vec![
            racer(1, 0, 0, 0),
            racer(2, 1, 0, 3_000),
            racer(3, 0, 0, 0),
            finished(4, Some(60_000), 3),
            finished(5, Some(55_000), 3),
        ];
        update_live_ranks(&mut players);
        assert_eq!(ranks(&players), vec![(1, 4), (2, 3), (3, 5), (4, 2), (5, 1)]);
    }

    #[test]
    fn when_time_limit_leaves_a_dnf_then_it_sorts_after_the_finisher() {
        let mut winner = finished(1, Some(80_000), 3);
        winner.race.rank = 1;
        let mut dnf = finished(2, None, 2);
        dnf.race.rank = 2;
        // Join order puts the DNF first.
        let players = vec![dnf, winner];

        let results = final_results(&players);

        assert_eq!(results[0].player_id, 1);
        assert_eq!(results[0].final_position, 1);
        assert!(!results[0].dnf);
        assert_eq!(results[1].player_id, 2);
        assert_eq!(results[1].final_position, 2);
        assert!(results[1].dnf);
        assert_eq!(results[1].finish_time, None);
    }

    #[test]
    fn when_several_karts_did_not_finish_then_laps_then_last_rank_decide() {
        let mut a = finished(1, None, 1);
        a.race.rank = 2;
        let mut b = finished(2, None, 2);
        b.race.rank = 3;
        let mut c = finished(3, None, 1);
        c.race.rank = 1;
        let unfinished = racer(4, 0, 0, 0);

        let results = final_results(&[a, b, c, unfinished]);
        let order: Vec<u64> = results.iter().map(|r| r.player_id).collect();

        assert_eq!(order, vec![2, 3, 1, 4]);
        assert_eq!(
            results.iter().map(|r| r.final_position).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn when_counting_finishers_then_only_finished_karts_count() {
        let players = vec![finished(1, Some(1), 3), racer(2, 2, 0, 0), finished(3, None, 1)];
        assert_eq!(finish_position(&players), 2);
    }
}
