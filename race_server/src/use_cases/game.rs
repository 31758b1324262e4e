use super::room::Room;
use super::types::{Outbound, RaceSnapshot, RoomCommand, RoomEvent, RoomSummary};
use crate::domain::RoomError;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Outputs of a room task.
pub struct RoomOutputs {
    pub events_tx: broadcast::Sender<Outbound>,
    pub snapshot_tx: broadcast::Sender<RaceSnapshot>,
    pub summary_tx: watch::Sender<RoomSummary>,
}

/// Owns one room and serializes everything that mutates it: commands, ticks and deadlines.
///
/// The tick loop only runs while a race is simulating. The task exits when the room empties,
/// when every command sender is gone, or on shutdown; the published summary is then closed.
pub async fn room_task(
    mut room: Room,
    mut command_rx: mpsc::Receiver<RoomCommand>,
    outputs: RoomOutputs,
    tick_interval: Duration,
    shutdown: Arc<Notify>,
) {
    let epoch = Instant::now();
    let clock = move || epoch.elapsed().as_millis() as u64;
    let mut rng = Pcg32::from_rng(&mut rand::rng());
    let mut ticker: Option<Interval> = None;
    let mut last_tick = epoch;

    info!(room_id = %room.id(), "room opened");

    loop {
        if room.phase().is_simulating() {
            if ticker.is_none() {
                let (interval, previous) = start_ticker(tick_interval);
                ticker = Some(interval);
                last_tick = previous;
            }
        } else {
            ticker = None;
        }
        let deadline = room
            .next_deadline()
            .map(|at_ms| epoch + Duration::from_millis(at_ms));

        let out = tokio::select! {
            _ = shutdown.notified() => {
                // Exit cleanly when the registry tears the room down.
                break;
            }
            cmd = command_rx.recv() => match cmd {
                Some(cmd) => handle_command(&mut room, cmd, clock()),
                None => break,
            },
            at = next_tick(&mut ticker) => {
                let dt_ms = at.saturating_duration_since(last_tick).as_secs_f32() * 1000.0;
                last_tick = at;
                let now_ms = clock();
                let out = room.tick(now_ms, dt_ms, &mut rng);
                if let Some(snapshot) = room.snapshot(now_ms) {
                    let _ = outputs.snapshot_tx.send(snapshot);
                }
                out
            }
            _ = wait_until(deadline) => room.fire_due(clock()),
        };

        for outbound in out {
            // No receivers simply means nobody is listening right now.
            let _ = outputs.events_tx.send(outbound);
        }

        let summary = room.summary();
        outputs.summary_tx.send_if_modified(|current| {
            if *current == summary {
                return false;
            }
            *current = summary;
            true
        });

        if room.is_empty() {
            break;
        }
    }

    info!(room_id = %room.id(), "room closed");
    outputs.summary_tx.send_modify(|s| s.closed = true);
}

fn handle_command(room: &mut Room, cmd: RoomCommand, now_ms: u64) -> Vec<Outbound> {
    let player_id = cmd.player_id();
    let result = match cmd {
        RoomCommand::Join {
            player_id,
            pseudo,
            color,
            reply,
        } => {
            return match room.join(player_id, pseudo, color) {
                Ok(out) => {
                    let _ = reply.send(Ok(()));
                    out
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                    Vec::new()
                }
            };
        }
        RoomCommand::Leave { .. } | RoomCommand::LeaveResults { .. } => room.leave(player_id, now_ms),
        RoomCommand::SetReady { .. } => room.set_ready(player_id),
        RoomCommand::HostStart { .. } => room.host_start(player_id, now_ms),
        RoomCommand::SelectMap { map_id, .. } => room.select_map(player_id, map_id),
        RoomCommand::ChangeColor { color, .. } => room.change_color(player_id, color),
        RoomCommand::Input {
            input, use_item, ..
        } => room
            .apply_input(player_id, input, use_item)
            .map(|()| Vec::new()),
        RoomCommand::VoteRematch { .. } => room.vote_rematch(player_id),
    };

    match result {
        Ok(out) => out,
        Err(RoomError::NotInRoom) => {
            debug!(player_id, "command from a player not in the room dropped");
            Vec::new()
        }
        Err(err) => {
            debug!(player_id, %err, "room command rejected");
            vec![Outbound::to(
                player_id,
                RoomEvent::Rejected {
                    reason: err.reason(),
                },
            )]
        }
    }
}

/// A fresh ticker and the instant one period before its first tick.
fn start_ticker(period: Duration) -> (Interval, Instant) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let now = Instant::now();
    (interval, now.checked_sub(period).unwrap_or(now))
}

async fn next_tick(ticker: &mut Option<Interval>) -> Instant {
    match ticker {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InputState, PlayerId, TrackCatalog, Tuning};
    use crate::use_cases::types::{RoomPhase, RoomSettings};
    use tokio::sync::oneshot;

    struct Harness {
        command_tx: mpsc::Sender<RoomCommand>,
        events_rx: broadcast::Receiver<Outbound>,
        snapshot_rx: broadcast::Receiver<RaceSnapshot>,
        summary_rx: watch::Receiver<RoomSummary>,
        task: tokio::task::JoinHandle<()>,
    }

    fn spawn_room() -> Harness {
        let settings = RoomSettings::default();
        let room = Room::new(
            "TEST01",
            false,
            settings.clone(),
            Tuning::default(),
            Arc::new(TrackCatalog::default()),
        );
        let (command_tx, command_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = broadcast::channel(1024);
        let (snapshot_tx, snapshot_rx) = broadcast::channel(4);
        let (summary_tx, summary_rx) = watch::channel(room.summary());
        let task = tokio::spawn(room_task(
            room,
            command_rx,
            RoomOutputs {
                events_tx,
                snapshot_tx,
                summary_tx,
            },
            settings.tick_interval,
            Arc::new(Notify::new()),
        ));
        Harness {
            command_tx,
            events_rx,
            snapshot_rx,
            summary_rx,
            task,
        }
    }

    async fn join(h: &Harness, player_id: PlayerId) -> Result<(), RoomError> {
        let (reply, reply_rx) = oneshot::channel();
        h.command_tx
            .send(RoomCommand::Join {
                player_id,
                pseudo: format!("P{player_id}"),
                color: "red".into(),
                reply,
            })
            .await
            .expect("room task alive");
        reply_rx.await.expect("join reply")
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<Outbound>,
        pred: impl Fn(&RoomEvent) -> bool,
    ) -> Outbound {
        loop {
            match rx.recv().await {
                Ok(outbound) if pred(&outbound.event) => return outbound,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("room events closed"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn when_ticker_starts_then_first_tick_spans_a_full_period() {
        let period = Duration::from_millis(16);
        let (mut ticker, previous) = start_ticker(period);

        let first = ticker.tick().await;

        assert_eq!(first.saturating_duration_since(previous), period);
    }

    #[tokio::test(start_paused = true)]
    async fn when_host_starts_then_countdown_ticks_and_race_clock_follows() {
        let mut h = spawn_room();
        join(&h, 1).await.expect("join");
        wait_for(&mut h.events_rx, |e| matches!(e, RoomEvent::Joined { .. })).await;

        h.command_tx
            .send(RoomCommand::HostStart { player_id: 1 })
            .await
            .expect("send");
        wait_for(&mut h.events_rx, |e| matches!(e, RoomEvent::GameStarted { .. })).await;

        let snapshot = loop {
            match h.snapshot_rx.recv().await {
                Ok(snapshot) => break snapshot,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(err) => panic!("snapshot during countdown: {err}"),
            }
        };
        assert_eq!(snapshot.game_time, 0);
        assert_eq!(snapshot.karts.len(), 1);

        h.command_tx
            .send(RoomCommand::Input {
                player_id: 1,
                input: InputState {
                    up: true,
                    ..InputState::default()
                },
                use_item: false,
            })
            .await
            .expect("send");

        let started = tokio::time::Instant::now();
        wait_for(&mut h.events_rx, |e| matches!(e, RoomEvent::RaceClockStarted)).await;
        assert!(started.elapsed() >= Duration::from_millis(8_000));
        h.summary_rx
            .wait_for(|s| s.phase == RoomPhase::Racing)
            .await
            .expect("summary");
    }

    #[tokio::test(start_paused = true)]
    async fn when_a_guest_starts_then_only_they_get_a_rejection() {
        let mut h = spawn_room();
        join(&h, 1).await.expect("join");
        join(&h, 2).await.expect("join");

        h.command_tx
            .send(RoomCommand::HostStart { player_id: 2 })
            .await
            .expect("send");

        let rejected =
            wait_for(&mut h.events_rx, |e| matches!(e, RoomEvent::Rejected { .. })).await;
        assert!(rejected.audience.includes(2));
        assert!(!rejected.audience.includes(1));
    }

    #[tokio::test(start_paused = true)]
    async fn when_last_player_leaves_then_task_exits_and_summary_closes() {
        let mut h = spawn_room();
        join(&h, 1).await.expect("join");
        h.summary_rx
            .wait_for(|s| s.players == 1)
            .await
            .expect("summary");

        h.command_tx
            .send(RoomCommand::Leave { player_id: 1 })
            .await
            .expect("send");
        h.task.await.expect("room task");

        assert!(h.summary_rx.borrow().closed);
        assert_eq!(h.summary_rx.borrow().players, 0);
    }
}
