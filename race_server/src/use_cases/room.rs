// Room state machine: lobby, race, results and rematch voting.
//
// Synchronous and single-owner. The room task feeds it commands, ticks and due
// deadlines strictly in arrival order; every call returns the events to publish.

use super::types::{
    LobbyPlayer, Outbound, RaceSnapshot, RoomEvent, RoomPhase, RoomSettings, RoomSummary,
};
use crate::domain::systems::TickStep;
use crate::domain::systems::boosters::check_boosters;
use crate::domain::systems::items::{check_item_pickup, use_item};
use crate::domain::systems::karts::resolve_kart_collisions;
use crate::domain::systems::kinematics::tick_kart;
use crate::domain::systems::progress::check_progress;
use crate::domain::systems::ranking::{final_results, finish_position, update_live_ranks};
use crate::domain::systems::walls::resolve_walls;
use crate::domain::{
    InputState, KartSnapshot, Player, PlayerId, RaceEvent, RoomError, Track, TrackCatalog, Tuning,
};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

const KICK_NO_VOTE: &str = "no rematch vote";

/// Delayed transitions. At most one is pending; any state change replaces or clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    StartRaceClock,
    OpenRematchWindow,
    CloseRematchWindow,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at_ms: u64,
    transition: Transition,
}

pub struct Room {
    id: Arc<str>,
    private: bool,
    settings: RoomSettings,
    tuning: Tuning,
    catalog: Arc<TrackCatalog>,

    phase: RoomPhase,
    /// Join order; the host hands off to the front of this list.
    players: Vec<Player>,
    host_id: Option<PlayerId>,
    selected_map: String,

    track: Option<Arc<Track>>,
    /// Room clock value when the countdown elapsed.
    race_started_at: Option<u64>,
    warning_sent: bool,
    rematch_votes: HashSet<PlayerId>,
    pending: Option<Deadline>,
}

impl Room {
    pub fn new(
        id: impl Into<Arc<str>>,
        private: bool,
        settings: RoomSettings,
        tuning: Tuning,
        catalog: Arc<TrackCatalog>,
    ) -> Self {
        let selected_map = catalog.default_id().to_string();
        Self {
            id: id.into(),
            private,
            settings,
            tuning,
            catalog,
            phase: RoomPhase::Lobby,
            players: Vec::new(),
            host_id: None,
            selected_map,
            track: None,
            race_started_at: None,
            warning_sent: false,
            rematch_votes: HashSet::new(),
            pending: None,
        }
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn host_id(&self) -> Option<PlayerId> {
        self.host_id
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn selected_map(&self) -> &str {
        &self.selected_map
    }

    /// Room-clock time of the next delayed transition, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.map(|d| d.at_ms)
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.id.clone(),
            private: self.private,
            phase: self.phase,
            players: self.players.len(),
            capacity: self.settings.capacity,
            members: self.players.iter().map(|p| p.id).collect(),
            closed: false,
        }
    }

    /// The host is implicitly ready; everyone else must have marked ready.
    pub fn can_start(&self) -> bool {
        self.phase == RoomPhase::Lobby
            && !self.players.is_empty()
            && self
                .players
                .iter()
                .all(|p| p.ready || Some(p.id) == self.host_id)
    }

    fn index_of(&self, player_id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }

    fn require_player(&self, player_id: PlayerId) -> Result<usize, RoomError> {
        self.index_of(player_id).ok_or(RoomError::NotInRoom)
    }

    fn require_host(&self, player_id: PlayerId) -> Result<usize, RoomError> {
        let idx = self.require_player(player_id)?;
        if self.host_id != Some(player_id) {
            return Err(RoomError::NotHost);
        }
        Ok(idx)
    }

    fn require_lobby(&self) -> Result<(), RoomError> {
        match self.phase {
            RoomPhase::Lobby => Ok(()),
            RoomPhase::Starting | RoomPhase::Racing => Err(RoomError::AlreadyStarted),
            RoomPhase::Ended | RoomPhase::RematchPending => Err(RoomError::NotInLobby),
        }
    }

    fn players_update(&self) -> Outbound {
        let players = self
            .players
            .iter()
            .map(|p| LobbyPlayer {
                id: p.id,
                pseudo: p.pseudo.clone(),
                color: p.color.clone(),
                ready: p.ready,
                is_host: Some(p.id) == self.host_id,
            })
            .collect();
        Outbound::room(RoomEvent::PlayersUpdate {
            players,
            host_id: self.host_id,
            can_start: self.can_start(),
        })
    }

    pub fn join(
        &mut self,
        player_id: PlayerId,
        pseudo: String,
        color: String,
    ) -> Result<Vec<Outbound>, RoomError> {
        if self.index_of(player_id).is_some() {
            return Ok(Vec::new());
        }
        if self.phase != RoomPhase::Lobby {
            return Err(RoomError::AlreadyStarted);
        }
        if self.players.len() >= self.settings.capacity {
            return Err(RoomError::RoomFull);
        }

        let mut player = Player::new(player_id, pseudo.clone(), color);
        let is_host = self.host_id.is_none();
        if is_host {
            self.host_id = Some(player_id);
            player.ready = true;
        }
        self.players.push(player);
        info!(room_id = %self.id, player_id, is_host, players = self.players.len(), "player joined room");

        Ok(vec![
            Outbound::to(
                player_id,
                RoomEvent::Joined {
                    room_id: self.id.clone(),
                    private: self.private,
                    is_host,
                    player_id,
                    map_id: self.selected_map.clone(),
                },
            ),
            Outbound::all_except(player_id, RoomEvent::PlayerJoined { player_id, pseudo }),
            self.players_update(),
        ])
    }

    /// Removes a player for any reason: disconnect, leaving the results screen.
    pub fn leave(&mut self, player_id: PlayerId, now_ms: u64) -> Result<Vec<Outbound>, RoomError> {
        let idx = self.require_player(player_id)?;
        let mut out = Vec::new();
        self.remove_at(idx, &mut out);
        if self.players.is_empty() {
            return Ok(out);
        }

        match self.phase {
            RoomPhase::Lobby => out.push(self.players_update()),
            RoomPhase::Starting | RoomPhase::Racing => self.check_race_end(now_ms, &mut out),
            RoomPhase::Ended | RoomPhase::RematchPending => self.check_rematch_votes(&mut out),
        }
        Ok(out)
    }

    fn remove_at(&mut self, idx: usize, out: &mut Vec<Outbound>) {
        let player = self.players.remove(idx);
        self.rematch_votes.remove(&player.id);
        out.push(Outbound::room(RoomEvent::PlayerLeft {
            player_id: player.id,
        }));
        info!(room_id = %self.id, player_id = player.id, players = self.players.len(), "player left room");

        if self.players.is_empty() {
            self.host_id = None;
            self.pending = None;
            return;
        }
        if self.host_id == Some(player.id) {
            let next = &mut self.players[0];
            next.ready = true;
            self.host_id = Some(next.id);
            info!(room_id = %self.id, host_id = next.id, "host handed off");
            out.push(Outbound::room(RoomEvent::HostChanged { host_id: next.id }));
        }
    }

    pub fn set_ready(&mut self, player_id: PlayerId) -> Result<Vec<Outbound>, RoomError> {
        let idx = self.require_player(player_id)?;
        self.require_lobby()?;
        self.players[idx].ready = true;
        Ok(vec![self.players_update()])
    }

    pub fn select_map(
        &mut self,
        player_id: PlayerId,
        map_id: String,
    ) -> Result<Vec<Outbound>, RoomError> {
        self.require_host(player_id)?;
        self.require_lobby()?;
        if !self.catalog.contains(&map_id) {
            return Err(RoomError::UnknownMap);
        }
        debug!(room_id = %self.id, map_id = %map_id, "map selected");
        self.selected_map = map_id.clone();
        Ok(vec![Outbound::room(RoomEvent::MapSelected { map_id })])
    }

    pub fn change_color(
        &mut self,
        player_id: PlayerId,
        color: String,
    ) -> Result<Vec<Outbound>, RoomError> {
        let idx = self.require_player(player_id)?;
        self.require_lobby()?;
        self.players[idx].color = color.clone();
        Ok(vec![
            Outbound::room(RoomEvent::ColorChanged { player_id, color }),
            self.players_update(),
        ])
    }

    pub fn host_start(&mut self, player_id: PlayerId, now_ms: u64) -> Result<Vec<Outbound>, RoomError> {
        self.require_host(player_id)?;
        self.require_lobby()?;
        if !self.can_start() {
            return Err(RoomError::NotAllReady);
        }

        let track = self.catalog.resolve(&self.selected_map);
        for (i, p) in self.players.iter_mut().enumerate() {
            p.place_on_grid(track.spawn_for(i));
        }
        let countdown_ms = self.settings.start_countdown.as_millis() as u64;

        self.phase = RoomPhase::Starting;
        self.track = Some(track.clone());
        self.race_started_at = None;
        self.warning_sent = false;
        self.rematch_votes.clear();
        self.pending = Some(Deadline {
            at_ms: now_ms + countdown_ms,
            transition: Transition::StartRaceClock,
        });
        info!(room_id = %self.id, map_id = %track.id, players = self.players.len(), "race starting");

        Ok(vec![Outbound::room(RoomEvent::GameStarted {
            track,
            countdown_ms,
        })])
    }

    /// Overwrites the player's intents; an item use is consumed by the next tick.
    pub fn apply_input(
        &mut self,
        player_id: PlayerId,
        input: InputState,
        use_item: bool,
    ) -> Result<(), RoomError> {
        let idx = self.require_player(player_id)?;
        if !self.phase.is_simulating() {
            return Ok(());
        }
        let p = &mut self.players[idx];
        p.input = input;
        if use_item {
            p.use_item_pending = true;
        }
        Ok(())
    }

    pub fn vote_rematch(&mut self, player_id: PlayerId) -> Result<Vec<Outbound>, RoomError> {
        self.require_player(player_id)?;
        if !matches!(self.phase, RoomPhase::Ended | RoomPhase::RematchPending) {
            debug!(room_id = %self.id, player_id, phase = self.phase.as_str(), "rematch vote outside results ignored");
            return Ok(Vec::new());
        }
        if !self.rematch_votes.insert(player_id) {
            return Ok(Vec::new());
        }

        let mut out = vec![Outbound::room(RoomEvent::RematchVote {
            player_id,
            votes: self.rematch_votes.len(),
            total: self.players.len(),
        })];
        self.check_rematch_votes(&mut out);
        Ok(out)
    }

    fn check_rematch_votes(&mut self, out: &mut Vec<Outbound>) {
        let everyone_voted = !self.players.is_empty()
            && self.players.iter().all(|p| self.rematch_votes.contains(&p.id));
        if everyone_voted {
            info!(room_id = %self.id, map_id = %self.selected_map, "rematch starting");
            self.reset_to_lobby();
            out.push(Outbound::room(RoomEvent::RematchStarting {
                map_id: self.selected_map.clone(),
            }));
            out.push(self.players_update());
        }
    }

    fn reset_to_lobby(&mut self) {
        self.phase = RoomPhase::Lobby;
        self.pending = None;
        self.track = None;
        self.race_started_at = None;
        self.warning_sent = false;
        self.rematch_votes.clear();
        for p in &mut self.players {
            p.reset_race_state();
            p.ready = Some(p.id) == self.host_id;
        }
    }

    /// Applies the pending transition if its deadline has passed.
    pub fn fire_due(&mut self, now_ms: u64) -> Vec<Outbound> {
        let Some(deadline) = self.pending else {
            return Vec::new();
        };
        if now_ms < deadline.at_ms {
            return Vec::new();
        }
        self.pending = None;

        match (deadline.transition, self.phase) {
            (Transition::StartRaceClock, RoomPhase::Starting) => {
                self.phase = RoomPhase::Racing;
                self.race_started_at = Some(now_ms);
                info!(room_id = %self.id, "race clock started");
                vec![Outbound::room(RoomEvent::RaceClockStarted)]
            }
            (Transition::OpenRematchWindow, RoomPhase::Ended) => {
                let window_ms = self.settings.rematch_window.as_millis() as u64;
                self.phase = RoomPhase::RematchPending;
                self.pending = Some(Deadline {
                    at_ms: now_ms + window_ms,
                    transition: Transition::CloseRematchWindow,
                });
                vec![Outbound::room(RoomEvent::RematchOpened { window_ms })]
            }
            (Transition::CloseRematchWindow, RoomPhase::RematchPending) => self.expire_rematch(),
            (transition, phase) => {
                debug!(room_id = %self.id, ?transition, phase = phase.as_str(), "stale transition dropped");
                Vec::new()
            }
        }
    }

    fn expire_rematch(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        let non_voters: Vec<PlayerId> = self
            .players
            .iter()
            .map(|p| p.id)
            .filter(|id| !self.rematch_votes.contains(id))
            .collect();

        for player_id in non_voters {
            out.push(Outbound::to(player_id, RoomEvent::Kicked { reason: KICK_NO_VOTE }));
            if let Some(idx) = self.index_of(player_id) {
                self.remove_at(idx, &mut out);
            }
        }

        if !self.players.is_empty() {
            self.reset_to_lobby();
            out.push(Outbound::room(RoomEvent::ReturnToLobby));
            out.push(self.players_update());
        }
        out
    }

    /// Advances the race by one tick. No-op outside the simulating phases.
    pub fn tick<R: Rng>(&mut self, now_ms: u64, dt_ms: f32, rng: &mut R) -> Vec<Outbound> {
        let mut out = Vec::new();
        if !self.phase.is_simulating() {
            return out;
        }
        let Some(track) = self.track.clone() else {
            return out;
        };
        let limits = track.race_settings;

        let elapsed = self.race_started_at.map(|start| now_ms.saturating_sub(start));
        // A zero limit disables both the warning and the hard stop.
        if let Some(elapsed) = elapsed.filter(|_| limits.max_time > 0) {
            if limits.max_time_warning > 0 && !self.warning_sent && elapsed >= limits.max_time_warning {
                self.warning_sent = true;
                let remaining_ms = limits.max_time.saturating_sub(elapsed);
                info!(room_id = %self.id, remaining_ms, "time warning");
                out.push(Outbound::room(RoomEvent::TimeWarning { remaining_ms }));
            }
            if elapsed >= limits.max_time {
                self.force_end(now_ms, &mut out);
                return out;
            }
        }

        let nominal_ms = self.settings.tick_interval.as_secs_f32() * 1000.0;
        let step = TickStep::new(now_ms, dt_ms, nominal_ms);
        let tuning = self.tuning;
        let bounds = (track.width, track.height);
        let mut events = Vec::new();

        for idx in 0..self.players.len() {
            if self.players[idx].race.finished {
                continue;
            }
            self.players[idx].race.race_time = elapsed.unwrap_or(0);
            events.extend(use_item(
                &mut self.players,
                idx,
                now_ms,
                &tuning.kart,
                &tuning.boost,
                &tuning.items,
            ));

            let p = &mut self.players[idx];
            tick_kart(p, step, bounds, &tuning.kart, &tuning.boost);
            resolve_walls(p, track.wall_segments(), &tuning.kart, &tuning.walls, rng);
            events.extend(check_boosters(p, &track.boosters, now_ms, &tuning.kart, &tuning.boost));
            events.extend(check_item_pickup(p, &track.items, rng));
            check_progress(p, &track, now_ms, &tuning.race, &mut events);

            for event in events.drain(..) {
                out.push(self.route_race_event(event));
            }
        }

        resolve_kart_collisions(&mut self.players, &tuning.kart, &tuning.karts, rng);
        update_live_ranks(&mut self.players);
        self.check_race_end(now_ms, &mut out);
        out
    }

    fn route_race_event(&self, event: RaceEvent) -> Outbound {
        match event {
            RaceEvent::Finished {
                player_id,
                finish_time,
            } => {
                let position = finish_position(&self.players);
                let pseudo = self
                    .players
                    .iter()
                    .find(|p| p.id == player_id)
                    .map(|p| p.pseudo.clone())
                    .unwrap_or_default();
                info!(room_id = %self.id, player_id, finish_time, position, "player finished");
                Outbound::room(RoomEvent::PlayerFinished {
                    player_id,
                    pseudo,
                    finish_time,
                    position,
                })
            }
            other => Outbound::to(other.player_id(), RoomEvent::Progress(other)),
        }
    }

    /// Ends the race once everyone who got going has finished.
    fn check_race_end(&mut self, now_ms: u64, out: &mut Vec<Outbound>) {
        if !self.phase.is_simulating() {
            return;
        }
        let mut progressed = self.players.iter().filter(|p| p.race.has_progress()).peekable();
        if progressed.peek().is_none() {
            return;
        }
        if progressed.all(|p| p.race.finished) {
            self.end_race(now_ms, out);
        }
    }

    fn force_end(&mut self, now_ms: u64, out: &mut Vec<Outbound>) {
        info!(room_id = %self.id, "time limit reached");
        for p in self.players.iter_mut().filter(|p| !p.race.finished) {
            p.race.finished = true;
            p.race.finish_time = None;
        }
        self.end_race(now_ms, out);
    }

    fn end_race(&mut self, now_ms: u64, out: &mut Vec<Outbound>) {
        let race_time = self
            .race_started_at
            .map(|start| now_ms.saturating_sub(start))
            .unwrap_or(0);
        // Ranks are left as of the last tick; results tie-break on them.
        let results = final_results(&self.players);

        self.phase = RoomPhase::Ended;
        self.rematch_votes.clear();
        self.pending = Some(Deadline {
            at_ms: now_ms + self.settings.results_delay.as_millis() as u64,
            transition: Transition::OpenRematchWindow,
        });
        info!(room_id = %self.id, race_time, "race ended");
        out.push(Outbound::room(RoomEvent::RaceEnded { results, race_time }));
    }

    /// Snapshot of the race for broadcasting, while the tick loop runs.
    pub fn snapshot(&self, now_ms: u64) -> Option<RaceSnapshot> {
        if !self.phase.is_simulating() {
            return None;
        }
        let track = self.track.as_ref()?;
        let limits = track.race_settings;
        let game_time = self
            .race_started_at
            .map(|start| now_ms.saturating_sub(start))
            .unwrap_or(0);
        let max_time = (limits.max_time > 0).then_some(limits.max_time);

        Some(RaceSnapshot {
            karts: self.players.iter().map(KartSnapshot::from).collect(),
            total_checkpoints: track.checkpoint_count(),
            laps_to_win: limits.laps,
            game_time,
            max_time,
            remaining_time: max_time.map(|max| max.saturating_sub(game_time)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::types::Audience;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    const COUNTDOWN: u64 = 8_800;

    fn room_with(catalog: TrackCatalog) -> Room {
        Room::new(
            "ABC123",
            false,
            RoomSettings::default(),
            Tuning::default(),
            Arc::new(catalog),
        )
    }

    fn room() -> Room {
        room_with(TrackCatalog::default())
    }

    fn short_race_catalog() -> TrackCatalog {
        let mut track = Track::builtin_oval();
        track.id = "short".to_string();
        track.race_settings.laps = 1;
        track.race_settings.max_time = 1_000;
        track.race_settings.max_time_warning = 500;
        TrackCatalog::new([track], "short")
    }

    fn join(room: &mut Room, id: PlayerId) -> Vec<Outbound> {
        room.join(id, format!("P{id}"), "red".to_string())
            .expect("join accepted")
    }

    fn has(out: &[Outbound], pred: impl Fn(&RoomEvent) -> bool) -> bool {
        out.iter().any(|o| pred(&o.event))
    }

    /// Two players in a running race with the clock started at `COUNTDOWN`.
    fn racing_room(catalog: TrackCatalog) -> Room {
        let mut room = room_with(catalog);
        join(&mut room, 1);
        join(&mut room, 2);
        room.set_ready(2).expect("ready");
        room.host_start(1, 0).expect("start");
        room.fire_due(COUNTDOWN);
        room
    }

    #[test]
    fn when_first_player_joins_then_they_host_and_are_ready() {
        let mut room = room();
        let out = join(&mut room, 1);

        assert_eq!(room.host_id(), Some(1));
        assert!(room.players()[0].ready);
        assert!(out.iter().any(|o| o.audience == Audience::Player(1)
            && matches!(o.event, RoomEvent::Joined { is_host: true, .. })));

        let out = join(&mut room, 2);
        assert!(!room.players()[1].ready);
        assert!(out.iter().any(|o| o.audience == Audience::AllExcept(2)
            && matches!(o.event, RoomEvent::PlayerJoined { player_id: 2, .. })));
    }

    #[test]
    fn when_room_is_full_then_join_is_rejected() {
        let mut room = room();
        for id in 1..=8 {
            join(&mut room, id);
        }
        let err = room.join(9, "Late".into(), "blue".into()).unwrap_err();
        assert_eq!(err, RoomError::RoomFull);
        assert_eq!(room.players().len(), 8);
    }

    #[test]
    fn when_a_guest_is_not_ready_then_host_cannot_start() {
        let mut room = room();
        join(&mut room, 1);
        join(&mut room, 2);

        assert_eq!(room.host_start(1, 0).unwrap_err(), RoomError::NotAllReady);
        assert_eq!(room.host_start(2, 0).unwrap_err(), RoomError::NotHost);
        assert_eq!(room.phase(), RoomPhase::Lobby);

        room.set_ready(2).expect("ready");
        let out = room.host_start(1, 1_000).expect("start");

        assert!(has(&out, |e| matches!(e, RoomEvent::GameStarted { countdown_ms: 8_800, .. })));
        assert_eq!(room.phase(), RoomPhase::Starting);
        assert_eq!(room.next_deadline(), Some(1_000 + COUNTDOWN));
        assert_eq!(room.join(3, "Late".into(), "red".into()).unwrap_err(), RoomError::AlreadyStarted);
    }

    #[test]
    fn when_race_starts_then_players_are_placed_on_the_grid() {
        let mut room = room();
        join(&mut room, 1);
        room.host_start(1, 0).expect("start");

        let track = Track::builtin_oval();
        let p = &room.players()[0];
        assert_eq!((p.x, p.y), (track.spawn_points[0].x, track.spawn_points[0].y));
        assert_eq!(p.race.lap, 0);
        assert_eq!(p.speed, 0.0);
    }

    #[test]
    fn when_host_leaves_then_next_player_by_join_order_hosts_and_is_ready() {
        let mut room = room();
        join(&mut room, 1);
        join(&mut room, 2);
        join(&mut room, 3);

        let out = room.leave(1, 0).expect("leave");

        assert_eq!(room.host_id(), Some(2));
        assert!(room.players()[0].ready);
        assert!(has(&out, |e| matches!(e, RoomEvent::HostChanged { host_id: 2 })));
    }

    #[test]
    fn when_countdown_elapses_then_race_clock_starts() {
        let mut room = room();
        join(&mut room, 1);
        room.host_start(1, 0).expect("start");

        assert!(room.fire_due(COUNTDOWN - 1).is_empty());
        assert_eq!(room.phase(), RoomPhase::Starting);

        let out = room.fire_due(COUNTDOWN);
        assert!(has(&out, |e| matches!(e, RoomEvent::RaceClockStarted)));
        assert_eq!(room.phase(), RoomPhase::Racing);
        assert_eq!(room.next_deadline(), None);
    }

    #[test]
    fn when_throttle_is_held_then_the_snapshot_shows_the_kart_moving() {
        let mut rng = Pcg32::seed_from_u64(5);
        let mut room = room();
        join(&mut room, 1);
        room.host_start(1, 0).expect("start");
        let start_x = room.players()[0].x;

        let input = InputState {
            up: true,
            ..InputState::default()
        };
        room.apply_input(1, input, false).expect("input");
        for tick in 1..=30u64 {
            room.tick(tick * 16, 16.0, &mut rng);
        }

        let snapshot = room.snapshot(30 * 16).expect("snapshot while racing");
        assert_eq!(snapshot.game_time, 0);
        assert!(snapshot.karts[0].speed > 0.0);
        assert!(snapshot.karts[0].x > start_x);
        assert_eq!(snapshot.total_checkpoints, 3);
        assert_eq!(snapshot.laps_to_win, 3);
    }

    #[test]
    fn when_time_limit_is_disabled_then_no_warning_is_sent() {
        let mut rng = Pcg32::seed_from_u64(5);
        let mut track = Track::builtin_oval();
        track.id = "endless".to_string();
        track.race_settings.max_time = 0;
        track.race_settings.max_time_warning = 500;
        let mut room = racing_room(TrackCatalog::new([track], "endless"));

        let out = room.tick(COUNTDOWN + 10_000, 16.0, &mut rng);

        assert!(!has(&out, |e| matches!(e, RoomEvent::TimeWarning { .. })));
        assert_eq!(room.phase(), RoomPhase::Racing);
    }

    #[test]
    fn when_time_limit_is_reached_then_unfinished_players_are_dnf_and_ranked_last() {
        let mut rng = Pcg32::seed_from_u64(5);
        let mut room = racing_room(short_race_catalog());
        {
            let winner = &mut room.players[1];
            winner.race.has_started_lap = true;
            winner.race.lap = 1;
            winner.race.finished = true;
            winner.race.finish_time = Some(400);
            let slow = &mut room.players[0];
            slow.race.has_started_lap = true;
            slow.race.lap = 1;
        }

        let out = room.tick(COUNTDOWN + 500, 16.0, &mut rng);
        assert!(has(&out, |e| matches!(e, RoomEvent::TimeWarning { remaining_ms: 500 })));
        let out = room.tick(COUNTDOWN + 600, 16.0, &mut rng);
        assert!(!has(&out, |e| matches!(e, RoomEvent::TimeWarning { .. })));

        let out = room.tick(COUNTDOWN + 1_000, 16.0, &mut rng);
        let results = out
            .iter()
            .find_map(|o| match &o.event {
                RoomEvent::RaceEnded { results, race_time } => {
                    assert_eq!(*race_time, 1_000);
                    Some(results.clone())
                }
                _ => None,
            })
            .expect("race ended");

        assert_eq!(results[0].player_id, 2);
        assert!(!results[0].dnf);
        assert_eq!(results[1].player_id, 1);
        assert!(results[1].dnf);
        assert!(room.players()[0].race.finished);
        assert_eq!(room.players()[0].race.finish_time, None);
        assert_eq!(room.phase(), RoomPhase::Ended);
        assert_eq!(room.next_deadline(), Some(COUNTDOWN + 1_000 + 3_000));
    }

    #[test]
    fn when_everyone_who_started_has_finished_then_race_ends() {
        let mut rng = Pcg32::seed_from_u64(5);
        let mut room = racing_room(TrackCatalog::default());
        {
            let p = &mut room.players[0];
            p.race.has_started_lap = true;
            p.race.lap = 3;
            p.race.finished = true;
            p.race.finish_time = Some(90_000);
        }

        let out = room.tick(COUNTDOWN + 90_000, 16.0, &mut rng);

        assert!(has(&out, |e| matches!(e, RoomEvent::RaceEnded { .. })));
        assert_eq!(room.phase(), RoomPhase::Ended);
    }

    #[test]
    fn when_nobody_has_started_a_lap_then_race_keeps_running() {
        let mut rng = Pcg32::seed_from_u64(5);
        let mut room = racing_room(TrackCatalog::default());

        let out = room.tick(COUNTDOWN + 16, 16.0, &mut rng);

        assert!(!has(&out, |e| matches!(e, RoomEvent::RaceEnded { .. })));
        assert_eq!(room.phase(), RoomPhase::Racing);
    }

    fn ended_room() -> Room {
        let mut rng = Pcg32::seed_from_u64(5);
        let mut room = racing_room(short_race_catalog());
        room.tick(COUNTDOWN + 1_000, 16.0, &mut rng);
        assert_eq!(room.phase(), RoomPhase::Ended);
        room
    }

    #[test]
    fn when_everyone_votes_then_room_resets_to_lobby() {
        let mut room = ended_room();

        let out = room.vote_rematch(1).expect("vote");
        assert!(has(&out, |e| matches!(e, RoomEvent::RematchVote { votes: 1, total: 2, .. })));
        room.vote_rematch(1).expect("duplicate vote");

        let out = room.vote_rematch(2).expect("vote");
        assert!(has(&out, |e| matches!(e, RoomEvent::RematchStarting { map_id } if map_id == "short")));
        assert_eq!(room.phase(), RoomPhase::Lobby);
        assert_eq!(room.next_deadline(), None);
        assert!(room.players()[0].ready);
        assert!(!room.players()[1].ready);
        assert!(!room.players()[1].race.finished);
    }

    #[test]
    fn when_rematch_window_expires_then_non_voters_are_kicked() {
        let mut room = ended_room();
        let ended_at = COUNTDOWN + 1_000;

        let out = room.fire_due(ended_at + 3_000);
        assert!(has(&out, |e| matches!(e, RoomEvent::RematchOpened { window_ms: 10_000 })));
        assert_eq!(room.phase(), RoomPhase::RematchPending);

        room.vote_rematch(2).expect("vote");
        let out = room.fire_due(ended_at + 13_000);

        assert!(out.iter().any(|o| o.audience == Audience::Player(1)
            && matches!(o.event, RoomEvent::Kicked { .. })));
        assert!(has(&out, |e| matches!(e, RoomEvent::ReturnToLobby)));
        assert_eq!(room.players().len(), 1);
        assert_eq!(room.host_id(), Some(2));
        assert_eq!(room.phase(), RoomPhase::Lobby);
    }

    #[test]
    fn when_the_only_non_voter_leaves_then_rematch_starts() {
        let mut room = ended_room();
        room.vote_rematch(2).expect("vote");

        let out = room.leave(1, COUNTDOWN + 2_000).expect("leave");

        assert!(has(&out, |e| matches!(e, RoomEvent::RematchStarting { .. })));
        assert_eq!(room.phase(), RoomPhase::Lobby);
    }

    #[test]
    fn when_vote_arrives_outside_results_then_it_is_ignored() {
        let mut room = room();
        join(&mut room, 1);
        assert!(room.vote_rematch(1).expect("ignored").is_empty());
        assert_eq!(room.vote_rematch(42).unwrap_err(), RoomError::NotInRoom);
    }

    #[test]
    fn when_host_selects_a_map_then_only_catalog_maps_are_accepted() {
        let mut room = room_with(short_race_catalog());
        join(&mut room, 1);
        join(&mut room, 2);

        assert_eq!(room.select_map(1, "nowhere".into()).unwrap_err(), RoomError::UnknownMap);
        assert_eq!(room.select_map(2, "oval".into()).unwrap_err(), RoomError::NotHost);
        let out = room.select_map(1, "oval".into()).expect("select");
        assert!(has(&out, |e| matches!(e, RoomEvent::MapSelected { map_id } if map_id == "oval")));
        assert_eq!(room.selected_map(), "oval");
    }

    #[test]
    fn when_race_is_running_then_color_changes_are_rejected() {
        let mut room = racing_room(TrackCatalog::default());
        assert_eq!(
            room.change_color(1, "pink".into()).unwrap_err(),
            RoomError::AlreadyStarted
        );
    }

    #[test]
    fn when_last_player_leaves_then_pending_transitions_are_cancelled() {
        let mut room = room();
        join(&mut room, 1);
        room.host_start(1, 0).expect("start");
        assert!(room.next_deadline().is_some());

        room.leave(1, 100).expect("leave");

        assert!(room.is_empty());
        assert_eq!(room.next_deadline(), None);
        assert!(room.fire_due(COUNTDOWN).is_empty());
    }
}
